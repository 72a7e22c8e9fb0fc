// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Observable status of controllers and gateways.
//!
//! A status is a small indicator (colour, shape, short text) plus an optional
//! longer detail. Controllers publish through a `watch` channel directly;
//! gateways go through a [`StatusReporter`] that coalesces bursts.

use std::time::Duration;

use chrono::{DateTime, Utc};
use nuclio_api::FunctionState;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::debug;

/// Indicator colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Fill {
    Green,
    Yellow,
    Red,
    Blue,
    Grey,
}

/// Indicator shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    Dot,
    Ring,
}

/// Short visual status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusIndicator {
    pub fill: Fill,
    pub shape: Shape,
    pub text: String,
}

impl StatusIndicator {
    /// Create an indicator.
    pub fn new(fill: Fill, shape: Shape, text: impl Into<String>) -> Self {
        Self {
            fill,
            shape,
            text: text.into(),
        }
    }

    /// Indicator for a remote lifecycle state.
    pub fn for_state(state: &FunctionState) -> Self {
        use Fill::*;
        use Shape::*;
        match state {
            FunctionState::Ready => Self::new(Green, Dot, ""),
            FunctionState::Imported => Self::new(Yellow, Dot, "Imported"),
            FunctionState::Building => Self::new(Yellow, Dot, "Building..."),
            FunctionState::ConfiguringResources => {
                Self::new(Yellow, Dot, "Configuring Resources...")
            }
            FunctionState::WaitingForBuild => Self::new(Yellow, Ring, "Waiting For Build..."),
            FunctionState::WaitingForResourceConfiguration => {
                Self::new(Yellow, Ring, "Waiting For Resource Configuration...")
            }
            FunctionState::WaitingForScaleResourceFromZero => {
                Self::new(Yellow, Ring, "Waiting to Scale Resource From Zero...")
            }
            FunctionState::WaitingForScaleResourceToZero => {
                Self::new(Yellow, Ring, "Waiting to Scale Resource To Zero...")
            }
            FunctionState::ScaledToZero => Self::new(Grey, Dot, "Scaled to Zero"),
            FunctionState::Error => Self::new(Red, Dot, "Error"),
            FunctionState::Unhealthy => Self::new(Red, Ring, "Unhealthy"),
            FunctionState::Other(tag) => Self::new(Yellow, Dot, tag.clone()),
        }
    }

    /// Ready, and the last invocation succeeded.
    pub fn ready() -> Self {
        Self::for_state(&FunctionState::Ready)
    }

    /// Invocations succeed but the control plane cannot be reached.
    pub fn ready_no_dashboard() -> Self {
        Self::new(Fill::Green, Shape::Ring, "")
    }

    /// Ready, with no invocation seen yet.
    pub fn ready_idle() -> Self {
        Self::new(Fill::Blue, Shape::Dot, "")
    }

    /// The remote reports no usable state, but invocations succeed.
    pub fn unhealthy_serving() -> Self {
        Self::new(Fill::Yellow, Shape::Ring, "Unhealthy (serving)")
    }

    /// The remote reports no state at all.
    pub fn unknown() -> Self {
        Self::new(Fill::Yellow, Shape::Dot, "Unknown")
    }

    /// The function declaration did not compile.
    pub fn invalid_config() -> Self {
        Self::new(Fill::Red, Shape::Ring, "Invalid config")
    }

    /// Deploying (no remote state known yet).
    pub fn deploying() -> Self {
        Self::new(Fill::Yellow, Shape::Dot, "Deploying...")
    }

    /// A tick or deploy failed.
    pub fn failure(text: impl Into<String>) -> Self {
        Self::new(Fill::Red, Shape::Ring, text)
    }

    /// Closed controller.
    pub fn closed() -> Self {
        Self::new(Fill::Grey, Shape::Ring, "Closed")
    }

    /// Same indicator with a different text.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }
}

/// One published status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    /// Short indicator.
    pub indicator: StatusIndicator,
    /// Longer explanation (remote error body, newest deployment log line).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// When the status was produced.
    pub at: DateTime<Utc>,
}

impl StatusReport {
    /// Report an indicator now.
    pub fn new(indicator: StatusIndicator) -> Self {
        Self {
            indicator,
            detail: None,
            at: Utc::now(),
        }
    }

    /// Attach a detail.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Default quiet period before an update is emitted.
pub const DEFAULT_DEBOUNCE_DELAY: Duration = Duration::from_millis(100);

/// Default upper bound on how long an update may be postponed.
pub const DEFAULT_DEBOUNCE_MAX_WAIT: Duration = Duration::from_millis(500);

/// Debounced status publisher.
///
/// Every [`report`](Self::report) restarts a `delay` timer; the latest status
/// is emitted once the timer fires. Under sustained reporting the status is
/// emitted anyway once `max_wait` has passed since the first pending report.
/// Dropping every handle flushes the pending status and stops the task.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    tx: mpsc::UnboundedSender<StatusReport>,
}

impl StatusReporter {
    /// Spawn the debounce task. Must be called inside a tokio runtime.
    pub fn spawn(
        delay: Duration,
        max_wait: Duration,
        initial: StatusReport,
    ) -> (Self, watch::Receiver<StatusReport>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = watch::channel(initial);
        tokio::spawn(debounce_loop(rx, out_tx, delay, max_wait));
        (Self { tx }, out_rx)
    }

    /// Queue a status for emission.
    pub fn report(&self, status: StatusReport) {
        // The task only exits once every sender is gone.
        let _ = self.tx.send(status);
    }
}

async fn debounce_loop(
    mut rx: mpsc::UnboundedReceiver<StatusReport>,
    out: watch::Sender<StatusReport>,
    delay: Duration,
    max_wait: Duration,
) {
    let mut pending: Option<StatusReport> = None;
    let mut quiet_deadline: Option<Instant> = None;
    let mut max_deadline: Option<Instant> = None;

    loop {
        let wake = match (quiet_deadline, max_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        tokio::select! {
            biased;

            received = rx.recv() => match received {
                Some(status) => {
                    let now = Instant::now();
                    pending = Some(status);
                    quiet_deadline = Some(now + delay);
                    max_deadline.get_or_insert(now + max_wait);
                }
                None => {
                    if let Some(status) = pending.take() {
                        out.send_replace(status);
                    }
                    break;
                }
            },

            _ = tokio::time::sleep_until(wake.unwrap_or_else(Instant::now)), if wake.is_some() => {
                if let Some(status) = pending.take() {
                    debug!(text = %status.indicator.text, "Emitting status");
                    out.send_replace(status);
                }
                quiet_deadline = None;
                max_deadline = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> StatusReport {
        StatusReport::new(StatusIndicator::new(Fill::Green, Shape::Dot, s))
    }

    #[test]
    fn test_state_table() {
        let unhealthy = StatusIndicator::for_state(&FunctionState::Unhealthy);
        assert_eq!(unhealthy.fill, Fill::Red);
        assert_eq!(unhealthy.shape, Shape::Ring);
        assert_eq!(unhealthy.text, "Unhealthy");

        let waiting = StatusIndicator::for_state(&FunctionState::WaitingForBuild);
        assert_eq!(waiting.shape, Shape::Ring);

        let other = StatusIndicator::for_state(&FunctionState::Other("exploded".into()));
        assert_eq!(other.fill, Fill::Yellow);
        assert_eq!(other.text, "exploded");
    }

    #[test]
    fn test_indicator_serializes_lowercase() {
        let json = serde_json::to_value(StatusIndicator::invalid_config()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"fill": "red", "shape": "ring", "text": "Invalid config"})
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_to_last_value() {
        let (reporter, mut rx) =
            StatusReporter::spawn(DEFAULT_DEBOUNCE_DELAY, DEFAULT_DEBOUNCE_MAX_WAIT, text("init"));

        for i in 0..3 {
            reporter.report(text(&format!("{i}")));
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!rx.has_changed().unwrap());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().indicator.text, "2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_sustained_reports_flush_at_max_wait() {
        let (reporter, mut rx) =
            StatusReporter::spawn(DEFAULT_DEBOUNCE_DELAY, DEFAULT_DEBOUNCE_MAX_WAIT, text("init"));

        // One report every 80ms never leaves a 100ms quiet gap.
        for i in 0..6 {
            reporter.report(text(&format!("{i}")));
            tokio::time::sleep(Duration::from_millis(80)).await;
        }
        // 480ms elapsed; nothing emitted yet.
        assert_eq!(rx.borrow().indicator.text, "init");

        // The quiet period would end at 580ms, the max wait at 500ms.
        reporter.report(text("6"));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().indicator.text, "6");
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_flushes_pending() {
        let (reporter, mut rx) =
            StatusReporter::spawn(DEFAULT_DEBOUNCE_DELAY, DEFAULT_DEBOUNCE_MAX_WAIT, text("init"));
        reporter.report(text("last"));
        drop(reporter);

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().indicator.text, "last");
    }
}
