// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Invocation admission gateway.
//!
//! Forwards payloads to a function's invocation URL, limiting how many may be
//! in flight and refusing work while the function cannot serve it. Outcomes
//! are fed back to the controller, which uses them to pick its poll cadence.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::controller::{FunctionController, InFlightGuard, InvocationOutcome};
use crate::status::{
    DEFAULT_DEBOUNCE_DELAY, DEFAULT_DEBOUNCE_MAX_WAIT, Fill, Shape, StatusIndicator, StatusReport,
    StatusReporter,
};

/// Default per-invocation timeout.
pub const DEFAULT_INVOCATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-function gateway settings, as declared in the manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeSettings {
    /// Maximum concurrent invocations; `0` means unlimited.
    #[serde(default)]
    pub max_in_flight: Option<usize>,
    /// Per-invocation timeout in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Headers added to every invocation.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Reasons an invocation was refused or failed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InvokeError {
    /// The in-flight limit is reached. Nothing was sent.
    #[error("too many invocations in flight ({in_flight}/{max_in_flight})")]
    Backpressure { in_flight: usize, max_in_flight: usize },

    /// No invocation URL is known yet.
    #[error("no endpoint known for function {0}")]
    NoEndpoint(String),

    /// A deploy is in progress.
    #[error("function {0} is being redeployed")]
    Redeploying(String),

    /// The function is in the `error` state.
    #[error("function {0} is in error state")]
    FunctionFailed(String),

    /// The controller is closed or its config is invalid.
    #[error("function {0} is not available")]
    Closed(String),

    /// The request was sent and failed.
    #[error("invocation failed: {message}")]
    Failed {
        /// HTTP status, when the function answered.
        status: Option<u16>,
        /// Response body or transport error.
        message: String,
        /// Wall time of the attempt.
        duration_ms: u64,
    },
}

/// Body of a function response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
}

impl ResponseBody {
    fn from_bytes(bytes: &[u8]) -> Self {
        match serde_json::from_slice(bytes) {
            Ok(value) => ResponseBody::Json(value),
            Err(_) => ResponseBody::Text(String::from_utf8_lossy(bytes).into_owned()),
        }
    }
}

/// A successful invocation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Invocation {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: ResponseBody,
    pub duration_ms: u64,
}

/// Admission gateway for one function.
pub struct InvocationGateway {
    controller: Arc<FunctionController>,
    client: reqwest::Client,
    headers: BTreeMap<String, String>,
    max_in_flight: usize,
    timeout: Duration,
    reporter: StatusReporter,
    status_rx: watch::Receiver<StatusReport>,
}

impl InvocationGateway {
    /// Create a gateway. Must be called inside a tokio runtime.
    pub fn new(
        controller: Arc<FunctionController>,
        settings: InvokeSettings,
        client: reqwest::Client,
    ) -> Self {
        Self::with_defaults(controller, settings, client, 0, DEFAULT_INVOCATION_TIMEOUT)
    }

    /// Create a gateway whose unset settings fall back to the given limits.
    pub fn with_defaults(
        controller: Arc<FunctionController>,
        settings: InvokeSettings,
        client: reqwest::Client,
        max_in_flight: usize,
        timeout: Duration,
    ) -> Self {
        let (reporter, status_rx) = StatusReporter::spawn(
            DEFAULT_DEBOUNCE_DELAY,
            DEFAULT_DEBOUNCE_MAX_WAIT,
            StatusReport::new(StatusIndicator::new(Fill::Grey, Shape::Dot, "")),
        );
        Self {
            controller,
            client,
            headers: settings.headers,
            max_in_flight: settings.max_in_flight.unwrap_or(max_in_flight),
            timeout: settings
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(timeout),
            reporter,
            status_rx,
        }
    }

    /// Function served by this gateway.
    pub fn controller(&self) -> &Arc<FunctionController> {
        &self.controller
    }

    /// Configured in-flight limit (`0` is unlimited).
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Debounced gateway status.
    pub fn subscribe_status(&self) -> watch::Receiver<StatusReport> {
        self.status_rx.clone()
    }

    /// Forward `payload` to the function.
    ///
    /// `headers` are applied over the configured ones. `timeout` overrides the
    /// configured per-invocation timeout.
    pub async fn invoke(
        &self,
        payload: &Value,
        headers: &BTreeMap<String, String>,
        timeout: Option<Duration>,
    ) -> Result<Invocation, InvokeError> {
        let name = self.controller.name().to_string();
        let admission = match self.controller.admit(self.max_in_flight) {
            Ok(admission) => admission,
            Err(InvokeError::NoEndpoint(name)) => {
                self.reporter.report(StatusReport::new(StatusIndicator::new(
                    Fill::Yellow,
                    Shape::Ring,
                    "No Endpoint",
                )));
                return Err(InvokeError::NoEndpoint(name));
            }
            Err(e) => {
                debug!(function = %name, reason = %e, "Invocation refused");
                return Err(e);
            }
        };

        debug!(function = %name, url = %admission.url(), "Invoking function");
        let started = Instant::now();
        let result = self
            .send(admission.url(), payload, headers, timeout.unwrap_or(self.timeout))
            .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok((status, response_headers, body)) if (200..300).contains(&status) => {
                let done = admission.complete(InvocationOutcome::Success { status });
                self.reporter.report(StatusReport::new(StatusIndicator::new(
                    Fill::Green,
                    Shape::Dot,
                    counter_text(done.in_flight),
                )));
                Ok(Invocation {
                    status,
                    headers: response_headers,
                    body: ResponseBody::from_bytes(&body),
                    duration_ms,
                })
            }
            Ok((status, _, body)) => {
                let message = String::from_utf8_lossy(&body).into_owned();
                self.fail(
                    admission,
                    InvocationOutcome::Failure {
                        status: Some(status),
                        code: None,
                    },
                    status.to_string(),
                );
                Err(InvokeError::Failed {
                    status: Some(status),
                    message,
                    duration_ms,
                })
            }
            Err(e) => {
                let code = transport_code(&e);
                let message = e.to_string();
                self.fail(
                    admission,
                    InvocationOutcome::Failure {
                        status: None,
                        code: Some(code.to_string()),
                    },
                    code.to_string(),
                );
                Err(InvokeError::Failed {
                    status: None,
                    message,
                    duration_ms,
                })
            }
        }
    }

    fn fail(&self, admission: InFlightGuard, outcome: InvocationOutcome, label: String) {
        let done = admission.complete(outcome);
        if done.redeploying {
            debug!(function = %self.controller.name(), "Invocation failed during redeploy");
            return;
        }
        warn!(function = %self.controller.name(), reason = %label, "Invocation failed");
        self.reporter.report(StatusReport::new(StatusIndicator::new(
            Fill::Red,
            Shape::Dot,
            match counter_text(done.in_flight) {
                count if count.is_empty() => label,
                count => format!("{} {}", label, count),
            },
        )));
    }

    async fn send(
        &self,
        url: &str,
        payload: &Value,
        headers: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> reqwest::Result<(u16, BTreeMap<String, String>, Vec<u8>)> {
        let response = self
            .client
            .post(url)
            .headers(merge_headers(&self.headers, headers))
            .json(payload)
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status().as_u16();
        let response_headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.to_string(), v.to_str().ok()?.to_string())))
            .collect();
        let body = response.bytes().await?;
        Ok((status, response_headers, body.to_vec()))
    }
}

fn merge_headers(configured: &BTreeMap<String, String>, call: &BTreeMap<String, String>) -> HeaderMap {
    let mut map = HeaderMap::new();
    map.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    for (key, value) in configured.iter().chain(call.iter()) {
        match (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => warn!(header = %key, "Skipping invalid header"),
        }
    }
    map
}

/// In-flight count shown in the indicator, blank unless calls overlap.
fn counter_text(in_flight: usize) -> String {
    if in_flight > 1 {
        in_flight.to_string()
    } else {
        String::new()
    }
}

fn transport_code(err: &reqwest::Error) -> &'static str {
    if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connect"
    } else if err.is_body() || err.is_decode() {
        "body"
    } else {
        "request"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_headers_override_configured() {
        let configured = BTreeMap::from([
            ("x-tenant".to_string(), "acme".to_string()),
            ("content-type".to_string(), "text/plain".to_string()),
        ]);
        let call = BTreeMap::from([("x-tenant".to_string(), "globex".to_string())]);

        let map = merge_headers(&configured, &call);
        assert_eq!(map["x-tenant"], "globex");
        assert_eq!(map[CONTENT_TYPE], "text/plain");
    }

    #[test]
    fn test_invalid_header_skipped() {
        let configured = BTreeMap::from([("bad header".to_string(), "x".to_string())]);
        let map = merge_headers(&configured, &BTreeMap::new());
        assert_eq!(map.len(), 1);
        assert_eq!(map[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_response_body_falls_back_to_text() {
        assert_eq!(
            ResponseBody::from_bytes(br#"{"ok":true}"#),
            ResponseBody::Json(serde_json::json!({"ok": true}))
        );
        assert_eq!(
            ResponseBody::from_bytes(b"hello"),
            ResponseBody::Text("hello".into())
        );
    }

    #[test]
    fn test_counter_shown_only_when_calls_overlap() {
        assert_eq!(counter_text(0), "");
        assert_eq!(counter_text(1), "");
        assert_eq!(counter_text(3), "3");
    }

    #[test]
    fn test_settings_deserialize_camel_case() {
        let settings: InvokeSettings =
            serde_yaml::from_str("maxInFlight: 4\ntimeoutMs: 1500\nheaders:\n  x-a: b\n").unwrap();
        assert_eq!(settings.max_in_flight, Some(4));
        assert_eq!(settings.timeout_ms, Some(1500));
        assert_eq!(settings.headers["x-a"], "b");
    }
}
