// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bounded retry for idempotent control-plane reads.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Retry an operation up to `max_retries` times with a fixed delay.
///
/// Total attempts = 1 + `max_retries`. Errors for which `is_retryable`
/// returns false are returned immediately.
pub async fn retry_fixed<T, E, F, Fut, R>(
    max_retries: u32,
    delay: Duration,
    description: &str,
    mut attempt_fn: F,
    mut is_retryable: R,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: std::fmt::Display,
    R: FnMut(&E) -> bool,
{
    let mut attempt = 0;
    loop {
        match attempt_fn().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                if !is_retryable(&e) || attempt >= max_retries {
                    return Err(e);
                }
                attempt += 1;
                warn!(
                    attempt,
                    max_retries,
                    delay_ms = delay.as_millis() as u64,
                    description,
                    error = %e,
                    "Control-plane read failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<u32, String> = retry_fixed(
            3,
            Duration::ZERO,
            "test",
            || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    if n < 2 { Err("flaky".to_string()) } else { Ok(n) }
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_returns_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), String> = retry_fixed(
            5,
            Duration::ZERO,
            "test",
            || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err("fatal".to_string())
                }
            },
            |e| e != "fatal",
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), String> = retry_fixed(
            2,
            Duration::ZERO,
            "test",
            || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err("down".to_string())
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(result, Err("down".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
