// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error type tests for nuclio-api.

use nuclio_api::ApiError;

#[test]
fn test_rejected_error_display() {
    let err = ApiError::Rejected {
        status: 500,
        body: "build failed".to_string(),
    };
    let display = err.to_string();
    assert!(display.contains("500"));
    assert!(display.contains("build failed"));
    assert_eq!(err.status(), Some(500));
}

#[test]
fn test_timeout_error_display() {
    let err = ApiError::Timeout(10000);
    assert!(err.to_string().contains("timed out"));
    assert!(err.to_string().contains("10000"));
    assert!(err.is_transient());
}

#[test]
fn test_not_found_classification() {
    let err = ApiError::NotFound("/api/functions/echo".to_string());
    assert!(err.is_not_found());
    assert!(!err.is_transient());
    assert_eq!(err.status(), Some(404));
}

#[test]
fn test_conflict_by_status_or_body() {
    assert!(
        ApiError::Rejected {
            status: 409,
            body: String::new()
        }
        .is_conflict()
    );
    assert!(
        ApiError::Rejected {
            status: 400,
            body: "Project Already Exists".to_string()
        }
        .is_conflict()
    );
    assert!(!ApiError::Transport("reset".to_string()).is_conflict());
}

#[test]
fn test_transport_is_transient() {
    assert!(ApiError::Transport("connection refused".to_string()).is_transient());
    assert!(!ApiError::Config("bad".to_string()).is_transient());
}
