// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for nuclio-api.

use thiserror::Error;

/// Result type using ApiError.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors that can occur when talking to the nuclio control plane.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    /// Configuration error (missing or invalid values).
    #[error("configuration error: {0}")]
    Config(String),

    /// The requested resource does not exist (HTTP 404).
    #[error("not found: {0}")]
    NotFound(String),

    /// The control plane answered with a non-success status.
    #[error("rejected by control plane [{status}]: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Raw response body, kept for user-facing error events.
        body: String,
    },

    /// Connection-level failure (DNS, refused, reset).
    #[error("transport error: {0}")]
    Transport(String),

    /// Request timed out.
    #[error("request timed out after {0}ms")]
    Timeout(u64),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ApiError {
    /// True for a 404 from the control plane.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }

    /// True for failures that may succeed when retried unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Transport(_) | ApiError::Timeout(_))
    }

    /// True when the control plane reports that a resource already exists.
    pub fn is_conflict(&self) -> bool {
        match self {
            ApiError::Rejected { status, body } => {
                *status == 409 || body.to_lowercase().contains("already exists")
            }
            _ => false,
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Rejected { status, .. } => Some(*status),
            ApiError::NotFound(_) => Some(404),
            _ => None,
        }
    }

    /// Classify a reqwest failure, using the timeout that was applied to the call.
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout_ms: u64) -> Self {
        if err.is_timeout() {
            ApiError::Timeout(timeout_ms)
        } else if err.is_decode() {
            ApiError::Serialization(err.to_string())
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Serialization(err.to_string())
    }
}
