// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for nuclio-controller.

use nuclio_api::ApiError;
use thiserror::Error;

/// Controller errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// The function configuration could not be compiled. Terminal for the controller.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// The control plane rejected a request.
    #[error("Rejected by control plane [{status}]: {body}")]
    RemoteRejected {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// Network failure or timeout talking to the control plane.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A deploy is already running for this function.
    #[error("Deploy already in progress for {0}")]
    DeployInProgress(String),

    /// The controller was closed.
    #[error("Controller closed: {0}")]
    Closed(String),

    /// Other control-plane client failure.
    #[error("Control plane error: {0}")]
    Api(ApiError),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing failed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl From<ApiError> for Error {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Rejected { status, body } => Error::RemoteRejected { status, body },
            ApiError::Transport(msg) => Error::Transport(msg),
            ApiError::Timeout(ms) => Error::Transport(format!("request timed out after {}ms", ms)),
            other => Error::Api(other),
        }
    }
}

impl Error {
    /// HTTP status reported by the control plane, if any.
    pub fn remote_status(&self) -> Option<u16> {
        match self {
            Error::RemoteRejected { status, .. } => Some(*status),
            Error::Api(e) => e.status(),
            _ => None,
        }
    }
}

/// Result type using controller Error.
pub type Result<T> = std::result::Result<T, Error>;
