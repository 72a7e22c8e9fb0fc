// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for the control-plane client.

use std::time::Duration;

use crate::error::{ApiError, Result};

/// Project used when none is configured.
pub const DEFAULT_PROJECT: &str = "default";

/// Dashboard address used when none is configured.
pub const DEFAULT_ADDRESS: &str = "http://localhost:8070";

/// Configuration for [`HttpControlPlane`](crate::HttpControlPlane).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the nuclio dashboard API (no trailing slash).
    pub address: String,
    /// Timeout applied to reads (GET).
    pub request_timeout: Duration,
    /// Timeout applied to create/replace/patch calls.
    pub deploy_timeout: Duration,
    /// Retries for idempotent reads that fail at the transport level.
    pub read_retries: u32,
    /// Fixed delay between read retries.
    pub retry_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            request_timeout: Duration::from_secs(10),
            deploy_timeout: Duration::from_secs(60),
            read_retries: 2,
            retry_delay: Duration::from_millis(200),
        }
    }
}

impl ClientConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration from environment variables.
    ///
    /// Environment variables:
    /// - `NUCLIO_ADDRESS`: dashboard address (default: "http://localhost:8070")
    /// - `NUCLIO_REQUEST_TIMEOUT_MS`: read timeout in milliseconds (default: 10000)
    /// - `NUCLIO_DEPLOY_TIMEOUT_MS`: create/replace/patch timeout in milliseconds (default: 60000)
    pub fn from_env() -> Result<Self> {
        let address =
            std::env::var("NUCLIO_ADDRESS").unwrap_or_else(|_| DEFAULT_ADDRESS.to_string());

        let request_timeout_ms: u64 = std::env::var("NUCLIO_REQUEST_TIMEOUT_MS")
            .unwrap_or_else(|_| "10000".to_string())
            .parse()
            .map_err(|e| ApiError::Config(format!("invalid NUCLIO_REQUEST_TIMEOUT_MS: {}", e)))?;

        let deploy_timeout_ms: u64 = std::env::var("NUCLIO_DEPLOY_TIMEOUT_MS")
            .unwrap_or_else(|_| "60000".to_string())
            .parse()
            .map_err(|e| ApiError::Config(format!("invalid NUCLIO_DEPLOY_TIMEOUT_MS: {}", e)))?;

        Ok(Self::default()
            .with_address(address)
            .with_request_timeout(Duration::from_millis(request_timeout_ms))
            .with_deploy_timeout(Duration::from_millis(deploy_timeout_ms)))
    }

    /// Set the dashboard address. A trailing slash is dropped.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        let address = address.into();
        self.address = address.trim_end_matches('/').to_string();
        self
    }

    /// Set the read timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the create/replace/patch timeout.
    pub fn with_deploy_timeout(mut self, timeout: Duration) -> Self {
        self.deploy_timeout = timeout;
        self
    }

    /// Set the read retry policy.
    pub fn with_read_retries(mut self, retries: u32, delay: Duration) -> Self {
        self.read_retries = retries;
        self.retry_delay = delay;
        self
    }
}
