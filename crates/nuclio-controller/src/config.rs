// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for nuclio-controller.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use nuclio_api::{ClientConfig, DEFAULT_ADDRESS, DEFAULT_PROJECT};

/// Controller configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Control-plane address used when a function does not name one.
    pub address: String,
    /// Project used when a function does not name one.
    pub project: String,
    /// Timeout for control-plane reads.
    pub request_timeout: Duration,
    /// Timeout for create/replace/patch calls.
    pub deploy_timeout: Duration,
    /// Default timeout for forwarded invocations.
    pub invocation_timeout: Duration,
    /// Default in-flight ceiling per gateway (0 = unbounded).
    pub max_in_flight: usize,
    /// Bind address of the admin HTTP API.
    pub admin_addr: SocketAddr,
    /// Path of the function manifest.
    pub functions_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            project: DEFAULT_PROJECT.to_string(),
            request_timeout: Duration::from_millis(10_000),
            deploy_timeout: Duration::from_millis(60_000),
            invocation_timeout: Duration::from_millis(30_000),
            max_in_flight: 0,
            admin_addr: SocketAddr::from(([127, 0, 0, 1], 1881)),
            functions_file: PathBuf::from("functions.yaml"),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let address = std::env::var("NUCLIO_ADDRESS").unwrap_or(defaults.address);
        let project = std::env::var("NUCLIO_PROJECT_NAME")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(defaults.project);

        let request_timeout = millis_var("NUCLIO_REQUEST_TIMEOUT_MS", defaults.request_timeout)?;
        let deploy_timeout = millis_var("NUCLIO_DEPLOY_TIMEOUT_MS", defaults.deploy_timeout)?;
        let invocation_timeout =
            millis_var("NUCLIO_INVOCATION_TIMEOUT_MS", defaults.invocation_timeout)?;

        let max_in_flight = match std::env::var("NUCLIO_MAX_IN_FLIGHT") {
            Ok(v) => v
                .parse()
                .map_err(|e| ConfigError::Invalid("NUCLIO_MAX_IN_FLIGHT", format!("{}", e)))?,
            Err(_) => defaults.max_in_flight,
        };

        let admin_addr = match std::env::var("NUCLIO_ADMIN_ADDR") {
            Ok(v) => v
                .parse()
                .map_err(|e| ConfigError::Invalid("NUCLIO_ADMIN_ADDR", format!("{}", e)))?,
            Err(_) => defaults.admin_addr,
        };

        let functions_file = std::env::var("NUCLIO_FUNCTIONS_FILE")
            .map(PathBuf::from)
            .unwrap_or(defaults.functions_file);

        Ok(Self {
            address,
            project,
            request_timeout,
            deploy_timeout,
            invocation_timeout,
            max_in_flight,
            admin_addr,
            functions_file,
        })
    }

    /// Control-plane client settings for `address`.
    pub fn client_config(&self, address: &str) -> ClientConfig {
        ClientConfig::new()
            .with_address(address)
            .with_request_timeout(self.request_timeout)
            .with_deploy_timeout(self.deploy_timeout)
    }
}

fn millis_var(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match std::env::var(name) {
        Ok(v) => v
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| ConfigError::Invalid(name, format!("{}", e))),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable holds a value that cannot be parsed.
    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.address, "http://localhost:8070");
        assert_eq!(config.project, "default");
        assert_eq!(config.invocation_timeout, Duration::from_secs(30));
        assert_eq!(config.max_in_flight, 0);
        assert_eq!(config.admin_addr.port(), 1881);
    }

    #[test]
    fn test_client_config_carries_timeouts() {
        let config = Config {
            request_timeout: Duration::from_millis(1500),
            deploy_timeout: Duration::from_millis(90_000),
            ..Config::default()
        };
        let client = config.client_config("http://dashboard:8070/");
        assert_eq!(client.address, "http://dashboard:8070");
        assert_eq!(client.request_timeout, Duration::from_millis(1500));
        assert_eq!(client.deploy_timeout, Duration::from_millis(90_000));
    }

    #[test]
    fn test_invalid_error_names_variable() {
        let err = ConfigError::Invalid("NUCLIO_MAX_IN_FLIGHT", "invalid digit".to_string());
        assert!(err.to_string().contains("NUCLIO_MAX_IN_FLIGHT"));
    }
}
