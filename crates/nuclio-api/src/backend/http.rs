// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP backend for the nuclio dashboard API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};

use super::traits::ControlPlane;
use crate::config::ClientConfig;
use crate::error::{ApiError, Result};
use crate::retry::retry_fixed;
use crate::types::{DesiredState, DesiredStatePatch, FunctionResource, Project, ReplicaList};

/// Header scoping function calls to a project.
pub const PROJECT_HEADER: &str = "x-nuclio-project-name";

/// Control plane reached over the nuclio dashboard REST API.
///
/// Reads use `request_timeout` and are retried on transport failures;
/// mutations use `deploy_timeout` and are never retried here. The caller's
/// poll cadence is the retry loop for those.
#[derive(Debug, Clone)]
pub struct HttpControlPlane {
    http: reqwest::Client,
    config: ClientConfig,
}

impl HttpControlPlane {
    /// Create a backend with the given configuration.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ApiError::Config(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { http, config })
    }

    /// Create a backend from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Get the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.address, path)
    }

    fn request(&self, method: Method, path: &str, project: Option<&str>) -> RequestBuilder {
        let mut request = self
            .http
            .request(method, self.url(path))
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(project) = project {
            request = request.header(PROJECT_HEADER, project);
        }
        request
    }

    /// Send a request and map non-success statuses to errors.
    async fn send(&self, request: RequestBuilder, timeout: Duration) -> Result<Response> {
        let timeout_ms = timeout.as_millis() as u64;
        let response = request
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ApiError::from_reqwest(e, timeout_ms))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().to_string();
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(url));
        }
        Err(ApiError::Rejected {
            status: status.as_u16(),
            body,
        })
    }

    /// GET a JSON document, retrying transport failures.
    async fn get_json<T: DeserializeOwned>(&self, path: &str, project: Option<&str>) -> Result<T> {
        let timeout = self.config.request_timeout;
        let response = retry_fixed(
            self.config.read_retries,
            self.config.retry_delay,
            path,
            || self.send(self.request(Method::GET, path, project), timeout),
            ApiError::is_transient,
        )
        .await?;

        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::from_reqwest(e, timeout.as_millis() as u64))
    }

    /// Send a mutation with the deploy timeout.
    async fn mutate(
        &self,
        method: Method,
        path: &str,
        project: Option<&str>,
        body: &Value,
    ) -> Result<Response> {
        let response = self
            .send(
                self.request(method.clone(), path, project).json(body),
                self.config.deploy_timeout,
            )
            .await?;
        debug!(method = %method, path, status = response.status().as_u16(), "Control-plane mutation accepted");
        Ok(response)
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    fn backend_type(&self) -> &'static str {
        "http"
    }

    #[instrument(skip(self))]
    async fn list_projects(&self) -> Result<Vec<Project>> {
        // The dashboard answers with a map keyed by project name.
        let projects: Value = self.get_json("/api/projects", None).await?;
        let values: Vec<Value> = match projects {
            Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
            Value::Array(items) => items,
            _ => Vec::new(),
        };
        Ok(values
            .into_iter()
            .filter_map(|v| serde_json::from_value::<Project>(v).ok())
            .collect())
    }

    #[instrument(skip(self))]
    async fn create_project(&self, name: &str) -> Result<()> {
        let body = serde_json::to_value(Project::named(name))?;
        let response = self
            .mutate(Method::POST, "/api/projects", None, &body)
            .await?;
        if response.status() != StatusCode::CREATED {
            let status = response.status().as_u16();
            return Err(ApiError::Rejected {
                status,
                body: format!("failed to create project {}: unexpected status {}", name, status),
            });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_function(&self, project: &str, name: &str) -> Result<Option<FunctionResource>> {
        match self
            .get_json::<FunctionResource>(&format!("/api/functions/{}", name), Some(project))
            .await
        {
            Ok(resource) => Ok(Some(resource)),
            Err(ApiError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, body))]
    async fn create_function(&self, project: &str, body: &Value) -> Result<()> {
        self.mutate(Method::POST, "/api/functions", Some(project), body)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, body))]
    async fn replace_function(&self, project: &str, name: &str, body: &Value) -> Result<()> {
        self.mutate(
            Method::PUT,
            &format!("/api/functions/{}", name),
            Some(project),
            body,
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn patch_desired_state(
        &self,
        project: &str,
        name: &str,
        state: DesiredState,
    ) -> Result<()> {
        let body = serde_json::to_value(DesiredStatePatch {
            desired_state: state,
        })?;
        self.mutate(
            Method::PATCH,
            &format!("/api/functions/{}", name),
            Some(project),
            &body,
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_replicas(&self, project: &str, name: &str) -> Result<ReplicaList> {
        self.get_json(&format!("/api/functions/{}/replicas", name), Some(project))
            .await
    }

    #[instrument(skip(self))]
    async fn get_logs(
        &self,
        project: &str,
        name: &str,
        replica: &str,
        tail_lines: u32,
    ) -> Result<Value> {
        let path = format!("/api/functions/{}/logs/{}", name, replica);
        let timeout = self.config.request_timeout;
        let tail = tail_lines.to_string();
        let response = retry_fixed(
            self.config.read_retries,
            self.config.retry_delay,
            &path,
            || {
                self.send(
                    self.request(Method::GET, &path, Some(project))
                        .query(&[("follow", "false"), ("tailLines", tail.as_str())]),
                    timeout,
                )
            },
            ApiError::is_transient,
        )
        .await?;

        let text = response
            .text()
            .await
            .map_err(|e| ApiError::from_reqwest(e, timeout.as_millis() as u64))?;
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}
