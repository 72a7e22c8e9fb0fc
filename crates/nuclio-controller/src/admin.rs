// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Admin HTTP API.
//!
//! Routes:
//!
//! - `GET  /health`
//! - `GET  /functions` - snapshots of every controller
//! - `GET  /functions/{name}` - live remote resource
//! - `POST /functions/{name}/deploy` - forced redeploy, optional override body
//! - `GET  /functions/{name}/logs?tailLines=70` - logs per replica
//! - `POST /functions/{name}/invoke?timeoutMs=` - invoke through the gateway

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{info, warn};

use crate::compiler::DeployOverride;
use crate::controller::{ControllerSnapshot, DEFAULT_LOG_TAIL, FunctionController};
use crate::error::Error;
use crate::gateway::{Invocation, InvocationGateway, InvokeError};

/// A controller together with its gateway.
#[derive(Clone)]
pub struct ManagedFunction {
    pub controller: Arc<FunctionController>,
    pub gateway: Arc<InvocationGateway>,
}

/// Shared state of the admin API.
#[derive(Clone, Default)]
pub struct AppState {
    functions: Arc<BTreeMap<String, ManagedFunction>>,
}

impl AppState {
    pub fn new(functions: impl IntoIterator<Item = ManagedFunction>) -> Self {
        let functions = functions
            .into_iter()
            .map(|f| (f.controller.name().to_string(), f))
            .collect();
        Self {
            functions: Arc::new(functions),
        }
    }

    fn function(&self, name: &str) -> Result<&ManagedFunction, AdminError> {
        self.functions
            .get(name)
            .ok_or_else(|| AdminError::not_found(format!("Unknown function: {}", name)))
    }
}

/// Build the admin router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/functions", get(list_functions))
        .route("/functions/{name}", get(get_function))
        .route("/functions/{name}/deploy", post(deploy_function))
        .route("/functions/{name}/logs", get(function_logs))
        .route("/functions/{name}/invoke", post(invoke_function))
        .with_state(state)
}

// ============================================================================
// Errors
// ============================================================================

/// Error returned by admin handlers.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("{message}")]
    Http { status: StatusCode, message: String },

    /// Passed through from the control plane unchanged.
    #[error("control plane answered {status}")]
    Remote { status: StatusCode, body: String },

    /// The function was invoked and failed.
    #[error("{message}")]
    Upstream { status: Option<u16>, message: String },
}

impl AdminError {
    fn not_found(message: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<Error> for AdminError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::InvalidConfig(_) => return AdminError::bad_request("Invalid config"),
            Error::RemoteRejected { status, body } => {
                return AdminError::Remote {
                    status: StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
                    body: body.clone(),
                };
            }
            Error::Api(api) if api.is_not_found() => StatusCode::NOT_FOUND,
            Error::Transport(_) => StatusCode::BAD_GATEWAY,
            Error::Closed(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AdminError::Http {
            status,
            message: err.to_string(),
        }
    }
}

impl From<InvokeError> for AdminError {
    fn from(err: InvokeError) -> Self {
        let status = match err {
            InvokeError::Failed {
                status, message, ..
            } => return AdminError::Upstream { status, message },
            InvokeError::Backpressure { .. } => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::SERVICE_UNAVAILABLE,
        };
        AdminError::Http {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        match self {
            AdminError::Http { status, message } => {
                (status, Json(json!({ "error": message }))).into_response()
            }
            AdminError::Upstream { status, message } => (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": message, "status": status })),
            )
                .into_response(),
            AdminError::Remote { status, body } => match serde_json::from_str::<Value>(&body) {
                Ok(value) => (status, Json(value)).into_response(),
                Err(_) => (status, Json(json!({ "error": body }))).into_response(),
            },
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_functions(State(state): State<AppState>) -> Json<Vec<ControllerSnapshot>> {
    Json(
        state
            .functions
            .values()
            .map(|f| f.controller.snapshot())
            .collect(),
    )
}

async fn get_function(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, AdminError> {
    let function = state.function(&name)?;
    match function.controller.refresh().await? {
        Some(resource) => Ok(Json(serde_json::to_value(resource).map_err(Error::from)?)),
        None => Err(AdminError::not_found(format!(
            "Function {} is not deployed",
            name
        ))),
    }
}

async fn deploy_function(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, AdminError> {
    let function = state.function(&name)?;
    let update = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        Some(
            serde_json::from_slice::<DeployOverride>(&body)
                .map_err(|e| AdminError::bad_request(format!("Invalid deploy body: {}", e)))?,
        )
    };

    info!(function = %name, "Deploy requested via admin API");
    let resource = function.controller.redeploy(update).await.inspect_err(|e| {
        warn!(function = %name, error = %e, "Requested deploy failed");
    })?;
    Ok(Json(
        serde_json::to_value(resource).map_err(Error::from)?,
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogsQuery {
    tail_lines: Option<u32>,
}

async fn function_logs(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<BTreeMap<String, Value>>, AdminError> {
    let function = state.function(&name)?;
    let logs = function
        .controller
        .logs(query.tail_lines.unwrap_or(DEFAULT_LOG_TAIL))
        .await?;
    Ok(Json(logs))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvokeQuery {
    timeout_ms: Option<u64>,
}

async fn invoke_function(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<InvokeQuery>,
    Json(payload): Json<Value>,
) -> Result<Json<Invocation>, AdminError> {
    let function = state.function(&name)?;
    let invocation = function
        .gateway
        .invoke(
            &payload,
            &BTreeMap::new(),
            query.timeout_ms.map(Duration::from_millis),
        )
        .await?;
    Ok(Json(invocation))
}
