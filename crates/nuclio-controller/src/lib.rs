// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! nuclio-controller - Function Reconciliation
//!
//! Keeps declared nuclio functions deployed and answers invocations on their
//! behalf.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌─────────────────────────────────────────────┐
//! │  functions.yaml  │────►│ compiler: raw declaration -> DesiredSpec    │
//! └──────────────────┘     └──────────────────────┬──────────────────────┘
//!                                                 │
//!                                                 ▼
//! ┌──────────────────┐     ┌─────────────────────────────────────────────┐
//! │    admin API     │────►│ controller: poll loop, single-flight deploy │
//! │   (axum, 1881)   │     │   planner: create / patch / replace / noop  │
//! └────────┬─────────┘     └──────────────────────┬──────────────────────┘
//!          │                                      │ nuclio-api
//!          ▼                                      ▼
//! ┌──────────────────┐     ┌─────────────────────────────────────────────┐
//! │     gateway      │────►│          nuclio dashboard (8070)            │
//! │ admission + POST │     └─────────────────────────────────────────────┘
//! └──────────────────┘
//! ```
//!
//! # Controller Lifecycle
//!
//! ```text
//!   Pending ──► deploy ──► building ──► ready ◄──────────┐
//!                  ▲          │           │              │
//!                  │          ▼           ▼              │
//!                  │        error     unhealthy ──► redeploy
//!                  │                      │
//!                  └──── absent ◄─────────┘
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `NUCLIO_ADDRESS` | `http://localhost:8070` | Dashboard address |
//! | `NUCLIO_PROJECT_NAME` | `default` | Default project |
//! | `NUCLIO_REQUEST_TIMEOUT_MS` | `10000` | Read timeout |
//! | `NUCLIO_DEPLOY_TIMEOUT_MS` | `60000` | Create/replace/patch timeout |
//! | `NUCLIO_INVOCATION_TIMEOUT_MS` | `30000` | Default invocation timeout |
//! | `NUCLIO_MAX_IN_FLIGHT` | `0` | Default in-flight limit (0 = unlimited) |
//! | `NUCLIO_ADMIN_ADDR` | `127.0.0.1:1881` | Admin API bind address |
//! | `NUCLIO_FUNCTIONS_FILE` | `functions.yaml` | Function manifest |
//!
//! # Modules
//!
//! - [`compiler`]: Desired-state compiler
//! - [`document`]: Deep merge, semantic diff and path assignment on JSON documents
//! - [`planner`]: Update planner
//! - [`controller`]: Reconciliation state machine
//! - [`gateway`]: Invocation admission gateway
//! - [`status`]: Status indicators and the debounced reporter
//! - [`admin`]: Admin HTTP API

/// Configuration loaded from environment variables.
pub mod config;

/// Error types for controller operations.
pub mod error;

/// JSON document helpers.
pub mod document;

/// Desired-state compiler.
pub mod compiler;

/// Diff & update planner.
pub mod planner;

/// Invocation and health endpoint derivation.
pub mod endpoints;

/// Status indicators and debounced reporting.
pub mod status;

/// Per-function reconciliation controller.
pub mod controller;

/// Invocation admission gateway.
pub mod gateway;

/// Admin HTTP API.
pub mod admin;

/// Function manifest loading.
pub mod manifest;

/// Embeddable runtime.
pub mod runtime;

pub use compiler::{CompileDefaults, DesiredSpec, RawFunctionConfig, compile};
pub use config::Config;
pub use controller::{FunctionController, InvocationOutcome, Phase, TickDecision, TickOutcome};
pub use error::{Error, Result};
pub use gateway::{InvocationGateway, InvokeError, InvokeSettings};
pub use planner::{Action, plan};
pub use runtime::ControllerRuntime;
pub use status::{StatusIndicator, StatusReport, StatusReporter};
