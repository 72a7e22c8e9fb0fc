// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Nuclio control-plane client
//!
//! Typed access to the nuclio dashboard REST API: projects, functions,
//! replicas and replica logs.
//!
//! The [`ControlPlane`] trait is the seam between reconciliation logic and
//! the transport. [`HttpControlPlane`] talks to a real dashboard;
//! [`MockControlPlane`] keeps everything in memory for tests.
//!
//! # Example
//!
//! ```no_run
//! use nuclio_api::{ClientConfig, ControlPlane, HttpControlPlane};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = HttpControlPlane::new(
//!     ClientConfig::new().with_address("http://nuclio-dashboard:8070"),
//! )?;
//!
//! backend.ensure_project("default").await?;
//!
//! if let Some(function) = backend.get_function("default", "echo").await? {
//!     println!("echo is {:?}", function.state());
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
mod config;
mod error;
pub mod retry;
pub mod types;

pub use backend::{
    ControlPlane, HttpControlPlane, MockCall, MockControlPlane, MockOp, http::PROJECT_HEADER,
};
pub use config::{ClientConfig, DEFAULT_ADDRESS, DEFAULT_PROJECT};
pub use error::{ApiError, Result};
pub use types::{
    DesiredState, FUNCTION_API_VERSION, FUNCTION_KIND, FunctionMetadata, FunctionResource,
    FunctionState, FunctionStatus, LogEntry, Project, ProjectMetadata, ReplicaList,
};
