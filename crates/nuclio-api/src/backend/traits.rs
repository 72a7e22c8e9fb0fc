// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Control-plane trait definitions.
//!
//! Defines the abstract interface to the remote function control plane.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::error::Result;
use crate::types::{DesiredState, FunctionResource, Project, ReplicaList};

/// Trait for control-plane backends.
///
/// Backends are thin transports: they do not decide *what* to change, only
/// carry one request to the remote API. Reconciliation decisions are made by
/// the caller.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Backend type identifier (e.g., "http", "mock").
    fn backend_type(&self) -> &'static str;

    /// List all projects.
    async fn list_projects(&self) -> Result<Vec<Project>>;

    /// Create a project.
    async fn create_project(&self, name: &str) -> Result<()>;

    /// Fetch a function. Returns `Ok(None)` when the function does not exist.
    async fn get_function(&self, project: &str, name: &str) -> Result<Option<FunctionResource>>;

    /// Create a function from a composed document.
    async fn create_function(&self, project: &str, body: &Value) -> Result<()>;

    /// Replace a function with a full merged document.
    async fn replace_function(&self, project: &str, name: &str, body: &Value) -> Result<()>;

    /// Set the desired state of a function without changing its body.
    async fn patch_desired_state(
        &self,
        project: &str,
        name: &str,
        state: DesiredState,
    ) -> Result<()>;

    /// List the replica names of a function.
    async fn list_replicas(&self, project: &str, name: &str) -> Result<ReplicaList>;

    /// Fetch the last `tail_lines` log lines of one replica.
    ///
    /// Returns the parsed JSON body when the server answers with JSON, else
    /// the raw text as a JSON string.
    async fn get_logs(
        &self,
        project: &str,
        name: &str,
        replica: &str,
        tail_lines: u32,
    ) -> Result<Value>;

    /// Create the project if it does not exist yet.
    ///
    /// Concurrent controllers may race on creation, so a conflict answer is
    /// treated as success. Returns true if this call created the project.
    async fn ensure_project(&self, name: &str) -> Result<bool> {
        let projects = self.list_projects().await?;
        if projects.iter().any(|p| p.metadata.name == name) {
            return Ok(false);
        }

        match self.create_project(name).await {
            Ok(()) => {
                info!(project = %name, "Created project");
                Ok(true)
            }
            Err(e) if e.is_conflict() => Ok(false),
            Err(e) => Err(e),
        }
    }
}
