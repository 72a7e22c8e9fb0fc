// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock control plane for testing.
//!
//! Keeps projects and functions in memory, records every mutating call and
//! lets tests drive the remote lifecycle by hand (`set_state`) or inject
//! failures for a single upcoming call (`fail_next`).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard};

use super::traits::ControlPlane;
use crate::error::{ApiError, Result};
use crate::types::{DesiredState, FunctionResource, FunctionStatus, Project, ReplicaList};

/// A mutating call observed by the mock.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    /// `create_project(name)`
    CreateProject(String),
    /// `create_function(project, body)`
    Create { project: String, body: Value },
    /// `replace_function(project, name, body)`
    Replace {
        project: String,
        name: String,
        body: Value,
    },
    /// `patch_desired_state(project, name, state)`
    Patch {
        project: String,
        name: String,
        state: DesiredState,
    },
}

/// Operation selector for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    ListProjects,
    CreateProject,
    Get,
    Create,
    Replace,
    Patch,
    Replicas,
    Logs,
}

#[derive(Default)]
struct MockState {
    projects: Vec<String>,
    functions: HashMap<(String, String), FunctionResource>,
    replicas: HashMap<(String, String), Vec<String>>,
    logs: HashMap<String, Value>,
    calls: Vec<MockCall>,
    failures: HashMap<MockOp, VecDeque<ApiError>>,
}

/// In-memory control plane.
pub struct MockControlPlane {
    state: Arc<Mutex<MockState>>,
    gets: AtomicUsize,
    latency: Duration,
    /// State tag assigned to a function after create/replace/patch.
    pub deploy_state: String,
}

impl Default for MockControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

impl MockControlPlane {
    /// Create an empty mock. Mutations leave functions `building`.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            gets: AtomicUsize::new(0),
            latency: Duration::ZERO,
            deploy_state: "building".to_string(),
        }
    }

    /// Delay every control-plane call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Create a mock whose mutations land functions directly in `state`.
    pub fn with_deploy_state(state: &str) -> Self {
        Self {
            deploy_state: state.to_string(),
            ..Self::new()
        }
    }

    /// Register an existing project.
    pub async fn add_project(&self, name: &str) {
        let mut state = self.state.lock().await;
        if !state.projects.iter().any(|p| p == name) {
            state.projects.push(name.to_string());
        }
    }

    /// Store a remote function as-is.
    pub async fn put_function(&self, project: &str, resource: FunctionResource) {
        let mut state = self.state.lock().await;
        state.functions.insert(
            (project.to_string(), resource.metadata.name.clone()),
            resource,
        );
    }

    /// Set the remote state tag of a stored function.
    pub async fn set_state(&self, project: &str, name: &str, tag: &str) {
        let mut state = self.state.lock().await;
        if let Some(resource) = state
            .functions
            .get_mut(&(project.to_string(), name.to_string()))
        {
            resource.status.get_or_insert_with(FunctionStatus::default).state =
                Some(tag.to_string());
        }
    }

    /// Replace the status section of a stored function.
    pub async fn set_status(&self, project: &str, name: &str, status: FunctionStatus) {
        let mut state = self.state.lock().await;
        if let Some(resource) = state
            .functions
            .get_mut(&(project.to_string(), name.to_string()))
        {
            resource.status = Some(status);
        }
    }

    /// Remove a stored function.
    pub async fn remove_function(&self, project: &str, name: &str) {
        let mut state = self.state.lock().await;
        state
            .functions
            .remove(&(project.to_string(), name.to_string()));
    }

    /// Current remote copy of a function.
    pub async fn function(&self, project: &str, name: &str) -> Option<FunctionResource> {
        let state = self.state.lock().await;
        state
            .functions
            .get(&(project.to_string(), name.to_string()))
            .cloned()
    }

    /// Set the replica names of a function.
    pub async fn set_replicas(&self, project: &str, name: &str, replicas: &[&str]) {
        let mut state = self.state.lock().await;
        state.replicas.insert(
            (project.to_string(), name.to_string()),
            replicas.iter().map(|r| r.to_string()).collect(),
        );
    }

    /// Set the log body returned for a replica.
    pub async fn set_logs(&self, replica: &str, logs: Value) {
        let mut state = self.state.lock().await;
        state.logs.insert(replica.to_string(), logs);
    }

    /// Fail the next call of `op` with `error`. Failures queue up in order.
    pub async fn fail_next(&self, op: MockOp, error: ApiError) {
        let mut state = self.state.lock().await;
        state.failures.entry(op).or_default().push_back(error);
    }

    /// All mutating calls, oldest first.
    pub async fn calls(&self) -> Vec<MockCall> {
        self.state.lock().await.calls.clone()
    }

    /// Number of create/replace/patch calls.
    pub async fn mutation_count(&self) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| !matches!(c, MockCall::CreateProject(_)))
            .count()
    }

    /// Number of `get_function` calls.
    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    async fn remote(&self) -> MutexGuard<'_, MockState> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.state.lock().await
    }

    fn take_failure(state: &mut MockState, op: MockOp) -> Result<()> {
        match state.failures.get_mut(&op).and_then(|q| q.pop_front()) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn store(&self, state: &mut MockState, project: &str, body: &Value) -> Result<String> {
        let mut resource = FunctionResource::from_document(body.clone())?;
        resource.status = Some(FunctionStatus {
            state: Some(self.deploy_state.clone()),
            ..FunctionStatus::default()
        });
        let name = resource.metadata.name.clone();
        state
            .functions
            .insert((project.to_string(), name.clone()), resource);
        Ok(name)
    }
}

#[async_trait]
impl ControlPlane for MockControlPlane {
    fn backend_type(&self) -> &'static str {
        "mock"
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        let mut state = self.remote().await;
        Self::take_failure(&mut state, MockOp::ListProjects)?;
        Ok(state.projects.iter().map(Project::named).collect())
    }

    async fn create_project(&self, name: &str) -> Result<()> {
        let mut state = self.remote().await;
        Self::take_failure(&mut state, MockOp::CreateProject)?;
        state.calls.push(MockCall::CreateProject(name.to_string()));
        if state.projects.iter().any(|p| p == name) {
            return Err(ApiError::Rejected {
                status: 409,
                body: format!("project {} already exists", name),
            });
        }
        state.projects.push(name.to_string());
        Ok(())
    }

    async fn get_function(&self, project: &str, name: &str) -> Result<Option<FunctionResource>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let mut state = self.remote().await;
        Self::take_failure(&mut state, MockOp::Get)?;
        Ok(state
            .functions
            .get(&(project.to_string(), name.to_string()))
            .cloned())
    }

    async fn create_function(&self, project: &str, body: &Value) -> Result<()> {
        let mut state = self.remote().await;
        Self::take_failure(&mut state, MockOp::Create)?;
        state.calls.push(MockCall::Create {
            project: project.to_string(),
            body: body.clone(),
        });
        self.store(&mut state, project, body)?;
        Ok(())
    }

    async fn replace_function(&self, project: &str, name: &str, body: &Value) -> Result<()> {
        let mut state = self.remote().await;
        Self::take_failure(&mut state, MockOp::Replace)?;
        state.calls.push(MockCall::Replace {
            project: project.to_string(),
            name: name.to_string(),
            body: body.clone(),
        });
        if !state
            .functions
            .contains_key(&(project.to_string(), name.to_string()))
        {
            return Err(ApiError::NotFound(name.to_string()));
        }
        self.store(&mut state, project, body)?;
        Ok(())
    }

    async fn patch_desired_state(
        &self,
        project: &str,
        name: &str,
        desired: DesiredState,
    ) -> Result<()> {
        let mut state = self.remote().await;
        Self::take_failure(&mut state, MockOp::Patch)?;
        state.calls.push(MockCall::Patch {
            project: project.to_string(),
            name: name.to_string(),
            state: desired,
        });
        let deploy_state = self.deploy_state.clone();
        match state
            .functions
            .get_mut(&(project.to_string(), name.to_string()))
        {
            Some(resource) => {
                resource.status.get_or_insert_with(FunctionStatus::default).state =
                    Some(deploy_state);
                Ok(())
            }
            None => Err(ApiError::NotFound(name.to_string())),
        }
    }

    async fn list_replicas(&self, project: &str, name: &str) -> Result<ReplicaList> {
        let mut state = self.remote().await;
        Self::take_failure(&mut state, MockOp::Replicas)?;
        let names = state
            .replicas
            .get(&(project.to_string(), name.to_string()))
            .cloned()
            .unwrap_or_default();
        Ok(ReplicaList { names })
    }

    async fn get_logs(
        &self,
        _project: &str,
        _name: &str,
        replica: &str,
        _tail_lines: u32,
    ) -> Result<Value> {
        let mut state = self.remote().await;
        Self::take_failure(&mut state, MockOp::Logs)?;
        state
            .logs
            .get(replica)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(replica.to_string()))
    }
}
