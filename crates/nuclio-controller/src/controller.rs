// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Reconciliation state machine.
//!
//! One [`FunctionController`] owns one function. Its poll loop fetches the
//! remote resource, classifies the lifecycle state, triggers deploys when
//! the state and the last invocation outcome call for it, and schedules the
//! next poll:
//!
//! | Observation                         | Action                       | Next poll |
//! |-------------------------------------|------------------------------|-----------|
//! | not found                           | deploy (single-flight)       | 1s, 3s if already deploying |
//! | transport failure                   | none                         | 1s        |
//! | ready, last invocation succeeded    | none                         | 5s        |
//! | ready, otherwise                    | none                         | 1s        |
//! | error                               | end transition               | 5s        |
//! | unhealthy                           | deploy unless serving/deploying | 1s     |
//! | no state, last invocation succeeded | mark serving                 | 1s        |
//! | no state, otherwise                 | deploy unless deploying      | 1s        |
//! | scaled to zero                      | none                         | 5s        |
//! | building / configuring              | none                         | 1s        |
//! | waiting for build/resources/scale   | none                         | 3s        |
//! | anything else                       | none                         | 1s        |
//!
//! Two flags track deploys. `deploying` counts deploy calls in flight and
//! makes unforced deploys single-flight. `redeploying` marks the transition
//! after a mutation: the gateway refuses traffic and absorbs failures until
//! a tick observes any state other than building or waiting.
//!
//! State lives behind a `std::sync::Mutex` that is never held across an
//! `.await`; remote calls run unlocked and their results are applied only if
//! the controller is still open.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use nuclio_api::{ApiError, ControlPlane, DesiredState, FunctionResource, FunctionState};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::compiler::{DeployOverride, DesiredSpec};
use crate::endpoints::EndpointSet;
use crate::error::{Error, Result};
use crate::gateway::InvokeError;
use crate::planner::{self, Action};
use crate::status::{StatusIndicator, StatusReport};

/// Poll delay after quick-changing observations.
pub const FAST_POLL: Duration = Duration::from_millis(1000);

/// Poll delay while waiting on the platform.
pub const WAITING_POLL: Duration = Duration::from_millis(3000);

/// Poll delay for settled states.
pub const SETTLED_POLL: Duration = Duration::from_millis(5000);

/// Default number of log lines fetched per replica.
pub const DEFAULT_LOG_TAIL: u32 = 70;

/// Outcome of the most recent invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum InvocationOutcome {
    /// No invocation yet, or no endpoint to send it to.
    #[default]
    Unknown,
    /// The function answered with a success status.
    Success {
        /// HTTP status.
        status: u16,
    },
    /// The invocation failed.
    Failure {
        /// HTTP status, when the function answered.
        status: Option<u16>,
        /// Transport failure description otherwise.
        code: Option<String>,
    },
}

impl InvocationOutcome {
    /// The invocation succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, InvocationOutcome::Success { .. })
    }
}

/// Classified lifecycle of the managed function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// Not observed yet.
    Pending,
    /// The control plane reports no such function.
    Absent,
    /// The function exists but reports no state.
    Unknown,
    /// A reported lifecycle state.
    State(FunctionState),
    /// The declaration did not compile; the controller never runs.
    InvalidConfig,
    /// The controller was closed.
    Closed,
}

impl Phase {
    /// Tag used in snapshots and logs.
    pub fn tag(&self) -> &str {
        match self {
            Phase::Pending => "pending",
            Phase::Absent => "absent",
            Phase::Unknown => "unknown",
            Phase::State(state) => state.as_tag(),
            Phase::InvalidConfig => "invalidConfig",
            Phase::Closed => "closed",
        }
    }
}

impl Serialize for Phase {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.tag())
    }
}

/// What a tick decided.
#[derive(Debug, Clone, PartialEq)]
pub enum TickDecision {
    /// A deploy ran and applied this action.
    Deployed(Action),
    /// A deploy was wanted but another one is in flight.
    DeploySkipped,
    /// A deploy was attempted and failed.
    DeployFailed(String),
    /// The platform is busy with the function.
    Defer,
    /// Nothing to do.
    NoOp,
    /// The function is in the `error` state.
    Failed,
    /// No healthy state is reported, but invocations succeed.
    Serving,
    /// The control plane could not be reached.
    Unreachable(String),
    /// The tick failed for another reason.
    Degraded(String),
    /// The controller is closed (or never started).
    Closed,
}

/// Result of one reconciliation tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    /// Classification after the tick.
    pub phase: Phase,
    /// Decision taken.
    pub decision: TickDecision,
    /// Delay before the next tick.
    pub delay: Duration,
}

/// Outcome of a deploy request.
#[derive(Debug, Clone, PartialEq)]
pub enum DeployOutcome {
    /// The planner ran and its action was applied.
    Applied(Action),
    /// Dropped: a deploy is already in progress.
    Skipped,
}

/// Mutable per-function state.
#[derive(Debug)]
struct ControllerState {
    desired: Option<DesiredSpec>,
    observed: Option<FunctionResource>,
    phase: Phase,
    deploying: usize,
    redeploying: bool,
    outcome: InvocationOutcome,
    in_flight: usize,
    endpoints: EndpointSet,
    project_ready: bool,
    closed: bool,
    last_polled_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// Point-in-time view of a controller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerSnapshot {
    pub name: String,
    pub project: Option<String>,
    pub phase: Phase,
    pub deploying: bool,
    pub redeploying: bool,
    pub last_invocation: InvocationOutcome,
    pub in_flight: usize,
    pub endpoints: EndpointSet,
    pub status: StatusReport,
    pub closed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_polled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_error: Option<String>,
}

/// An admitted invocation. Counted in flight until completed or dropped.
#[derive(Debug)]
pub(crate) struct InFlightGuard {
    controller: Arc<FunctionController>,
    url: String,
    done: bool,
}

impl InFlightGuard {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Count the invocation out and record its outcome.
    pub fn complete(mut self, outcome: InvocationOutcome) -> Completion {
        self.done = true;
        let mut st = self.controller.lock();
        st.in_flight = st.in_flight.saturating_sub(1);
        st.outcome = outcome;
        Completion {
            in_flight: st.in_flight,
            redeploying: st.redeploying,
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if !self.done {
            let mut st = self.controller.lock();
            st.in_flight = st.in_flight.saturating_sub(1);
            debug!(function = %self.controller.name, "Invocation abandoned before completion");
        }
    }
}

/// Result of finishing an invocation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Completion {
    pub in_flight: usize,
    pub redeploying: bool,
}

/// Holds one slot of the deploy counter while a deploy call runs.
struct DeployGuard<'a> {
    controller: &'a FunctionController,
}

impl Drop for DeployGuard<'_> {
    fn drop(&mut self) {
        let mut st = self.controller.lock();
        st.deploying = st.deploying.saturating_sub(1);
    }
}

/// Reconciliation controller for one function.
pub struct FunctionController {
    name: String,
    backend: Option<Arc<dyn ControlPlane>>,
    config_error: Option<String>,
    state: Mutex<ControllerState>,
    cancel: CancellationToken,
    status_tx: watch::Sender<StatusReport>,
}

impl std::fmt::Debug for FunctionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionController")
            .field("name", &self.name)
            .field("config_error", &self.config_error)
            .finish_non_exhaustive()
    }
}

impl FunctionController {
    /// Create a controller for a compiled function.
    pub fn new(desired: DesiredSpec, backend: Arc<dyn ControlPlane>) -> Arc<Self> {
        let endpoints = EndpointSet::derive(None, &desired.name, desired.namespace(), None);
        let name = desired.name.clone();
        Arc::new(Self::build(
            name,
            Some(backend),
            None,
            ControllerState {
                desired: Some(desired),
                observed: None,
                phase: Phase::Pending,
                deploying: 0,
                redeploying: false,
                outcome: InvocationOutcome::Unknown,
                in_flight: 0,
                endpoints,
                project_ready: false,
                closed: false,
                last_polled_at: None,
                last_error: None,
            },
            StatusReport::new(StatusIndicator::deploying()),
        ))
    }

    /// Create a controller for a declaration that failed to compile.
    ///
    /// Its status is fixed to "Invalid config" and its loop never starts.
    pub fn broken(name: impl Into<String>, reason: impl Into<String>) -> Arc<Self> {
        let name = name.into();
        let reason = reason.into();
        error!(function = %name, error = %reason, "Invalid function config");
        let endpoints = EndpointSet::derive(None, &name, None, None);
        Arc::new(Self::build(
            name,
            None,
            Some(reason.clone()),
            ControllerState {
                desired: None,
                observed: None,
                phase: Phase::InvalidConfig,
                deploying: 0,
                redeploying: false,
                outcome: InvocationOutcome::Unknown,
                in_flight: 0,
                endpoints,
                project_ready: false,
                closed: false,
                last_polled_at: None,
                last_error: Some(reason.clone()),
            },
            StatusReport::new(StatusIndicator::invalid_config()).with_detail(reason),
        ))
    }

    fn build(
        name: String,
        backend: Option<Arc<dyn ControlPlane>>,
        config_error: Option<String>,
        state: ControllerState,
        initial: StatusReport,
    ) -> Self {
        let (status_tx, _) = watch::channel(initial);
        Self {
            name,
            backend,
            config_error,
            state: Mutex::new(state),
            cancel: CancellationToken::new(),
            status_tx,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Function name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Compile error, for controllers built with [`broken`](Self::broken).
    pub fn config_error(&self) -> Option<&str> {
        self.config_error.as_deref()
    }

    /// The controller has been closed.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Subscribe to status changes.
    pub fn subscribe_status(&self) -> watch::Receiver<StatusReport> {
        self.status_tx.subscribe()
    }

    /// Current status.
    pub fn status(&self) -> StatusReport {
        self.status_tx.borrow().clone()
    }

    /// Current desired spec (absent for broken controllers).
    pub fn desired(&self) -> Option<DesiredSpec> {
        self.lock().desired.clone()
    }

    /// Current derived endpoints.
    pub fn endpoints(&self) -> EndpointSet {
        self.lock().endpoints.clone()
    }

    /// Point-in-time view.
    pub fn snapshot(&self) -> ControllerSnapshot {
        let st = self.lock();
        ControllerSnapshot {
            name: self.name.clone(),
            project: st.desired.as_ref().map(|d| d.project.clone()),
            phase: st.phase.clone(),
            deploying: st.deploying > 0,
            redeploying: st.redeploying,
            last_invocation: st.outcome.clone(),
            in_flight: st.in_flight,
            endpoints: st.endpoints.clone(),
            status: self.status_tx.borrow().clone(),
            closed: st.closed,
            last_polled_at: st.last_polled_at,
            last_error: st.last_error.clone(),
            config_error: self.config_error.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, report: StatusReport) {
        self.status_tx.send_replace(report);
    }

    fn backend(&self) -> Result<&Arc<dyn ControlPlane>> {
        self.backend
            .as_ref()
            .ok_or_else(|| Error::InvalidConfig(self.config_error.clone().unwrap_or_default()))
    }

    fn project(&self) -> Result<String> {
        self.lock()
            .desired
            .as_ref()
            .map(|d| d.project.clone())
            .ok_or_else(|| Error::InvalidConfig(self.config_error.clone().unwrap_or_default()))
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Run the controller: one initial deploy, then the poll loop until closed.
    pub async fn run(self: Arc<Self>) {
        if self.config_error.is_some() {
            debug!(function = %self.name, "Invalid config, reconcile loop not started");
            return;
        }

        info!(function = %self.name, "Reconcile loop started");

        if let Err(e) = self.deploy(false).await {
            warn!(function = %self.name, error = %e, "Initial deploy failed");
        }

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            let outcome = self.tick().await;
            if outcome.decision == TickDecision::Closed {
                break;
            }

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                _ = tokio::time::sleep(outcome.delay) => {}
            }
        }

        info!(function = %self.name, "Reconcile loop stopped");
    }

    /// Close the controller. Pending polls are cancelled and results of
    /// in-flight remote calls are discarded.
    pub fn close(&self) {
        {
            let mut st = self.lock();
            if st.closed {
                return;
            }
            st.closed = true;
            if self.config_error.is_none() {
                st.phase = Phase::Closed;
            }
        }
        self.cancel.cancel();
        if self.config_error.is_none() {
            self.publish(StatusReport::new(StatusIndicator::closed()));
        }
        info!(function = %self.name, "Controller closed");
    }

    // =========================================================================
    // Deploy
    // =========================================================================

    /// Plan and apply one deploy.
    ///
    /// Dropped with [`DeployOutcome::Skipped`] when a deploy call is already
    /// running, unless `force` is set. After a mutating action the function
    /// stays marked as redeploying until a tick observes a state that is not
    /// building or waiting.
    #[instrument(skip(self), fields(function = %self.name))]
    pub async fn deploy(&self, force: bool) -> Result<DeployOutcome> {
        let backend = self.backend()?.clone();
        let (desired, project, project_ready) = {
            let mut st = self.lock();
            if st.closed {
                return Err(Error::Closed(self.name.clone()));
            }
            let Some(desired) = st.desired.as_ref() else {
                return Err(Error::InvalidConfig(
                    self.config_error.clone().unwrap_or_default(),
                ));
            };
            if st.deploying > 0 && !force {
                debug!("Deploy already in progress, dropping request");
                return Ok(DeployOutcome::Skipped);
            }
            let prepared = (desired.to_resource(), desired.project.clone(), st.project_ready);
            st.deploying += 1;
            st.redeploying = true;
            prepared
        };
        let _guard = DeployGuard { controller: self };

        let result = self
            .apply_deploy(backend.as_ref(), &desired, &project, project_ready, force)
            .await;

        let mut st = self.lock();
        if st.closed {
            debug!("Controller closed during deploy, discarding result");
            return Err(Error::Closed(self.name.clone()));
        }

        match result {
            Ok(action) => {
                st.project_ready = true;
                if !action.is_mutation() {
                    st.redeploying = false;
                }
                st.last_error = None;
                Ok(DeployOutcome::Applied(action))
            }
            Err(e) => {
                st.redeploying = false;
                st.last_error = Some(e.to_string());
                drop(st);
                error!(error = %e, "Deploy failed");
                self.publish(
                    StatusReport::new(StatusIndicator::failure("Deploy failed"))
                        .with_detail(e.to_string()),
                );
                Err(e)
            }
        }
    }

    async fn apply_deploy(
        &self,
        backend: &dyn ControlPlane,
        desired: &Value,
        project: &str,
        project_ready: bool,
        force: bool,
    ) -> Result<Action> {
        if !project_ready {
            backend.ensure_project(project).await?;
        }

        let observed = backend.get_function(project, &self.name).await?;
        let action = planner::plan(desired, observed.as_ref(), force);

        match &action {
            Action::Create { body } => {
                info!(function = %self.name, project, "Creating function");
                backend.create_function(project, body).await?;
            }
            Action::Patch => {
                info!(function = %self.name, project, "Patching function to ready");
                backend
                    .patch_desired_state(project, &self.name, DesiredState::Ready)
                    .await?;
            }
            Action::Replace {
                body,
                skip_build,
                changes,
            } => {
                info!(
                    function = %self.name,
                    project,
                    skip_build,
                    changes = %serde_json::Value::Object(changes.clone()),
                    "Updating function"
                );
                backend.replace_function(project, &self.name, body).await?;
            }
            Action::NoOp => debug!(function = %self.name, "Function is up to date"),
            Action::Defer { state } => {
                debug!(function = %self.name, state = %state, "Function busy, deploy deferred")
            }
        }

        Ok(action)
    }

    /// Forced redeploy, optionally with a partial override of the desired spec.
    ///
    /// Errors are returned to the caller. On success the freshly fetched
    /// remote resource is returned.
    pub async fn redeploy(&self, update: Option<DeployOverride>) -> Result<Option<FunctionResource>> {
        self.backend()?;
        if let Some(update) = update {
            let mut st = self.lock();
            if let Some(desired) = st.desired.as_mut() {
                desired.apply_override(update);
                let namespace = desired.namespace().map(str::to_string);
                st.endpoints = EndpointSet::derive(
                    st.observed.as_ref(),
                    &self.name,
                    namespace.as_deref(),
                    Some(&st.endpoints),
                );
            }
        }

        info!(function = %self.name, "Forced redeploy requested");
        self.deploy(true).await?;
        self.refresh().await
    }

    // =========================================================================
    // Observation
    // =========================================================================

    /// Fetch the remote resource and record it without acting on it.
    pub async fn refresh(&self) -> Result<Option<FunctionResource>> {
        let backend = self.backend()?.clone();
        let project = self.project()?;
        let observed = backend.get_function(&project, &self.name).await?;

        let mut st = self.lock();
        if st.closed {
            return Err(Error::Closed(self.name.clone()));
        }
        self.observe(&mut st, observed.clone());
        Ok(observed)
    }

    fn observe(&self, st: &mut ControllerState, observed: Option<FunctionResource>) {
        let namespace = st
            .desired
            .as_ref()
            .and_then(|d| d.namespace())
            .map(str::to_string);
        st.endpoints = EndpointSet::derive(
            observed.as_ref(),
            &self.name,
            namespace.as_deref(),
            Some(&st.endpoints),
        );
        st.phase = match &observed {
            None => Phase::Absent,
            Some(resource) => resource.state().map_or(Phase::Unknown, Phase::State),
        };
        st.observed = observed;
        st.last_polled_at = Some(Utc::now());
    }

    /// Last observed remote resource.
    pub fn observed(&self) -> Option<FunctionResource> {
        self.lock().observed.clone()
    }

    /// Fetch the last `tail_lines` log lines of every replica.
    ///
    /// Replicas whose logs cannot be fetched map to the error text.
    pub async fn logs(&self, tail_lines: u32) -> Result<BTreeMap<String, Value>> {
        let backend = self.backend()?.clone();
        let project = self.project()?;
        let replicas = backend.list_replicas(&project, &self.name).await?;

        let mut tasks = JoinSet::new();
        for replica in replicas.names {
            let backend = backend.clone();
            let project = project.clone();
            let name = self.name.clone();
            tasks.spawn(async move {
                let logs = backend.get_logs(&project, &name, &replica, tail_lines).await;
                (replica, logs)
            });
        }

        let mut logs = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((replica, Ok(value))) => {
                    if !value.is_null() {
                        logs.insert(replica, value);
                    }
                }
                Ok((replica, Err(e))) => {
                    warn!(function = %self.name, replica = %replica, error = %e, "Failed to fetch replica logs");
                    logs.insert(replica, Value::String(e.to_string()));
                }
                Err(e) => warn!(function = %self.name, error = %e, "Log fetch task failed"),
            }
        }
        Ok(logs)
    }

    // =========================================================================
    // Tick
    // =========================================================================

    /// Run one reconciliation tick. Never fails: errors become a degraded
    /// status and a short delay.
    #[instrument(skip(self), fields(function = %self.name))]
    pub async fn tick(&self) -> TickOutcome {
        let Ok(backend) = self.backend().cloned() else {
            return self.closed_outcome();
        };
        let Ok(project) = self.project() else {
            return self.closed_outcome();
        };
        if self.is_closed() {
            return self.closed_outcome();
        }

        let fetched = backend.get_function(&project, &self.name).await;
        if self.is_closed() {
            debug!("Controller closed during poll, discarding result");
            return self.closed_outcome();
        }

        let outcome = match fetched {
            Ok(None) => self.on_absent().await,
            Ok(Some(resource)) => self.on_observed(resource).await,
            Err(e) if e.is_transient() => self.on_unreachable(e),
            Err(e) => self.on_tick_error(Error::from(e)),
        };

        debug!(
            phase = %outcome.phase.tag(),
            decision = ?outcome.decision,
            delay_ms = outcome.delay.as_millis() as u64,
            "Tick complete"
        );
        outcome
    }

    fn closed_outcome(&self) -> TickOutcome {
        TickOutcome {
            phase: self.lock().phase.clone(),
            decision: TickDecision::Closed,
            delay: Duration::ZERO,
        }
    }

    fn outcome(&self, decision: TickDecision, delay: Duration) -> TickOutcome {
        TickOutcome {
            phase: self.lock().phase.clone(),
            decision,
            delay,
        }
    }

    async fn on_absent(&self) -> TickOutcome {
        let already_deploying = {
            let mut st = self.lock();
            self.observe(&mut st, None);
            st.redeploying = false;
            st.deploying > 0
        };

        if already_deploying {
            debug!("Function not found, deploy already in flight");
            return self.outcome(TickDecision::DeploySkipped, WAITING_POLL);
        }

        info!(function = %self.name, "Function not found, deploying");
        self.publish(StatusReport::new(StatusIndicator::deploying()));
        let decision = self.trigger_deploy().await;
        self.outcome(decision, FAST_POLL)
    }

    fn on_unreachable(&self, err: ApiError) -> TickOutcome {
        warn!(function = %self.name, error = %err, "Control plane unreachable");
        let serving = {
            let mut st = self.lock();
            st.last_error = Some(err.to_string());
            st.outcome.is_success()
        };
        let indicator = if serving {
            StatusIndicator::ready_no_dashboard()
        } else {
            StatusIndicator::failure("Control plane unreachable")
        };
        self.publish(StatusReport::new(indicator).with_detail(err.to_string()));
        self.outcome(TickDecision::Unreachable(err.to_string()), FAST_POLL)
    }

    fn on_tick_error(&self, err: Error) -> TickOutcome {
        error!(function = %self.name, error = %err, "Error while checking function status");
        self.lock().last_error = Some(err.to_string());
        self.publish(StatusReport::new(StatusIndicator::failure(err.to_string())));
        self.outcome(TickDecision::Degraded(err.to_string()), FAST_POLL)
    }

    async fn on_observed(&self, resource: FunctionResource) -> TickOutcome {
        let state = resource.state();
        let latest_log = resource.latest_log_message().map(str::to_string);

        let (outcome, deploying) = {
            let mut st = self.lock();
            self.observe(&mut st, Some(resource));
            if !state.as_ref().is_some_and(FunctionState::is_transient) {
                st.redeploying = false;
            }
            st.last_error = None;
            (st.outcome.clone(), st.deploying > 0)
        };
        let serving = outcome.is_success();

        let Some(state) = state else {
            if serving {
                self.publish(StatusReport::new(StatusIndicator::unhealthy_serving()));
                return self.outcome(TickDecision::Serving, FAST_POLL);
            }
            if deploying {
                self.publish(StatusReport::new(StatusIndicator::unknown()));
                return self.outcome(TickDecision::DeploySkipped, FAST_POLL);
            }
            info!(function = %self.name, "Function reports no state, redeploying");
            let decision = self.trigger_deploy().await;
            return self.outcome(decision, FAST_POLL);
        };

        match state {
            FunctionState::Ready => match outcome {
                InvocationOutcome::Success { .. } => {
                    self.publish(StatusReport::new(StatusIndicator::ready()));
                    self.outcome(TickDecision::NoOp, SETTLED_POLL)
                }
                InvocationOutcome::Unknown => {
                    self.publish(StatusReport::new(StatusIndicator::ready_idle()));
                    self.outcome(TickDecision::NoOp, FAST_POLL)
                }
                InvocationOutcome::Failure { .. } => self.outcome(TickDecision::NoOp, FAST_POLL),
            },
            FunctionState::Error => {
                let message = latest_log.unwrap_or_default();
                error!("Deployment of {} failed. error - {}", self.name, message);
                let mut report = StatusReport::new(StatusIndicator::for_state(&state));
                if !message.is_empty() {
                    report = report.with_detail(message);
                }
                self.publish(report);
                self.outcome(TickDecision::Failed, SETTLED_POLL)
            }
            FunctionState::Unhealthy => {
                if serving {
                    self.publish(StatusReport::new(StatusIndicator::unhealthy_serving()));
                    return self.outcome(TickDecision::Serving, FAST_POLL);
                }
                self.publish(StatusReport::new(StatusIndicator::for_state(&state)));
                if deploying {
                    return self.outcome(TickDecision::DeploySkipped, FAST_POLL);
                }
                info!(function = %self.name, "Function unhealthy, redeploying");
                let decision = self.trigger_deploy().await;
                self.outcome(decision, FAST_POLL)
            }
            FunctionState::ScaledToZero => {
                self.publish(StatusReport::new(StatusIndicator::for_state(&state)));
                self.outcome(TickDecision::NoOp, SETTLED_POLL)
            }
            ref busy if busy.is_transient() => {
                self.publish(in_progress_report(busy, latest_log.as_deref()));
                let delay = if busy.is_waiting() {
                    WAITING_POLL
                } else {
                    FAST_POLL
                };
                self.outcome(TickDecision::Defer, delay)
            }
            other => {
                self.publish(StatusReport::new(StatusIndicator::for_state(&other)));
                self.outcome(TickDecision::NoOp, FAST_POLL)
            }
        }
    }

    async fn trigger_deploy(&self) -> TickDecision {
        match self.deploy(false).await {
            Ok(DeployOutcome::Applied(action)) => TickDecision::Deployed(action),
            Ok(DeployOutcome::Skipped) => TickDecision::DeploySkipped,
            Err(Error::Closed(_)) => TickDecision::Closed,
            Err(e) => TickDecision::DeployFailed(e.to_string()),
        }
    }

    // =========================================================================
    // Invocation bookkeeping
    // =========================================================================

    /// Record the outcome of an invocation made outside the gateway.
    pub fn record_invocation(&self, outcome: InvocationOutcome) {
        self.lock().outcome = outcome;
    }

    /// Last recorded invocation outcome.
    pub fn last_invocation(&self) -> InvocationOutcome {
        self.lock().outcome.clone()
    }

    /// Invocations currently in flight.
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    /// Check admission and count the invocation in, atomically.
    pub(crate) fn admit(
        self: &Arc<Self>,
        max_in_flight: usize,
    ) -> std::result::Result<InFlightGuard, InvokeError> {
        let mut st = self.lock();
        if st.closed || self.config_error.is_some() {
            return Err(InvokeError::Closed(self.name.clone()));
        }
        if max_in_flight > 0 && st.in_flight >= max_in_flight {
            return Err(InvokeError::Backpressure {
                in_flight: st.in_flight,
                max_in_flight,
            });
        }
        let Some(url) = st.endpoints.invocation.clone() else {
            st.outcome = InvocationOutcome::Unknown;
            return Err(InvokeError::NoEndpoint(self.name.clone()));
        };
        if st.redeploying {
            return Err(InvokeError::Redeploying(self.name.clone()));
        }
        if st.phase == Phase::State(FunctionState::Error) {
            return Err(InvokeError::FunctionFailed(self.name.clone()));
        }
        st.in_flight += 1;
        Ok(InFlightGuard {
            controller: self.clone(),
            url,
            done: false,
        })
    }
}

fn in_progress_report(state: &FunctionState, latest_log: Option<&str>) -> StatusReport {
    let indicator = StatusIndicator::for_state(state);
    match latest_log.filter(|m| !m.is_empty()) {
        Some(message) => {
            let text = format!("{} {}", indicator.text, message);
            StatusReport::new(indicator.with_text(text)).with_detail(message)
        }
        None => StatusReport::new(indicator),
    }
}
