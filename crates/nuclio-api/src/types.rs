// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Resource documents exchanged with the nuclio dashboard API.
//!
//! Every document keeps unknown fields in a flattened `extra` map so that a
//! resource read from the server and written back (PUT) never loses
//! server-managed data.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// API version written on composed function documents.
pub const FUNCTION_API_VERSION: &str = "nuclio.io/v1";

/// Kind written on composed function documents.
pub const FUNCTION_KIND: &str = "Function";

/// Lifecycle state tag reported in `status.state`.
///
/// Reference: nuclio function configuration, "Function state".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FunctionState {
    /// Deployed and ready to process events.
    Ready,
    /// Imported but not yet deployed.
    Imported,
    /// Image is being built.
    Building,
    /// Platform resources are being configured.
    ConfiguringResources,
    /// Waiting for a build slot.
    WaitingForBuild,
    /// Waiting for platform resources (deployment, pods) to become ready.
    WaitingForResourceConfiguration,
    /// Scaling up from zero replicas.
    WaitingForScaleResourceFromZero,
    /// Scaling down to zero replicas.
    WaitingForScaleResourceToZero,
    /// Zero replicas running.
    ScaledToZero,
    /// Deployment failed; needs a redeploy to recover.
    Error,
    /// Deployment failed in a way that may recover over time.
    Unhealthy,
    /// A tag this client does not know.
    Other(String),
}

impl FunctionState {
    /// Parse a `status.state` tag.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "ready" => FunctionState::Ready,
            "imported" => FunctionState::Imported,
            "building" => FunctionState::Building,
            "configuringResources" => FunctionState::ConfiguringResources,
            "waitingForBuild" => FunctionState::WaitingForBuild,
            "waitingForResourceConfiguration" => FunctionState::WaitingForResourceConfiguration,
            "waitingForScaleResourceFromZero" => FunctionState::WaitingForScaleResourceFromZero,
            "waitingForScaleResourceToZero" => FunctionState::WaitingForScaleResourceToZero,
            "scaledToZero" => FunctionState::ScaledToZero,
            "error" => FunctionState::Error,
            "unhealthy" => FunctionState::Unhealthy,
            other => FunctionState::Other(other.to_string()),
        }
    }

    /// The wire tag for this state.
    pub fn as_tag(&self) -> &str {
        match self {
            FunctionState::Ready => "ready",
            FunctionState::Imported => "imported",
            FunctionState::Building => "building",
            FunctionState::ConfiguringResources => "configuringResources",
            FunctionState::WaitingForBuild => "waitingForBuild",
            FunctionState::WaitingForResourceConfiguration => "waitingForResourceConfiguration",
            FunctionState::WaitingForScaleResourceFromZero => "waitingForScaleResourceFromZero",
            FunctionState::WaitingForScaleResourceToZero => "waitingForScaleResourceToZero",
            FunctionState::ScaledToZero => "scaledToZero",
            FunctionState::Error => "error",
            FunctionState::Unhealthy => "unhealthy",
            FunctionState::Other(tag) => tag,
        }
    }

    /// Build or resource configuration is actively running.
    pub fn is_building(&self) -> bool {
        matches!(
            self,
            FunctionState::Building | FunctionState::ConfiguringResources
        )
    }

    /// The platform is waiting on a build slot, resources or scaling.
    pub fn is_waiting(&self) -> bool {
        matches!(
            self,
            FunctionState::WaitingForBuild
                | FunctionState::WaitingForResourceConfiguration
                | FunctionState::WaitingForScaleResourceFromZero
                | FunctionState::WaitingForScaleResourceToZero
        )
    }

    /// A remote operation is in progress and must not be disturbed.
    pub fn is_transient(&self) -> bool {
        self.is_building() || self.is_waiting()
    }
}

impl fmt::Display for FunctionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// A nuclio function resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResource {
    /// API version (`nuclio.io/v1`); the dashboard usually omits it on reads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    /// Resource kind (`Function`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Identifying metadata.
    #[serde(default)]
    pub metadata: FunctionMetadata,
    /// Function spec. Kept loosely typed: operators may set any field.
    #[serde(default)]
    pub spec: Map<String, Value>,
    /// Server-reported status. Never sent back to the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<FunctionStatus>,
    /// Unknown top-level fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FunctionResource {
    /// Parse a resource from a JSON document.
    pub fn from_document(document: Value) -> serde_json::Result<Self> {
        serde_json::from_value(document)
    }

    /// The resource as a JSON document without its `status` section.
    pub fn to_document(&self) -> Value {
        let mut document = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut document {
            map.remove("status");
        }
        document
    }

    /// Parsed lifecycle state, `None` when the server reports no state.
    pub fn state(&self) -> Option<FunctionState> {
        self.status
            .as_ref()
            .and_then(|s| s.state.as_deref())
            .map(FunctionState::from_tag)
    }

    /// Message of the newest status log entry.
    pub fn latest_log_message(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.logs.last())
            .and_then(|entry| entry.message.as_deref())
    }
}

/// Function metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionMetadata {
    /// Function name.
    #[serde(default)]
    pub name: String,
    /// Namespace the function is deployed into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Unknown metadata fields (resource version, uid, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Server-reported function status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionStatus {
    /// Lifecycle state tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Deployment log entries, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<LogEntry>,
    /// In-cluster invocation addresses (`host:port`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub internal_invocation_urls: Vec<String>,
    /// Externally reachable invocation addresses (`host[:port]/path`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external_invocation_urls: Vec<String>,
    /// Unknown status fields (http port, scale-to-zero info, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One deployment log line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Log level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    /// Log message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Remaining fields (time, name, more, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A nuclio project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Project metadata.
    #[serde(default)]
    pub metadata: ProjectMetadata,
    /// Project spec, passed through untouched.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub spec: Map<String, Value>,
}

impl Project {
    /// A project document carrying only a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            metadata: ProjectMetadata {
                name: name.into(),
                namespace: None,
            },
            spec: Map::new(),
        }
    }
}

/// Project metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    /// Project name.
    #[serde(default)]
    pub name: String,
    /// Namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Replica names of a function.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplicaList {
    /// Pod/container names.
    #[serde(default)]
    pub names: Vec<String>,
}

/// Desired state written by a PATCH.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DesiredState {
    /// Ask the platform to (re)deploy the function into `ready`.
    Ready,
    /// Ask the platform to scale the function to zero.
    ScaledToZero,
}

/// PATCH body for `/api/functions/{name}`.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DesiredStatePatch {
    pub desired_state: DesiredState,
}
