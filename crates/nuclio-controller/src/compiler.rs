// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Desired-state compiler.
//!
//! Turns a raw function declaration (name, runtime, inline code, a free-form
//! YAML/JSON overlay, env vars, secrets, labels and annotations) into a
//! [`DesiredSpec`], and a `DesiredSpec` into the function document that is
//! sent to the control plane.
//!
//! Label and annotation precedence is data, not code order: see
//! [`MetadataLayers`].

use std::collections::BTreeMap;

use base64::Engine;
use nuclio_api::{DEFAULT_ADDRESS, DEFAULT_PROJECT, FUNCTION_API_VERSION, FUNCTION_KIND};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::document::assign_path;
use crate::gateway::InvokeSettings;

/// Runtime used when a declaration names none.
pub const DEFAULT_RUNTIME: &str = "python:3.12";

/// Annotation marking resources written by this controller.
pub const GENERATED_BY_ANNOTATION: &str = "nuclio.io/generated_by";

/// Value of [`GENERATED_BY_ANNOTATION`].
pub const GENERATED_BY_VALUE: &str = "nuclio-controller";

/// Annotation carrying the identity of the owning controller.
pub const MANAGED_BY_ANNOTATION: &str = "nuclio.io/managed-by";

/// Label tying a function to its project.
pub const PROJECT_LABEL: &str = "nuclio.io/project-name";

/// Top-level overlay sections that may be set by operators.
pub const OVERLAY_SECTIONS: [&str; 4] = ["apiVersion", "kind", "metadata", "spec"];

/// Errors raised while compiling a declaration.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CompileError {
    /// The overlay document does not parse or holds unknown sections.
    #[error("invalid overlay: {0}")]
    InvalidOverlay(String),

    /// The declaration has no function name.
    #[error("function name is required")]
    MissingName,

    /// A secret reference could not be resolved.
    #[error("secret for `{path}` could not be resolved: {reason}")]
    Secret {
        /// Overlay path the secret was meant for.
        path: String,
        /// Why resolution failed.
        reason: String,
    },
}

impl From<CompileError> for crate::error::Error {
    fn from(err: CompileError) -> Self {
        crate::error::Error::InvalidConfig(err.to_string())
    }
}

// ============================================================================
// Declarations
// ============================================================================

/// One environment variable of the function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    /// Variable name.
    pub name: String,
    /// Variable value. Non-string scalars are stringified.
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub value: String,
}

impl EnvVar {
    /// Create an env var.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A secret to inject into the overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRef {
    /// Dotted overlay path; `\.` escapes a literal dot.
    pub path: String,
    /// Resolver-specific key (for [`EnvSecretResolver`], a variable name).
    pub source: String,
}

/// Raw function declaration, as found in the manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFunctionConfig {
    /// Function name.
    #[serde(default)]
    pub name: String,
    /// Runtime identifier (`base:version`).
    #[serde(default)]
    pub runtime: String,
    /// Inline source code.
    #[serde(default)]
    pub code: String,
    /// Overlay document text (YAML or JSON).
    #[serde(default)]
    pub config: String,
    /// Project name; falls back to the configured default.
    #[serde(default)]
    pub project: Option<String>,
    /// Control-plane address; falls back to the configured default.
    #[serde(default)]
    pub address: Option<String>,
    /// Environment variables, in order.
    #[serde(default)]
    pub env: Vec<EnvVar>,
    /// Secrets resolved into the overlay.
    #[serde(default)]
    pub secrets: Vec<SecretRef>,
    /// Caller labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Caller annotations.
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    /// Invocation gateway settings.
    #[serde(default)]
    pub invoke: InvokeSettings,
}

/// Values used when a declaration leaves a field empty.
#[derive(Debug, Clone)]
pub struct CompileDefaults {
    /// Default project.
    pub project: String,
    /// Default control-plane address.
    pub address: String,
    /// Identity written into [`MANAGED_BY_ANNOTATION`].
    pub controller_id: String,
}

impl Default for CompileDefaults {
    fn default() -> Self {
        Self {
            project: DEFAULT_PROJECT.to_string(),
            address: DEFAULT_ADDRESS.to_string(),
            controller_id: GENERATED_BY_VALUE.to_string(),
        }
    }
}

impl From<&crate::config::Config> for CompileDefaults {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            project: config.project.clone(),
            address: config.address.clone(),
            ..Self::default()
        }
    }
}

// ============================================================================
// Secrets
// ============================================================================

/// Resolves secret references to values.
pub trait SecretResolver: Send + Sync {
    /// Resolve one reference.
    fn resolve(&self, secret: &SecretRef) -> Result<Value, CompileError>;
}

/// Resolves secrets from environment variables named by `source`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecretResolver;

impl SecretResolver for EnvSecretResolver {
    fn resolve(&self, secret: &SecretRef) -> Result<Value, CompileError> {
        std::env::var(&secret.source)
            .map(Value::String)
            .map_err(|e| CompileError::Secret {
                path: secret.path.clone(),
                reason: format!("{}: {}", secret.source, e),
            })
    }
}

/// Resolves secrets from a fixed map keyed by `source`.
#[derive(Debug, Clone, Default)]
pub struct StaticSecretResolver {
    values: BTreeMap<String, Value>,
}

impl StaticSecretResolver {
    /// Create an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value.
    pub fn with(mut self, source: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(source.into(), value.into());
        self
    }
}

impl SecretResolver for StaticSecretResolver {
    fn resolve(&self, secret: &SecretRef) -> Result<Value, CompileError> {
        self.values
            .get(&secret.source)
            .cloned()
            .ok_or_else(|| CompileError::Secret {
                path: secret.path.clone(),
                reason: format!("no value for {}", secret.source),
            })
    }
}

// ============================================================================
// Metadata layers
// ============================================================================

/// Origin of a metadata layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerSource {
    /// Declared inside the overlay document.
    Overlay,
    /// Declared on the function by the caller.
    Caller,
    /// Owned by the controller.
    System,
}

/// Labels and annotations contributed by one source.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataLayer {
    /// Where the layer comes from.
    pub source: LayerSource,
    /// Labels.
    pub labels: BTreeMap<String, String>,
    /// Annotations.
    pub annotations: BTreeMap<String, String>,
}

/// Ordered metadata layers; later layers win on key conflicts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataLayers {
    layers: Vec<MetadataLayer>,
}

impl MetadataLayers {
    /// Append a layer with higher precedence than all previous ones.
    pub fn push(&mut self, layer: MetadataLayer) {
        self.layers.push(layer);
    }

    /// Layers in application order.
    pub fn layers(&self) -> &[MetadataLayer] {
        &self.layers
    }

    /// Flatten the layers into final label and annotation maps.
    pub fn resolve(&self) -> (BTreeMap<String, String>, BTreeMap<String, String>) {
        let mut labels = BTreeMap::new();
        let mut annotations = BTreeMap::new();
        for layer in &self.layers {
            labels.extend(layer.labels.clone());
            annotations.extend(layer.annotations.clone());
        }
        (labels, annotations)
    }
}

// ============================================================================
// Desired spec
// ============================================================================

/// Partial override carried by a forced redeploy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployOverride {
    /// New runtime.
    #[serde(default)]
    pub runtime: Option<String>,
    /// New inline code.
    #[serde(default)]
    pub code: Option<String>,
    /// Replacement env list.
    #[serde(default)]
    pub env: Option<Vec<EnvVar>>,
    /// Labels merged over the caller labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Annotations merged over the caller annotations.
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// Canonical desired definition of one function.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredSpec {
    /// Function name.
    pub name: String,
    /// Runtime identifier.
    pub runtime: String,
    /// Inline source code (may be empty).
    pub code: String,
    /// Validated overlay document (always an object).
    pub overlay: Value,
    /// Project name.
    pub project: String,
    /// Control-plane address.
    pub address: String,
    /// Environment variables, in order.
    pub env: Vec<EnvVar>,
    /// Caller labels.
    pub labels: BTreeMap<String, String>,
    /// Caller annotations.
    pub annotations: BTreeMap<String, String>,
    /// Controller identity for [`MANAGED_BY_ANNOTATION`].
    pub controller_id: String,
}

/// Compile a raw declaration.
pub fn compile(
    raw: &RawFunctionConfig,
    defaults: &CompileDefaults,
    resolver: &dyn SecretResolver,
) -> Result<DesiredSpec, CompileError> {
    let name = raw.name.trim();
    if name.is_empty() {
        return Err(CompileError::MissingName);
    }

    let mut overlay = parse_overlay(&raw.config)?;
    for secret in &raw.secrets {
        if secret.path.is_empty() {
            continue;
        }
        let value = resolver.resolve(secret)?;
        assign_path(&mut overlay, &secret.path, value);
    }
    validate_sections(&overlay)?;

    let runtime = non_blank(&raw.runtime).unwrap_or(DEFAULT_RUNTIME);
    let project = raw
        .project
        .as_deref()
        .and_then(non_blank)
        .unwrap_or(&defaults.project);
    let address = raw
        .address
        .as_deref()
        .and_then(non_blank)
        .unwrap_or(&defaults.address);

    let spec = DesiredSpec {
        name: name.to_string(),
        runtime: runtime.to_string(),
        code: raw.code.clone(),
        overlay,
        project: project.to_string(),
        address: address.trim_end_matches('/').to_string(),
        env: raw
            .env
            .iter()
            .filter(|e| !e.name.is_empty())
            .cloned()
            .collect(),
        labels: raw.labels.clone(),
        annotations: raw.annotations.clone(),
        controller_id: defaults.controller_id.clone(),
    };

    debug!(function = %spec.name, runtime = %spec.runtime, project = %spec.project, "Compiled function declaration");
    Ok(spec)
}

/// Parse an overlay document. Blank text is an empty overlay.
pub fn parse_overlay(text: &str) -> Result<Value, CompileError> {
    if text.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }

    let value: Value =
        serde_yaml::from_str(text).map_err(|e| CompileError::InvalidOverlay(e.to_string()))?;
    match value {
        Value::Null => Ok(Value::Object(Map::new())),
        Value::Object(_) => Ok(value),
        other => Err(CompileError::InvalidOverlay(format!(
            "expected a mapping, got {}",
            type_name(&other)
        ))),
    }
}

fn validate_sections(overlay: &Value) -> Result<(), CompileError> {
    let Value::Object(map) = overlay else {
        return Err(CompileError::InvalidOverlay("expected a mapping".into()));
    };
    if let Some(key) = map.keys().find(|k| !OVERLAY_SECTIONS.contains(&k.as_str())) {
        return Err(CompileError::InvalidOverlay(format!(
            "unknown top-level section `{}`",
            key
        )));
    }
    for section in ["metadata", "spec"] {
        if let Some(value) = map.get(section)
            && !value.is_object()
            && !value.is_null()
        {
            return Err(CompileError::InvalidOverlay(format!(
                "`{}` must be a mapping, got {}",
                section,
                type_name(value)
            )));
        }
    }
    Ok(())
}

impl DesiredSpec {
    /// Handler reference `module:entry` derived from the runtime family.
    pub fn handler(&self) -> String {
        let base = self.runtime.split(':').next().unwrap_or_default();
        let module = if base.starts_with("nodejs") {
            "handler"
        } else {
            "main"
        };
        let entry = if base.starts_with("golang") {
            "Handler"
        } else {
            "handler"
        };
        format!("{}:{}", module, entry)
    }

    /// Namespace requested by the overlay.
    pub fn namespace(&self) -> Option<&str> {
        self.overlay
            .get("metadata")
            .and_then(|m| m.get("namespace"))
            .and_then(Value::as_str)
    }

    /// Label/annotation layers in precedence order: overlay, caller, system.
    pub fn metadata_layers(&self) -> MetadataLayers {
        let overlay_metadata = self.overlay.get("metadata");
        let mut layers = MetadataLayers::default();
        layers.push(MetadataLayer {
            source: LayerSource::Overlay,
            labels: string_map(overlay_metadata.and_then(|m| m.get("labels"))),
            annotations: string_map(overlay_metadata.and_then(|m| m.get("annotations"))),
        });
        layers.push(MetadataLayer {
            source: LayerSource::Caller,
            labels: self.labels.clone(),
            annotations: self.annotations.clone(),
        });
        layers.push(MetadataLayer {
            source: LayerSource::System,
            labels: BTreeMap::from([(PROJECT_LABEL.to_string(), self.project.clone())]),
            annotations: BTreeMap::from([
                (
                    GENERATED_BY_ANNOTATION.to_string(),
                    GENERATED_BY_VALUE.to_string(),
                ),
                (MANAGED_BY_ANNOTATION.to_string(), self.controller_id.clone()),
            ]),
        });
        layers
    }

    /// Compose the desired function document.
    ///
    /// Overlay `spec` keys replace the derived runtime and handler. The build
    /// section carries the base64 source only when the code is not blank, so
    /// an update never clears code already held remotely.
    pub fn to_resource(&self) -> Value {
        let overlay = self.overlay.as_object().cloned().unwrap_or_default();
        let (labels, annotations) = self.metadata_layers().resolve();

        let mut metadata = overlay
            .get("metadata")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        metadata.insert("name".into(), Value::String(self.name.clone()));
        metadata.insert("labels".into(), json!(labels));
        metadata.insert("annotations".into(), json!(annotations));

        let overlay_spec = overlay
            .get("spec")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let mut spec = Map::new();
        spec.insert("runtime".into(), Value::String(self.runtime.clone()));
        spec.insert("handler".into(), Value::String(self.handler()));
        if !self.env.is_empty() {
            spec.insert("env".into(), json!(self.env));
        }
        for (key, value) in &overlay_spec {
            spec.insert(key.clone(), value.clone());
        }

        let mut build = Map::new();
        if !self.code.trim().is_empty() {
            build.insert(
                "functionSourceCode".into(),
                Value::String(base64::engine::general_purpose::STANDARD.encode(&self.code)),
            );
        }
        if let Some(Value::Object(overlay_build)) = overlay_spec.get("build") {
            for (key, value) in overlay_build {
                build.insert(key.clone(), value.clone());
            }
        }
        spec.insert("build".into(), Value::Object(build));

        let api_version = overlay
            .get("apiVersion")
            .and_then(Value::as_str)
            .unwrap_or(FUNCTION_API_VERSION);
        let kind = overlay
            .get("kind")
            .and_then(Value::as_str)
            .unwrap_or(FUNCTION_KIND);

        json!({
            "apiVersion": api_version,
            "kind": kind,
            "metadata": metadata,
            "spec": spec,
        })
    }

    /// Apply the partial override of a forced redeploy.
    pub fn apply_override(&mut self, update: DeployOverride) {
        if let Some(runtime) = update.runtime.filter(|r| !r.trim().is_empty()) {
            self.runtime = runtime;
        }
        if let Some(code) = update.code {
            self.code = code;
        }
        if let Some(env) = update.env {
            self.env = env.into_iter().filter(|e| !e.name.is_empty()).collect();
        }
        self.labels.extend(update.labels);
        self.annotations.extend(update.annotations);
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn non_blank(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn string_map(value: Option<&Value>) -> BTreeMap<String, String> {
    value
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), scalar_to_string(v)))
                .collect()
        })
        .unwrap_or_default()
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn scalar_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(scalar_to_string(&value))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}
