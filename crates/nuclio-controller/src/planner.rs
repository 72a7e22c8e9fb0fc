// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Diff & update planner.
//!
//! Decides which remote operation brings the observed function in line with
//! the desired document. Pure: no I/O, no state.

use nuclio_api::{FunctionResource, FunctionState};
use serde_json::{Map, Value};

use crate::document::{diff, merge};

/// Annotation asking the platform to reuse the existing image.
pub const SKIP_BUILD_ANNOTATION: &str = "skip-build";

/// Spec sections whose change requires a new image.
const BUILD_SECTIONS: [&str; 3] = ["build", "image", "runtime"];

/// Remote operation chosen by [`plan`].
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// The function does not exist; POST the desired document.
    Create {
        /// Composed desired document.
        body: Value,
    },
    /// Nothing changed, but the function should be nudged to `ready`.
    Patch,
    /// The function changed; PUT the merged document.
    Replace {
        /// Observed document with the desired one merged on top.
        body: Value,
        /// The change does not touch the image.
        skip_build: bool,
        /// Minimal set of changed keys.
        changes: Map<String, Value>,
    },
    /// Already up to date.
    NoOp,
    /// A remote operation is in progress; try again later.
    Defer {
        /// The transient state observed.
        state: FunctionState,
    },
}

impl Action {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Action::Create { .. } => "create",
            Action::Patch => "patch",
            Action::Replace { .. } => "replace",
            Action::NoOp => "noop",
            Action::Defer { .. } => "defer",
        }
    }

    /// The action issues a mutating remote call.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Action::Create { .. } | Action::Patch | Action::Replace { .. }
        )
    }
}

/// Plan the remote operation for `desired` against `observed`.
pub fn plan(desired: &Value, observed: Option<&FunctionResource>, force: bool) -> Action {
    let Some(observed) = observed else {
        return Action::Create {
            body: desired.clone(),
        };
    };

    let state = observed.state();
    if let Some(state) = state.as_ref().filter(|s| s.is_transient()) {
        return Action::Defer {
            state: state.clone(),
        };
    }

    let observed_doc = observed.to_document();
    let mut merged = observed_doc.clone();
    merge(&mut merged, desired);

    // Compare against the observed document re-tagged with the desired kind
    // and version; the dashboard omits both on reads.
    let mut comparand = observed_doc;
    if let Value::Object(map) = &mut comparand {
        for key in ["apiVersion", "kind"] {
            if !map.contains_key(key)
                && let Some(value) = merged.get(key)
            {
                map.insert(key.to_string(), value.clone());
            }
        }
    }

    let changes = diff(&merged, &comparand);
    let ready = state == Some(FunctionState::Ready);

    if changes.is_empty() {
        return if ready && !force {
            Action::NoOp
        } else {
            Action::Patch
        };
    }

    let touches_build = changes
        .get("spec")
        .and_then(Value::as_object)
        .is_some_and(|spec| BUILD_SECTIONS.iter().any(|k| spec.contains_key(*k)));
    let skip_build = ready && !touches_build;

    let had_hint = observed
        .metadata
        .annotations
        .contains_key(SKIP_BUILD_ANNOTATION);
    if skip_build || had_hint {
        set_annotation(
            &mut merged,
            SKIP_BUILD_ANNOTATION,
            if skip_build { "true" } else { "false" },
        );
    }

    Action::Replace {
        body: merged,
        skip_build,
        changes,
    }
}

fn set_annotation(doc: &mut Value, key: &str, value: &str) {
    let Value::Object(root) = doc else {
        return;
    };
    let metadata = root
        .entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()));
    if !metadata.is_object() {
        *metadata = Value::Object(Map::new());
    }
    if let Value::Object(metadata) = metadata {
        let annotations = metadata
            .entry("annotations")
            .or_insert_with(|| Value::Object(Map::new()));
        if !annotations.is_object() {
            *annotations = Value::Object(Map::new());
        }
        if let Value::Object(annotations) = annotations {
            annotations.insert(key.to_string(), Value::String(value.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn desired() -> Value {
        json!({
            "apiVersion": "nuclio.io/v1",
            "kind": "Function",
            "metadata": {
                "name": "echo",
                "labels": {"nuclio.io/project-name": "default"},
                "annotations": {"nuclio.io/generated_by": "nuclio-controller"}
            },
            "spec": {"runtime": "python:3.12", "handler": "main:handler", "build": {}}
        })
    }

    fn observed(state: &str, spec: Value) -> FunctionResource {
        FunctionResource::from_document(json!({
            "metadata": {
                "name": "echo",
                "namespace": "nuclio",
                "resourceVersion": "12",
                "labels": {"nuclio.io/project-name": "default"},
                "annotations": {"nuclio.io/generated_by": "nuclio-controller"}
            },
            "spec": spec,
            "status": {"state": state}
        }))
        .unwrap()
    }

    fn current_spec() -> Value {
        json!({
            "runtime": "python:3.12",
            "handler": "main:handler",
            "build": {"image": "default/echo:latest"},
            "resources": {}
        })
    }

    #[test]
    fn test_absent_creates() {
        for force in [false, true] {
            assert!(matches!(
                plan(&desired(), None, force),
                Action::Create { .. }
            ));
        }
    }

    #[test]
    fn test_transient_defers_regardless_of_force() {
        for state in ["building", "configuringResources", "waitingForBuild"] {
            for force in [false, true] {
                let action = plan(&desired(), Some(&observed(state, current_spec())), force);
                assert!(matches!(action, Action::Defer { .. }), "{state}");
            }
        }
    }

    #[test]
    fn test_ready_and_equal_is_noop() {
        let action = plan(&desired(), Some(&observed("ready", current_spec())), false);
        assert_eq!(action, Action::NoOp);
    }

    #[test]
    fn test_force_or_not_ready_patches() {
        let action = plan(&desired(), Some(&observed("ready", current_spec())), true);
        assert_eq!(action, Action::Patch);

        for state in ["error", "unhealthy", "scaledToZero", "imported"] {
            let action = plan(&desired(), Some(&observed(state, current_spec())), false);
            assert_eq!(action, Action::Patch, "{state}");
        }
    }

    #[test]
    fn test_metadata_change_replaces_with_skip_build() {
        let mut want = desired();
        want["metadata"]["labels"]["team"] = json!("payments");

        match plan(&want, Some(&observed("ready", current_spec())), false) {
            Action::Replace {
                body,
                skip_build,
                changes,
            } => {
                assert!(skip_build);
                assert_eq!(body["metadata"]["annotations"]["skip-build"], "true");
                assert_eq!(body["metadata"]["resourceVersion"], "12");
                assert_eq!(body["metadata"]["namespace"], "nuclio");
                assert_eq!(body["spec"]["build"]["image"], "default/echo:latest");
                assert!(body.get("status").is_none());
                assert_eq!(
                    Value::Object(changes),
                    json!({"metadata": {"labels": {"team": "payments"}}})
                );
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn test_code_change_rebuilds() {
        let mut want = desired();
        want["spec"]["build"]["functionSourceCode"] = json!("ZGVmIGhhbmRsZXIoKTogcGFzcw==");

        match plan(&want, Some(&observed("ready", current_spec())), false) {
            Action::Replace {
                body, skip_build, ..
            } => {
                assert!(!skip_build);
                assert!(body["metadata"]["annotations"].get("skip-build").is_none());
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn test_stale_skip_build_hint_is_cleared() {
        let mut remote = observed("ready", current_spec());
        remote
            .metadata
            .annotations
            .insert(SKIP_BUILD_ANNOTATION.into(), "true".into());

        let mut want = desired();
        want["spec"]["runtime"] = json!("python:3.11");

        match plan(&want, Some(&remote), false) {
            Action::Replace {
                body, skip_build, ..
            } => {
                assert!(!skip_build);
                assert_eq!(body["metadata"]["annotations"]["skip-build"], "false");
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn test_change_on_unhealthy_replaces_without_hint() {
        let mut want = desired();
        want["spec"]["minReplicas"] = json!(2);

        match plan(&want, Some(&observed("unhealthy", current_spec())), false) {
            Action::Replace { skip_build, .. } => assert!(!skip_build),
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn test_missing_state_is_not_transient() {
        let mut remote = observed("ready", current_spec());
        remote.status = None;
        assert_eq!(plan(&desired(), Some(&remote), false), Action::Patch);
    }
}
