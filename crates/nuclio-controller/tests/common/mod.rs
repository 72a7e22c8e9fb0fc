// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared fixtures for nuclio-controller integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use nuclio_api::{FunctionStatus, MockControlPlane};
use nuclio_controller::compiler::{
    CompileDefaults, DesiredSpec, EnvVar, RawFunctionConfig, StaticSecretResolver, compile,
};
use nuclio_controller::controller::FunctionController;

pub const PROJECT: &str = "default";

pub const ECHO_CODE: &str = "def handler(context, event):\n    return event.body\n";

/// Raw declaration of a python echo function.
pub fn raw_function(name: &str) -> RawFunctionConfig {
    RawFunctionConfig {
        name: name.to_string(),
        code: ECHO_CODE.to_string(),
        config: "spec:\n  minReplicas: 1\n".to_string(),
        env: vec![EnvVar::new("LOG_LEVEL", "info")],
        ..Default::default()
    }
}

/// Compiled echo function.
pub fn desired(name: &str) -> DesiredSpec {
    compile(
        &raw_function(name),
        &CompileDefaults::default(),
        &StaticSecretResolver::new(),
    )
    .expect("fixture compiles")
}

/// Controller for `name` on a fresh mock control plane.
pub fn controller(name: &str) -> (Arc<MockControlPlane>, Arc<FunctionController>) {
    controller_on(name, MockControlPlane::new())
}

/// Controller for `name` on the given mock.
pub fn controller_on(
    name: &str,
    mock: MockControlPlane,
) -> (Arc<MockControlPlane>, Arc<FunctionController>) {
    let mock = Arc::new(mock);
    let controller = FunctionController::new(desired(name), mock.clone());
    (mock, controller)
}

/// Mark a stored function ready and reachable at `address` (host:port).
pub async fn serve_at(mock: &MockControlPlane, name: &str, address: &str) {
    mock.set_status(
        PROJECT,
        name,
        FunctionStatus {
            state: Some("ready".to_string()),
            internal_invocation_urls: vec![address.to_string()],
            ..Default::default()
        },
    )
    .await;
}
