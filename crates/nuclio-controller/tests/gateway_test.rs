// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Invocation gateway against a wiremock function endpoint.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use common::{PROJECT, controller_on, serve_at};
use nuclio_api::MockControlPlane;
use nuclio_controller::controller::{FunctionController, InvocationOutcome};
use nuclio_controller::gateway::{InvocationGateway, InvokeError, InvokeSettings, ResponseBody};
use nuclio_controller::status::{Fill, Shape};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A ready controller whose function is served by a fresh wiremock server.
async fn serving_controller() -> (Arc<MockControlPlane>, Arc<FunctionController>, MockServer) {
    let server = MockServer::start().await;
    let (mock, controller) = controller_on("echo", MockControlPlane::with_deploy_state("ready"));
    controller.deploy(false).await.unwrap();
    serve_at(&mock, "echo", &server.address().to_string()).await;
    controller.tick().await;
    (mock, controller, server)
}

fn gateway(controller: &Arc<FunctionController>, settings: InvokeSettings) -> Arc<InvocationGateway> {
    Arc::new(InvocationGateway::new(
        controller.clone(),
        settings,
        reqwest::Client::new(),
    ))
}

#[tokio::test]
async fn test_success_records_outcome() {
    let (_mock, controller, server) = serving_controller().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(header("content-type", "application/json"))
        .and(header("x-tenant", "acme"))
        .and(body_json(json!({"hello": "world"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"echo": "world"})))
        .expect(1)
        .mount(&server)
        .await;

    let settings = InvokeSettings {
        headers: BTreeMap::from([("x-tenant".to_string(), "acme".to_string())]),
        ..Default::default()
    };
    let gateway = gateway(&controller, settings);
    let mut status = gateway.subscribe_status();

    let invocation = gateway
        .invoke(&json!({"hello": "world"}), &BTreeMap::new(), None)
        .await
        .unwrap();

    assert_eq!(invocation.status, 200);
    assert_eq!(invocation.body, ResponseBody::Json(json!({"echo": "world"})));
    assert_eq!(
        controller.last_invocation(),
        InvocationOutcome::Success { status: 200 }
    );
    assert_eq!(controller.in_flight(), 0);

    tokio::time::timeout(Duration::from_secs(2), status.changed())
        .await
        .unwrap()
        .unwrap();
    let report = status.borrow().clone();
    assert_eq!(report.indicator.fill, Fill::Green);
    assert_eq!(report.indicator.shape, Shape::Dot);
    assert_eq!(report.indicator.text, "");
}

#[tokio::test]
async fn test_backpressure_leaves_counter_unchanged() {
    let (_mock, controller, server) = serving_controller().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("slow")
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway(
        &controller,
        InvokeSettings {
            max_in_flight: Some(1),
            ..Default::default()
        },
    );

    let first = {
        let gateway = gateway.clone();
        tokio::spawn(async move { gateway.invoke(&json!({}), &BTreeMap::new(), None).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(controller.in_flight(), 1);

    let err = gateway
        .invoke(&json!({}), &BTreeMap::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        InvokeError::Backpressure {
            in_flight: 1,
            max_in_flight: 1
        }
    ));
    assert_eq!(controller.in_flight(), 1);

    let invocation = first.await.unwrap().unwrap();
    assert_eq!(invocation.body, ResponseBody::Text("slow".into()));
    assert_eq!(controller.in_flight(), 0);
}

#[tokio::test]
async fn test_dropped_invocation_releases_slot() {
    let (_mock, controller, server) = serving_controller().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let gateway = gateway(
        &controller,
        InvokeSettings {
            max_in_flight: Some(1),
            ..Default::default()
        },
    );

    let abandoned = tokio::time::timeout(
        Duration::from_millis(200),
        gateway.invoke(&json!({}), &BTreeMap::new(), None),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!(controller.in_flight(), 0);
    assert_eq!(controller.last_invocation(), InvocationOutcome::Unknown);

    let err = gateway
        .invoke(&json!({}), &BTreeMap::new(), Some(Duration::from_millis(50)))
        .await
        .unwrap_err();
    assert!(matches!(err, InvokeError::Failed { status: None, .. }));
    assert_eq!(controller.in_flight(), 0);
}

#[tokio::test]
async fn test_no_endpoint_reports_status() {
    let (_mock, controller) = controller_on("echo", MockControlPlane::new());
    let gateway = gateway(&controller, InvokeSettings::default());
    let mut status = gateway.subscribe_status();

    let err = gateway
        .invoke(&json!({}), &BTreeMap::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, InvokeError::NoEndpoint(_)));
    assert_eq!(controller.last_invocation(), InvocationOutcome::Unknown);
    assert_eq!(controller.in_flight(), 0);

    tokio::time::timeout(Duration::from_secs(2), status.changed())
        .await
        .unwrap()
        .unwrap();
    let report = status.borrow().clone();
    assert_eq!(report.indicator.fill, Fill::Yellow);
    assert_eq!(report.indicator.shape, Shape::Ring);
    assert_eq!(report.indicator.text, "No Endpoint");
}

#[tokio::test]
async fn test_upstream_failure_reports_status() {
    let (_mock, controller, server) = serving_controller().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let gateway = gateway(&controller, InvokeSettings::default());
    let mut status = gateway.subscribe_status();

    let err = gateway
        .invoke(&json!({}), &BTreeMap::new(), None)
        .await
        .unwrap_err();
    match err {
        InvokeError::Failed {
            status, message, ..
        } => {
            assert_eq!(status, Some(500));
            assert_eq!(message, "boom");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(
        controller.last_invocation(),
        InvocationOutcome::Failure {
            status: Some(500),
            code: None
        }
    );

    tokio::time::timeout(Duration::from_secs(2), status.changed())
        .await
        .unwrap()
        .unwrap();
    let report = status.borrow().clone();
    assert_eq!(report.indicator.fill, Fill::Red);
    assert_eq!(report.indicator.text, "500");
}

#[tokio::test]
async fn test_timeout_is_a_transport_failure() {
    let (_mock, controller, server) = serving_controller().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let gateway = gateway(&controller, InvokeSettings::default());
    let err = gateway
        .invoke(&json!({}), &BTreeMap::new(), Some(Duration::from_millis(50)))
        .await
        .unwrap_err();

    assert!(matches!(err, InvokeError::Failed { status: None, .. }));
    assert_eq!(
        controller.last_invocation(),
        InvocationOutcome::Failure {
            status: None,
            code: Some("timeout".into())
        }
    );
}

#[tokio::test]
async fn test_refused_while_redeploying() {
    let server = MockServer::start().await;
    let (mock, controller) = controller_on("echo", MockControlPlane::new());
    controller.deploy(false).await.unwrap();
    serve_at(&mock, "echo", &server.address().to_string()).await;
    controller.refresh().await.unwrap();
    assert!(controller.snapshot().redeploying);

    let gateway = gateway(&controller, InvokeSettings::default());
    let err = gateway
        .invoke(&json!({}), &BTreeMap::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, InvokeError::Redeploying(_)));
    assert_eq!(controller.in_flight(), 0);
}

#[tokio::test]
async fn test_refused_in_error_state() {
    let (mock, controller, _server) = serving_controller().await;
    mock.set_state(PROJECT, "echo", "error").await;
    controller.tick().await;

    let gateway = gateway(&controller, InvokeSettings::default());
    let err = gateway
        .invoke(&json!({}), &BTreeMap::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, InvokeError::FunctionFailed(_)));
}

#[tokio::test]
async fn test_failure_during_redeploy_is_absorbed() {
    let (mock, controller, server) = serving_controller().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_delay(Duration::from_millis(300)))
        .mount(&server)
        .await;

    let gateway = gateway(&controller, InvokeSettings::default());
    let mut status = gateway.subscribe_status();

    let pending = {
        let gateway = gateway.clone();
        tokio::spawn(async move { gateway.invoke(&json!({}), &BTreeMap::new(), None).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    controller.deploy(true).await.unwrap();
    assert!(controller.snapshot().redeploying);

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, InvokeError::Failed { status: Some(503), .. }));
    assert_eq!(mock.mutation_count().await, 2);

    let changed = tokio::time::timeout(Duration::from_millis(800), status.changed()).await;
    assert!(changed.is_err(), "status must not change while redeploying");
}
