// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP backend tests against a wiremock dashboard.

use std::time::Duration;

use nuclio_api::{
    ApiError, ClientConfig, ControlPlane, DesiredState, FunctionState, HttpControlPlane,
};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend(server: &MockServer) -> HttpControlPlane {
    HttpControlPlane::new(
        ClientConfig::new()
            .with_address(server.uri())
            .with_request_timeout(Duration::from_millis(500))
            .with_read_retries(1, Duration::ZERO),
    )
    .unwrap()
}

#[tokio::test]
async fn test_get_function_sends_project_header() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/functions/echo"))
        .and(header("x-nuclio-project-name", "shop"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "metadata": {"name": "echo", "namespace": "nuclio"},
            "spec": {"runtime": "python:3.12"},
            "status": {"state": "ready"}
        })))
        .mount(&server)
        .await;

    let function = backend(&server)
        .get_function("shop", "echo")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(function.metadata.name, "echo");
    assert_eq!(function.state(), Some(FunctionState::Ready));
}

#[tokio::test]
async fn test_get_function_404_is_none() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/functions/ghost"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let function = backend(&server).get_function("shop", "ghost").await.unwrap();
    assert!(function.is_none());
}

#[tokio::test]
async fn test_get_function_500_is_rejected_without_retry() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/functions/echo"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;

    let err = backend(&server).get_function("shop", "echo").await.unwrap_err();
    match err {
        ApiError::Rejected { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_read_timeout_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/functions/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .expect(2)
        .mount(&server)
        .await;

    let err = backend(&server).get_function("shop", "slow").await.unwrap_err();
    assert!(matches!(err, ApiError::Timeout(500)));
}

#[tokio::test]
async fn test_create_function_posts_collection() {
    let server = MockServer::start().await;
    let body = json!({"metadata": {"name": "echo"}, "spec": {"runtime": "nodejs"}});

    Mock::given(method("POST"))
        .and(path("/api/functions"))
        .and(header("x-nuclio-project-name", "shop"))
        .and(body_json(body.clone()))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    backend(&server)
        .create_function("shop", &body)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_replace_function_puts_document() {
    let server = MockServer::start().await;
    let body = json!({"metadata": {"name": "echo"}, "spec": {"minReplicas": 2}});

    Mock::given(method("PUT"))
        .and(path("/api/functions/echo"))
        .and(body_json(body.clone()))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    backend(&server)
        .replace_function("shop", "echo", &body)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_patch_desired_state_body() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/api/functions/echo"))
        .and(body_json(json!({"desiredState": "ready"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    backend(&server)
        .patch_desired_state("shop", "echo", DesiredState::Ready)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_ensure_project_creates_missing_project() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/projects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "default": {"metadata": {"name": "default", "namespace": "nuclio"}}
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/projects"))
        .and(body_json(json!({"metadata": {"name": "shop"}})))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let client = backend(&server);
    assert!(client.ensure_project("shop").await.unwrap());
    assert!(!client.ensure_project("default").await.unwrap());
}

#[tokio::test]
async fn test_create_project_requires_created_status() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/projects"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let err = backend(&server).create_project("shop").await.unwrap_err();
    assert_eq!(err.status(), Some(200));
}

#[tokio::test]
async fn test_replicas_and_logs() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/functions/echo/replicas"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"names": ["echo-1", "echo-2"]})),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/functions/echo/logs/echo-1"))
        .and(query_param("follow", "false"))
        .and(query_param("tailLines", "70"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["line 1", "line 2"])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/functions/echo/logs/echo-2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("plain text"))
        .mount(&server)
        .await;

    let client = backend(&server);
    let replicas = client.list_replicas("shop", "echo").await.unwrap();
    assert_eq!(replicas.names, vec!["echo-1", "echo-2"]);

    let json_logs = client.get_logs("shop", "echo", "echo-1", 70).await.unwrap();
    assert_eq!(json_logs, json!(["line 1", "line 2"]));

    let text_logs = client.get_logs("shop", "echo", "echo-2", 70).await.unwrap();
    assert_eq!(text_logs, json!("plain text"));
}
