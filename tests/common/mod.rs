//! Shared utilities for integration tests.
//!
//! Builds an engine over in-memory echo releases and drives the REST router
//! in-process.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body, Bytes};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use rulehost::engine::{EngineOptions, ExecutionEngine};
use rulehost::marshal::MarshallerRegistry;
use rulehost::registry::ContainerRegistry;
use rulehost::release::InMemoryRepository;
use rulehost::test_utils::repository_with;

pub use rulehost::test_utils::{release_id, DEFAULT_SESSION};

pub const RELEASE: &str = "2.1.0.GA";

pub const HELLO_BATCH_XML: &str = r#"<batch-execution lookup="defaultKieSession">
  <insert out-identifier="message">
    <org.pkg1.Message><text>Hello World</text></org.pkg1.Message>
  </insert>
  <fire-all-rules/>
</batch-execution>"#;

pub const HELLO_BATCH_JSON: &str = r#"{
  "lookup": "defaultKieSession",
  "commands": [
    {"insert": {"object": {"org.pkg1.Message": {"text": "Hello World"}}, "out-identifier": "message"}},
    "fire-all-rules"
  ]
}"#;

pub fn engine_over(repo: Arc<InMemoryRepository>, execution_timeout: Duration) -> Arc<ExecutionEngine> {
    let registry = ContainerRegistry::new(repo, Duration::from_secs(5));
    Arc::new(ExecutionEngine::new(
        registry,
        Arc::new(MarshallerRegistry::with_defaults()),
        EngineOptions {
            server_id: "it-server".into(),
            execution_timeout,
            ..EngineOptions::default()
        },
    ))
}

/// Engine over a repository holding `foo.bar:baz:2.1.0.GA`.
pub async fn engine() -> Arc<ExecutionEngine> {
    engine_over(repository_with(&[RELEASE]).await, Duration::from_secs(5))
}

/// Engine with container `kie1` already started.
pub async fn engine_with_kie1() -> Arc<ExecutionEngine> {
    let engine = engine().await;
    engine
        .registry()
        .create("kie1", release_id(RELEASE), None)
        .await
        .expect("kie1 starts");
    engine
}

/// Send one request through the router.
pub async fn send(
    router: Router,
    method: Method,
    uri: &str,
    headers: &[(&str, &str)],
    body: impl Into<Body>,
) -> (StatusCode, Bytes) {
    let mut request = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        request = request.header(*name, *value);
    }
    let response = router
        .oneshot(request.body(body.into()).expect("valid request"))
        .await
        .expect("router is infallible");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    (status, bytes)
}
