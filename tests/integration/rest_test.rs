//! REST adapter integration tests.
//!
//! Drives the axum router in-process with `oneshot`.

#[path = "../common/mod.rs"]
mod common;

use std::time::Duration;

use axum::http::{Method, StatusCode};
use common::{engine, engine_over, engine_with_kie1, send, HELLO_BATCH_JSON, HELLO_BATCH_XML};
use rulehost::marshal::{JsonMarshaller, MarshallerExt, XmlMarshaller};
use rulehost::model::{ContainerStatus, ResponsePayload, ResponseType, ServiceResponse, Value};
use rulehost::test_utils::{echo_release, slow_echo_release};
use rulehost::transport::rest::router;
use rulehost::types::NoDomainTypes;
use rulehost::release::InMemoryRepository;

fn echoed_text(marshaller: &dyn rulehost::marshal::Marshaller, response: &ServiceResponse) -> String {
    let Some(ResponsePayload::Text(text)) = &response.result else {
        panic!("expected execution results, got {:?}", response.result);
    };
    let results = marshaller
        .decode_results(text.as_bytes(), &NoDomainTypes)
        .unwrap();
    results
        .value("message")
        .and_then(Value::as_object)
        .and_then(|m| m.get("text"))
        .and_then(Value::as_text)
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_health() {
    let (status, _) = send(router(engine().await), Method::GET, "/health", &[], "").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_script_create_call_dispose() {
    let app = router(engine().await);
    let script = format!(
        r#"<script>
          <create-container container-id="kie1">
            <release-id><group-id>foo.bar</group-id><artifact-id>baz</artifact-id><version>2.1.0.GA</version></release-id>
          </create-container>
          <call-container container-id="kie1"><payload>{}</payload></call-container>
          <dispose-container container-id="kie1"/>
        </script>"#,
        HELLO_BATCH_XML
    );

    let (status, body) = send(
        app.clone(),
        Method::POST,
        "/server",
        &[("content-type", "application/xml")],
        script,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let responses = XmlMarshaller.decode_responses(&body).unwrap();
    let types: Vec<_> = responses.responses.iter().map(|r| r.response_type).collect();
    assert_eq!(types, vec![ResponseType::Success; 3], "{:?}", responses);
    assert_eq!(echoed_text(&XmlMarshaller, &responses.responses[1]), "echo:Hello World");

    let (status, body) = send(app, Method::GET, "/server/containers/kie1", &[], "").await;
    assert_eq!(status, StatusCode::OK);
    let response = XmlMarshaller.decode_response(&body).unwrap();
    assert_eq!(response.response_type, ResponseType::Failure);
    assert!(response.msg.contains("[NotFound]"), "{}", response.msg);
}

#[tokio::test]
async fn test_call_container_over_json() {
    let app = router(engine_with_kie1().await);

    let (status, body) = send(
        app,
        Method::POST,
        "/server/containers/kie1",
        &[("content-type", "application/json")],
        HELLO_BATCH_JSON,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let response = JsonMarshaller.decode_response(&body).unwrap();
    assert_eq!(response.response_type, ResponseType::Success, "{}", response.msg);
    assert_eq!(response.msg, "Container kie1 successfully called.");
    assert_eq!(echoed_text(&JsonMarshaller, &response), "echo:Hello World");
}

#[tokio::test]
async fn test_unknown_lookup_is_a_failure_response() {
    let app = router(engine_with_kie1().await);
    let batch = HELLO_BATCH_XML.replace("defaultKieSession", "xyz");

    let (status, body) = send(app, Method::POST, "/server/containers/kie1", &[], batch).await;
    assert_eq!(status, StatusCode::OK);

    let response = XmlMarshaller.decode_response(&body).unwrap();
    assert_eq!(response.response_type, ResponseType::Failure);
    assert!(response.msg.contains("[SessionNotFound]"), "{}", response.msg);
    assert!(response.result.is_none());
}

#[tokio::test]
async fn test_unknown_format_is_unsupported_media_type() {
    let app = router(engine().await);

    let (status, _) = send(
        app.clone(),
        Method::POST,
        "/server",
        &[("x-rulehost-format", "yaml")],
        "commands: []",
    )
    .await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let (status, _) = send(
        app,
        Method::GET,
        "/server",
        &[("content-type", "text/plain")],
        "",
    )
    .await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_malformed_envelope_is_bad_request() {
    let app = router(engine().await);

    let (status, _) = send(
        app.clone(),
        Method::POST,
        "/server",
        &[("content-type", "application/xml")],
        "<script",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        app,
        Method::PUT,
        "/server/containers/kie1",
        &[("content-type", "application/json")],
        "{\"release-id\": 7}",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_container_routes() {
    let app = router(engine().await);

    let resource = r#"<container container-id="kie2">
        <release-id><group-id>foo.bar</group-id><artifact-id>baz</artifact-id><version>2.1.0.GA</version></release-id>
    </container>"#;
    let (status, body) = send(app.clone(), Method::PUT, "/server/containers/kie2", &[], resource).await;
    assert_eq!(status, StatusCode::OK);
    let created = XmlMarshaller.decode_response(&body).unwrap();
    assert!(created.is_success(), "{}", created.msg);

    let (_, body) = send(app.clone(), Method::GET, "/server/containers", &[], "").await;
    let listed = XmlMarshaller.decode_response(&body).unwrap();
    let Some(ResponsePayload::Containers(containers)) = listed.result else {
        panic!("expected container list");
    };
    assert_eq!(containers.len(), 1);
    assert_eq!(containers[0].container_id, "kie2");
    assert_eq!(containers[0].status, ContainerStatus::Started);

    let (_, body) = send(app.clone(), Method::GET, "/server/containers/kie2/release-id", &[], "").await;
    let release = XmlMarshaller.decode_response(&body).unwrap();
    assert_eq!(
        release.result,
        Some(ResponsePayload::ReleaseId(common::release_id("2.1.0.GA")))
    );

    let (_, body) = send(app.clone(), Method::GET, "/server/containers/kie2/scanner", &[], "").await;
    assert!(XmlMarshaller.decode_response(&body).unwrap().is_success());

    let (_, body) = send(app.clone(), Method::DELETE, "/server/containers/kie2", &[], "").await;
    let disposed = XmlMarshaller.decode_response(&body).unwrap();
    assert_eq!(disposed.msg, "Container kie2 successfully disposed.");

    let (_, body) = send(app, Method::GET, "/server/containers", &[], "").await;
    let listed = XmlMarshaller.decode_response(&body).unwrap();
    assert_eq!(listed.result, Some(ResponsePayload::Containers(vec![])));
}

#[tokio::test]
async fn test_update_release_id_route() {
    let repo = std::sync::Arc::new(InMemoryRepository::new());
    repo.deploy(echo_release("1.0")).await;
    repo.deploy(echo_release("1.1")).await;
    let engine = engine_over(repo, Duration::from_secs(5));
    engine
        .registry()
        .create("kie1", common::release_id("1.0"), None)
        .await
        .unwrap();
    let app = router(engine);

    let body = r#"{"group-id":"foo.bar","artifact-id":"baz","version":"1.1"}"#;
    let (status, response) = send(
        app.clone(),
        Method::POST,
        "/server/containers/kie1/release-id",
        &[("content-type", "application/json")],
        body,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let response = JsonMarshaller.decode_response(&response).unwrap();
    assert!(response.is_success(), "{}", response.msg);

    let (_, response) = send(
        app,
        Method::GET,
        "/server/containers/kie1/release-id",
        &[("x-rulehost-format", "json")],
        "",
    )
    .await;
    let response = JsonMarshaller.decode_response(&response).unwrap();
    assert_eq!(
        response.result,
        Some(ResponsePayload::ReleaseId(common::release_id("1.1")))
    );
}

/// Calls racing a dispose either complete or fail with a lifecycle error;
/// none observes a half-torn-down container.
#[tokio::test]
async fn test_dispose_racing_calls() {
    let repo = std::sync::Arc::new(InMemoryRepository::new());
    repo.deploy(slow_echo_release("1.0", Duration::from_millis(20)))
        .await;
    let engine = engine_over(repo, Duration::from_secs(5));
    engine
        .registry()
        .create("kie1", common::release_id("1.0"), None)
        .await
        .unwrap();
    let app = router(engine);

    let mut calls = Vec::new();
    for _ in 0..8 {
        let app = app.clone();
        calls.push(tokio::spawn(async move {
            send(app, Method::POST, "/server/containers/kie1", &[], HELLO_BATCH_XML).await
        }));
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
    let (status, body) = send(app.clone(), Method::DELETE, "/server/containers/kie1", &[], "").await;
    assert_eq!(status, StatusCode::OK);
    assert!(XmlMarshaller.decode_response(&body).unwrap().is_success());

    for call in calls {
        let (status, body) = call.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        let response = XmlMarshaller.decode_response(&body).unwrap();
        if response.is_success() {
            assert_eq!(echoed_text(&XmlMarshaller, &response), "echo:Hello World");
        } else {
            assert!(
                ["[NotFound]", "[ContainerNotStarted]", "[DisposeInProgress]"]
                    .iter()
                    .any(|kind| response.msg.contains(kind)),
                "{}",
                response.msg
            );
        }
    }

    let (_, body) = send(app, Method::GET, "/server/containers/kie1", &[], "").await;
    assert!(!XmlMarshaller.decode_response(&body).unwrap().is_success());
}
