//! REST client against a server bound to a local port.

#[path = "../common/mod.rs"]
mod common;

use common::{engine, release_id, RELEASE};
use rulehost::client::ServerClient;
use rulehost::command::{BatchCommand, BatchExecution, CommandScript, ServerCommand};
use rulehost::model::{
    ContainerStatus, ResponsePayload, ResponseType, ScannerResource, ScannerStatus, Value,
};
use rulehost::test_utils::{message, DEFAULT_SESSION};
use rulehost::transport::rest::router;

async fn start_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(engine().await);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_client_drives_container_lifecycle() {
    let client = ServerClient::new(start_server().await, "json").unwrap();
    client.wait_until_ready().await.unwrap();

    let info = client.server_info().await.unwrap();
    let Some(ResponsePayload::ServerInfo(info)) = info.result else {
        panic!("expected server info");
    };
    assert_eq!(info.server_id, "it-server");

    let created = client
        .create_container("kie1", release_id(RELEASE), None)
        .await
        .unwrap();
    assert!(created.is_success(), "{}", created.msg);

    let batch = BatchExecution::new(
        Some(DEFAULT_SESSION),
        vec![
            BatchCommand::insert(message("Hello World"), Some("message")),
            BatchCommand::fire_all_rules(),
        ],
    );
    let called = client.call_container("kie1", &batch).await.unwrap();
    assert_eq!(called.response_type, ResponseType::Success, "{}", called.msg);
    let results = called.result.unwrap();
    let text = results
        .value("message")
        .and_then(Value::as_object)
        .and_then(|m| m.get("text"))
        .and_then(Value::as_text);
    assert_eq!(text, Some("echo:Hello World"));

    let scanner = client
        .update_scanner("kie1", ScannerResource::new(ScannerStatus::Started, Some(60_000)))
        .await
        .unwrap();
    assert!(scanner.is_success(), "{}", scanner.msg);
    let scanner = client.scanner_info("kie1").await.unwrap();
    assert_eq!(
        scanner.result,
        Some(ResponsePayload::Scanner(ScannerResource::new(
            ScannerStatus::Started,
            Some(60_000)
        )))
    );

    let disposed = client.dispose_container("kie1").await.unwrap();
    let Some(ResponsePayload::Container(container)) = disposed.result else {
        panic!("expected disposed container");
    };
    assert_eq!(container.status, ContainerStatus::Disposed);

    let missing = client.container_info("kie1").await.unwrap();
    assert_eq!(missing.response_type, ResponseType::Failure);
}

#[tokio::test]
async fn test_client_executes_scripts_in_xml() {
    let client = ServerClient::new(start_server().await, "xml").unwrap();
    client.wait_until_ready().await.unwrap();

    let script = CommandScript::new(vec![
        ServerCommand::create_container("kie1", release_id(RELEASE)),
        ServerCommand::ListContainers,
        ServerCommand::dispose_container("kie1"),
    ]);
    let responses = client.execute(&script).await.unwrap();
    assert_eq!(responses.len(), 3);
    assert!(responses.all_succeeded(), "{:?}", responses);

    let listed = client.list_containers().await.unwrap();
    assert_eq!(listed.result, Some(ResponsePayload::Containers(vec![])));
}

#[tokio::test]
async fn test_client_call_failure_has_no_results() {
    let client = ServerClient::new(start_server().await, "json").unwrap();
    client.wait_until_ready().await.unwrap();

    let batch = BatchExecution::new(Some(DEFAULT_SESSION), vec![BatchCommand::fire_all_rules()]);
    let called = client.call_container("missing", &batch).await.unwrap();
    assert_eq!(called.response_type, ResponseType::Failure);
    assert!(called.msg.contains("[NotFound]"), "{}", called.msg);
    assert!(called.result.is_none());
}
