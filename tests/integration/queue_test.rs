//! Queue adapter integration tests over the in-process channel queue.

#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;

use common::{engine, HELLO_BATCH_XML};
use rulehost::marshal::{MarshallerExt, XmlMarshaller};
use rulehost::model::{ResponsePayload, ResponseType};
use rulehost::transport::queue::{channel_queue, QueueListener};

#[tokio::test]
async fn test_script_round_trip_over_queue() {
    let (queue, client) = channel_queue(16);
    let listener = QueueListener::new(engine().await, Arc::new(queue)).spawn();

    let script = format!(
        r#"<script>
          <create-container container-id="kie1">
            <release-id><group-id>foo.bar</group-id><artifact-id>baz</artifact-id><version>2.1.0.GA</version></release-id>
          </create-container>
          <call-container container-id="kie1"><payload>{}</payload></call-container>
        </script>"#,
        HELLO_BATCH_XML
    );
    let reply = client.request("xml", script).await.unwrap();
    assert_eq!(reply.format, "xml");

    let responses = XmlMarshaller.decode_responses(&reply.body).unwrap();
    assert_eq!(responses.len(), 2);
    assert!(responses.all_succeeded(), "{:?}", responses);
    let Some(ResponsePayload::Text(results)) = &responses.responses[1].result else {
        panic!("expected execution results");
    };
    assert!(results.contains("echo:Hello World"));

    client.close();
    listener.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_concurrent_requests_are_correlated() {
    let (queue, client) = channel_queue(16);
    let _listener = QueueListener::new(engine().await, Arc::new(queue)).spawn();

    let mut sent = Vec::new();
    for i in 0..5 {
        let script = format!(
            r#"<script>
              <create-container container-id="kie{i}">
                <release-id><group-id>foo.bar</group-id><artifact-id>baz</artifact-id><version>2.1.0.GA</version></release-id>
              </create-container>
              <get-container-info container-id="kie{i}"/>
            </script>"#
        );
        sent.push((i, client.send("xml", script).await.unwrap()));
    }

    // Collect in reverse order so most replies arrive before they are awaited.
    for (i, pending) in sent.into_iter().rev() {
        let request_id = pending.request_id().to_string();
        let reply = pending.wait().await.unwrap();
        assert_eq!(reply.request_id, request_id);
        let responses = XmlMarshaller.decode_responses(&reply.body).unwrap();
        let Some(ResponsePayload::Container(container)) = &responses.responses[1].result else {
            panic!("expected container info");
        };
        assert_eq!(container.container_id, format!("kie{}", i));
    }
}

#[tokio::test]
async fn test_failed_command_still_gets_a_reply() {
    let (queue, client) = channel_queue(4);
    let _listener = QueueListener::new(engine().await, Arc::new(queue)).spawn();

    let reply = client
        .request(
            "xml",
            r#"<script><dispose-container container-id="missing"/><list-containers/></script>"#,
        )
        .await
        .unwrap();

    let responses = XmlMarshaller.decode_responses(&reply.body).unwrap();
    let types: Vec<_> = responses.responses.iter().map(|r| r.response_type).collect();
    assert_eq!(types, vec![ResponseType::Failure, ResponseType::Success]);
}
