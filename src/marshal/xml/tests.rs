use super::*;
use crate::marshal::MarshallerExt;
use crate::test_utils::{message, message_type, release_id, DEFAULT_SESSION, MESSAGE_TYPE};
use crate::types::{NoDomainTypes, TypeNamespace};

const HELLO_BATCH: &str = r#"<batch-execution lookup="defaultKieSession">
  <insert out-identifier="message">
    <org.pkg1.Message>
      <text>Hello World</text>
    </org.pkg1.Message>
  </insert>
  <fire-all-rules/>
</batch-execution>"#;

fn namespace() -> TypeNamespace {
    TypeNamespace::new("foo.bar:baz:2.1.0.GA").with_type(message_type())
}

#[test]
fn test_decode_batch_preserves_order() {
    let batch = XmlMarshaller
        .decode_batch(HELLO_BATCH.as_bytes(), &namespace())
        .unwrap();

    assert_eq!(batch.lookup.as_deref(), Some(DEFAULT_SESSION));
    assert_eq!(batch.commands.len(), 2);
    assert_eq!(
        batch.commands[0],
        BatchCommand::insert(message("Hello World"), Some("message"))
    );
    assert_eq!(batch.commands[1], BatchCommand::fire_all_rules());
}

#[test]
fn test_decode_batch_rejects_type_outside_namespace() {
    let other = TypeNamespace::new("other:app:1");
    let err = XmlMarshaller
        .decode_batch(HELLO_BATCH.as_bytes(), &other)
        .unwrap_err();
    assert!(err.to_string().contains("unknown type 'org.pkg1.Message'"));
    assert!(err.to_string().contains("other:app:1"));
}

#[test]
fn test_decode_batch_rejects_undeclared_field() {
    let xml = r#"<batch-execution>
        <insert><org.pkg1.Message><colour>red</colour></org.pkg1.Message></insert>
    </batch-execution>"#;
    let err = XmlMarshaller
        .decode_batch(xml.as_bytes(), &namespace())
        .unwrap_err();
    assert!(err.to_string().contains("has no field 'colour'"));
}

#[test]
fn test_decode_typed_scalars_and_nested_objects() {
    let types = TypeNamespace::new("ns")
        .with_type(
            TypeDescriptor::new("a.Order")
                .with_field("quantity", FieldKind::Int)
                .with_field("express", FieldKind::Bool)
                .with_field("customer", FieldKind::Object("a.Customer".into())),
        )
        .with_type(TypeDescriptor::new("a.Customer").with_field("name", FieldKind::Text));
    let xml = r#"<batch-execution>
        <insert out-identifier="order">
          <a.Order>
            <quantity>3</quantity>
            <express>true</express>
            <customer><name>Ada</name></customer>
          </a.Order>
        </insert>
    </batch-execution>"#;

    let batch = XmlMarshaller.decode_batch(xml.as_bytes(), &types).unwrap();
    let BatchCommand::Insert { object, .. } = &batch.commands[0] else {
        panic!("expected insert");
    };
    let order = object.as_object().unwrap();
    assert_eq!(order.get("quantity"), Some(&Value::Int(3)));
    assert_eq!(order.get("express"), Some(&Value::Bool(true)));
    let customer = order.get("customer").and_then(Value::as_object).unwrap();
    assert_eq!(customer.type_name, "a.Customer");
    assert_eq!(customer.get("name"), Some(&Value::Text("Ada".into())));

    let bad = xml.replace("<quantity>3</quantity>", "<quantity>many</quantity>");
    assert!(XmlMarshaller.decode_batch(bad.as_bytes(), &types).is_err());
}

#[test]
fn test_batch_encode_decode_is_equivalent() {
    let batch = BatchExecution::new(
        Some(DEFAULT_SESSION),
        vec![
            BatchCommand::Insert {
                object: message("Hi").into(),
                out_identifier: Some("m".into()),
                return_object: false,
            },
            BatchCommand::FireAllRules {
                max: Some(5),
                out_identifier: Some("fired".into()),
            },
            BatchCommand::GetObjects {
                out_identifier: "all".into(),
            },
            BatchCommand::SetGlobal {
                identifier: "limit".into(),
                object: Value::Int(3),
                out_identifier: None,
            },
            BatchCommand::GetGlobal {
                identifier: "limit".into(),
                out_identifier: Some("l".into()),
            },
        ],
    );

    let bytes = XmlMarshaller.encode(&Payload::Batch(batch.clone())).unwrap();
    let decoded = XmlMarshaller.decode_batch(&bytes, &namespace()).unwrap();
    assert_eq!(decoded, batch);
}

#[test]
fn test_decode_script_with_inline_and_escaped_payloads() {
    let xml = r#"<script>
      <create-container container-id="kie1">
        <release-id><group-id>foo.bar</group-id><artifact-id>baz</artifact-id><version>2.1.0.GA</version></release-id>
      </create-container>
      <call-container container-id="kie1">
        <payload><batch-execution lookup="defaultKieSession"><fire-all-rules/></batch-execution></payload>
      </call-container>
      <call-container container-id="kie1" format="json">
        <payload>{"commands":[]}</payload>
      </call-container>
      <dispose-container container-id="kie1"/>
    </script>"#;

    let script = XmlMarshaller.decode_script(xml.as_bytes()).unwrap();
    assert!(script.truncation.is_none());
    assert_eq!(script.len(), 4);
    assert_eq!(
        script.commands[0],
        ServerCommand::create_container("kie1", release_id("2.1.0.GA"))
    );
    match &script.commands[1] {
        ServerCommand::CallContainer(call) => {
            assert_eq!(call.format, None);
            let inner = XmlMarshaller
                .decode_batch(call.payload.as_bytes(), &namespace())
                .unwrap();
            assert_eq!(inner.commands, vec![BatchCommand::fire_all_rules()]);
        }
        other => panic!("unexpected {:?}", other),
    }
    match &script.commands[2] {
        ServerCommand::CallContainer(call) => {
            assert_eq!(call.format.as_deref(), Some("json"));
            assert_eq!(call.payload, r#"{"commands":[]}"#);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_decode_script_truncates_at_bad_descriptor() {
    let xml = r#"<script>
      <list-containers/>
      <dispose-container/>
      <get-server-info/>
    </script>"#;

    let script = XmlMarshaller.decode_script(xml.as_bytes()).unwrap();
    assert_eq!(script.commands, vec![ServerCommand::ListContainers]);
    let truncation = script.truncation.unwrap();
    assert_eq!(truncation.index, 1);
    assert!(truncation.reason.contains("container-id"));
}

#[test]
fn test_decode_script_rejects_wrong_root() {
    let err = XmlMarshaller
        .decode_script(b"<responses/>")
        .unwrap_err();
    assert!(matches!(err, ServerError::MalformedPayload(_)));
}

#[test]
fn test_script_encode_decode_is_equivalent() {
    let mut script = CommandScript::new(vec![
        ServerCommand::CreateContainer(CreateContainerCommand {
            container_id: "kie1".into(),
            release_id: release_id("1"),
            config: Some(ContainerConfig {
                scanner: Some(ScannerResource::new(ScannerStatus::Started, Some(100))),
            }),
        }),
        ServerCommand::call_container("kie1", HELLO_BATCH),
        ServerCommand::GetServerInfo,
        ServerCommand::UpdateScanner(UpdateScannerCommand {
            container_id: "kie1".into(),
            scanner: ScannerResource::new(ScannerStatus::Stopped, None),
        }),
        ServerCommand::UpdateReleaseId(UpdateReleaseIdCommand {
            container_id: "kie1".into(),
            release_id: release_id("2"),
        }),
        ServerCommand::dispose_container("kie1"),
    ]);
    script.apply_default_format("xml");

    let bytes = XmlMarshaller
        .encode(&Payload::Script(script.clone()))
        .unwrap();
    assert_eq!(XmlMarshaller.decode_script(&bytes).unwrap(), script);
}

#[test]
fn test_results_encoding() {
    let mut results = ExecutionResults::new();
    results.set_value("message", message("echo:Hello World").into());
    results.set_fact_handle("message", FactHandle::new(1, MESSAGE_TYPE));

    let xml = XmlMarshaller
        .encode_to_string(&Payload::Results(results.clone()))
        .unwrap();
    assert!(xml.contains(r#"<result identifier="message"><org.pkg1.Message><text>echo:Hello World</text></org.pkg1.Message></result>"#));
    assert!(xml.contains(r#"external-form="0:1:org.pkg1.Message""#));

    // Without the release's types the object is rebuilt structurally.
    let decoded = XmlMarshaller
        .decode_results(xml.as_bytes(), &NoDomainTypes)
        .unwrap();
    assert_eq!(decoded, results);
}

#[test]
fn test_responses_encode_decode() {
    let mut container = ContainerResource::new("kie1", release_id("1"));
    container.status = ContainerStatus::Started;
    container.resolved_release_id = Some(release_id("1"));
    let list = ServiceResponsesList::new(vec![
        ServiceResponse::success(
            "Container kie1 successfully deployed",
            Some(ResponsePayload::Container(container.clone())),
        ),
        ServiceResponse::success(
            "Containers",
            Some(ResponsePayload::Containers(vec![container])),
        ),
        ServiceResponse::success("results", Some(ResponsePayload::Text("<x/>".into()))),
        ServiceResponse::success(
            "info",
            Some(ResponsePayload::ServerInfo(ServerInfo {
                server_id: "s1".into(),
                name: "rulehost".into(),
                version: "0.1.0".into(),
                capabilities: vec!["rules".into()],
                started_at: None,
            })),
        ),
        ServiceResponse::failure("Container kie9 not found"),
    ]);

    let bytes = XmlMarshaller
        .encode(&Payload::Responses(list.clone()))
        .unwrap();
    assert_eq!(XmlMarshaller.decode_responses(&bytes).unwrap(), list);
}

#[test]
fn test_decode_container_resource_defaults_status() {
    let xml = r#"<container container-id="kie1">
        <release-id><group-id>g</group-id><artifact-id>a</artifact-id><version>1</version></release-id>
        <scanner status="STARTED" poll-interval="500"/>
    </container>"#;
    let container = XmlMarshaller.decode_container(xml.as_bytes()).unwrap();
    assert_eq!(container.status, ContainerStatus::Creating);
    assert_eq!(
        container.scanner,
        Some(ScannerResource::new(ScannerStatus::Started, Some(500)))
    );

    let bad = xml.replace("STARTED", "RUNNING");
    assert!(XmlMarshaller.decode_container(bad.as_bytes()).is_err());
}

#[test]
fn test_decode_release_requires_all_parts() {
    let err = XmlMarshaller
        .decode_release(b"<release-id><group-id>g</group-id><version>1</version></release-id>")
        .unwrap_err();
    assert!(err.to_string().contains("artifact-id"));
}
