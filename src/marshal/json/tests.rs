use super::*;
use crate::marshal::MarshallerExt;
use crate::model::{ResponsePayload, ScannerStatus};
use crate::test_utils::{message, message_type, release_id, DEFAULT_SESSION, MESSAGE_TYPE};
use crate::types::{NoDomainTypes, TypeNamespace};

const HELLO_BATCH: &str = r#"{
  "lookup": "defaultKieSession",
  "commands": [
    {"insert": {"object": {"org.pkg1.Message": {"text": "Hello World"}}, "out-identifier": "message"}},
    "fire-all-rules"
  ]
}"#;

fn namespace() -> TypeNamespace {
    TypeNamespace::new("foo.bar:baz:2.1.0.GA").with_type(message_type())
}

#[test]
fn test_decode_batch_preserves_order() {
    let batch = JsonMarshaller
        .decode_batch(HELLO_BATCH.as_bytes(), &namespace())
        .unwrap();

    assert_eq!(batch.lookup.as_deref(), Some(DEFAULT_SESSION));
    assert_eq!(
        batch.commands,
        vec![
            BatchCommand::insert(message("Hello World"), Some("message")),
            BatchCommand::fire_all_rules(),
        ]
    );
}

#[test]
fn test_decode_batch_rejects_type_outside_namespace() {
    let err = JsonMarshaller
        .decode_batch(HELLO_BATCH.as_bytes(), &TypeNamespace::new("other:app:1"))
        .unwrap_err();
    assert!(err.to_string().contains("unknown type 'org.pkg1.Message'"));
}

#[test]
fn test_decode_batch_checks_field_kinds() {
    let wrong_kind = r#"{"commands":[{"insert":{"object":{"org.pkg1.Message":{"text":42}}}}]}"#;
    let err = JsonMarshaller
        .decode_batch(wrong_kind.as_bytes(), &namespace())
        .unwrap_err();
    assert!(err.to_string().contains("field 'text'"));

    let unknown_field = r#"{"commands":[{"insert":{"object":{"org.pkg1.Message":{"colour":"red"}}}}]}"#;
    let err = JsonMarshaller
        .decode_batch(unknown_field.as_bytes(), &namespace())
        .unwrap_err();
    assert!(err.to_string().contains("has no field 'colour'"));
}

#[test]
fn test_decode_batch_rejects_unknown_command() {
    let json = r#"{"commands":[{"retract":{"fact-handle":"0:1:x"}}]}"#;
    let err = JsonMarshaller
        .decode_batch(json.as_bytes(), &namespace())
        .unwrap_err();
    assert!(err.to_string().contains("unknown batch command 'retract'"));
}

#[test]
fn test_batch_encode_decode_is_equivalent() {
    let batch = BatchExecution::new(
        None,
        vec![
            BatchCommand::Insert {
                object: message("Hi").into(),
                out_identifier: Some("m".into()),
                return_object: false,
            },
            BatchCommand::FireAllRules {
                max: Some(2),
                out_identifier: Some("fired".into()),
            },
            BatchCommand::GetObjects {
                out_identifier: "all".into(),
            },
            BatchCommand::SetGlobal {
                identifier: "ratio".into(),
                object: Value::Float(0.5),
                out_identifier: None,
            },
            BatchCommand::GetGlobal {
                identifier: "ratio".into(),
                out_identifier: None,
            },
        ],
    );

    let bytes = JsonMarshaller.encode(&Payload::Batch(batch.clone())).unwrap();
    assert_eq!(
        JsonMarshaller.decode_batch(&bytes, &namespace()).unwrap(),
        batch
    );
}

#[test]
fn test_decode_script_with_inline_payload() {
    let json = r#"{"commands":[
        {"create-container":{"container-id":"kie1","release-id":{"group-id":"foo.bar","artifact-id":"baz","version":"2.1.0.GA"}}},
        {"call-container":{"container-id":"kie1","payload":{"commands":["fire-all-rules"]}}},
        {"dispose-container":{"container-id":"kie1"}}
    ]}"#;

    let script = JsonMarshaller.decode_script(json.as_bytes()).unwrap();
    assert!(script.truncation.is_none());
    assert_eq!(
        script.commands[0],
        ServerCommand::create_container("kie1", release_id("2.1.0.GA"))
    );
    let ServerCommand::CallContainer(call) = &script.commands[1] else {
        panic!("expected call-container");
    };
    let inner = JsonMarshaller
        .decode_batch(call.payload.as_bytes(), &namespace())
        .unwrap();
    assert_eq!(inner.commands, vec![BatchCommand::fire_all_rules()]);
    assert_eq!(script.commands[2], ServerCommand::dispose_container("kie1"));
}

#[test]
fn test_decode_script_truncates_at_bad_descriptor() {
    let json = r#"{"commands":["list-containers",{"dispose-container":{}},"get-server-info"]}"#;
    let script = JsonMarshaller.decode_script(json.as_bytes()).unwrap();
    assert_eq!(script.commands, vec![ServerCommand::ListContainers]);
    let truncation = script.truncation.unwrap();
    assert_eq!(truncation.index, 1);
    assert!(truncation.reason.contains("container-id"));
}

#[test]
fn test_decode_script_requires_commands() {
    assert!(JsonMarshaller.decode_script(b"[]").is_err());
    assert!(JsonMarshaller.decode_script(b"{}").is_err());
    assert!(JsonMarshaller.decode_script(b"{not json").is_err());
}

#[test]
fn test_results_encoding() {
    let mut results = ExecutionResults::new();
    results.set_value("message", message("echo:Hello World").into());
    results.set_value("fired", Value::Int(1));
    results.set_fact_handle("message", FactHandle::new(1, MESSAGE_TYPE));

    let bytes = JsonMarshaller
        .encode(&Payload::Results(results.clone()))
        .unwrap();
    let json: Json = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(
        json["results"][0]["value"]["org.pkg1.Message"]["text"],
        "echo:Hello World"
    );
    assert_eq!(json["facts"][0]["value"], "0:1:org.pkg1.Message");

    let decoded = JsonMarshaller
        .decode_results(&bytes, &NoDomainTypes)
        .unwrap();
    assert_eq!(decoded, results);
}

#[test]
fn test_structural_results_keep_nested_objects() {
    let json = r#"{"results":[{"key":"order","value":{"a.Order":{"customer":{"name":"Ada"},"tags":["x"]}}}]}"#;
    let results = JsonMarshaller
        .decode_results(json.as_bytes(), &NoDomainTypes)
        .unwrap();
    let order = results.value("order").and_then(Value::as_object).unwrap();
    assert_eq!(order.type_name, "a.Order");
    let customer = order.get("customer").and_then(Value::as_object).unwrap();
    assert_eq!(customer.get("name"), Some(&Value::Text("Ada".into())));
    assert_eq!(
        order.get("tags"),
        Some(&Value::List(vec![Value::Text("x".into())]))
    );
}

#[test]
fn test_envelopes_use_serde_shapes() {
    let scanner = ScannerResource::new(ScannerStatus::Started, Some(250));
    let bytes = JsonMarshaller
        .encode(&Payload::Scanner(scanner.clone()))
        .unwrap();
    assert_eq!(
        std::str::from_utf8(&bytes).unwrap(),
        r#"{"status":"STARTED","poll-interval":250}"#
    );
    assert_eq!(JsonMarshaller.decode_scanner(&bytes).unwrap(), scanner);

    let list = ServiceResponsesList::new(vec![
        ServiceResponse::success("ok", Some(ResponsePayload::ReleaseId(release_id("1")))),
        ServiceResponse::failure("nope"),
    ]);
    let bytes = JsonMarshaller
        .encode(&Payload::Responses(list.clone()))
        .unwrap();
    assert_eq!(JsonMarshaller.decode_responses(&bytes).unwrap(), list);
}
