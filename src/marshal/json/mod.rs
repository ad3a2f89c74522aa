//! JSON marshaller.
//!
//! Envelopes (responses, resources, command scripts) map directly onto the
//! serde derives of the model. Batches and execution results carry domain
//! objects, so they are mapped by hand: an object is written as a single-key
//! map from its type name to its fields, e.g.
//! `{"org.pkg1.Message": {"text": "Hello World"}}`. Nested objects are written
//! as plain field maps; their type comes from the enclosing field declaration.

use serde_json::{json, Map, Value as Json};

use super::{Marshaller, Payload, Shape};
use crate::command::{
    BatchCommand, BatchExecution, CommandScript, ExecutionResults, FactHandle, ScriptTruncation,
    ServerCommand,
};
use crate::error::{Result, ServerError};
use crate::model::{
    ContainerResource, DomainObject, ReleaseId, ScannerResource, ServiceResponse,
    ServiceResponsesList, Value,
};
use crate::types::{FieldKind, TypeDescriptor, TypeResolver};

/// JSON wire format.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMarshaller;

fn malformed(e: impl std::fmt::Display) -> ServerError {
    ServerError::malformed(e.to_string())
}

impl Marshaller for JsonMarshaller {
    fn format_id(&self) -> &'static str {
        "json"
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn encode(&self, payload: &Payload) -> Result<Vec<u8>> {
        let encoded = match payload {
            Payload::Script(script) => serde_json::to_vec(script),
            Payload::Batch(batch) => serde_json::to_vec(&batch_to_json(batch)),
            Payload::Results(results) => serde_json::to_vec(&results_to_json(results)),
            Payload::Response(response) => serde_json::to_vec(response),
            Payload::Responses(list) => serde_json::to_vec(list),
            Payload::Container(container) => serde_json::to_vec(container),
            Payload::Scanner(scanner) => serde_json::to_vec(scanner),
            Payload::Release(release) => serde_json::to_vec(release),
        };
        encoded.map_err(malformed)
    }

    fn decode(&self, bytes: &[u8], shape: Shape, types: &dyn TypeResolver) -> Result<Payload> {
        let document: Json = serde_json::from_slice(bytes).map_err(malformed)?;
        match shape {
            Shape::Script => decode_script(document).map(Payload::Script),
            Shape::Batch => decode_batch(&document, types).map(Payload::Batch),
            Shape::Results => decode_results(&document, types).map(Payload::Results),
            Shape::Response => serde_json::from_value::<ServiceResponse>(document)
                .map(Payload::Response)
                .map_err(malformed),
            Shape::Responses => serde_json::from_value::<ServiceResponsesList>(document)
                .map(Payload::Responses)
                .map_err(malformed),
            Shape::Container => serde_json::from_value::<ContainerResource>(document)
                .map(Payload::Container)
                .map_err(malformed),
            Shape::Scanner => serde_json::from_value::<ScannerResource>(document)
                .map(Payload::Scanner)
                .map_err(malformed),
            Shape::Release => serde_json::from_value::<ReleaseId>(document)
                .map(Payload::Release)
                .map_err(malformed),
        }
    }
}

fn as_map<'a>(json: &'a Json, what: &str) -> Result<&'a Map<String, Json>> {
    json.as_object()
        .ok_or_else(|| ServerError::malformed(format!("{} must be a JSON object", what)))
}

fn opt_str(map: &Map<String, Json>, key: &str) -> Result<Option<String>> {
    match map.get(key) {
        None | Some(Json::Null) => Ok(None),
        Some(Json::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(ServerError::malformed(format!(
            "'{}' must be a string, found {}",
            key, other
        ))),
    }
}

fn req_str(map: &Map<String, Json>, key: &str, context: &str) -> Result<String> {
    opt_str(map, key)?
        .ok_or_else(|| ServerError::malformed(format!("{} is missing '{}'", context, key)))
}

// ---------------------------------------------------------------------------
// Command scripts
// ---------------------------------------------------------------------------

/// Accept an inline JSON document as a container call payload.
fn inline_payload(entry: &mut Json) {
    if let Some(Json::Object(call)) = entry.get_mut("call-container") {
        if let Some(payload) = call.get_mut("payload") {
            if !payload.is_string() {
                *payload = Json::String(payload.to_string());
            }
        }
    }
}

fn decode_script(document: Json) -> Result<CommandScript> {
    let Json::Object(mut map) = document else {
        return Err(ServerError::malformed("command script must be a JSON object"));
    };
    let entries = match map.remove("commands") {
        Some(Json::Array(entries)) => entries,
        Some(_) => return Err(ServerError::malformed("'commands' must be an array")),
        None => return Err(ServerError::malformed("command script is missing 'commands'")),
    };

    let mut script = CommandScript::default();
    for (index, mut entry) in entries.into_iter().enumerate() {
        inline_payload(&mut entry);
        match serde_json::from_value::<ServerCommand>(entry) {
            Ok(command) => script.commands.push(command),
            Err(e) => {
                script.truncation = Some(ScriptTruncation {
                    index,
                    reason: e.to_string(),
                });
                break;
            }
        }
    }
    Ok(script)
}

// ---------------------------------------------------------------------------
// Domain values
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Typing {
    Strict,
    Structural,
}

fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(n) => Json::from(*n),
        Value::Float(x) => serde_json::Number::from_f64(*x)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        Value::Text(s) => Json::String(s.clone()),
        Value::List(items) => Json::Array(items.iter().map(value_to_json).collect()),
        Value::Object(object) => {
            let mut wrapper = Map::new();
            wrapper.insert(object.type_name.clone(), fields_to_json(object));
            Json::Object(wrapper)
        }
    }
}

fn fields_to_json(object: &DomainObject) -> Json {
    let fields = object
        .fields
        .iter()
        .map(|(name, value)| {
            let encoded = match value {
                Value::Object(nested) => fields_to_json(nested),
                other => value_to_json(other),
            };
            (name.clone(), encoded)
        })
        .collect();
    Json::Object(fields)
}

fn value_from_json(json: &Json, types: &dyn TypeResolver, typing: Typing) -> Result<Value> {
    match json {
        Json::Null => Ok(Value::Null),
        Json::Bool(b) => Ok(Value::Bool(*b)),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Ok(Value::Int(i)),
            None => n
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| ServerError::malformed(format!("unsupported number {}", n))),
        },
        Json::String(s) => Ok(Value::Text(s.clone())),
        Json::Array(items) => items
            .iter()
            .map(|item| value_from_json(item, types, typing))
            .collect::<Result<Vec<_>>>()
            .map(Value::List),
        Json::Object(wrapper) => {
            let mut entries = wrapper.iter();
            let (type_name, fields) = match (entries.next(), entries.next()) {
                (Some(entry), None) => entry,
                _ => {
                    return Err(ServerError::malformed(
                        "domain object must be a single-key map from type name to fields",
                    ))
                }
            };
            match types.resolve(type_name) {
                Some(descriptor) => typed_from_json(fields, &descriptor, types).map(Value::Object),
                None if typing == Typing::Structural => {
                    structural_from_json(fields, type_name).map(Value::Object)
                }
                None => Err(ServerError::malformed(format!(
                    "unknown type '{}' in namespace '{}'",
                    type_name,
                    types.namespace()
                ))),
            }
        }
    }
}

fn typed_from_json(
    fields: &Json,
    descriptor: &TypeDescriptor,
    types: &dyn TypeResolver,
) -> Result<DomainObject> {
    let fields = as_map(fields, &format!("fields of '{}'", descriptor.name))?;
    let mut object = DomainObject::new(&descriptor.name);
    for (name, raw) in fields {
        let field = descriptor.field(name).ok_or_else(|| {
            ServerError::malformed(format!(
                "type '{}' has no field '{}'",
                descriptor.name, name
            ))
        })?;
        let mismatch = || {
            ServerError::malformed(format!(
                "field '{}' of '{}' must be {}, found {}",
                name, descriptor.name, field.kind, raw
            ))
        };
        let value = match (&field.kind, raw) {
            (_, Json::Null) => Value::Null,
            (FieldKind::Text, Json::String(s)) => Value::Text(s.clone()),
            (FieldKind::Int, Json::Number(n)) => Value::Int(n.as_i64().ok_or_else(mismatch)?),
            (FieldKind::Float, Json::Number(n)) => {
                Value::Float(n.as_f64().ok_or_else(mismatch)?)
            }
            (FieldKind::Bool, Json::Bool(b)) => Value::Bool(*b),
            (FieldKind::Object(nested), Json::Object(_)) => {
                let nested = types.resolve(nested).ok_or_else(|| {
                    ServerError::malformed(format!(
                        "unknown type '{}' in namespace '{}'",
                        nested,
                        types.namespace()
                    ))
                })?;
                Value::Object(typed_from_json(raw, &nested, types)?)
            }
            _ => return Err(mismatch()),
        };
        object.set(name.clone(), value);
    }
    Ok(object)
}

fn structural_from_json(fields: &Json, type_name: &str) -> Result<DomainObject> {
    let fields = as_map(fields, &format!("fields of '{}'", type_name))?;
    let mut object = DomainObject::new(type_name);
    for (name, raw) in fields {
        let value = match raw {
            Json::Object(_) => Value::Object(structural_from_json(raw, name)?),
            other => value_from_json(other, &crate::types::NoDomainTypes, Typing::Structural)?,
        };
        object.set(name.clone(), value);
    }
    Ok(object)
}

// ---------------------------------------------------------------------------
// BatchExecution
// ---------------------------------------------------------------------------

fn batch_command_to_json(command: &BatchCommand) -> Json {
    let mut body = Map::new();
    let mut put_opt = |key: &str, value: Option<Json>| {
        if let Some(value) = value {
            body.insert(key.to_string(), value);
        }
    };
    match command {
        BatchCommand::Insert {
            object,
            out_identifier,
            return_object,
        } => {
            put_opt("object", Some(value_to_json(object)));
            put_opt("out-identifier", out_identifier.clone().map(Json::String));
            put_opt("return-object", Some(Json::Bool(*return_object)));
        }
        BatchCommand::FireAllRules {
            max,
            out_identifier,
        } => {
            put_opt("max", max.map(Json::from));
            put_opt("out-identifier", out_identifier.clone().map(Json::String));
        }
        BatchCommand::GetObjects { out_identifier } => {
            put_opt("out-identifier", Some(Json::String(out_identifier.clone())));
        }
        BatchCommand::SetGlobal {
            identifier,
            object,
            out_identifier,
        } => {
            put_opt("identifier", Some(Json::String(identifier.clone())));
            put_opt("object", Some(value_to_json(object)));
            put_opt("out-identifier", out_identifier.clone().map(Json::String));
        }
        BatchCommand::GetGlobal {
            identifier,
            out_identifier,
        } => {
            put_opt("identifier", Some(Json::String(identifier.clone())));
            put_opt("out-identifier", out_identifier.clone().map(Json::String));
        }
    }
    let mut entry = Map::new();
    entry.insert(command.name().to_string(), Json::Object(body));
    Json::Object(entry)
}

fn batch_to_json(batch: &BatchExecution) -> Json {
    let mut document = Map::new();
    if let Some(lookup) = &batch.lookup {
        document.insert("lookup".into(), Json::String(lookup.clone()));
    }
    document.insert(
        "commands".into(),
        Json::Array(batch.commands.iter().map(batch_command_to_json).collect()),
    );
    Json::Object(document)
}

fn batch_command_from_json(entry: &Json, types: &dyn TypeResolver) -> Result<BatchCommand> {
    // A bare string names a command without arguments.
    let empty = Map::new();
    let (name, body) = match entry {
        Json::String(name) => (name.as_str(), &empty),
        Json::Object(map) if map.len() == 1 => match map.iter().next() {
            Some((name, body)) => (name.as_str(), as_map(body, name)?),
            None => return Err(ServerError::malformed("empty batch command")),
        },
        _ => {
            return Err(ServerError::malformed(
                "batch command must be a single-key object",
            ))
        }
    };

    let object = |context: &str| -> Result<Value> {
        let raw = body
            .get("object")
            .ok_or_else(|| ServerError::malformed(format!("{} is missing 'object'", context)))?;
        value_from_json(raw, types, Typing::Strict)
    };

    let command = match name {
        "insert" => BatchCommand::Insert {
            object: object("insert")?,
            out_identifier: opt_str(body, "out-identifier")?,
            return_object: match body.get("return-object") {
                None | Some(Json::Null) => true,
                Some(Json::Bool(b)) => *b,
                Some(other) => {
                    return Err(ServerError::malformed(format!(
                        "'return-object' must be a boolean, found {}",
                        other
                    )))
                }
            },
        },
        "fire-all-rules" => BatchCommand::FireAllRules {
            max: match body.get("max") {
                None | Some(Json::Null) => None,
                Some(raw) => Some(
                    raw.as_u64()
                        .and_then(|m| u32::try_from(m).ok())
                        .ok_or_else(|| {
                            ServerError::malformed(format!("invalid 'max' value {}", raw))
                        })?,
                ),
            },
            out_identifier: opt_str(body, "out-identifier")?,
        },
        "get-objects" => BatchCommand::GetObjects {
            out_identifier: req_str(body, "out-identifier", "get-objects")?,
        },
        "set-global" => BatchCommand::SetGlobal {
            identifier: req_str(body, "identifier", "set-global")?,
            object: object("set-global")?,
            out_identifier: opt_str(body, "out-identifier")?,
        },
        "get-global" => BatchCommand::GetGlobal {
            identifier: req_str(body, "identifier", "get-global")?,
            out_identifier: opt_str(body, "out-identifier")?,
        },
        other => {
            return Err(ServerError::malformed(format!(
                "unknown batch command '{}'",
                other
            )))
        }
    };
    Ok(command)
}

fn decode_batch(document: &Json, types: &dyn TypeResolver) -> Result<BatchExecution> {
    let map = as_map(document, "batch execution")?;
    let commands = match map.get("commands") {
        Some(Json::Array(entries)) => entries
            .iter()
            .map(|entry| batch_command_from_json(entry, types))
            .collect::<Result<Vec<_>>>()?,
        Some(_) => return Err(ServerError::malformed("'commands' must be an array")),
        None => Vec::new(),
    };
    Ok(BatchExecution {
        lookup: opt_str(map, "lookup")?,
        commands,
    })
}

// ---------------------------------------------------------------------------
// ExecutionResults
// ---------------------------------------------------------------------------

fn results_to_json(results: &ExecutionResults) -> Json {
    let values: Vec<Json> = results
        .values()
        .iter()
        .map(|(key, value)| json!({ "key": key, "value": value_to_json(value) }))
        .collect();
    let facts: Vec<Json> = results
        .fact_handles()
        .iter()
        .map(|(key, handle)| json!({ "key": key, "value": handle.external_form() }))
        .collect();
    json!({ "results": values, "facts": facts })
}

fn entries<'a>(map: &'a Map<String, Json>, key: &str) -> Result<&'a [Json]> {
    match map.get(key) {
        None | Some(Json::Null) => Ok(Default::default()),
        Some(Json::Array(items)) => Ok(items),
        Some(_) => Err(ServerError::malformed(format!("'{}' must be an array", key))),
    }
}

fn decode_results(document: &Json, types: &dyn TypeResolver) -> Result<ExecutionResults> {
    let map = as_map(document, "execution results")?;
    let mut results = ExecutionResults::new();

    for entry in entries(map, "results")? {
        let entry = as_map(entry, "result entry")?;
        let key = req_str(entry, "key", "result entry")?;
        let value = entry.get("value").unwrap_or(&Json::Null);
        results.set_value(key, value_from_json(value, types, Typing::Structural)?);
    }

    for entry in entries(map, "facts")? {
        let entry = as_map(entry, "fact entry")?;
        let key = req_str(entry, "key", "fact entry")?;
        let external = req_str(entry, "value", "fact entry")?;
        let handle = FactHandle::from_external_form(&external).ok_or_else(|| {
            ServerError::malformed(format!("invalid fact handle '{}'", external))
        })?;
        results.set_fact_handle(key, handle);
    }

    Ok(results)
}

#[cfg(test)]
mod tests;
