//! XML marshaller.
//!
//! Envelopes use kebab-case element names. A batch looks like:
//!
//! ```xml
//! <batch-execution lookup="defaultKieSession">
//!   <insert out-identifier="message">
//!     <org.pkg1.Message><text>Hello World</text></org.pkg1.Message>
//!   </insert>
//!   <fire-all-rules/>
//! </batch-execution>
//! ```
//!
//! Domain objects are elements named after their type with one child element
//! per field; nested objects are written inline under their field element.
//! Top-level primitives use `<string>`, `<int>`, `<double>`, `<boolean>`,
//! `<null/>` and `<list>`.

use std::str::FromStr;

use super::dom::{self, Element};
use super::{Marshaller, Payload, Shape};
use crate::command::{
    BatchCommand, BatchExecution, CallContainerCommand, CommandScript, CreateContainerCommand,
    DisposeContainerCommand, ExecutionResults, FactHandle, GetContainerInfoCommand,
    GetScannerInfoCommand, ScriptTruncation, ServerCommand, UpdateReleaseIdCommand,
    UpdateScannerCommand,
};
use crate::error::{Result, ServerError};
use crate::model::{
    ContainerConfig, ContainerResource, ContainerStatus, DomainObject, ReleaseId,
    ResponsePayload, ResponseType, ScannerResource, ScannerStatus, ServerInfo, ServiceResponse,
    ServiceResponsesList, Value,
};
use crate::types::{FieldKind, TypeDescriptor, TypeResolver};

/// XML wire format.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlMarshaller;

impl Marshaller for XmlMarshaller {
    fn format_id(&self) -> &'static str {
        "xml"
    }

    fn content_type(&self) -> &'static str {
        "application/xml"
    }

    fn encode(&self, payload: &Payload) -> Result<Vec<u8>> {
        let root = match payload {
            Payload::Script(script) => script_element(script),
            Payload::Batch(batch) => batch_element(batch),
            Payload::Results(results) => results_element(results),
            Payload::Response(response) => response_element(response),
            Payload::Responses(list) => {
                Element::new("responses").with_children(list.responses.iter().map(response_element))
            }
            Payload::Container(container) => container_element(container),
            Payload::Scanner(scanner) => scanner_element(scanner),
            Payload::Release(release) => release_element("release-id", release),
        };
        root.to_bytes()
    }

    fn decode(&self, bytes: &[u8], shape: Shape, types: &dyn TypeResolver) -> Result<Payload> {
        let root = dom::parse(bytes)?;
        match shape {
            Shape::Script => decode_script(&root).map(Payload::Script),
            Shape::Batch => decode_batch(&root, types).map(Payload::Batch),
            Shape::Results => decode_results(&root, types).map(Payload::Results),
            Shape::Response => decode_response(&root).map(Payload::Response),
            Shape::Responses => decode_responses(&root).map(Payload::Responses),
            Shape::Container => decode_container(&root).map(Payload::Container),
            Shape::Scanner => decode_scanner(&root).map(Payload::Scanner),
            Shape::Release => decode_release(&root).map(Payload::Release),
        }
    }
}

fn expect_root<'a>(root: &'a Element, name: &str) -> Result<&'a Element> {
    if root.name == name {
        Ok(root)
    } else {
        Err(ServerError::malformed(format!(
            "expected <{}> but found <{}>",
            name, root.name
        )))
    }
}

fn parse_attr<T: FromStr>(element: &Element, name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    element
        .attr(name)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| {
                ServerError::malformed(format!(
                    "<{}> attribute '{}' has invalid value '{}': {}",
                    element.name, name, raw, e
                ))
            })
        })
        .transpose()
}

// ---------------------------------------------------------------------------
// Model resources
// ---------------------------------------------------------------------------

fn release_element(name: &str, release: &ReleaseId) -> Element {
    Element::new(name)
        .with_child(Element::new("group-id").with_text(&release.group_id))
        .with_child(Element::new("artifact-id").with_text(&release.artifact_id))
        .with_child(Element::new("version").with_text(&release.version))
}

fn decode_release(element: &Element) -> Result<ReleaseId> {
    let part = |name: &str| -> Result<String> {
        let text = element.require_child(name)?.text().trim().to_string();
        if text.is_empty() {
            return Err(ServerError::malformed(format!(
                "<{}> has an empty <{}>",
                element.name, name
            )));
        }
        Ok(text)
    };
    Ok(ReleaseId::new(
        part("group-id")?,
        part("artifact-id")?,
        part("version")?,
    ))
}

fn scanner_element(scanner: &ScannerResource) -> Element {
    Element::new("scanner")
        .with_attr("status", scanner.status.as_str())
        .with_opt_attr("poll-interval", scanner.poll_interval.map(|ms| ms.to_string()))
}

fn decode_scanner(element: &Element) -> Result<ScannerResource> {
    let element = expect_root(element, "scanner")?;
    let status: ScannerStatus = parse_attr(element, "status")?.unwrap_or_default();
    Ok(ScannerResource::new(
        status,
        parse_attr(element, "poll-interval")?,
    ))
}

fn container_element(container: &ContainerResource) -> Element {
    Element::new("container")
        .with_attr("container-id", &container.container_id)
        .with_attr("status", container.status.as_str())
        .with_child(release_element("release-id", &container.release_id))
        .with_children(
            container
                .resolved_release_id
                .as_ref()
                .map(|r| release_element("resolved-release-id", r)),
        )
        .with_children(container.scanner.as_ref().map(scanner_element))
}

fn decode_container(element: &Element) -> Result<ContainerResource> {
    let element = expect_root(element, "container")?;
    Ok(ContainerResource {
        container_id: element.attr("container-id").unwrap_or_default().to_string(),
        release_id: decode_release(element.require_child("release-id")?)?,
        resolved_release_id: element
            .child("resolved-release-id")
            .map(decode_release)
            .transpose()?,
        status: parse_attr::<ContainerStatus>(element, "status")?.unwrap_or_default(),
        scanner: element.child("scanner").map(decode_scanner).transpose()?,
    })
}

fn server_info_element(info: &ServerInfo) -> Element {
    Element::new("server-info")
        .with_attr("server-id", &info.server_id)
        .with_attr("name", &info.name)
        .with_attr("version", &info.version)
        .with_opt_attr("started-at", info.started_at.as_deref())
        .with_children(
            info.capabilities
                .iter()
                .map(|c| Element::new("capability").with_text(c)),
        )
}

fn decode_server_info(element: &Element) -> Result<ServerInfo> {
    Ok(ServerInfo {
        server_id: element.require_attr("server-id")?.to_string(),
        name: element.attr("name").unwrap_or_default().to_string(),
        version: element.attr("version").unwrap_or_default().to_string(),
        capabilities: element
            .elements()
            .filter(|e| e.name == "capability")
            .map(|e| e.text().into_owned())
            .collect(),
        started_at: element.attr("started-at").map(str::to_string),
    })
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

fn result_element(payload: &ResponsePayload) -> Element {
    match payload {
        ResponsePayload::Container(c) => container_element(c),
        ResponsePayload::Containers(cs) => {
            Element::new("containers").with_children(cs.iter().map(container_element))
        }
        ResponsePayload::Scanner(s) => scanner_element(s),
        ResponsePayload::ReleaseId(r) => release_element("release-id", r),
        ResponsePayload::ServerInfo(i) => server_info_element(i),
        ResponsePayload::Text(t) => Element::new("text").with_text(t),
    }
}

fn decode_result(element: &Element) -> Result<ResponsePayload> {
    match element.name.as_str() {
        "container" => decode_container(element).map(ResponsePayload::Container),
        "containers" => element
            .elements()
            .map(decode_container)
            .collect::<Result<Vec<_>>>()
            .map(ResponsePayload::Containers),
        "scanner" => decode_scanner(element).map(ResponsePayload::Scanner),
        "release-id" => decode_release(element).map(ResponsePayload::ReleaseId),
        "server-info" => decode_server_info(element).map(ResponsePayload::ServerInfo),
        "text" => Ok(ResponsePayload::Text(element.text().into_owned())),
        other => Err(ServerError::malformed(format!(
            "unknown response result <{}>",
            other
        ))),
    }
}

fn response_element(response: &ServiceResponse) -> Element {
    Element::new("response")
        .with_attr("type", response.response_type.as_str())
        .with_attr("msg", &response.msg)
        .with_children(response.result.as_ref().map(result_element))
}

fn decode_response(element: &Element) -> Result<ServiceResponse> {
    let element = expect_root(element, "response")?;
    let response_type = match element.require_attr("type")? {
        "SUCCESS" => ResponseType::Success,
        "FAILURE" => ResponseType::Failure,
        other => {
            return Err(ServerError::malformed(format!(
                "unknown response type '{}'",
                other
            )))
        }
    };
    Ok(ServiceResponse {
        response_type,
        msg: element.attr("msg").unwrap_or_default().to_string(),
        result: element.elements().next().map(decode_result).transpose()?,
    })
}

fn decode_responses(element: &Element) -> Result<ServiceResponsesList> {
    let element = expect_root(element, "responses")?;
    element
        .elements()
        .map(decode_response)
        .collect::<Result<Vec<_>>>()
        .map(ServiceResponsesList::new)
}

// ---------------------------------------------------------------------------
// Command scripts
// ---------------------------------------------------------------------------

fn command_element(command: &ServerCommand) -> Element {
    let named = |name: &str, container_id: &str| {
        Element::new(name).with_attr("container-id", container_id)
    };
    match command {
        ServerCommand::CreateContainer(c) => named("create-container", &c.container_id)
            .with_child(release_element("release-id", &c.release_id))
            .with_children(
                c.config
                    .as_ref()
                    .and_then(|config| config.scanner.as_ref())
                    .map(|s| Element::new("config").with_child(scanner_element(s))),
            ),
        ServerCommand::DisposeContainer(c) => named("dispose-container", &c.container_id),
        ServerCommand::CallContainer(c) => named("call-container", &c.container_id)
            .with_opt_attr("format", c.format.as_deref())
            .with_child(Element::new("payload").with_text(&c.payload)),
        ServerCommand::GetServerInfo => Element::new("get-server-info"),
        ServerCommand::ListContainers => Element::new("list-containers"),
        ServerCommand::GetContainerInfo(c) => named("get-container-info", &c.container_id),
        ServerCommand::GetScannerInfo(c) => named("get-scanner-info", &c.container_id),
        ServerCommand::UpdateScanner(c) => {
            named("update-scanner", &c.container_id).with_child(scanner_element(&c.scanner))
        }
        ServerCommand::UpdateReleaseId(c) => named("update-release-id", &c.container_id)
            .with_child(release_element("release-id", &c.release_id)),
    }
}

fn script_element(script: &CommandScript) -> Element {
    Element::new("script").with_children(script.commands.iter().map(command_element))
}

fn decode_command(element: &Element) -> Result<ServerCommand> {
    let container_id = || element.require_attr("container-id").map(str::to_string);
    let command = match element.name.as_str() {
        "create-container" => ServerCommand::CreateContainer(CreateContainerCommand {
            container_id: container_id()?,
            release_id: decode_release(element.require_child("release-id")?)?,
            config: element
                .child("config")
                .map(|config| -> Result<ContainerConfig> {
                    Ok(ContainerConfig {
                        scanner: config.child("scanner").map(decode_scanner).transpose()?,
                    })
                })
                .transpose()?,
        }),
        "dispose-container" => ServerCommand::DisposeContainer(DisposeContainerCommand {
            container_id: container_id()?,
        }),
        "call-container" => {
            let payload = element.require_child("payload")?;
            // An inline document is accepted as well as escaped text.
            let payload = match payload.elements().next() {
                Some(inline) => inline.to_xml_string()?,
                None => payload.text().into_owned(),
            };
            ServerCommand::CallContainer(CallContainerCommand {
                container_id: container_id()?,
                payload,
                format: element.attr("format").map(str::to_string),
            })
        }
        "get-server-info" => ServerCommand::GetServerInfo,
        "list-containers" => ServerCommand::ListContainers,
        "get-container-info" => ServerCommand::GetContainerInfo(GetContainerInfoCommand {
            container_id: container_id()?,
        }),
        "get-scanner-info" => ServerCommand::GetScannerInfo(GetScannerInfoCommand {
            container_id: container_id()?,
        }),
        "update-scanner" => ServerCommand::UpdateScanner(UpdateScannerCommand {
            container_id: container_id()?,
            scanner: decode_scanner(element.require_child("scanner")?)?,
        }),
        "update-release-id" => ServerCommand::UpdateReleaseId(UpdateReleaseIdCommand {
            container_id: container_id()?,
            release_id: decode_release(element.require_child("release-id")?)?,
        }),
        other => {
            return Err(ServerError::malformed(format!("unknown command <{}>", other)));
        }
    };
    Ok(command)
}

fn decode_script(root: &Element) -> Result<CommandScript> {
    let root = expect_root(root, "script")?;
    let mut script = CommandScript::default();
    for (index, element) in root.elements().enumerate() {
        match decode_command(element) {
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

/// How to treat object types the resolver does not know.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Typing {
    Strict,
    Structural,
}

fn value_element(value: &Value) -> Element {
    match value {
        Value::Null => Element::new("null"),
        Value::Bool(b) => Element::new("boolean").with_text(b.to_string()),
        Value::Int(n) => Element::new("int").with_text(n.to_string()),
        Value::Float(x) => Element::new("double").with_text(x.to_string()),
        Value::Text(s) => Element::new("string").with_text(s),
        Value::List(items) => Element::new("list").with_children(items.iter().map(value_element)),
        Value::Object(object) => object_element(&object.type_name, object),
    }
}

fn object_element(name: &str, object: &DomainObject) -> Element {
    Element::new(name).with_children(
        object
            .fields
            .iter()
            .filter_map(|(field, value)| field_element(field, value)),
    )
}

fn field_element(field: &str, value: &Value) -> Option<Element> {
    match value {
        Value::Null => None,
        Value::Object(object) => Some(object_element(field, object)),
        Value::List(items) => {
            Some(Element::new(field).with_children(items.iter().map(value_element)))
        }
        scalar => Some(Element::new(field).with_text(scalar.to_string())),
    }
}

fn parse_scalar<T: FromStr>(element: &Element, label: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    let text = element.text();
    text.trim().parse::<T>().map_err(|e| {
        ServerError::malformed(format!(
            "<{}> is not a valid {} ('{}'): {}",
            element.name, label, text, e
        ))
    })
}

fn decode_value(element: &Element, types: &dyn TypeResolver, typing: Typing) -> Result<Value> {
    match element.name.as_str() {
        "null" => Ok(Value::Null),
        "string" => Ok(Value::Text(element.text().into_owned())),
        "int" | "long" => parse_scalar(element, "integer").map(Value::Int),
        "double" | "float" => parse_scalar(element, "number").map(Value::Float),
        "boolean" => parse_scalar(element, "boolean").map(Value::Bool),
        "list" => element
            .elements()
            .map(|item| decode_value(item, types, typing))
            .collect::<Result<Vec<_>>>()
            .map(Value::List),
        type_name => match types.resolve(type_name) {
            Some(descriptor) => decode_typed(element, &descriptor, types).map(Value::Object),
            None if typing == Typing::Structural => {
                Ok(Value::Object(decode_structural(element, type_name)))
            }
            None => Err(ServerError::malformed(format!(
                "unknown type '{}' in namespace '{}'",
                type_name,
                types.namespace()
            ))),
        },
    }
}

fn decode_typed(
    element: &Element,
    descriptor: &TypeDescriptor,
    types: &dyn TypeResolver,
) -> Result<DomainObject> {
    let mut object = DomainObject::new(&descriptor.name);
    for field_element in element.elements() {
        let field = descriptor.field(&field_element.name).ok_or_else(|| {
            ServerError::malformed(format!(
                "type '{}' has no field '{}'",
                descriptor.name, field_element.name
            ))
        })?;
        if !matches!(field.kind, FieldKind::Object(_)) && field_element.has_elements() {
            return Err(ServerError::malformed(format!(
                "field '{}' of '{}' must be {}",
                field.name, descriptor.name, field.kind
            )));
        }
        let value = match &field.kind {
            FieldKind::Text => Value::Text(field_element.text().into_owned()),
            FieldKind::Int => Value::Int(parse_scalar(field_element, "integer")?),
            FieldKind::Float => Value::Float(parse_scalar(field_element, "number")?),
            FieldKind::Bool => Value::Bool(parse_scalar(field_element, "boolean")?),
            FieldKind::Object(nested) => {
                let nested = types.resolve(nested).ok_or_else(|| {
                    ServerError::malformed(format!(
                        "unknown type '{}' in namespace '{}'",
                        nested,
                        types.namespace()
                    ))
                })?;
                Value::Object(decode_typed(field_element, &nested, types)?)
            }
        };
        object.set(field.name.clone(), value);
    }
    Ok(object)
}

fn decode_structural(element: &Element, type_name: &str) -> DomainObject {
    let mut object = DomainObject::new(type_name);
    for field in element.elements() {
        let value = if field.has_elements() {
            Value::Object(decode_structural(field, &field.name))
        } else {
            Value::Text(field.text().into_owned())
        };
        object.set(field.name.clone(), value);
    }
    object
}

fn single_value(element: &Element, types: &dyn TypeResolver, typing: Typing) -> Result<Value> {
    let mut children = element.elements();
    match (children.next(), children.next()) {
        (Some(value), None) => decode_value(value, types, typing),
        (None, _) => Err(ServerError::malformed(format!(
            "<{}> carries no value",
            element.name
        ))),
        (Some(_), Some(_)) => Err(ServerError::malformed(format!(
            "<{}> carries more than one value",
            element.name
        ))),
    }
}

// ---------------------------------------------------------------------------
// BatchExecution
// ---------------------------------------------------------------------------

fn batch_command_element(command: &BatchCommand) -> Element {
    match command {
        BatchCommand::Insert {
            object,
            out_identifier,
            return_object,
        } => Element::new("insert")
            .with_opt_attr("out-identifier", out_identifier.as_deref())
            .with_opt_attr("return-object", (!return_object).then_some("false"))
            .with_child(value_element(object)),
        BatchCommand::FireAllRules {
            max,
            out_identifier,
        } => Element::new("fire-all-rules")
            .with_opt_attr("max", max.map(|m| m.to_string()))
            .with_opt_attr("out-identifier", out_identifier.as_deref()),
        BatchCommand::GetObjects { out_identifier } => {
            Element::new("get-objects").with_attr("out-identifier", out_identifier)
        }
        BatchCommand::SetGlobal {
            identifier,
            object,
            out_identifier,
        } => Element::new("set-global")
            .with_attr("identifier", identifier)
            .with_opt_attr("out-identifier", out_identifier.as_deref())
            .with_child(value_element(object)),
        BatchCommand::GetGlobal {
            identifier,
            out_identifier,
        } => Element::new("get-global")
            .with_attr("identifier", identifier)
            .with_opt_attr("out-identifier", out_identifier.as_deref()),
    }
}

fn batch_element(batch: &BatchExecution) -> Element {
    Element::new("batch-execution")
        .with_opt_attr("lookup", batch.lookup.as_deref())
        .with_children(batch.commands.iter().map(batch_command_element))
}

fn decode_batch_command(element: &Element, types: &dyn TypeResolver) -> Result<BatchCommand> {
    let out_identifier = element.attr("out-identifier").map(str::to_string);
    let command = match element.name.as_str() {
        "insert" => BatchCommand::Insert {
            object: single_value(element, types, Typing::Strict)?,
            out_identifier,
            return_object: parse_attr(element, "return-object")?.unwrap_or(true),
        },
        "fire-all-rules" => BatchCommand::FireAllRules {
            max: parse_attr(element, "max")?,
            out_identifier,
        },
        "get-objects" => BatchCommand::GetObjects {
            out_identifier: element.require_attr("out-identifier")?.to_string(),
        },
        "set-global" => BatchCommand::SetGlobal {
            identifier: element.require_attr("identifier")?.to_string(),
            object: single_value(element, types, Typing::Strict)?,
            out_identifier,
        },
        "get-global" => BatchCommand::GetGlobal {
            identifier: element.require_attr("identifier")?.to_string(),
            out_identifier,
        },
        other => {
            return Err(ServerError::malformed(format!(
                "unknown batch command <{}>",
                other
            )))
        }
    };
    Ok(command)
}

fn decode_batch(root: &Element, types: &dyn TypeResolver) -> Result<BatchExecution> {
    let root = expect_root(root, "batch-execution")?;
    let commands = root
        .elements()
        .map(|element| decode_batch_command(element, types))
        .collect::<Result<Vec<_>>>()?;
    Ok(BatchExecution {
        lookup: root.attr("lookup").map(str::to_string),
        commands,
    })
}

// ---------------------------------------------------------------------------
// ExecutionResults
// ---------------------------------------------------------------------------

fn results_element(results: &ExecutionResults) -> Element {
    Element::new("execution-results")
        .with_children(results.values().iter().map(|(identifier, value)| {
            Element::new("result")
                .with_attr("identifier", identifier)
                .with_child(value_element(value))
        }))
        .with_children(results.fact_handles().iter().map(|(identifier, handle)| {
            Element::new("fact-handle")
                .with_attr("identifier", identifier)
                .with_attr("external-form", handle.external_form())
        }))
}

fn decode_results(root: &Element, types: &dyn TypeResolver) -> Result<ExecutionResults> {
    let root = expect_root(root, "execution-results")?;
    let mut results = ExecutionResults::new();
    for element in root.elements() {
        let identifier = element.require_attr("identifier")?;
        match element.name.as_str() {
            "result" => {
                let value = single_value(element, types, Typing::Structural)?;
                results.set_value(identifier, value);
            }
            "fact-handle" => {
                let external = element.require_attr("external-form")?;
                let handle = FactHandle::from_external_form(external).ok_or_else(|| {
                    ServerError::malformed(format!("invalid fact handle '{}'", external))
                })?;
                results.set_fact_handle(identifier, handle);
            }
            other => {
                return Err(ServerError::malformed(format!(
                    "unknown execution result <{}>",
                    other
                )))
            }
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests;
