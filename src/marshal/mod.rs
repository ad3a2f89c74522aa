//! Pluggable marshalling.
//!
//! A [`Marshaller`] encodes and decodes the protocol object graph for one wire
//! format. Formats are selected at run time through the [`MarshallerRegistry`];
//! callers never branch on a format at compile time.
//!
//! Domain objects embedded in a payload are decoded against the
//! [`TypeResolver`] of the container the payload is addressed to. A type the
//! resolver does not know is a decode failure for inbound batches. Execution
//! results are decoded leniently: unknown types are rebuilt from the document
//! structure so clients can read results without the release's types.

mod dom;
pub mod json;
pub mod xml;

pub use json::JsonMarshaller;
pub use xml::XmlMarshaller;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::command::{BatchExecution, CommandScript, ExecutionResults};
use crate::error::{Result, ServerError};
use crate::model::{
    ContainerResource, ReleaseId, ScannerResource, ServiceResponse, ServiceResponsesList,
};
use crate::types::{NoDomainTypes, TypeResolver};

/// Object graphs a marshaller can carry.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Script(CommandScript),
    Batch(BatchExecution),
    Results(ExecutionResults),
    Response(ServiceResponse),
    Responses(ServiceResponsesList),
    Container(ContainerResource),
    Scanner(ScannerResource),
    Release(ReleaseId),
}

impl Payload {
    pub fn shape(&self) -> Shape {
        match self {
            Payload::Script(_) => Shape::Script,
            Payload::Batch(_) => Shape::Batch,
            Payload::Results(_) => Shape::Results,
            Payload::Response(_) => Shape::Response,
            Payload::Responses(_) => Shape::Responses,
            Payload::Container(_) => Shape::Container,
            Payload::Scanner(_) => Shape::Scanner,
            Payload::Release(_) => Shape::Release,
        }
    }
}

/// Target shape requested from a decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Script,
    Batch,
    Results,
    Response,
    Responses,
    Container,
    Scanner,
    Release,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Shape::Script => "command script",
            Shape::Batch => "batch execution",
            Shape::Results => "execution results",
            Shape::Response => "service response",
            Shape::Responses => "service response list",
            Shape::Container => "container",
            Shape::Scanner => "scanner",
            Shape::Release => "release id",
        };
        f.write_str(name)
    }
}

/// Encoder/decoder for one wire format.
pub trait Marshaller: Send + Sync {
    /// Run-time format selector, e.g. `xml`.
    fn format_id(&self) -> &'static str;

    fn content_type(&self) -> &'static str;

    fn encode(&self, payload: &Payload) -> Result<Vec<u8>>;

    /// Decode `bytes` into `shape`, resolving domain types through `types`.
    fn decode(&self, bytes: &[u8], shape: Shape, types: &dyn TypeResolver) -> Result<Payload>;
}

fn unexpected(expected: Shape, got: &Payload) -> ServerError {
    ServerError::malformed(format!(
        "expected {} but decoded {}",
        expected,
        got.shape()
    ))
}

/// Typed conveniences over [`Marshaller`].
pub trait MarshallerExt: Marshaller {
    fn decode_script(&self, bytes: &[u8]) -> Result<CommandScript> {
        match self.decode(bytes, Shape::Script, &NoDomainTypes)? {
            Payload::Script(script) => Ok(script),
            other => Err(unexpected(Shape::Script, &other)),
        }
    }

    fn decode_batch(&self, bytes: &[u8], types: &dyn TypeResolver) -> Result<BatchExecution> {
        match self.decode(bytes, Shape::Batch, types)? {
            Payload::Batch(batch) => Ok(batch),
            other => Err(unexpected(Shape::Batch, &other)),
        }
    }

    fn decode_results(&self, bytes: &[u8], types: &dyn TypeResolver) -> Result<ExecutionResults> {
        match self.decode(bytes, Shape::Results, types)? {
            Payload::Results(results) => Ok(results),
            other => Err(unexpected(Shape::Results, &other)),
        }
    }

    fn decode_response(&self, bytes: &[u8]) -> Result<ServiceResponse> {
        match self.decode(bytes, Shape::Response, &NoDomainTypes)? {
            Payload::Response(response) => Ok(response),
            other => Err(unexpected(Shape::Response, &other)),
        }
    }

    fn decode_responses(&self, bytes: &[u8]) -> Result<ServiceResponsesList> {
        match self.decode(bytes, Shape::Responses, &NoDomainTypes)? {
            Payload::Responses(responses) => Ok(responses),
            other => Err(unexpected(Shape::Responses, &other)),
        }
    }

    fn decode_container(&self, bytes: &[u8]) -> Result<ContainerResource> {
        match self.decode(bytes, Shape::Container, &NoDomainTypes)? {
            Payload::Container(container) => Ok(container),
            other => Err(unexpected(Shape::Container, &other)),
        }
    }

    fn decode_scanner(&self, bytes: &[u8]) -> Result<ScannerResource> {
        match self.decode(bytes, Shape::Scanner, &NoDomainTypes)? {
            Payload::Scanner(scanner) => Ok(scanner),
            other => Err(unexpected(Shape::Scanner, &other)),
        }
    }

    fn decode_release(&self, bytes: &[u8]) -> Result<ReleaseId> {
        match self.decode(bytes, Shape::Release, &NoDomainTypes)? {
            Payload::Release(release) => Ok(release),
            other => Err(unexpected(Shape::Release, &other)),
        }
    }

    /// Encode to a UTF-8 string; both built-in formats are textual.
    fn encode_to_string(&self, payload: &Payload) -> Result<String> {
        String::from_utf8(self.encode(payload)?)
            .map_err(|e| ServerError::malformed(format!("encoded payload is not UTF-8: {}", e)))
    }
}

impl<M: Marshaller + ?Sized> MarshallerExt for M {}

/// Format identifier to marshaller map.
#[derive(Clone, Default)]
pub struct MarshallerRegistry {
    marshallers: HashMap<String, Arc<dyn Marshaller>>,
}

impl MarshallerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the XML and JSON marshallers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(XmlMarshaller));
        registry.register(Arc::new(JsonMarshaller));
        registry
    }

    /// Add or replace the marshaller for its format id.
    pub fn register(&mut self, marshaller: Arc<dyn Marshaller>) {
        debug!(format = marshaller.format_id(), "Registering marshaller");
        self.marshallers
            .insert(marshaller.format_id().to_ascii_lowercase(), marshaller);
    }

    /// Marshaller for a format id (case-insensitive).
    pub fn get(&self, format: &str) -> Result<Arc<dyn Marshaller>> {
        self.marshallers
            .get(&format.trim().to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| ServerError::UnsupportedFormat(format.to_string()))
    }

    /// Marshaller whose content type matches a `Content-Type` header value.
    pub fn for_content_type(&self, content_type: &str) -> Option<Arc<dyn Marshaller>> {
        let media_type = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        self.marshallers
            .values()
            .find(|m| {
                m.content_type() == media_type
                    || media_type
                        .rsplit(|c: char| c == '/' || c == '+')
                        .next()
                        .is_some_and(|suffix| suffix == m.format_id())
            })
            .cloned()
    }

    /// Registered format ids, sorted.
    pub fn formats(&self) -> Vec<&str> {
        let mut formats: Vec<&str> = self.marshallers.keys().map(String::as_str).collect();
        formats.sort_unstable();
        formats
    }
}
