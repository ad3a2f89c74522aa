//! Command responses.

use serde::{Deserialize, Serialize};

use super::{ContainerResource, ReleaseId, ScannerResource, ServerInfo};
use crate::error::ServerError;

/// Outcome of one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseType {
    Success,
    Failure,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Success => "SUCCESS",
            ResponseType::Failure => "FAILURE",
        }
    }
}

/// Result carried by a response in a [`ServiceResponsesList`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponsePayload {
    Container(ContainerResource),
    Containers(Vec<ContainerResource>),
    Scanner(ScannerResource),
    ReleaseId(ReleaseId),
    ServerInfo(ServerInfo),
    /// Marshalled text, e.g. execution results of a container call.
    Text(String),
}

/// Typed success/failure outcome of a single command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceResponse<T = ResponsePayload> {
    #[serde(rename = "type")]
    pub response_type: ResponseType,
    pub msg: String,
    #[serde(default = "none", skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
}

fn none<T>() -> Option<T> {
    None
}

impl<T> ServiceResponse<T> {
    pub fn success(msg: impl Into<String>, result: Option<T>) -> Self {
        Self {
            response_type: ResponseType::Success,
            msg: msg.into(),
            result,
        }
    }

    pub fn failure(msg: impl Into<String>) -> Self {
        Self {
            response_type: ResponseType::Failure,
            msg: msg.into(),
            result: None,
        }
    }

    /// Failure carrying the error kind and detail, e.g.
    /// `Error calling container kie1: [SessionNotFound] Session 'xyz' not found ...`.
    pub fn failure_from(context: impl AsRef<str>, err: &ServerError) -> Self {
        Self::failure(format!("{}: [{}] {}", context.as_ref(), err.kind(), err))
    }

    pub fn is_success(&self) -> bool {
        self.response_type == ResponseType::Success
    }

    /// Convert the result while keeping type and message.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ServiceResponse<U> {
        ServiceResponse {
            response_type: self.response_type,
            msg: self.msg,
            result: self.result.map(f),
        }
    }
}

impl ServiceResponse<String> {
    /// Widen a text response into the general payload form.
    pub fn into_payload(self) -> ServiceResponse {
        self.map(ResponsePayload::Text)
    }
}

/// Ordered responses of a command script, one per executed command.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ServiceResponsesList {
    pub responses: Vec<ServiceResponse>,
}

impl ServiceResponsesList {
    pub fn new(responses: Vec<ServiceResponse>) -> Self {
        Self { responses }
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    pub fn all_succeeded(&self) -> bool {
        self.responses.iter().all(ServiceResponse::is_success)
    }
}
