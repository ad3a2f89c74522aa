//! REST client for a running server.
//!
//! Mirrors the routes served by [`crate::transport::rest`]. Requests and
//! responses are marshalled with one format chosen when the client is built.
//! Execution results are decoded structurally, so callers do not need the
//! container's release types.

use std::sync::Arc;
use std::time::Duration;

use backon::Retryable;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use tracing::{debug, info, warn};

use crate::command::{BatchExecution, CommandScript, ExecutionResults};
use crate::error::ServerError;
use crate::marshal::{Marshaller, MarshallerExt, MarshallerRegistry, Payload};
use crate::model::{
    ContainerResource, ReleaseId, ResponsePayload, ScannerResource, ServiceResponse,
    ServiceResponsesList,
};
use crate::transport::FORMAT_HEADER;
use crate::types::NoDomainTypes;
use crate::utils::retry::connection_backoff;

/// Result type for client calls.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors raised by [`ServerClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server answered {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Marshalling failed: {0}")]
    Marshal(#[from] ServerError),

    #[error("Unexpected response payload: {0}")]
    UnexpectedPayload(String),
}

/// Client for the server's REST routes.
#[derive(Clone)]
pub struct ServerClient {
    http: reqwest::Client,
    base_url: String,
    marshaller: Arc<dyn Marshaller>,
}

impl ServerClient {
    /// Client for `base_url` (e.g. `http://localhost:8230`) speaking `format`.
    pub fn new(base_url: impl Into<String>, format: &str) -> Result<Self> {
        let marshaller = MarshallerRegistry::with_defaults().get(format)?;
        Ok(Self::with_marshaller(base_url, marshaller))
    }

    pub fn with_marshaller(base_url: impl Into<String>, marshaller: Arc<dyn Marshaller>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
            marshaller,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn format(&self) -> &'static str {
        self.marshaller.format_id()
    }

    /// Poll `/health` with exponential backoff until the server answers.
    pub async fn wait_until_ready(&self) -> Result<()> {
        let url = format!("{}/health", self.base_url);
        (|| async {
            self.http
                .get(&url)
                .send()
                .await?
                .error_for_status()
                .map(|_| ())
        })
        .retry(connection_backoff())
        .notify(|err: &reqwest::Error, dur: Duration| {
            warn!(url = %url, error = %err, delay = ?dur, "Server not ready, retrying");
        })
        .await?;
        info!(url = %self.base_url, "Server ready");
        Ok(())
    }

    // ========================================================================
    // Server
    // ========================================================================

    pub async fn server_info(&self) -> Result<ServiceResponse> {
        self.response(Method::GET, "/server", None).await
    }

    /// Execute a command script; one response per executed command.
    pub async fn execute(&self, script: &CommandScript) -> Result<ServiceResponsesList> {
        let body = self.marshaller.encode(&Payload::Script(script.clone()))?;
        let bytes = self.send(Method::POST, "/server", Some(body)).await?;
        Ok(self.marshaller.decode_responses(&bytes)?)
    }

    // ========================================================================
    // Containers
    // ========================================================================

    pub async fn list_containers(&self) -> Result<ServiceResponse> {
        self.response(Method::GET, "/server/containers", None).await
    }

    pub async fn create_container(
        &self,
        id: &str,
        release_id: ReleaseId,
        scanner: Option<ScannerResource>,
    ) -> Result<ServiceResponse> {
        let mut resource = ContainerResource::new(id, release_id);
        resource.scanner = scanner;
        let body = self.marshaller.encode(&Payload::Container(resource))?;
        self.response(Method::PUT, &container_path(id), Some(body))
            .await
    }

    pub async fn container_info(&self, id: &str) -> Result<ServiceResponse> {
        self.response(Method::GET, &container_path(id), None).await
    }

    pub async fn dispose_container(&self, id: &str) -> Result<ServiceResponse> {
        self.response(Method::DELETE, &container_path(id), None)
            .await
    }

    /// Run a batch in a container and decode the returned execution results.
    ///
    /// A FAILURE response is returned as is, without a result.
    pub async fn call_container(
        &self,
        id: &str,
        batch: &BatchExecution,
    ) -> Result<ServiceResponse<ExecutionResults>> {
        let body = self.marshaller.encode(&Payload::Batch(batch.clone()))?;
        let response = self
            .response(Method::POST, &container_path(id), Some(body))
            .await?;
        let ServiceResponse {
            response_type,
            msg,
            result,
        } = response;
        let result = match result {
            None => None,
            Some(ResponsePayload::Text(text)) => Some(
                self.marshaller
                    .decode_results(text.as_bytes(), &NoDomainTypes)?,
            ),
            Some(other) => {
                return Err(ClientError::UnexpectedPayload(format!("{:?}", other)));
            }
        };
        Ok(ServiceResponse {
            response_type,
            msg,
            result,
        })
    }

    // ========================================================================
    // Scanner and release
    // ========================================================================

    pub async fn scanner_info(&self, id: &str) -> Result<ServiceResponse> {
        self.response(Method::GET, &format!("{}/scanner", container_path(id)), None)
            .await
    }

    pub async fn update_scanner(
        &self,
        id: &str,
        scanner: ScannerResource,
    ) -> Result<ServiceResponse> {
        let body = self.marshaller.encode(&Payload::Scanner(scanner))?;
        self.response(
            Method::POST,
            &format!("{}/scanner", container_path(id)),
            Some(body),
        )
        .await
    }

    pub async fn release_id(&self, id: &str) -> Result<ServiceResponse> {
        self.response(
            Method::GET,
            &format!("{}/release-id", container_path(id)),
            None,
        )
        .await
    }

    pub async fn update_release_id(
        &self,
        id: &str,
        release_id: ReleaseId,
    ) -> Result<ServiceResponse> {
        let body = self.marshaller.encode(&Payload::Release(release_id))?;
        self.response(
            Method::POST,
            &format!("{}/release-id", container_path(id)),
            Some(body),
        )
        .await
    }

    // ========================================================================
    // Plumbing
    // ========================================================================

    async fn response(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<ServiceResponse> {
        let bytes = self.send(method, path, body).await?;
        Ok(self.marshaller.decode_response(&bytes)?)
    }

    async fn send(&self, method: Method, path: &str, body: Option<Vec<u8>>) -> Result<Vec<u8>> {
        let url = format!("{}{}", self.base_url, path);
        debug!(method = %method, url = %url, "Sending request");

        let mut request = self
            .http
            .request(method, &url)
            .header(FORMAT_HEADER, self.marshaller.format_id());
        if let Some(body) = body {
            request = request
                .header(CONTENT_TYPE, self.marshaller.content_type())
                .body(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(ClientError::Status {
                status,
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        Ok(bytes.to_vec())
    }
}

fn container_path(id: &str) -> String {
    format!("/server/containers/{}", id)
}
