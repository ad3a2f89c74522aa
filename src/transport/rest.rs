//! REST adapter.
//!
//! Routes:
//! - `GET /health`: liveness
//! - `GET /server`: server info; `POST /server`: execute a command script
//! - `GET /server/containers`: list containers
//! - `PUT|GET|DELETE /server/containers/:id`: create, inspect, dispose
//! - `POST /server/containers/:id`: execute a BatchExecution against the container
//! - `GET|POST /server/containers/:id/scanner`: scanner state
//! - `GET|POST /server/containers/:id/release-id`: deployed release
//!
//! The format comes from the `x-rulehost-format` header, then `Content-Type`,
//! then the server default. Every processed request answers 200 with a
//! marshalled response; a body that cannot be decoded answers 400 and an
//! unknown format 415.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::{handle_script, FORMAT_HEADER};
use crate::command::{
    CreateContainerCommand, DisposeContainerCommand, GetContainerInfoCommand,
    GetScannerInfoCommand, ServerCommand, UpdateReleaseIdCommand, UpdateScannerCommand,
};
use crate::engine::ExecutionEngine;
use crate::error::{ErrorKind, ServerError};
use crate::marshal::{Marshaller, MarshallerExt, Payload};
use crate::model::{ContainerConfig, ResponsePayload, ServiceResponse};

type AppState = Arc<ExecutionEngine>;

/// Start the REST server.
///
/// When `port` is 0 the OS assigns one; the bound port is logged.
pub async fn serve(
    engine: Arc<ExecutionEngine>,
    host: &str,
    port: u16,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    let addr = listener.local_addr()?;
    info!(%addr, "REST API listening");
    axum::serve(listener, router(engine)).await?;
    Ok(())
}

/// Build the axum router (separated for testing).
pub fn router(engine: Arc<ExecutionEngine>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/server", get(server_info).post(execute_script))
        .route("/server/containers", get(list_containers))
        .route(
            "/server/containers/:id",
            get(container_info)
                .put(create_container)
                .delete(dispose_container)
                .post(call_container),
        )
        .route(
            "/server/containers/:id/scanner",
            get(scanner_info).post(update_scanner),
        )
        .route(
            "/server/containers/:id/release-id",
            get(release_id).post(update_release_id),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

// ============================================================================
// Errors and negotiation
// ============================================================================

/// Envelope-level failure.
struct RestError(ServerError);

impl From<ServerError> for RestError {
    fn from(e: ServerError) -> Self {
        Self(e)
    }
}

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        let status = match self.0.kind() {
            ErrorKind::UnsupportedFormat => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ErrorKind::MalformedPayload => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!(status = %status, error = %self.0, "Rejected request envelope");
        (status, self.0.to_string()).into_response()
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn negotiate(engine: &ExecutionEngine, headers: &HeaderMap) -> Result<Arc<dyn Marshaller>, RestError> {
    if let Some(format) = header_value(headers, FORMAT_HEADER) {
        return Ok(engine.marshallers().get(format)?);
    }
    match header_value(headers, CONTENT_TYPE.as_str()) {
        Some(content_type) => engine
            .marshallers()
            .for_content_type(content_type)
            .ok_or_else(|| ServerError::UnsupportedFormat(content_type.to_string()).into()),
        None => Ok(engine.marshallers().get(engine.default_format())?),
    }
}

fn reply(marshaller: &dyn Marshaller, payload: Payload) -> Result<Response, RestError> {
    let body = marshaller.encode(&payload)?;
    Ok(([(CONTENT_TYPE, marshaller.content_type())], body).into_response())
}

async fn run(
    engine: &ExecutionEngine,
    marshaller: &dyn Marshaller,
    command: ServerCommand,
) -> Result<Response, RestError> {
    let response = engine.execute_command(&command).await;
    reply(marshaller, Payload::Response(response))
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> StatusCode {
    StatusCode::OK
}

#[tracing::instrument(name = "rest.server_info", skip_all)]
async fn server_info(State(engine): State<AppState>, headers: HeaderMap) -> Result<Response, RestError> {
    let marshaller = negotiate(&engine, &headers)?;
    run(&engine, marshaller.as_ref(), ServerCommand::GetServerInfo).await
}

#[tracing::instrument(name = "rest.script", skip_all, fields(bytes = body.len()))]
async fn execute_script(
    State(engine): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, RestError> {
    let marshaller = negotiate(&engine, &headers)?;
    let encoded = handle_script(&engine, marshaller.format_id(), &body).await?;
    Ok(([(CONTENT_TYPE, marshaller.content_type())], encoded).into_response())
}

#[tracing::instrument(name = "rest.list_containers", skip_all)]
async fn list_containers(
    State(engine): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, RestError> {
    let marshaller = negotiate(&engine, &headers)?;
    run(&engine, marshaller.as_ref(), ServerCommand::ListContainers).await
}

#[tracing::instrument(name = "rest.create_container", skip_all, fields(container_id = %id))]
async fn create_container(
    State(engine): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, RestError> {
    let marshaller = negotiate(&engine, &headers)?;
    let resource = marshaller.decode_container(&body)?;
    let command = ServerCommand::CreateContainer(CreateContainerCommand {
        container_id: id,
        release_id: resource.release_id,
        config: resource.scanner.map(|scanner| ContainerConfig {
            scanner: Some(scanner),
        }),
    });
    run(&engine, marshaller.as_ref(), command).await
}

#[tracing::instrument(name = "rest.container_info", skip_all, fields(container_id = %id))]
async fn container_info(
    State(engine): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, RestError> {
    let marshaller = negotiate(&engine, &headers)?;
    let command = ServerCommand::GetContainerInfo(GetContainerInfoCommand { container_id: id });
    run(&engine, marshaller.as_ref(), command).await
}

#[tracing::instrument(name = "rest.dispose_container", skip_all, fields(container_id = %id))]
async fn dispose_container(
    State(engine): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, RestError> {
    let marshaller = negotiate(&engine, &headers)?;
    let command = ServerCommand::DisposeContainer(DisposeContainerCommand { container_id: id });
    run(&engine, marshaller.as_ref(), command).await
}

#[tracing::instrument(name = "rest.call_container", skip_all, fields(container_id = %id, bytes = body.len()))]
async fn call_container(
    State(engine): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, RestError> {
    let marshaller = negotiate(&engine, &headers)?;
    let response = engine
        .execute_commands(&id, &body, marshaller.format_id())
        .await
        .into_payload();
    reply(marshaller.as_ref(), Payload::Response(response))
}

async fn scanner_info(
    State(engine): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, RestError> {
    let marshaller = negotiate(&engine, &headers)?;
    let command = ServerCommand::GetScannerInfo(GetScannerInfoCommand { container_id: id });
    run(&engine, marshaller.as_ref(), command).await
}

#[tracing::instrument(name = "rest.update_scanner", skip_all, fields(container_id = %id))]
async fn update_scanner(
    State(engine): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, RestError> {
    let marshaller = negotiate(&engine, &headers)?;
    let scanner = marshaller.decode_scanner(&body)?;
    let command = ServerCommand::UpdateScanner(UpdateScannerCommand {
        container_id: id,
        scanner,
    });
    run(&engine, marshaller.as_ref(), command).await
}

async fn release_id(
    State(engine): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, RestError> {
    let marshaller = negotiate(&engine, &headers)?;
    let response = match engine.registry().get(&id).await {
        Ok(container) => ServiceResponse::success(
            format!("Release id of container {}", id),
            Some(ResponsePayload::ReleaseId(
                container.resolved_release_id.unwrap_or(container.release_id),
            )),
        ),
        Err(e) => ServiceResponse::failure_from(format!("Error retrieving container {}", id), &e),
    };
    reply(marshaller.as_ref(), Payload::Response(response))
}

#[tracing::instrument(name = "rest.update_release_id", skip_all, fields(container_id = %id))]
async fn update_release_id(
    State(engine): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, RestError> {
    let marshaller = negotiate(&engine, &headers)?;
    let release_id = marshaller.decode_release(&body)?;
    let command = ServerCommand::UpdateReleaseId(UpdateReleaseIdCommand {
        container_id: id,
        release_id,
    });
    run(&engine, marshaller.as_ref(), command).await
}
