//! Transport adapters.
//!
//! Both adapters share one envelope contract: a format selector plus a
//! marshalled command script in, a marshalled [`ServiceResponsesList`] in the
//! same format out. Application failures travel inside the body; only an
//! envelope that cannot be decoded at all fails at the transport level.
//!
//! [`ServiceResponsesList`]: crate::model::ServiceResponsesList

pub mod queue;
pub mod rest;

use tracing::debug;

use crate::engine::ExecutionEngine;
use crate::error::Result;
use crate::marshal::{MarshallerExt, Payload};

/// Header naming the marshalling format explicitly.
pub const FORMAT_HEADER: &str = "x-rulehost-format";

/// Decode a command script, execute it, and encode the responses.
///
/// `format` is a format id (`xml`) or a content type (`application/xml`).
/// Container calls inside the script that do not name a format use the
/// script's own format.
pub async fn handle_script(engine: &ExecutionEngine, format: &str, body: &[u8]) -> Result<Vec<u8>> {
    let marshaller = engine.marshallers().get(format).or_else(|e| {
        engine.marshallers().for_content_type(format).ok_or(e)
    })?;
    let mut script = marshaller.decode_script(body)?;
    script.apply_default_format(marshaller.format_id());
    debug!(format = marshaller.format_id(), commands = script.len(), "Decoded command script");

    let responses = engine.execute_script(script).await;
    marshaller.encode(&Payload::Responses(responses))
}
