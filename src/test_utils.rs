//! Test fixtures.
//!
//! Releases and repositories shared by unit and integration tests.

use std::sync::Arc;
use std::time::Duration;

use crate::model::{DomainObject, ReleaseId};
use crate::release::{InMemoryRepository, ReleaseArtifact};
use crate::session::EchoEngine;
use crate::types::{FieldKind, TypeDescriptor};

pub const MESSAGE_TYPE: &str = "org.pkg1.Message";
pub const DEFAULT_SESSION: &str = "defaultKieSession";

pub fn release_id(version: &str) -> ReleaseId {
    ReleaseId::new("foo.bar", "baz", version)
}

pub fn message_type() -> TypeDescriptor {
    TypeDescriptor::new(MESSAGE_TYPE).with_field("text", FieldKind::Text)
}

pub fn message(text: &str) -> DomainObject {
    DomainObject::new(MESSAGE_TYPE).with_field("text", text)
}

/// Release with the message type, a default session and the echo engine.
pub fn echo_release(version: &str) -> ReleaseArtifact {
    echo_release_with(version, EchoEngine::default())
}

pub fn echo_release_with(version: &str, engine: EchoEngine) -> ReleaseArtifact {
    ReleaseArtifact::builder(release_id(version))
        .with_type(message_type())
        .with_session(DEFAULT_SESSION, true)
        .with_engine(Arc::new(engine))
        .build()
        .expect("fixture release is valid")
}

/// Echo release whose engine sleeps before every evaluation pass.
pub fn slow_echo_release(version: &str, delay: Duration) -> ReleaseArtifact {
    echo_release_with(version, EchoEngine::default().with_delay(delay))
}

/// Release declaring sessions but no default one.
pub fn release_without_default(version: &str) -> ReleaseArtifact {
    ReleaseArtifact::builder(release_id(version))
        .with_type(message_type())
        .with_session("first", false)
        .with_session("second", false)
        .with_engine(Arc::new(EchoEngine::default()))
        .build()
        .expect("fixture release is valid")
}

/// Repository holding `foo.bar:baz:<version>` echo releases.
pub async fn repository_with(versions: &[&str]) -> Arc<InMemoryRepository> {
    let repo = Arc::new(InMemoryRepository::new());
    for version in versions {
        repo.deploy(echo_release(version)).await;
    }
    repo
}
