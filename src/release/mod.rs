//! Release resolution.
//!
//! A release is an immutable, versioned unit of deployable logic. The container
//! registry never loads releases itself; it asks an injected [`ReleaseResolver`]
//! for a [`ReleaseArtifact`], which bundles the release's isolated type
//! namespace, its declared sessions and the rule engine that evaluates them.

pub mod file;
pub mod memory;

pub use file::FileRepository;
pub use memory::InMemoryRepository;

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::model::ReleaseId;
use crate::session::{NoopEngine, RuleEngine, SessionDeclaration};
use crate::types::{TypeDescriptor, TypeNamespace};

/// Errors raised while resolving a release.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Release {0} not found")]
    NotFound(ReleaseId),

    #[error("Release {release} is invalid: {message}")]
    Invalid { release: ReleaseId, message: String },

    #[error("I/O error reading release {release}: {source}")]
    Io {
        release: ReleaseId,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ResolveError>;

/// Resolved release ready to back a container.
pub struct ReleaseArtifact {
    release_id: ReleaseId,
    types: Arc<TypeNamespace>,
    sessions: Vec<SessionDeclaration>,
    engine: Arc<dyn RuleEngine>,
}

impl ReleaseArtifact {
    pub fn builder(release_id: ReleaseId) -> ReleaseArtifactBuilder {
        ReleaseArtifactBuilder::new(release_id)
    }

    pub fn release_id(&self) -> &ReleaseId {
        &self.release_id
    }

    /// Type namespace scoped to this release.
    pub fn types(&self) -> &Arc<TypeNamespace> {
        &self.types
    }

    pub fn sessions(&self) -> &[SessionDeclaration] {
        &self.sessions
    }

    pub fn engine(&self) -> &Arc<dyn RuleEngine> {
        &self.engine
    }

    /// Name of the session marked as default, if any.
    pub fn default_session(&self) -> Option<&str> {
        self.sessions
            .iter()
            .find(|s| s.default)
            .map(|s| s.name.as_str())
    }
}

impl std::fmt::Debug for ReleaseArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleaseArtifact")
            .field("release_id", &self.release_id)
            .field("types", &self.types.len())
            .field("sessions", &self.sessions)
            .field("engine", &self.engine.name())
            .finish()
    }
}

/// Builder for [`ReleaseArtifact`].
pub struct ReleaseArtifactBuilder {
    release_id: ReleaseId,
    types: TypeNamespace,
    sessions: Vec<SessionDeclaration>,
    engine: Option<Arc<dyn RuleEngine>>,
}

impl ReleaseArtifactBuilder {
    pub fn new(release_id: ReleaseId) -> Self {
        let types = TypeNamespace::new(release_id.to_string());
        Self {
            release_id,
            types,
            sessions: Vec::new(),
            engine: None,
        }
    }

    pub fn with_type(mut self, descriptor: TypeDescriptor) -> Self {
        self.types.register(descriptor);
        self
    }

    pub fn with_session(mut self, name: impl Into<String>, default: bool) -> Self {
        self.sessions.push(SessionDeclaration::new(name, default));
        self
    }

    pub fn with_engine(mut self, engine: Arc<dyn RuleEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Validate and build. Session names must be unique, at most one session
    /// may be the default, and nested object fields must name declared types.
    pub fn build(self) -> Result<ReleaseArtifact> {
        let invalid = |message: String| ResolveError::Invalid {
            release: self.release_id.clone(),
            message,
        };

        let mut names = HashSet::new();
        for session in &self.sessions {
            if !names.insert(session.name.as_str()) {
                return Err(invalid(format!("duplicate session '{}'", session.name)));
            }
        }

        let defaults = self.sessions.iter().filter(|s| s.default).count();
        if defaults > 1 {
            return Err(invalid(format!("{} sessions marked default", defaults)));
        }

        let dangling = self.types.dangling_references();
        if !dangling.is_empty() {
            return Err(invalid(format!(
                "undeclared nested types: {}",
                dangling.join(", ")
            )));
        }

        Ok(ReleaseArtifact {
            release_id: self.release_id,
            types: Arc::new(self.types),
            sessions: self.sessions,
            engine: self.engine.unwrap_or_else(|| Arc::new(NoopEngine)),
        })
    }
}

/// Artifact resolution collaborator.
#[async_trait]
pub trait ReleaseResolver: Send + Sync {
    /// Resolve a release to its deployable artifact.
    async fn resolve(&self, release: &ReleaseId) -> Result<Arc<ReleaseArtifact>>;

    /// Newest known version of an artifact, used by scanners.
    async fn latest(&self, _group_id: &str, _artifact_id: &str) -> Result<Option<ReleaseId>> {
        Ok(None)
    }
}

/// Order two version strings segment by segment.
///
/// Segments are split on `.` and `-`. Numeric segments compare numerically
/// and outrank qualifiers such as `SNAPSHOT` or `beta`, which compare
/// lexically without case. A qualifier ranks below the bare version, so
/// `2.1.0-SNAPSHOT` < `2.1.0` < `2.1.0.1`. `GA`, `Final` and `Release` mark the
/// bare version itself: `2.1.0.GA` orders equal to `2.1.0`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let is_sep = |c: char| c == '.' || c == '-';
    let mut left = a.split(is_sep);
    let mut right = b.split(is_sep);
    loop {
        let (l, r) = match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (l, r) => (Segment::parse(l), Segment::parse(r)),
        };
        let ord = l.cmp(&r);
        if ord != Ordering::Equal {
            return ord;
        }
    }
}

/// One version segment; variant order is rank order.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Segment {
    Qualifier(String),
    Release,
    Number(u64),
}

impl Segment {
    fn parse(segment: Option<&str>) -> Self {
        let Some(segment) = segment else {
            return Segment::Release;
        };
        if let Ok(n) = segment.parse::<u64>() {
            return Segment::Number(n);
        }
        let qualifier = segment.to_ascii_lowercase();
        match qualifier.as_str() {
            "" | "ga" | "final" | "release" => Segment::Release,
            _ => Segment::Qualifier(qualifier),
        }
    }
}
