//! Release repository configuration types.

use std::sync::Arc;

use serde::Deserialize;

use super::ConfigError;
use crate::release::{FileRepository, InMemoryRepository, ReleaseResolver};

/// Repository type discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryType {
    /// Empty in-memory repository; releases are deployed programmatically.
    #[default]
    Memory,
    /// Releases read from a directory tree.
    File,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    #[serde(rename = "type")]
    pub repository_type: RepositoryType,
    /// Root directory of the file repository.
    pub path: Option<String>,
}

impl RepositoryConfig {
    /// Build the configured release resolver.
    pub fn build(&self) -> Result<Arc<dyn ReleaseResolver>, ConfigError> {
        match self.repository_type {
            RepositoryType::Memory => Ok(Arc::new(InMemoryRepository::new())),
            RepositoryType::File => {
                let path = self.path.as_deref().ok_or_else(|| {
                    ConfigError::Invalid("repository.path is required for a file repository".into())
                })?;
                Ok(Arc::new(FileRepository::new(path)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_repository_requires_path() {
        let config = RepositoryConfig {
            repository_type: RepositoryType::File,
            path: None,
        };
        assert!(matches!(config.build(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_memory_repository_is_default() {
        let config = RepositoryConfig::default();
        assert_eq!(config.repository_type, RepositoryType::Memory);
        assert!(config.build().is_ok());
    }
}
