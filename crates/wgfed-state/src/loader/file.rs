//! Local file loader.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::{is_http_url, ConfigMap, ConfigurationLoader, DocumentFormat};
use crate::canonicalize::MAX_TOTAL_SIZE;
use crate::error::{StateError, StateResult};

/// Loads `.yaml`, `.yml` and `.json` files from the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct FileConfigurationLoader;

impl FileConfigurationLoader {
    pub fn new() -> Self {
        Self
    }
}

/// Strip an optional `file://` scheme.
pub(crate) fn local_path(source: &str) -> PathBuf {
    Path::new(source.strip_prefix("file://").unwrap_or(source)).to_path_buf()
}

#[async_trait]
impl ConfigurationLoader for FileConfigurationLoader {
    fn supports(&self, source: &str) -> bool {
        !is_http_url(source) && DocumentFormat::from_locator(source).is_some()
    }

    #[instrument(skip_all, fields(source = %source))]
    async fn load(&self, source: &str) -> StateResult<ConfigMap> {
        let format = DocumentFormat::from_locator(source).ok_or_else(|| {
            StateError::UnsupportedSource {
                locator: source.to_string(),
            }
        })?;
        let path = local_path(source);

        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| StateError::from_io(source, &e))?;
        if metadata.len() > MAX_TOTAL_SIZE as u64 {
            return Err(StateError::Parse {
                locator: source.to_string(),
                message: format!(
                    "file size {} exceeds limit {}",
                    metadata.len(),
                    MAX_TOTAL_SIZE
                ),
            });
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| StateError::from_io(source, &e))?;
        debug!(bytes = content.len(), "read configuration file");

        format.parse(&content, source)
    }
}
