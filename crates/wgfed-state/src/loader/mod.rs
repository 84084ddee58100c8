//! Configuration loaders.
//!
//! Every loader turns a source locator into a mapping. Plain loaders do I/O
//! and strict parsing only; wrappers such as the verifying proxy and the
//! timeout loader add one concern each and implement the same trait, so
//! they stack in any order.

mod chain;
mod file;
mod http;
mod merge;
mod timeout;

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::canonicalize::{parse_json_strict, parse_yaml_strict};
use crate::envelope::value_type_name;
use crate::error::{StateError, StateResult};

pub use chain::ConfigurationLoaderChain;
pub use file::FileConfigurationLoader;
pub use http::{HttpConfigurationLoader, DEFAULT_HTTP_TIMEOUT, USER_AGENT_VALUE};
pub use merge::deep_merge;
pub use timeout::TimeoutConfigurationLoader;

pub(crate) use file::local_path;

/// A loaded configuration document.
pub type ConfigMap = serde_json::Map<String, JsonValue>;

/// Loads configuration mappings from source locators.
#[async_trait]
pub trait ConfigurationLoader: Send + Sync {
    /// Whether this loader handles `source`.
    fn supports(&self, source: &str) -> bool;

    /// Load one source. A missing source is `StateError::NotFound`.
    async fn load(&self, source: &str) -> StateResult<ConfigMap>;

    /// Load one source, treating a missing source as an empty mapping.
    async fn load_if_exists(&self, source: &str) -> StateResult<ConfigMap> {
        match self.load(source).await {
            Err(e) if e.is_not_found() => {
                debug!(source = %source, "source not found, using empty configuration");
                Ok(ConfigMap::new())
            }
            other => other,
        }
    }

    /// Load every source in order and deep-merge the results.
    ///
    /// The first failure is returned and later sources are not attempted.
    async fn load_all(&self, sources: &[String]) -> StateResult<ConfigMap> {
        let mut merged = ConfigMap::new();
        for source in sources {
            let loaded = self.load(source).await?;
            deep_merge(&mut merged, loaded);
        }
        debug!(sources = sources.len(), "merged configuration sources");
        Ok(merged)
    }

    /// Like [`load_all`](Self::load_all), skipping sources that do not exist.
    async fn load_all_if_exists(&self, sources: &[String]) -> StateResult<ConfigMap> {
        let mut merged = ConfigMap::new();
        for source in sources {
            let loaded = self.load_if_exists(source).await?;
            deep_merge(&mut merged, loaded);
        }
        debug!(sources = sources.len(), "merged existing configuration sources");
        Ok(merged)
    }
}

/// Serialization formats understood by loaders and savers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Yaml,
    Json,
}

impl DocumentFormat {
    /// Format implied by the extension of a path or URL path.
    pub fn from_locator(locator: &str) -> Option<Self> {
        let extension = Path::new(locator).extension()?.to_str()?;
        match extension.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Strictly parse `content` into a top-level mapping.
    ///
    /// An empty document is an empty mapping.
    pub fn parse(self, content: &str, locator: &str) -> StateResult<ConfigMap> {
        if content.trim().is_empty() {
            return Ok(ConfigMap::new());
        }

        let value = match self {
            Self::Yaml => parse_yaml_strict(content),
            Self::Json => parse_json_strict(content),
        }
        .map_err(|e| StateError::Parse {
            locator: locator.to_string(),
            message: e.to_string(),
        })?;

        match value {
            JsonValue::Object(map) => Ok(map),
            JsonValue::Null => Ok(ConfigMap::new()),
            other => Err(StateError::Parse {
                locator: locator.to_string(),
                message: format!(
                    "top level must be a mapping, found {}",
                    value_type_name(&other)
                ),
            }),
        }
    }

    /// Render a mapping in this format.
    pub fn render(self, map: &ConfigMap, locator: &str) -> StateResult<String> {
        let rendered = match self {
            Self::Yaml => serde_yaml::to_string(map).map_err(|e| e.to_string()),
            Self::Json => serde_json::to_string_pretty(map)
                .map(|mut s| {
                    s.push('\n');
                    s
                })
                .map_err(|e| e.to_string()),
        };
        rendered.map_err(|message| StateError::Parse {
            locator: locator.to_string(),
            message,
        })
    }
}

/// Whether `source` is an HTTP(S) URL.
pub(crate) fn is_http_url(source: &str) -> bool {
    let lower = source.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}
