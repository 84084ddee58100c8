//! Dispatch to the first loader that supports a source.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{ConfigMap, ConfigurationLoader};
use crate::error::{StateError, StateResult};

/// Ordered set of loaders; the first one whose `supports` matches handles the load.
#[derive(Clone, Default)]
pub struct ConfigurationLoaderChain {
    loaders: Vec<Arc<dyn ConfigurationLoader>>,
}

impl ConfigurationLoaderChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loader(mut self, loader: Arc<dyn ConfigurationLoader>) -> Self {
        self.loaders.push(loader);
        self
    }

    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }

    fn select(&self, source: &str) -> StateResult<&Arc<dyn ConfigurationLoader>> {
        self.loaders
            .iter()
            .find(|loader| loader.supports(source))
            .ok_or_else(|| StateError::UnsupportedSource {
                locator: source.to_string(),
            })
    }
}

impl std::fmt::Debug for ConfigurationLoaderChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationLoaderChain")
            .field("loaders", &self.loaders.len())
            .finish()
    }
}

#[async_trait]
impl ConfigurationLoader for ConfigurationLoaderChain {
    fn supports(&self, source: &str) -> bool {
        self.loaders.iter().any(|loader| loader.supports(source))
    }

    async fn load(&self, source: &str) -> StateResult<ConfigMap> {
        let loader = self.select(source)?;
        debug!(source = %source, "dispatching load");
        loader.load(source).await
    }
}
