//! Deadline wrapper for any loader.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::{ConfigMap, ConfigurationLoader};
use crate::error::{StateError, StateResult};

/// Fails a `load` that does not finish within `after`.
///
/// The inner future is dropped on expiry, which cancels its I/O.
#[derive(Clone)]
pub struct TimeoutConfigurationLoader {
    inner: Arc<dyn ConfigurationLoader>,
    after: Duration,
}

impl TimeoutConfigurationLoader {
    pub fn new(inner: Arc<dyn ConfigurationLoader>, after: Duration) -> Self {
        Self { inner, after }
    }

    pub fn timeout(&self) -> Duration {
        self.after
    }
}

impl std::fmt::Debug for TimeoutConfigurationLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeoutConfigurationLoader")
            .field("after", &self.after)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ConfigurationLoader for TimeoutConfigurationLoader {
    fn supports(&self, source: &str) -> bool {
        self.inner.supports(source)
    }

    async fn load(&self, source: &str) -> StateResult<ConfigMap> {
        match tokio::time::timeout(self.after, self.inner.load(source)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(source = %source, after_ms = self.after.as_millis(), "load timed out");
                Err(StateError::Timeout {
                    locator: source.to_string(),
                    after: self.after,
                })
            }
        }
    }
}
