//! Normalizing saver proxy.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::{debug, instrument};

use super::ConfigurationSaver;
use crate::error::StateResult;
use crate::loader::ConfigMap;

/// Drops `null` mapping entries before handing data to the inner saver.
///
/// An unset optional field and an absent one then sign and store the same
/// way.
#[derive(Clone)]
pub struct NormalizeFilterConfigurationSaverProxy {
    inner: Arc<dyn ConfigurationSaver>,
}

impl NormalizeFilterConfigurationSaverProxy {
    pub fn new(inner: Arc<dyn ConfigurationSaver>) -> Self {
        Self { inner }
    }
}

impl std::fmt::Debug for NormalizeFilterConfigurationSaverProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NormalizeFilterConfigurationSaverProxy")
            .finish_non_exhaustive()
    }
}

/// Remove `null` entries from every mapping in `map`; returns how many went.
pub fn drop_nulls(map: &mut ConfigMap) -> usize {
    let before = map.len();
    map.retain(|_, value| !value.is_null());
    let mut dropped = before - map.len();

    for value in map.values_mut() {
        dropped += drop_nulls_in(value);
    }
    dropped
}

fn drop_nulls_in(value: &mut JsonValue) -> usize {
    match value {
        JsonValue::Object(map) => drop_nulls(map),
        JsonValue::Array(items) => items.iter_mut().map(drop_nulls_in).sum(),
        _ => 0,
    }
}

#[async_trait]
impl ConfigurationSaver for NormalizeFilterConfigurationSaverProxy {
    fn supports(&self, destination: &str) -> bool {
        self.inner.supports(destination)
    }

    #[instrument(skip_all, fields(destination = %destination))]
    async fn save(&self, data: &ConfigMap, destination: &str) -> StateResult<()> {
        let mut normalized = data.clone();
        let dropped = drop_nulls(&mut normalized);
        if dropped > 0 {
            debug!(dropped, "dropped null entries");
        }
        self.inner.save(&normalized, destination).await
    }
}
