//! State lifecycle: reload, update and create under the state lock.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::error::StateResult;
use crate::loader::{deep_merge, ConfigMap, ConfigurationLoader};
use crate::locker::{ConfigurationLocker, StateLock};
use crate::saver::ConfigurationSaver;

/// Reads and writes one state locator, holding the state lock around each
/// operation.
///
/// Reloads take the shared lock. Updates and creations take the exclusive
/// one, so a read-modify-write never interleaves with another writer.
#[derive(Clone)]
pub struct StateDataManager {
    state: String,
    loader: Arc<dyn ConfigurationLoader>,
    saver: Arc<dyn ConfigurationSaver>,
    locker: Arc<dyn ConfigurationLocker>,
}

impl std::fmt::Debug for StateDataManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateDataManager")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl StateDataManager {
    pub fn new(
        state: impl Into<String>,
        loader: Arc<dyn ConfigurationLoader>,
        saver: Arc<dyn ConfigurationSaver>,
        locker: Arc<dyn ConfigurationLocker>,
    ) -> Self {
        Self {
            state: state.into(),
            loader,
            saver,
            locker,
        }
    }

    /// State locator this manager works on.
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Load the state. A missing state is `StateError::NotFound`.
    #[instrument(skip(self), fields(state = %self.state))]
    pub async fn reload(&self) -> StateResult<ConfigMap> {
        let _lock = self.lock_shared().await?;
        self.loader.load(&self.state).await
    }

    /// Deep-merge `changes` into the current state and save the result.
    ///
    /// A missing state counts as empty. Returns the saved state.
    #[instrument(skip_all, fields(state = %self.state))]
    pub async fn update(&self, changes: ConfigMap) -> StateResult<ConfigMap> {
        let _lock = self.lock_exclusively().await?;

        let mut state = self.loader.load_if_exists(&self.state).await?;
        deep_merge(&mut state, changes);
        self.saver.save(&state, &self.state).await?;

        info!(keys = state.len(), "state updated");
        Ok(state)
    }

    /// Save `data` as the new state, whatever was there before.
    #[instrument(skip_all, fields(state = %self.state))]
    pub async fn create(&self, data: &ConfigMap) -> StateResult<()> {
        let _lock = self.lock_exclusively().await?;
        self.saver.save(data, &self.state).await?;
        info!("state created");
        Ok(())
    }

    async fn lock_shared(&self) -> StateResult<Option<StateLock>> {
        if !self.locker.supports(&self.state) {
            debug!("state cannot be locked, reading unlocked");
            return Ok(None);
        }
        self.locker.lock_shared(&self.state).await.map(Some)
    }

    async fn lock_exclusively(&self) -> StateResult<Option<StateLock>> {
        if !self.locker.supports(&self.state) {
            debug!("state cannot be locked, writing unlocked");
            return Ok(None);
        }
        self.locker.lock_exclusively(&self.state).await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StateError;
    use crate::loader::FileConfigurationLoader;
    use crate::locker::FileConfigurationLocker;
    use crate::saver::FileConfigurationSaver;
    use serde_json::{json, Value as JsonValue};
    use std::time::Duration;

    fn map(value: JsonValue) -> ConfigMap {
        match value {
            JsonValue::Object(map) => map,
            other => panic!("expected object, got {}", other),
        }
    }

    fn manager(state: &str) -> StateDataManager {
        StateDataManager::new(
            state,
            Arc::new(FileConfigurationLoader::new()),
            Arc::new(FileConfigurationSaver::new()),
            Arc::new(FileConfigurationLocker::new().with_timeout(Duration::from_secs(30))),
        )
    }

    #[tokio::test]
    async fn test_reload_missing_state_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("state.yaml");

        let err = manager(state.to_str().unwrap()).reload().await.unwrap_err();
        assert!(matches!(err, StateError::NotFound { .. }), "{:?}", err);
    }

    #[tokio::test]
    async fn test_create_then_update_merges() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("hq").join("state.yaml");
        let manager = manager(state.to_str().unwrap());

        manager
            .create(&map(json!({"interfaces": {"wg0": {"listen_port": 51820}}})))
            .await
            .unwrap();
        let updated = manager
            .update(map(json!({"interfaces": {"wg0": {"mtu": 1420}, "wg1": {"listen_port": 51821}}})))
            .await
            .unwrap();

        let expected = map(json!({
            "interfaces": {
                "wg0": {"listen_port": 51820, "mtu": 1420},
                "wg1": {"listen_port": 51821}
            }
        }));
        assert_eq!(updated, expected);
        assert_eq!(manager.reload().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_update_creates_missing_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("state.json");
        let manager = manager(state.to_str().unwrap());

        manager.update(map(json!({"mtu": 1420}))).await.unwrap();
        assert_eq!(manager.reload().await.unwrap(), map(json!({"mtu": 1420})));
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("state.yaml");
        let state = state.to_str().unwrap().to_string();
        manager(&state).create(&ConfigMap::new()).await.unwrap();

        let mut tasks = Vec::new();
        for index in 0..8 {
            let manager = manager(&state);
            tasks.push(tokio::spawn(async move {
                manager
                    .update(map(json!({"peers": {format!("peer{}", index): index}})))
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let peers = manager(&state).reload().await.unwrap()["peers"].clone();
        assert_eq!(peers.as_object().unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_update_waits_for_reader_lock() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("state.yaml");
        let state = state.to_str().unwrap().to_string();
        manager(&state).create(&map(json!({"mtu": 1420}))).await.unwrap();

        let reader = FileConfigurationLocker::new().lock_shared(&state).await.unwrap();
        let writer = {
            let manager = manager(&state);
            tokio::spawn(async move { manager.update(map(json!({"mtu": 1500}))).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!writer.is_finished());
        assert_eq!(manager(&state).reload().await.unwrap()["mtu"], 1420);

        drop(reader);
        writer.await.unwrap().unwrap();
        assert_eq!(manager(&state).reload().await.unwrap()["mtu"], 1500);
    }
}
