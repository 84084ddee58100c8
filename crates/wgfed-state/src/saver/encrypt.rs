//! Encrypting saver proxy.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::ConfigurationSaver;
use crate::encrypter::MessageEncrypter;
use crate::error::StateResult;
use crate::loader::ConfigMap;
use crate::secrets::SecretFields;

/// Seals secret fields, then hands the data to the inner saver.
///
/// Put the signing saver inside this one so the signature covers the
/// sealed values that are actually stored.
#[derive(Clone)]
pub struct EncryptConfigurationSaverProxy {
    inner: Arc<dyn ConfigurationSaver>,
    encrypter: Arc<dyn MessageEncrypter>,
    fields: SecretFields,
}

impl EncryptConfigurationSaverProxy {
    pub fn new(inner: Arc<dyn ConfigurationSaver>, encrypter: Arc<dyn MessageEncrypter>) -> Self {
        Self {
            inner,
            encrypter,
            fields: SecretFields::default(),
        }
    }

    pub fn with_secret_fields(mut self, fields: SecretFields) -> Self {
        self.fields = fields;
        self
    }
}

impl std::fmt::Debug for EncryptConfigurationSaverProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptConfigurationSaverProxy")
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ConfigurationSaver for EncryptConfigurationSaverProxy {
    fn supports(&self, destination: &str) -> bool {
        self.inner.supports(destination)
    }

    #[instrument(skip_all, fields(destination = %destination))]
    async fn save(&self, data: &ConfigMap, destination: &str) -> StateResult<()> {
        let mut sealed = data.clone();
        let count = self.fields.seal(&mut sealed, self.encrypter.as_ref())?;
        debug!(fields = count, "encrypted secret fields");
        self.inner.save(&sealed, destination).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encrypter::{is_sealed, AesGcmMessageEncrypter};
    use serde_json::{json, Value as JsonValue};
    use std::sync::Mutex;

    #[derive(Default)]
    struct LastSaved(Mutex<Option<ConfigMap>>);

    #[async_trait]
    impl ConfigurationSaver for LastSaved {
        fn supports(&self, destination: &str) -> bool {
            destination.ends_with(".yaml")
        }

        async fn save(&self, data: &ConfigMap, _destination: &str) -> StateResult<()> {
            *self.0.lock().unwrap() = Some(data.clone());
            Ok(())
        }
    }

    fn map(value: JsonValue) -> ConfigMap {
        match value {
            JsonValue::Object(map) => map,
            other => panic!("expected object, got {}", other),
        }
    }

    #[tokio::test]
    async fn test_secrets_are_sealed_before_saving() {
        let inner = Arc::new(LastSaved::default());
        let encrypter = Arc::new(AesGcmMessageEncrypter::generate());
        let saver = EncryptConfigurationSaverProxy::new(inner.clone(), encrypter.clone());

        let data = map(json!({"interface": {"private_key": "k", "listen_port": 51820}}));
        saver.save(&data, "state.yaml").await.unwrap();

        let saved = inner.0.lock().unwrap().clone().unwrap();
        let sealed = saved["interface"]["private_key"].as_str().unwrap();
        assert!(is_sealed(sealed));
        assert_eq!(encrypter.decrypt(sealed).unwrap().as_str(), "k");
        assert_eq!(saved["interface"]["listen_port"], 51820);
        assert_eq!(data["interface"]["private_key"], "k", "input is left alone");
        assert!(saver.supports("state.yaml"));
        assert!(!saver.supports("state.toml"));
    }
}
