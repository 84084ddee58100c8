//! Secret fields of state data and the decrypting loader proxy.
//!
//! Secrets are sealed field by field so the rest of the state stays
//! readable and diffable. Sealing happens before signing and opening after
//! verification, so the signature always covers the sealed form.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::{debug, instrument};

use crate::encrypter::{is_sealed, EncryptionError, MessageEncrypter};
use crate::error::StateResult;
use crate::loader::{ConfigMap, ConfigurationLoader};

/// Keys whose string values are sealed wherever they appear.
pub const DEFAULT_SECRET_FIELDS: [&str; 3] = ["private_key", "shared_psk", "preshared_key"];

/// Set of mapping keys holding secrets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretFields(BTreeSet<String>);

impl Default for SecretFields {
    fn default() -> Self {
        Self::new(DEFAULT_SECRET_FIELDS)
    }
}

impl SecretFields {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(fields.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains(key)
    }

    /// Seal every secret string in `data`; returns how many were sealed.
    pub fn seal(
        &self,
        data: &mut ConfigMap,
        encrypter: &dyn MessageEncrypter,
    ) -> Result<usize, EncryptionError> {
        let mut sealed = 0;
        self.walk_map(data, "", &mut |_: &str, value: &mut String| {
            *value = encrypter.encrypt(value.as_str())?;
            sealed += 1;
            Ok(())
        })?;
        Ok(sealed)
    }

    /// Open every secret string in `data`; each one must be sealed.
    pub fn open(
        &self,
        data: &mut ConfigMap,
        encrypter: &dyn MessageEncrypter,
    ) -> Result<usize, EncryptionError> {
        let mut opened = 0;
        self.walk_map(data, "", &mut |field: &str, value: &mut String| {
            if !is_sealed(value.as_str()) {
                return Err(EncryptionError::NotEncrypted {
                    field: field.to_string(),
                });
            }
            *value = encrypter.decrypt(value.as_str())?.to_string();
            opened += 1;
            Ok(())
        })?;
        Ok(opened)
    }

    fn walk_map<F>(
        &self,
        map: &mut ConfigMap,
        path: &str,
        visit: &mut F,
    ) -> Result<(), EncryptionError>
    where
        F: FnMut(&str, &mut String) -> Result<(), EncryptionError>,
    {
        for (key, value) in map.iter_mut() {
            let field = if path.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", path, key)
            };
            match value {
                JsonValue::String(secret) if self.contains(key) => visit(&field, secret)?,
                other => self.walk_value(other, &field, visit)?,
            }
        }
        Ok(())
    }

    fn walk_value<F>(
        &self,
        value: &mut JsonValue,
        path: &str,
        visit: &mut F,
    ) -> Result<(), EncryptionError>
    where
        F: FnMut(&str, &mut String) -> Result<(), EncryptionError>,
    {
        match value {
            JsonValue::Object(map) => self.walk_map(map, path, visit),
            JsonValue::Array(items) => {
                for (index, item) in items.iter_mut().enumerate() {
                    self.walk_value(item, &format!("{}[{}]", path, index), visit)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Loader that opens sealed secret fields of what its inner loader returns.
///
/// Wrap it around the verifying proxy: data is decrypted only once its
/// signature has been checked.
#[derive(Clone)]
pub struct DecryptConfigurationLoaderProxy {
    inner: Arc<dyn ConfigurationLoader>,
    encrypter: Arc<dyn MessageEncrypter>,
    fields: SecretFields,
}

impl DecryptConfigurationLoaderProxy {
    pub fn new(inner: Arc<dyn ConfigurationLoader>, encrypter: Arc<dyn MessageEncrypter>) -> Self {
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

impl std::fmt::Debug for DecryptConfigurationLoaderProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptConfigurationLoaderProxy")
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ConfigurationLoader for DecryptConfigurationLoaderProxy {
    fn supports(&self, source: &str) -> bool {
        self.inner.supports(source)
    }

    #[instrument(skip_all, fields(source = %source))]
    async fn load(&self, source: &str) -> StateResult<ConfigMap> {
        let mut data = self.inner.load(source).await?;
        let opened = self.fields.open(&mut data, self.encrypter.as_ref())?;
        debug!(fields = opened, "decrypted secret fields");
        Ok(data)
    }
}
