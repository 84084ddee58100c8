//! Signed envelope and detached digest resource shapes.

use serde_json::Value as JsonValue;

use crate::error::{StateError, StateResult};
use crate::loader::ConfigMap;

/// Key holding the configuration payload.
pub const DATA_KEY: &str = "data";

/// Key holding the nonce mixed into the signature.
pub const NONCE_KEY: &str = "nonce";

/// Key holding the digest, inline or in a detached resource.
pub const DIGEST_KEY: &str = "digest";

/// A raw state document split into its parts.
///
/// Holding one of these does not mean the data is trusted. Only the
/// verifying loader hands `data` to callers, after the signer accepts it.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedEnvelope {
    pub data: ConfigMap,
    pub nonce: String,
    /// Present when the digest is stored next to the data.
    pub digest: Option<String>,
}

impl SignedEnvelope {
    /// Extract `data`, `nonce` and an optional `digest` from a loaded mapping.
    pub fn from_raw(mut raw: ConfigMap, locator: &str) -> StateResult<Self> {
        let data = match raw.remove(DATA_KEY) {
            Some(JsonValue::Object(map)) => map,
            Some(other) => {
                return Err(StateError::invalid_data(format!(
                    "'{}' in {} must be a mapping, found {}",
                    DATA_KEY,
                    locator,
                    value_type_name(&other)
                )))
            }
            None => {
                return Err(StateError::invalid_data(format!(
                    "expected a '{}' mapping in {}, but none was found",
                    DATA_KEY, locator
                )))
            }
        };

        let nonce = match raw.remove(NONCE_KEY) {
            Some(JsonValue::String(nonce)) if !nonce.is_empty() => nonce,
            Some(JsonValue::String(_)) => {
                return Err(StateError::invalid_data(format!(
                    "'{}' in {} is empty",
                    NONCE_KEY, locator
                )))
            }
            Some(other) => {
                return Err(StateError::invalid_data(format!(
                    "'{}' in {} must be a string, found {}",
                    NONCE_KEY,
                    locator,
                    value_type_name(&other)
                )))
            }
            None => {
                return Err(StateError::invalid_data(format!(
                    "expected a '{}' in {}, but none was found",
                    NONCE_KEY, locator
                )))
            }
        };

        let digest = match raw.remove(DIGEST_KEY) {
            Some(JsonValue::String(digest)) => Some(digest),
            Some(JsonValue::Null) | None => None,
            Some(other) => {
                return Err(StateError::invalid_data(format!(
                    "'{}' in {} must be a string, found {}",
                    DIGEST_KEY,
                    locator,
                    value_type_name(&other)
                )))
            }
        };

        Ok(Self {
            data,
            nonce,
            digest,
        })
    }

    /// Serialize back to a mapping, writing `digest` only when present.
    pub fn into_map(self) -> ConfigMap {
        let mut map = ConfigMap::new();
        map.insert(DATA_KEY.to_string(), JsonValue::Object(self.data));
        map.insert(NONCE_KEY.to_string(), JsonValue::String(self.nonce));
        if let Some(digest) = self.digest {
            map.insert(DIGEST_KEY.to_string(), JsonValue::String(digest));
        }
        map
    }
}

/// A digest stored apart from the state it protects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestResource {
    pub digest: String,
}

impl DigestResource {
    /// Read the `digest` key of a loaded mapping.
    pub fn from_raw(raw: &ConfigMap, locator: &str) -> StateResult<Self> {
        match raw.get(DIGEST_KEY) {
            Some(JsonValue::String(digest)) if !digest.is_empty() => Ok(Self {
                digest: digest.clone(),
            }),
            Some(JsonValue::String(_)) => Err(StateError::invalid_data(format!(
                "'{}' in {} is empty",
                DIGEST_KEY, locator
            ))),
            Some(other) => Err(StateError::invalid_data(format!(
                "'{}' in {} must be a string, found {}",
                DIGEST_KEY,
                locator,
                value_type_name(other)
            ))),
            None => Err(StateError::invalid_data(format!(
                "expected a '{}' in {}, but none was found",
                DIGEST_KEY, locator
            ))),
        }
    }

    pub fn into_map(self) -> ConfigMap {
        let mut map = ConfigMap::new();
        map.insert(DIGEST_KEY.to_string(), JsonValue::String(self.digest));
        map
    }
}

/// Human-readable name of a JSON value's type.
pub fn value_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(n) if n.is_f64() => "float",
        JsonValue::Number(_) => "integer",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "sequence",
        JsonValue::Object(_) => "mapping",
    }
}
