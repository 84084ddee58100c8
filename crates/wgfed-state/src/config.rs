//! State loading options.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{StateError, StateResult};
use crate::location::{DigestPlacement, StateLocations};

pub const ENV_STATE_PATH: &str = "WGFED_STATE_PATH";
pub const ENV_DIGEST_PLACEMENT: &str = "WGFED_DIGEST_PLACEMENT";
pub const ENV_DIGEST_PATH: &str = "WGFED_DIGEST_PATH";
pub const ENV_PUBLIC_KEY: &str = "WGFED_PUBLIC_KEY";
pub const ENV_PRIVATE_KEY: &str = "WGFED_PRIVATE_KEY";
pub const ENV_LOAD_TIMEOUT: &str = "WGFED_LOAD_TIMEOUT";
pub const ENV_HTTP_MAX_RETRIES: &str = "WGFED_HTTP_MAX_RETRIES";
pub const ENV_ENCRYPTION_KEY: &str = "WGFED_ENCRYPTION_KEY";
pub const ENV_LOCK_TIMEOUT: &str = "WGFED_LOCK_TIMEOUT";

/// Options for locating, loading and signing state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateConfig {
    /// Path or URL of the signed state.
    #[serde(default = "default_state_path")]
    pub state_path: String,

    /// Whether the digest is inline or detached.
    #[serde(default)]
    pub digest_placement: DigestPlacement,

    /// Detached digest locator; derived from `state_path` when unset.
    #[serde(default)]
    pub digest_path: Option<String>,

    /// SPKI PEM public key used for verification.
    #[serde(default)]
    pub public_key_path: Option<PathBuf>,

    /// PKCS#8 PEM private key used for signing.
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,

    /// Deadline for one load, digest included, in seconds.
    #[serde(default = "default_load_timeout")]
    pub load_timeout_secs: u64,

    /// Retries for transient HTTP failures.
    #[serde(default = "default_http_max_retries")]
    pub http_max_retries: u32,

    /// Base64 AES-256 key file; secret fields are sealed when set.
    #[serde(default)]
    pub encryption_key_path: Option<PathBuf>,

    /// How long to wait for the state lock, in seconds.
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_secs: u64,
}

fn default_state_path() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wg-federation")
        .join("state.yaml")
        .to_string_lossy()
        .into_owned()
}

fn default_load_timeout() -> u64 {
    30
}

fn default_http_max_retries() -> u32 {
    3
}

fn default_lock_timeout() -> u64 {
    10
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            digest_placement: DigestPlacement::default(),
            digest_path: None,
            public_key_path: None,
            private_key_path: None,
            load_timeout_secs: default_load_timeout(),
            http_max_retries: default_http_max_retries(),
            encryption_key_path: None,
            lock_timeout_secs: default_lock_timeout(),
        }
    }
}

impl StateConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `WGFED_STATE_PATH` | State path or URL |
    /// | `WGFED_DIGEST_PLACEMENT` | `inline` or `detached` |
    /// | `WGFED_DIGEST_PATH` | Detached digest path or URL |
    /// | `WGFED_PUBLIC_KEY` | Verification key (SPKI PEM) |
    /// | `WGFED_PRIVATE_KEY` | Signing key (PKCS#8 PEM) |
    /// | `WGFED_LOAD_TIMEOUT` | Load deadline in seconds |
    /// | `WGFED_HTTP_MAX_RETRIES` | HTTP retries |
    /// | `WGFED_ENCRYPTION_KEY` | Secret field key file (Base64) |
    /// | `WGFED_LOCK_TIMEOUT` | State lock wait in seconds |
    ///
    /// Unset variables keep their defaults; malformed values are errors.
    pub fn from_env() -> StateResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            state_path: env_string(ENV_STATE_PATH).unwrap_or(defaults.state_path),
            digest_placement: env_parse(ENV_DIGEST_PLACEMENT)?
                .unwrap_or(defaults.digest_placement),
            digest_path: env_string(ENV_DIGEST_PATH),
            public_key_path: env_string(ENV_PUBLIC_KEY).map(PathBuf::from),
            private_key_path: env_string(ENV_PRIVATE_KEY).map(PathBuf::from),
            load_timeout_secs: env_parse(ENV_LOAD_TIMEOUT)?.unwrap_or(defaults.load_timeout_secs),
            http_max_retries: env_parse(ENV_HTTP_MAX_RETRIES)?
                .unwrap_or(defaults.http_max_retries),
            encryption_key_path: env_string(ENV_ENCRYPTION_KEY).map(PathBuf::from),
            lock_timeout_secs: env_parse(ENV_LOCK_TIMEOUT)?.unwrap_or(defaults.lock_timeout_secs),
        })
    }

    /// Read config from a YAML file; absent fields take their defaults.
    pub fn from_yaml_file(path: &Path) -> StateResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| StateError::Config {
            message: format!("failed to read {}: {}", path.display(), e),
        })?;
        serde_yaml::from_str(&content).map_err(|e| StateError::Config {
            message: format!("invalid config {}: {}", path.display(), e),
        })
    }

    pub fn with_state_path(mut self, state_path: impl Into<String>) -> Self {
        self.state_path = state_path.into();
        self
    }

    pub fn with_digest_placement(mut self, placement: DigestPlacement) -> Self {
        self.digest_placement = placement;
        self
    }

    /// Detached digest locator; also switches placement to detached.
    pub fn with_digest_path(mut self, digest_path: impl Into<String>) -> Self {
        self.digest_path = Some(digest_path.into());
        self.digest_placement = DigestPlacement::Detached;
        self
    }

    pub fn with_public_key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.public_key_path = Some(path.into());
        self
    }

    pub fn with_private_key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.private_key_path = Some(path.into());
        self
    }

    pub fn with_load_timeout_secs(mut self, secs: u64) -> Self {
        self.load_timeout_secs = secs;
        self
    }

    pub fn with_http_max_retries(mut self, retries: u32) -> Self {
        self.http_max_retries = retries;
        self
    }

    pub fn with_encryption_key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.encryption_key_path = Some(path.into());
        self
    }

    pub fn with_lock_timeout_secs(mut self, secs: u64) -> Self {
        self.lock_timeout_secs = secs;
        self
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }

    /// Location finder for this config.
    pub fn locations(&self) -> StateLocations {
        let locations = StateLocations::new(self.state_path.clone(), self.digest_placement);
        match &self.digest_path {
            Some(digest_path) => locations.with_digest_locator(digest_path.clone()),
            None => locations,
        }
    }

    /// Reject values that cannot produce a working loader.
    pub fn validate(&self) -> StateResult<()> {
        if self.state_path.trim().is_empty() {
            return Err(StateError::Config {
                message: "state_path must not be empty".to_string(),
            });
        }
        if self.load_timeout_secs == 0 {
            return Err(StateError::Config {
                message: "load_timeout_secs must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(name: &str) -> StateResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_string(name)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| StateError::Config {
                message: format!("invalid {}='{}': {}", name, raw, e),
            })
        })
        .transpose()
}
