//! Signed, layered configuration state for wg-federation.
//!
//! This crate loads configuration state that is only released to callers
//! after its signature has been verified, and writes state in the same
//! signed form:
//!
//! - Strict YAML/JSON parsing and JCS canonical messages
//! - File and HTTP loaders with deep-merged layering
//! - A verifying loader proxy with inline or detached digests
//! - Ed25519 message signing over DSSE PAE
//! - A signing saver proxy for the producer side
//! - Optional AES-256-GCM sealing of secret fields
//! - Shared/exclusive state locks and a state lifecycle manager
//! - A validated WireGuard interface record
//!
//! # Quick Start
//!
//! ```no_run
//! use wgfed_state::{build_verifying_loader, ConfigurationLoader, StateConfig, WireguardInterface};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = StateConfig::from_env()?;
//! let loader = build_verifying_loader(&config)?;
//!
//! let data = loader.load(&config.state_path).await?;
//! if let Some(serde_json::Value::Object(interface)) = data.get("interface") {
//!     let interface = WireguardInterface::from_map(interface)?;
//!     println!("listening on {}", interface.listen_port());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `WGFED_STATE_PATH` | State path or URL (default: `<data dir>/wg-federation/state.yaml`) |
//! | `WGFED_DIGEST_PLACEMENT` | `inline` (default) or `detached` |
//! | `WGFED_DIGEST_PATH` | Detached digest locator (default: `<state dir>/<stem>.digest.json`) |
//! | `WGFED_PUBLIC_KEY` | SPKI PEM verification key |
//! | `WGFED_PRIVATE_KEY` | PKCS#8 PEM signing key |
//! | `WGFED_LOAD_TIMEOUT` | Load deadline in seconds (default: 30) |
//! | `WGFED_HTTP_MAX_RETRIES` | Max retries for transient HTTP failures (default: 3) |
//! | `WGFED_ENCRYPTION_KEY` | Base64 AES-256 key file; seals secret fields when set |
//! | `WGFED_LOCK_TIMEOUT` | State lock wait in seconds (default: 10) |

pub mod canonicalize;
pub mod config;
mod digest;
pub mod encrypter;
pub mod envelope;
pub mod error;
mod keyfile;
pub mod loader;
pub mod location;
pub mod locker;
pub mod manager;
pub mod proxy;
pub mod saver;
pub mod secrets;
pub mod signer;
pub mod wireguard;

use std::sync::Arc;

use tracing::debug;

// Re-export main types
pub use config::StateConfig;
pub use encrypter::{AesGcmMessageEncrypter, EncryptionError, MessageEncrypter};
pub use envelope::{DigestResource, SignedEnvelope, DATA_KEY, DIGEST_KEY, NONCE_KEY};
pub use error::{StateError, StateResult};
pub use loader::{
    deep_merge, ConfigMap, ConfigurationLoader, ConfigurationLoaderChain, DocumentFormat,
    FileConfigurationLoader, HttpConfigurationLoader, TimeoutConfigurationLoader,
};
pub use location::{ConfigurationLocationFinder, DigestPlacement, StateLocations};
pub use locker::{ConfigurationLocker, FileConfigurationLocker, LockMode, StateLock};
pub use manager::StateDataManager;
pub use proxy::VerifySignatureConfigurationLoaderProxy;
pub use saver::{
    ConfigurationSaver, EncryptConfigurationSaverProxy, FileConfigurationSaver,
    NormalizeFilterConfigurationSaverProxy, SignConfigurationSaverProxy,
};
pub use secrets::{DecryptConfigurationLoaderProxy, SecretFields};
pub use signer::{
    compute_key_id, generate_nonce, Ed25519MessageSigner, KeyPairPaths, MessageSigner,
    SignatureError, PAYLOAD_TYPE_STATE_V1,
};
pub use wireguard::{ValidationError, WireguardInterface, WireguardInterfaceSpec};

pub use canonicalize::{
    canonical_digest, parse_json_strict, parse_yaml_strict, to_canonical_jcs_bytes,
    to_canonical_string, CanonicalizeError,
};

/// File and HTTP loaders for the given config.
pub fn build_loader_chain(config: &StateConfig) -> StateResult<ConfigurationLoaderChain> {
    let http = HttpConfigurationLoader::new(config.load_timeout())?
        .with_max_retries(config.http_max_retries);
    Ok(ConfigurationLoaderChain::new()
        .with_loader(Arc::new(FileConfigurationLoader::new()))
        .with_loader(Arc::new(http)))
}

/// Verifying loader for the given config.
///
/// Layers, outermost first: load deadline, secret decryption when a key is
/// configured, signature verification, then a file/HTTP chain that also
/// serves the detached digest.
pub fn build_verifying_loader(config: &StateConfig) -> StateResult<TimeoutConfigurationLoader> {
    config.validate()?;
    let key_path = config
        .public_key_path
        .as_ref()
        .ok_or_else(|| StateError::Config {
            message: format!(
                "a public key is required to verify state (set {})",
                config::ENV_PUBLIC_KEY
            ),
        })?;
    let signer = Ed25519MessageSigner::load_public_key_pem(key_path).map_err(|e| {
        StateError::Config {
            message: e.to_string(),
        }
    })?;
    debug!(key_id = %signer.key_id(), placement = %config.digest_placement, "verifying state");

    let chain: Arc<dyn ConfigurationLoader> = Arc::new(build_loader_chain(config)?);
    let mut loader: Arc<dyn ConfigurationLoader> =
        Arc::new(VerifySignatureConfigurationLoaderProxy::new(
            chain.clone(),
            chain,
            Arc::new(config.locations()),
            Arc::new(signer),
        ));
    if let Some(encrypter) = load_encrypter(config)? {
        loader = Arc::new(DecryptConfigurationLoaderProxy::new(loader, encrypter));
    }

    Ok(TimeoutConfigurationLoader::new(loader, config.load_timeout()))
}

/// Signing file saver for the given config.
///
/// Layers, outermost first: null filtering, secret encryption when a key is
/// configured, signing, then the file saver.
pub fn build_signing_saver(
    config: &StateConfig,
) -> StateResult<NormalizeFilterConfigurationSaverProxy> {
    config.validate()?;
    let key_path = config
        .private_key_path
        .as_ref()
        .ok_or_else(|| StateError::Config {
            message: format!(
                "a private key is required to sign state (set {})",
                config::ENV_PRIVATE_KEY
            ),
        })?;
    let signer = Ed25519MessageSigner::load_private_key_pem(key_path).map_err(|e| {
        StateError::Config {
            message: e.to_string(),
        }
    })?;
    debug!(key_id = %signer.key_id(), placement = %config.digest_placement, "signing state");

    let mut saver: Arc<dyn ConfigurationSaver> = Arc::new(SignConfigurationSaverProxy::new(
        Arc::new(FileConfigurationSaver::new()),
        Arc::new(config.locations()),
        Arc::new(signer),
    ));
    if let Some(encrypter) = load_encrypter(config)? {
        saver = Arc::new(EncryptConfigurationSaverProxy::new(saver, encrypter));
    }

    Ok(NormalizeFilterConfigurationSaverProxy::new(saver))
}

/// State manager reading and writing `config.state_path` under its lock.
///
/// Needs both keys: updates reload through the verifying loader and save
/// through the signing saver.
pub fn build_state_manager(config: &StateConfig) -> StateResult<StateDataManager> {
    let loader = build_verifying_loader(config)?;
    let saver = build_signing_saver(config)?;
    let locker = FileConfigurationLocker::new().with_timeout(config.lock_timeout());

    Ok(StateDataManager::new(
        config.state_path.clone(),
        Arc::new(loader),
        Arc::new(saver),
        Arc::new(locker),
    ))
}

fn load_encrypter(config: &StateConfig) -> StateResult<Option<Arc<dyn MessageEncrypter>>> {
    let Some(key_path) = &config.encryption_key_path else {
        return Ok(None);
    };
    let encrypter = AesGcmMessageEncrypter::load_key_file(key_path)?;
    debug!(key = %key_path.display(), "sealing secret fields");
    Ok(Some(Arc::new(encrypter)))
}
