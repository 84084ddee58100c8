//! Signature-verifying loader proxy.
//!
//! Wraps a plain loader and hands out a document's `data` only after the
//! message signer has accepted it. Every load:
//!
//! 1. loads the raw envelope through the inner loader,
//! 2. extracts `data`, `nonce` and (inline) `digest`,
//! 3. resolves the digest inline or from the detached digest resource,
//! 4. verifies the JCS form of `data` with the nonce and digest,
//! 5. returns `data` alone.
//!
//! Shape problems, including a digest resource that cannot be loaded, are
//! `StateError::InvalidData`. Signer failures pass through untouched as
//! `StateError::Signature`.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::canonicalize::to_canonical_string;
use crate::digest::sha256_prefixed;
use crate::envelope::{DigestResource, SignedEnvelope, DIGEST_KEY};
use crate::error::{StateError, StateResult};
use crate::loader::{ConfigMap, ConfigurationLoader};
use crate::location::ConfigurationLocationFinder;
use crate::signer::MessageSigner;

/// Loader that only returns signature-verified data.
#[derive(Clone)]
pub struct VerifySignatureConfigurationLoaderProxy {
    inner: Arc<dyn ConfigurationLoader>,
    digest_loader: Arc<dyn ConfigurationLoader>,
    finder: Arc<dyn ConfigurationLocationFinder>,
    signer: Arc<dyn MessageSigner>,
}

impl VerifySignatureConfigurationLoaderProxy {
    /// `digest_loader` reads detached digest resources and is not itself verified.
    pub fn new(
        inner: Arc<dyn ConfigurationLoader>,
        digest_loader: Arc<dyn ConfigurationLoader>,
        finder: Arc<dyn ConfigurationLocationFinder>,
        signer: Arc<dyn MessageSigner>,
    ) -> Self {
        Self {
            inner,
            digest_loader,
            finder,
            signer,
        }
    }

    async fn resolve_digest(
        &self,
        envelope: &SignedEnvelope,
        source: &str,
    ) -> StateResult<String> {
        if self.finder.state_digest_belongs_to_state() {
            return envelope.digest.clone().ok_or_else(|| {
                StateError::invalid_data(format!(
                    "expected a '{}' in {}, but none was found",
                    DIGEST_KEY, source
                ))
            });
        }

        let locator = self.finder.state_digest();
        if envelope.digest.is_some() {
            debug!(source = %source, "ignoring inline digest, digest placement is detached");
        }

        let raw = self.digest_loader.load(locator).await.map_err(|e| {
            StateError::invalid_data_caused_by(
                format!("failed to load digest from {}: {}", locator, e),
                e,
            )
        })?;
        let resource = DigestResource::from_raw(&raw, locator)?;
        debug!(digest_source = %locator, "resolved detached digest");
        Ok(resource.digest)
    }
}

impl std::fmt::Debug for VerifySignatureConfigurationLoaderProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifySignatureConfigurationLoaderProxy")
            .field("digest_inline", &self.finder.state_digest_belongs_to_state())
            .field("state_digest", &self.finder.state_digest())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ConfigurationLoader for VerifySignatureConfigurationLoaderProxy {
    fn supports(&self, source: &str) -> bool {
        self.inner.supports(source)
    }

    #[instrument(skip_all, fields(source = %source))]
    async fn load(&self, source: &str) -> StateResult<ConfigMap> {
        let raw = self.inner.load(source).await?;
        let envelope = SignedEnvelope::from_raw(raw, source)?;
        let digest = self.resolve_digest(&envelope, source).await?;

        let message = to_canonical_string(&envelope.data).map_err(|e| {
            StateError::invalid_data(format!("cannot canonicalize data in {}: {}", source, e))
        })?;

        self.signer
            .verify_sign(&message, &envelope.nonce, &digest)?;
        debug!(
            state_digest = %sha256_prefixed(message.as_bytes()),
            "state signature verified"
        );

        Ok(envelope.data)
    }
}
