//! Signing saver proxy.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::{debug, info, instrument};

use super::ConfigurationSaver;
use crate::canonicalize::{check_limits, to_canonical_string};
use crate::envelope::{DigestResource, SignedEnvelope};
use crate::error::{StateError, StateResult};
use crate::loader::ConfigMap;
use crate::location::ConfigurationLocationFinder;
use crate::signer::MessageSigner;

/// Signs `data` under a fresh nonce and writes it as a state envelope.
///
/// With an inline placement the digest goes into the envelope. Otherwise the
/// envelope holds `data` and `nonce` only, and a `{digest}` resource is
/// written to the finder's digest locator together with it.
#[derive(Clone)]
pub struct SignConfigurationSaverProxy {
    inner: Arc<dyn ConfigurationSaver>,
    finder: Arc<dyn ConfigurationLocationFinder>,
    signer: Arc<dyn MessageSigner>,
}

impl SignConfigurationSaverProxy {
    pub fn new(
        inner: Arc<dyn ConfigurationSaver>,
        finder: Arc<dyn ConfigurationLocationFinder>,
        signer: Arc<dyn MessageSigner>,
    ) -> Self {
        Self {
            inner,
            finder,
            signer,
        }
    }
}

impl std::fmt::Debug for SignConfigurationSaverProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignConfigurationSaverProxy")
            .field("digest_inline", &self.finder.state_digest_belongs_to_state())
            .field("state_digest", &self.finder.state_digest())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ConfigurationSaver for SignConfigurationSaverProxy {
    fn supports(&self, destination: &str) -> bool {
        self.inner.supports(destination)
    }

    #[instrument(skip_all, fields(destination = %destination))]
    async fn save(&self, data: &ConfigMap, destination: &str) -> StateResult<()> {
        // Anything the strict loaders would reject must not be signed.
        check_limits(&JsonValue::Object(data.clone()), 1).map_err(|e| {
            StateError::invalid_data(format!("data for {} cannot be signed: {}", destination, e))
        })?;
        let message = to_canonical_string(data).map_err(|e| {
            StateError::invalid_data(format!("data for {} cannot be signed: {}", destination, e))
        })?;

        let nonce = self.signer.generate_nonce();
        let digest = self.signer.sign(&message, &nonce)?;

        if self.finder.state_digest_belongs_to_state() {
            let envelope = SignedEnvelope {
                data: data.clone(),
                nonce,
                digest: Some(digest),
            };
            self.inner.save(&envelope.into_map(), destination).await?;
            info!("wrote signed state with inline digest");
            return Ok(());
        }

        let envelope = SignedEnvelope {
            data: data.clone(),
            nonce,
            digest: None,
        }
        .into_map();
        let digest_resource = DigestResource { digest }.into_map();
        let digest_destination = self.finder.state_digest();

        // Envelope and digest only verify as a pair.
        self.inner
            .save_all(&[
                (&envelope, destination),
                (&digest_resource, digest_destination),
            ])
            .await?;
        debug!(digest_destination = %digest_destination, "wrote detached digest");
        info!("wrote signed state with detached digest");
        Ok(())
    }
}
