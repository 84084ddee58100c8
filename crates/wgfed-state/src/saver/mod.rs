//! Configuration savers, the producer side of the loaders.

mod encrypt;
mod file;
mod normalize;
mod sign;

use async_trait::async_trait;

use crate::error::StateResult;
use crate::loader::ConfigMap;

pub use encrypt::EncryptConfigurationSaverProxy;
pub use file::FileConfigurationSaver;
pub use normalize::{drop_nulls, NormalizeFilterConfigurationSaverProxy};
pub use sign::SignConfigurationSaverProxy;

/// Writes configuration mappings to destination locators.
#[async_trait]
pub trait ConfigurationSaver: Send + Sync {
    /// Whether this saver handles `destination`.
    fn supports(&self, destination: &str) -> bool;

    /// Write `data` to `destination`, replacing what is there.
    async fn save(&self, data: &ConfigMap, destination: &str) -> StateResult<()>;

    /// Write documents that are only valid together.
    ///
    /// The default writes them one by one; savers that can stage their
    /// writes override it so a failure leaves every destination unchanged.
    async fn save_all(&self, documents: &[(&ConfigMap, &str)]) -> StateResult<()> {
        for (data, destination) in documents {
            self.save(data, destination).await?;
        }
        Ok(())
    }
}
