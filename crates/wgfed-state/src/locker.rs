//! Advisory locks around state reloads and saves.
//!
//! Readers take a shared lock, writers an exclusive one, on a sibling
//! `<state>.lock` file. The state file itself is replaced by rename on every
//! save, so it cannot carry the lock.

use std::fs::File;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use fs2::FileExt;
use tracing::{debug, warn};

use crate::error::{StateError, StateResult};
use crate::loader::{is_http_url, local_path};

/// How long a lock is waited for when none is configured.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(50);
const MAX_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Lock flavour held by a [`StateLock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

impl std::fmt::Display for LockMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shared => write!(f, "shared"),
            Self::Exclusive => write!(f, "exclusive"),
        }
    }
}

/// Takes shared or exclusive locks on state locators.
#[async_trait]
pub trait ConfigurationLocker: Send + Sync {
    /// Whether this locker can lock `locator`.
    fn supports(&self, locator: &str) -> bool;

    /// Lock for reading; other readers are let in.
    async fn lock_shared(&self, locator: &str) -> StateResult<StateLock>;

    /// Lock for writing; nobody else is let in.
    async fn lock_exclusively(&self, locator: &str) -> StateResult<StateLock>;
}

/// A held lock, released on drop.
#[derive(Debug)]
pub struct StateLock {
    file: File,
    path: PathBuf,
    mode: LockMode,
}

impl StateLock {
    pub fn mode(&self) -> LockMode {
        self.mode
    }

    /// Path of the lock file.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "failed to release state lock");
        }
    }
}

/// Locks local state files with `flock`-style advisory locks.
#[derive(Debug, Clone)]
pub struct FileConfigurationLocker {
    timeout: Duration,
}

impl Default for FileConfigurationLocker {
    fn default() -> Self {
        Self::new()
    }
}

impl FileConfigurationLocker {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Give up with `StateError::Timeout` after waiting this long.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Lock file guarding `locator`.
    pub fn lock_path(locator: &str) -> PathBuf {
        let path = local_path(locator);
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(".lock");
        path.with_file_name(name)
    }

    async fn acquire(&self, locator: &str, mode: LockMode) -> StateResult<StateLock> {
        if !self.supports(locator) {
            return Err(StateError::UnsupportedSource {
                locator: locator.to_string(),
            });
        }

        let path = Self::lock_path(locator);
        let lock_locator = path.display().to_string();

        // Writers may be creating the state; readers need it to exist.
        if mode == LockMode::Exclusive {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StateError::from_io(lock_locator.clone(), &e))?;
            }
        }
        let file = tokio::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .await
            .map_err(|e| StateError::from_io(lock_locator.clone(), &e))?
            .into_std()
            .await;

        let deadline = Instant::now() + self.timeout;
        let mut retry_delay = INITIAL_RETRY_DELAY;

        loop {
            // fs2's methods are called by path; newer std has inherent ones.
            let attempt = match mode {
                LockMode::Shared => FileExt::try_lock_shared(&file),
                LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
            };

            match attempt {
                Ok(()) => {
                    debug!(lock = %lock_locator, mode = %mode, "acquired state lock");
                    return Ok(StateLock { file, path, mode });
                }
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    if Instant::now() >= deadline {
                        return Err(StateError::Timeout {
                            locator: lock_locator,
                            after: self.timeout,
                        });
                    }
                    debug!(lock = %lock_locator, mode = %mode, "state lock busy, waiting");
                    tokio::time::sleep(retry_delay).await;
                    retry_delay = (retry_delay * 2).min(MAX_RETRY_DELAY);
                }
                Err(e) => return Err(StateError::from_io(lock_locator, &e)),
            }
        }
    }
}

#[async_trait]
impl ConfigurationLocker for FileConfigurationLocker {
    fn supports(&self, locator: &str) -> bool {
        !is_http_url(locator)
    }

    async fn lock_shared(&self, locator: &str) -> StateResult<StateLock> {
        self.acquire(locator, LockMode::Shared).await
    }

    async fn lock_exclusively(&self, locator: &str) -> StateResult<StateLock> {
        self.acquire(locator, LockMode::Exclusive).await
    }
}
