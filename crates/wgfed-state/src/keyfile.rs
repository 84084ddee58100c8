//! Creating key files on disk.

use std::io::Write;
use std::path::Path;

use crate::error::{StateError, StateResult};

/// Mode of private and secret key files on Unix.
pub const PRIVATE_KEY_MODE: u32 = 0o600;

/// Mode of public key files on Unix.
pub const PUBLIC_KEY_MODE: u32 = 0o644;

/// Fail with a config error if any of `paths` exists.
pub(crate) fn refuse_existing<P: AsRef<Path>>(paths: &[P]) -> StateResult<()> {
    for path in paths {
        let path: &Path = path.as_ref();
        if path.exists() {
            return Err(StateError::Config {
                message: format!("{} already exists", path.display()),
            });
        }
    }
    Ok(())
}

/// Create `path` holding `content`, born with `mode` on Unix.
///
/// An existing file is removed first so its permissions are not inherited.
pub(crate) fn create_key_file(path: &Path, content: &[u8], mode: u32) -> StateResult<()> {
    let locator = path.display().to_string();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| StateError::from_io(locator.clone(), &e))?;
    }
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
            return Err(StateError::from_io(locator, &e))
        }
        _ => {}
    }

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    let mut file = options
        .open(path)
        .map_err(|e| StateError::from_io(locator.clone(), &e))?;
    file.write_all(content)
        .and_then(|()| file.sync_all())
        .map_err(|e| StateError::from_io(locator, &e))
}
