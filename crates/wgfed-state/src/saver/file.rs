//! Local file saver with atomic replace.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, instrument, warn};

use super::ConfigurationSaver;
use crate::error::{StateError, StateResult};
use crate::loader::{is_http_url, local_path, ConfigMap, DocumentFormat};

/// Writes `.yaml`, `.yml` or `.json` files, owner-readable only on Unix.
#[derive(Debug, Clone, Default)]
pub struct FileConfigurationSaver;

impl FileConfigurationSaver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConfigurationSaver for FileConfigurationSaver {
    fn supports(&self, destination: &str) -> bool {
        !is_http_url(destination) && DocumentFormat::from_locator(destination).is_some()
    }

    #[instrument(skip_all, fields(destination = %destination))]
    async fn save(&self, data: &ConfigMap, destination: &str) -> StateResult<()> {
        self.save_all(&[(data, destination)]).await
    }

    /// Stage every document in a temp file, then rename them into place.
    ///
    /// A failed rename puts back the documents already replaced, so the
    /// destinations either all change or all keep their previous content.
    #[instrument(skip_all, fields(documents = documents.len()))]
    async fn save_all(&self, documents: &[(&ConfigMap, &str)]) -> StateResult<()> {
        let mut staged: Vec<StagedFile> = Vec::with_capacity(documents.len());
        for (data, destination) in documents {
            match StagedFile::stage(data, destination).await {
                Ok(file) => staged.push(file),
                Err(e) => {
                    discard(&staged).await;
                    return Err(e);
                }
            }
        }

        for (index, file) in staged.iter().enumerate() {
            if let Err(e) = fs::rename(&file.temp_path, &file.path).await {
                warn!(destination = %file.destination, error = %e, "rolling back staged files");
                restore(&staged[..index]).await;
                discard(&staged[index..]).await;
                return Err(io_error(&file.destination, "failed to rename temp file", &e));
            }
        }

        for file in &staged {
            debug!(destination = %file.destination, bytes = file.bytes, "wrote configuration file");
        }
        Ok(())
    }
}

/// A rendered document waiting in its sibling temp file.
struct StagedFile {
    destination: String,
    path: PathBuf,
    temp_path: PathBuf,
    previous: Option<Vec<u8>>,
    bytes: usize,
}

impl StagedFile {
    async fn stage(data: &ConfigMap, destination: &str) -> StateResult<Self> {
        let format = DocumentFormat::from_locator(destination).ok_or_else(|| {
            StateError::UnsupportedSource {
                locator: destination.to_string(),
            }
        })?;
        let content = format.render(data, destination)?;

        // Never write what the strict loaders would not read back unchanged.
        let reloaded = format.parse(&content, destination).map_err(|e| {
            StateError::invalid_data_caused_by(
                format!("rendered {} does not load back", destination),
                e,
            )
        })?;
        if &reloaded != data {
            return Err(StateError::invalid_data(format!(
                "rendered {} does not load back unchanged",
                destination
            )));
        }

        let path = local_path(destination);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(destination, "failed to create directory", &e))?;
        }

        let previous = match fs::read(&path).await {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(io_error(destination, "failed to read current file", &e)),
        };

        let temp_path = temp_path_for(&path);
        write_private(&temp_path, content.as_bytes())
            .await
            .map_err(|e| io_error(destination, "failed to write temp file", &e))?;

        Ok(Self {
            destination: destination.to_string(),
            path,
            temp_path,
            previous,
            bytes: content.len(),
        })
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    path.with_file_name(temp_name)
}

/// Create `path` owner-readable only on Unix, replacing a leftover file.
async fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    match fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e),
        _ => {}
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    file.write_all(content).await?;
    file.sync_all().await
}

async fn discard(staged: &[StagedFile]) {
    for file in staged {
        let _ = fs::remove_file(&file.temp_path).await;
    }
}

async fn restore(replaced: &[StagedFile]) {
    for file in replaced {
        let restored = match &file.previous {
            Some(bytes) => {
                let temp_path = temp_path_for(&file.path);
                match write_private(&temp_path, bytes).await {
                    Ok(()) => fs::rename(&temp_path, &file.path).await,
                    Err(e) => Err(e),
                }
            }
            None => fs::remove_file(&file.path).await,
        };
        if let Err(e) = restored {
            error!(destination = %file.destination, error = %e, "failed to restore previous file");
        }
    }
}

fn io_error(destination: &str, context: &str, err: &std::io::Error) -> StateError {
    StateError::Io {
        locator: destination.to_string(),
        message: format!("{}: {}", context, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{ConfigurationLoader, FileConfigurationLoader};
    use serde_json::{json, Value as JsonValue};

    fn map(value: JsonValue) -> ConfigMap {
        match value {
            JsonValue::Object(map) => map,
            other => panic!("expected object, got {}", other),
        }
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let data = map(json!({"data": {"address": ["10.10.100.1/24"]}, "nonce": "00ff"}));

        for name in ["nested/dir/state.yaml", "state.json"] {
            let path = dir.path().join(name);
            let destination = path.to_str().unwrap();
            FileConfigurationSaver::new()
                .save(&data, destination)
                .await
                .unwrap();

            let loaded = FileConfigurationLoader::new().load(destination).await.unwrap();
            assert_eq!(loaded, data);
            assert!(!dir.path().join(format!("{}.tmp", name)).exists());
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_saved_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.yaml");
        FileConfigurationSaver::new()
            .save(&map(json!({"a": 1})), path.to_str().unwrap())
            .await
            .unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_leftover_temp_file_does_not_widen_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.yaml");
        let leftover = dir.path().join("state.yaml.tmp");
        std::fs::write(&leftover, "stale").unwrap();
        std::fs::set_permissions(&leftover, std::fs::Permissions::from_mode(0o644)).unwrap();

        FileConfigurationSaver::new()
            .save(&map(json!({"a": 1})), path.to_str().unwrap())
            .await
            .unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(!leftover.exists());
    }

    #[tokio::test]
    async fn test_save_all_leaves_files_alone_when_staging_fails() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("state.yaml");
        let second = dir.path().join("state.digest.json");
        std::fs::write(&first, "a: 1\n").unwrap();
        std::fs::create_dir(dir.path().join("state.digest.json.tmp")).unwrap();

        let data = map(json!({"a": 2}));
        let err = FileConfigurationSaver::new()
            .save_all(&[
                (&data, first.to_str().unwrap()),
                (&data, second.to_str().unwrap()),
            ])
            .await
            .unwrap_err();

        assert!(matches!(err, StateError::Io { .. }), "{:?}", err);
        assert_eq!(std::fs::read_to_string(&first).unwrap(), "a: 1\n");
        assert!(!second.exists());
        assert!(!dir.path().join("state.yaml.tmp").exists());
    }

    #[tokio::test]
    async fn test_restore_puts_back_replaced_files() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("state.yaml");
        let created = dir.path().join("state.digest.json");
        std::fs::write(&existing, "a: 1\n").unwrap();

        let data = map(json!({"a": 2}));
        let mut staged = Vec::new();
        for path in [&existing, &created] {
            let file = StagedFile::stage(&data, path.to_str().unwrap()).await.unwrap();
            fs::rename(&file.temp_path, &file.path).await.unwrap();
            staged.push(file);
        }
        assert_eq!(std::fs::read_to_string(&existing).unwrap(), "a: 2\n");

        restore(&staged).await;
        assert_eq!(std::fs::read_to_string(&existing).unwrap(), "a: 1\n");
        assert!(!created.exists());
    }

    #[tokio::test]
    async fn test_unrenderable_yaml_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.yaml");

        // Floats are outside the canonical subset, so they never load back.
        let err = FileConfigurationSaver::new()
            .save(&map(json!({"mtu": 1.5})), path.to_str().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::InvalidData { .. }), "{:?}", err);
        assert!(err.to_string().contains("does not load back"));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_unsupported_extension() {
        let saver = FileConfigurationSaver::new();
        assert!(!saver.supports("state.toml"));
        assert!(matches!(
            saver.save(&ConfigMap::new(), "state.toml").await,
            Err(StateError::UnsupportedSource { .. })
        ));
    }
}
