//! Baseline stores: JSON files on disk and an in-memory map.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::drift::SchemaSnapshot;
use crate::error::AppError;
use crate::traits::BaselineStore;

/// Stores each baseline as `<root>/<provider>/<schema_name>.json`.
///
/// Writes go to a temporary file first and are renamed into place.
#[derive(Debug, Clone)]
pub struct FileBaselineStore {
    root: PathBuf,
}

impl FileBaselineStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, provider: &str, schema_name: &str) -> PathBuf {
        self.root
            .join(encode_key(provider))
            .join(format!("{}.json", encode_key(schema_name)))
    }
}

/// Map a key to a single path component, one-to-one.
///
/// ASCII alphanumerics and `-` pass through; every other byte becomes `_xx`
/// (lowercase hex). The empty key is `_`, which no other key produces.
fn encode_key(key: &str) -> String {
    if key.is_empty() {
        return "_".to_string();
    }
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("_{byte:02x}"));
        }
    }
    encoded
}

fn storage_err(action: &str, path: &Path, e: impl std::fmt::Display) -> AppError {
    AppError::StorageError(format!("Failed to {action} {}: {e}", path.display()))
}

impl BaselineStore for FileBaselineStore {
    async fn load(
        &self,
        provider: &str,
        schema_name: &str,
    ) -> Result<Option<SchemaSnapshot>, AppError> {
        let path = self.path_for(provider, schema_name);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage_err("read baseline", &path, e)),
        };
        let snapshot: SchemaSnapshot =
            serde_json::from_str(&raw).map_err(|e| storage_err("decode baseline", &path, e))?;
        if snapshot.provider != provider || snapshot.schema_name != schema_name {
            tracing::warn!(
                path = %path.display(),
                provider = %provider,
                schema = %schema_name,
                stored_provider = %snapshot.provider,
                stored_schema = %snapshot.schema_name,
                "Ignoring baseline stored under a different key"
            );
            return Ok(None);
        }
        Ok(Some(snapshot))
    }

    async fn save(&self, snapshot: &SchemaSnapshot) -> Result<(), AppError> {
        let path = self.path_for(&snapshot.provider, &snapshot.schema_name);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| storage_err("create directory", dir, e))?;
        }

        let body = serde_json::to_vec_pretty(snapshot)?;
        let tmp = path.with_extension(format!("json.{}.tmp", snapshot.id.simple()));
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| storage_err("write baseline", &tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| storage_err("replace baseline", &path, e))?;

        tracing::debug!(path = %path.display(), version = snapshot.version, "Baseline written");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SchemaSnapshot>, AppError> {
        let mut snapshots = Vec::new();

        let mut providers = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(snapshots),
            Err(e) => return Err(storage_err("list", &self.root, e)),
        };

        while let Some(provider_dir) = providers
            .next_entry()
            .await
            .map_err(|e| storage_err("list", &self.root, e))?
        {
            let is_dir = provider_dir
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            if !is_dir {
                continue;
            }
            let dir_path = provider_dir.path();
            let mut files = tokio::fs::read_dir(&dir_path)
                .await
                .map_err(|e| storage_err("list", &dir_path, e))?;
            while let Some(file) = files
                .next_entry()
                .await
                .map_err(|e| storage_err("list", &dir_path, e))?
            {
                let path = file.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let decoded = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|e| e.to_string())
                    .and_then(|raw| {
                        serde_json::from_str::<SchemaSnapshot>(&raw).map_err(|e| e.to_string())
                    });
                match decoded {
                    Ok(snapshot) => snapshots.push(snapshot),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable baseline")
                    }
                }
            }
        }

        snapshots.sort_by(|a, b| {
            (a.provider.as_str(), a.schema_name.as_str())
                .cmp(&(b.provider.as_str(), b.schema_name.as_str()))
        });
        Ok(snapshots)
    }

    async fn delete(&self, provider: &str, schema_name: &str) -> Result<bool, AppError> {
        let path = self.path_for(provider, schema_name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(storage_err("delete baseline", &path, e)),
        }
    }
}

/// In-memory store for tests and ephemeral deployments.
#[derive(Debug, Clone, Default)]
pub struct MemoryBaselineStore {
    baselines: Arc<Mutex<BTreeMap<(String, String), SchemaSnapshot>>>,
}

impl MemoryBaselineStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<(String, String), SchemaSnapshot>> {
        self.baselines.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Baseline store mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

impl BaselineStore for MemoryBaselineStore {
    async fn load(
        &self,
        provider: &str,
        schema_name: &str,
    ) -> Result<Option<SchemaSnapshot>, AppError> {
        Ok(self
            .lock()
            .get(&(provider.to_string(), schema_name.to_string()))
            .cloned())
    }

    async fn save(&self, snapshot: &SchemaSnapshot) -> Result<(), AppError> {
        self.lock().insert(
            (snapshot.provider.clone(), snapshot.schema_name.clone()),
            snapshot.clone(),
        );
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SchemaSnapshot>, AppError> {
        Ok(self.lock().values().cloned().collect())
    }

    async fn delete(&self, provider: &str, schema_name: &str) -> Result<bool, AppError> {
        Ok(self
            .lock()
            .remove(&(provider.to_string(), schema_name.to_string()))
            .is_some())
    }
}
