//! On-disk state: the process configuration and named norm sets.
//!
//! Layout under the data directory (`~/.normcraft/` unless `NORMCRAFT_HOME`
//! is set):
//!
//! ```text
//! config.json           GlobalProcessConfig
//! <name>.norms.json     Vec<CreatedNorm>
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::{CreatedNorm, GlobalProcessConfig};

const CONFIG_FILE: &str = "config.json";
const NORM_SET_SUFFIX: &str = ".norms.json";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid norm set name '{0}'")]
    InvalidName(String),
}

#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    /// Store rooted at `NORMCRAFT_HOME`, falling back to `~/.normcraft`.
    pub fn open_default() -> Self {
        let root = std::env::var_os("NORMCRAFT_HOME")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".normcraft")
            });
        Self::at(root)
    }

    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // --- Process configuration ---

    /// The saved configuration, or `None` when the process is not configured.
    ///
    /// A file that no longer parses is removed so the next save starts clean.
    pub fn read_config(&self) -> Option<GlobalProcessConfig> {
        let path = self.root.join(CONFIG_FILE);
        let raw = fs::read(&path).ok()?;
        match serde_json::from_slice(&raw) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "discarding malformed config");
                if let Err(e) = fs::remove_file(&path) {
                    tracing::warn!(error = %e, "failed to remove malformed config");
                }
                None
            }
        }
    }

    pub fn write_config(&self, config: &GlobalProcessConfig) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(config)?;
        self.write_atomic(CONFIG_FILE, &json)
    }

    // --- Norm sets ---

    /// Names of stored norm sets, sorted.
    pub fn list_norm_sets(&self) -> Result<Vec<String>, StoreError> {
        if !self.root.exists() {
            return Ok(vec![]);
        }
        let mut names: Vec<String> = fs::read_dir(&self.root)?
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let name = entry.file_name().to_string_lossy().to_string();
                name.strip_suffix(NORM_SET_SUFFIX)
                    .filter(|n| !n.starts_with('.'))
                    .map(|n| n.to_string())
            })
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn read_norm_set(&self, name: &str) -> Result<Vec<CreatedNorm>, StoreError> {
        let path = self.norm_set_path(name)?;
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write a norm set via temp file + rename, so readers never see a
    /// half-written file.
    pub fn write_norm_set(&self, name: &str, norms: &[CreatedNorm]) -> Result<(), StoreError> {
        validate_name(name)?;
        let json = serde_json::to_string_pretty(norms)?;
        self.write_atomic(&format!("{name}{NORM_SET_SUFFIX}"), &json)?;
        tracing::info!(name, count = norms.len(), "norm set saved");
        Ok(())
    }

    /// Delete a norm set. Deleting a missing set is not an error.
    pub fn delete_norm_set(&self, name: &str) -> Result<(), StoreError> {
        let path = self.norm_set_path(name)?;
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    fn norm_set_path(&self, name: &str) -> Result<PathBuf, StoreError> {
        validate_name(name)?;
        Ok(self.root.join(format!("{name}{NORM_SET_SUFFIX}")))
    }

    fn write_atomic(&self, file_name: &str, data: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)?;
        let tmp = self.root.join(format!(".{file_name}.tmp"));
        let path = self.root.join(file_name);
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Set names become file names: no separators, no leading dot, no blanks.
fn validate_name(name: &str) -> Result<(), StoreError> {
    let ok = !name.trim().is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\']);
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NormSpec, StorageLocation};

    fn store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::at(dir.path());
        (dir, store)
    }

    fn sample_norm(id: &str) -> CreatedNorm {
        CreatedNorm {
            norm_id: id.into(),
            description: "d".into(),
            weight: 1.0,
            enabled: true,
            spec: NormSpec::ActivityDirectlyFollows {
                activity_a: "A".into(),
                activity_b: "B".into(),
                forbidden: false,
            },
            execution_filters: vec![],
        }
    }

    #[test]
    fn missing_config_means_not_configured() {
        let (_dir, store) = store();
        assert!(store.read_config().is_none());
    }

    #[test]
    fn config_round_trips() {
        let (_dir, store) = store();
        let config = GlobalProcessConfig {
            attribute_storage_strategy: StorageLocation::Node,
            ..GlobalProcessConfig::default()
        };
        store.write_config(&config).unwrap();
        assert_eq!(store.read_config(), Some(config));
    }

    #[test]
    fn malformed_config_is_discarded() {
        let (dir, store) = store();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();
        assert!(store.read_config().is_none());
        assert!(!path.exists());
    }

    #[test]
    fn non_utf8_config_is_discarded() {
        let (dir, store) = store();
        let path = dir.path().join("config.json");
        fs::write(&path, [0xff, 0xfe, b'{', 0x80]).unwrap();
        assert!(store.read_config().is_none());
        assert!(!path.exists());
    }

    #[test]
    fn norm_sets_list_read_delete() {
        let (dir, store) = store();
        store.write_norm_set("procurement", &[sample_norm("a"), sample_norm("b")]).unwrap();
        store.write_norm_set("billing", &[]).unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        assert_eq!(store.list_norm_sets().unwrap(), vec!["billing", "procurement"]);
        let loaded = store.read_norm_set("procurement").unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].norm_id, "b");
        assert!(!dir.path().join(".procurement.norms.json.tmp").exists());

        store.delete_norm_set("billing").unwrap();
        store.delete_norm_set("billing").unwrap();
        assert_eq!(store.list_norm_sets().unwrap(), vec!["procurement"]);
    }

    #[test]
    fn empty_store_lists_nothing() {
        let store = Store::at(std::env::temp_dir().join("normcraft-missing-store-dir"));
        assert!(store.list_norm_sets().unwrap().is_empty());
    }

    #[test]
    fn rejects_path_like_names() {
        let (_dir, store) = store();
        for bad in ["", "  ", "../x", "a/b", ".hidden"] {
            assert!(
                matches!(store.write_norm_set(bad, &[]), Err(StoreError::InvalidName(_))),
                "{bad:?}"
            );
        }
    }
}
