use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Version tag instances reference when no explicit build is pinned.
pub const DEFAULT_VERSION_TAG: &str = "default";

/// Fingerprint environment fields every instance carries, with their
/// defaults. The core records and persists these but never interprets them,
/// and they never enter the launch argument vector.
pub const ENV_DEFAULTS: &[(&str, &str)] = &[
    ("resolution", "system"),
    ("font_fingerprint", "system"),
    ("webrtc", "disabled"),
    ("webgl_image", "random"),
    ("webgl_info", "custom"),
    ("canvas", "random"),
    ("audiocontext", "random"),
    ("speech_voices", "random"),
    ("do_not_track", "on"),
    ("client_rects", "random"),
    ("media_devices", "random"),
    ("device_name", "random"),
    ("mac_address", "custom"),
    ("hardware_concurrency", "12"),
    ("device_memory", "8"),
    ("ssl_fingerprint", "off"),
    ("speaker_protection", "on"),
];

/// Fresh env map holding every documented key at its default.
pub fn default_env() -> BTreeMap<String, String> {
    ENV_DEFAULTS
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

fn default_version_tag() -> String {
    DEFAULT_VERSION_TAG.to_string()
}

/// One managed Chromium instance as persisted in the config document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instance {
    /// Unique key within the registry.
    pub name: String,
    /// Opaque numeric-string fingerprint seed.
    #[serde(default)]
    pub fingerprint: String,
    /// Profile directory passed as `--user-data-dir`.
    #[serde(default)]
    pub profile_dir: PathBuf,
    /// IANA timezone identifier.
    #[serde(default)]
    pub timezone: String,
    /// Empty string means no proxy.
    #[serde(default)]
    pub proxy_server: String,
    #[serde(default = "default_version_tag")]
    pub version: String,
    /// Flat fingerprint-environment fields, opaque to the core.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl Instance {
    /// Insert any documented env key the instance lacks, keeping documents
    /// written by older builds loadable without losing new defaults.
    pub fn apply_env_defaults(&mut self) {
        for (key, value) in ENV_DEFAULTS {
            self.env
                .entry((*key).to_string())
                .or_insert_with(|| (*value).to_string());
        }
    }
}

impl Default for Instance {
    fn default() -> Self {
        Self {
            name: String::new(),
            fingerprint: String::new(),
            profile_dir: PathBuf::new(),
            timezone: String::new(),
            proxy_server: String::new(),
            version: default_version_tag(),
            env: default_env(),
        }
    }
}

/// Catalogue record for one installed version tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VersionRecord {
    /// Absolute path of the Chromium executable.
    pub path: String,
    /// How the record came to be: "downloaded" or "discovered".
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    /// RFC 3339 stamp of the executable mtime; empty when unavailable.
    #[serde(default)]
    pub last_updated: String,
}

/// Top-level persisted document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(default)]
    pub instances: Vec<Instance>,
    #[serde(default)]
    pub versions: BTreeMap<String, VersionRecord>,
}

impl FleetConfig {
    fn normalize(&mut self) {
        for instance in &mut self.instances {
            instance.apply_env_defaults();
        }
    }

    pub fn find_instance(&self, name: &str) -> Option<&Instance> {
        self.instances.iter().find(|i| i.name == name)
    }

    pub fn find_instance_mut(&mut self, name: &str) -> Option<&mut Instance> {
        self.instances.iter_mut().find(|i| i.name == name)
    }
}

/// Persistent store for the fleet document.
///
/// All mutation goes through [`ConfigStore::with_mut`], a read-modify-write
/// of the whole document under a store-level lock; readers get cheap `Arc`
/// snapshots. The store carries no global state and is injected wherever the
/// document is needed.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    write_lock: Mutex<()>,
    cache: RwLock<Option<Arc<FleetConfig>>>,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
            cache: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_from_disk(&self) -> Result<FleetConfig> {
        if !self.path.exists() {
            let config = FleetConfig::default();
            self.write_to_disk(&config)?;
            return Ok(config);
        }
        let content = fs::read_to_string(&self.path).map_err(|e| AppError::config(e.to_string()))?;
        match toml::from_str::<FleetConfig>(&content) {
            Ok(mut config) => {
                config.normalize();
                Ok(config)
            }
            Err(e) => {
                log::error!(
                    "config at {} is malformed ({e}); replacing with defaults",
                    self.path.display()
                );
                let config = FleetConfig::default();
                self.write_to_disk(&config)?;
                Ok(config)
            }
        }
    }

    fn write_to_disk(&self, config: &FleetConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| AppError::config(e.to_string()))?;
        }
        let content =
            toml::to_string_pretty(config).map_err(|e| AppError::config(e.to_string()))?;
        fs::write(&self.path, content).map_err(|e| AppError::config(e.to_string()))
    }

    /// Cached snapshot, or disk load when the cache is cold. Callers must
    /// hold `write_lock` or tolerate racing first loads.
    fn snapshot_locked(&self) -> Result<Arc<FleetConfig>> {
        {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(config) = cache.as_ref() {
                return Ok(Arc::clone(config));
            }
        }
        let config = Arc::new(self.read_from_disk()?);
        *self.cache.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&config));
        Ok(config)
    }

    /// Current document snapshot, loading from disk on first access.
    pub fn load(&self) -> Result<Arc<FleetConfig>> {
        {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(config) = cache.as_ref() {
                return Ok(Arc::clone(config));
            }
        }
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.snapshot_locked()
    }

    /// Execute a read-modify-write operation on the document while holding
    /// the store lock. The mutation is committed to the in-memory snapshot
    /// before the disk write: a failed save surfaces an error but does not
    /// roll the snapshot back.
    pub fn with_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut FleetConfig) -> Result<T>,
    {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let current = self.snapshot_locked()?;

        let mut updated = (*current).clone();
        let result = f(&mut updated)?;
        let updated = Arc::new(updated);

        *self.cache.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&updated));
        self.write_to_disk(&updated)?;

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{ConfigStore, Instance, VersionRecord, DEFAULT_VERSION_TAG, ENV_DEFAULTS};

    #[test]
    fn fresh_store_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.toml"));
        let config = store.load().unwrap();
        assert!(config.instances.is_empty());
        assert!(config.versions.is_empty());
        assert!(store.path().exists());
    }

    #[test]
    fn mutations_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let store = ConfigStore::new(&path);
        store
            .with_mut(|config| {
                config.instances.push(Instance {
                    name: "Instance 1".to_string(),
                    fingerprint: "1000".to_string(),
                    ..Instance::default()
                });
                config.versions.insert(
                    "135.0.1".to_string(),
                    VersionRecord {
                        path: "/somewhere/chrome.exe".to_string(),
                        kind: "downloaded".to_string(),
                        description: "Chromium 135.0.1".to_string(),
                        last_updated: String::new(),
                    },
                );
                Ok(())
            })
            .unwrap();

        // A second store reads what the first one wrote.
        let reloaded = ConfigStore::new(&path).load().unwrap();
        assert_eq!(reloaded.instances.len(), 1);
        assert_eq!(reloaded.instances[0].name, "Instance 1");
        assert_eq!(
            reloaded.versions.get("135.0.1").map(|v| v.kind.as_str()),
            Some("downloaded")
        );
    }

    #[test]
    fn document_missing_versions_key_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[[instances]]\nname = \"Instance 1\"\nfingerprint = \"1000\"\n",
        )
        .unwrap();

        let config = ConfigStore::new(&path).load().unwrap();
        assert!(config.versions.is_empty());
        assert_eq!(config.instances.len(), 1);
        // Scalar fields absent from the document take their defaults.
        assert_eq!(config.instances[0].version, DEFAULT_VERSION_TAG);
    }

    #[test]
    fn loaded_instances_gain_missing_env_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[[instances]]\nname = \"old\"\n\n[instances.env]\ncanvas = \"noise\"\n",
        )
        .unwrap();

        let config = ConfigStore::new(&path).load().unwrap();
        let env = &config.instances[0].env;
        // The key present in the document keeps its value.
        assert_eq!(env.get("canvas").map(String::as_str), Some("noise"));
        // Every documented key exists after the load.
        for (key, _) in ENV_DEFAULTS {
            assert!(env.contains_key(*key), "missing env key {key}");
        }
    }

    #[test]
    fn malformed_document_is_replaced_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "instances = \"not a list").unwrap();

        let config = ConfigStore::new(&path).load().unwrap();
        assert!(config.instances.is_empty());

        // The replacement was persisted, not just held in memory.
        let rewritten = fs::read_to_string(&path).unwrap();
        assert!(toml::from_str::<toml::Value>(&rewritten).is_ok());
    }
}
