//! Data directory layout.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};
use crate::platform::Platform;

/// On-disk layout rooted at a single data directory:
///
/// ```text
/// <root>/config.toml            persisted instance + version document
/// <root>/app/<platform>/<tag>/  versioned Chromium installs
/// <root>/downloads/             downloaded archives and transient scratch dirs
/// ```
///
/// The root is injected so tests and embedders can relocate everything.
#[derive(Debug, Clone)]
pub struct DataDirs {
    root: PathBuf,
    platform: Platform,
}

impl DataDirs {
    pub fn new(root: impl Into<PathBuf>, platform: Platform) -> Self {
        Self {
            root: root.into(),
            platform,
        }
    }

    /// Layout rooted at `~/.chromium-fleet` for the given platform.
    pub fn for_home(platform: Platform) -> Result<Self> {
        let home = dirs::home_dir().ok_or_else(|| AppError::io("cannot find home directory"))?;
        Ok(Self::new(home.join(".chromium-fleet"), platform))
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the persisted config document.
    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Directory holding this platform's versioned installs.
    pub fn platform_dir(&self) -> PathBuf {
        self.root.join("app").join(self.platform.install_dir_name())
    }

    /// Install directory for one version tag.
    pub fn version_dir(&self, tag: &str) -> PathBuf {
        self.platform_dir().join(tag)
    }

    /// Directory downloaded archives land in.
    pub fn download_dir(&self) -> PathBuf {
        self.root.join("downloads")
    }

    /// Destination path for a downloaded release asset.
    pub fn archive_path(&self, asset_name: &str) -> PathBuf {
        self.download_dir().join(asset_name)
    }

    /// Scratch directory a zip archive is extracted into before its contents
    /// replace the versioned install.
    pub fn extract_scratch_dir(&self, tag: &str) -> PathBuf {
        self.download_dir().join(format!("tmp_extract_{tag}"))
    }

    /// Mount point used while a dmg image is attached.
    pub fn dmg_mount_point(&self, tag: &str) -> PathBuf {
        self.download_dir()
            .join(format!("mnt_{}", tag.replace('.', "_")))
    }

    /// Ensure all required data directories exist.
    pub fn ensure(&self) -> Result<()> {
        let dirs = [self.root.clone(), self.platform_dir(), self.download_dir()];
        for dir in &dirs {
            fs::create_dir_all(dir).map_err(|e| AppError::io(e.to_string()))?;
        }
        Ok(())
    }
}
