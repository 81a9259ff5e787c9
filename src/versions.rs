//! Version catalogue: executable resolution and install records.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{ConfigStore, VersionRecord};
use crate::error::{AppError, Result};
use crate::paths::DataDirs;

/// Validate that a version tag is safe to use as a path component.
pub fn validate_version_tag(version: &str) -> Result<()> {
    let is_safe = !version.is_empty()
        && version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '+'));

    if !is_safe {
        return Err(AppError::version_not_found(version));
    }

    Ok(())
}

/// Resolve the Chromium executable for a version tag.
///
/// The persisted record wins when its path still exists. Otherwise the
/// install directory is probed for the platform's candidate layouts and a
/// hit self-heals the record, so manual file-system changes are picked up
/// transparently. `Ok(None)` means the version is not installed.
pub fn resolve_executable(
    store: &ConfigStore,
    dirs: &DataDirs,
    tag: &str,
) -> Result<Option<PathBuf>> {
    validate_version_tag(tag)?;

    let config = store.load()?;
    if let Some(record) = config.versions.get(tag) {
        let recorded = Path::new(&record.path);
        if recorded.is_file() {
            return Ok(Some(recorded.to_path_buf()));
        }
    }

    let version_dir = dirs.version_dir(tag);
    if !version_dir.is_dir() {
        return Ok(None);
    }

    for candidate in dirs.platform().executable_candidates() {
        let path = version_dir.join(candidate);
        if path.is_file() {
            log::info!(
                "discovered executable for version {tag} at {}",
                path.display()
            );
            record_version(store, tag, &path, "discovered")?;
            return Ok(Some(path));
        }
    }

    log::warn!("no executable found under {}", version_dir.display());
    Ok(None)
}

/// Whether a version tag currently resolves to an executable on disk.
/// Requires no previous install record.
pub fn is_installed(store: &ConfigStore, dirs: &DataDirs, tag: &str) -> bool {
    matches!(resolve_executable(store, dirs, tag), Ok(Some(_)))
}

/// Create or overwrite the catalogue record for a tag.
pub fn record_version(store: &ConfigStore, tag: &str, executable: &Path, kind: &str) -> Result<()> {
    let record = VersionRecord {
        path: executable.display().to_string(),
        kind: kind.to_string(),
        description: format!("Chromium {tag}"),
        last_updated: executable_mtime(executable),
    };
    store.with_mut(|config| {
        config.versions.insert(tag.to_string(), record);
        Ok(())
    })
}

fn executable_mtime(path: &Path) -> String {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map(|mtime| chrono::DateTime::<chrono::Utc>::from(mtime).to_rfc3339())
        .unwrap_or_default()
}
