//! Archive installation: turning downloaded archives into versioned installs.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::archive::extract_zip;
use crate::config::ConfigStore;
use crate::error::{AppError, Result};
use crate::paths::DataDirs;
use crate::versions::{record_version, validate_version_tag};

const APP_BUNDLE_NAME: &str = "Chromium.app";
const BUNDLE_EXECUTABLE: &str = "Contents/MacOS/Chromium";

/// Install a downloaded archive as the given version tag, returning the
/// discovered executable path.
///
/// Both archive kinds wholly replace the version directory, so installing
/// the same tag twice is idempotent. On success the catalogue is updated and
/// the source archive is deleted; on failure the version directory may be
/// left partially built and a fresh install is required.
pub fn install_archive(
    store: &ConfigStore,
    dirs: &DataDirs,
    archive: &Path,
    tag: &str,
) -> Result<PathBuf> {
    validate_version_tag(tag)?;

    let extension = archive
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let executable = match extension.as_str() {
        "zip" => install_zip(dirs, archive, tag),
        "dmg" => install_dmg(dirs, archive, tag),
        other => Err(AppError::install(format!(
            "unsupported archive extension: {other:?}"
        ))),
    }?;

    record_version(store, tag, &executable, "downloaded")?;

    if let Err(e) = fs::remove_file(archive) {
        log::warn!("failed to remove archive {:?}: {}", archive, e);
    }

    log::info!("installed version {tag} at {}", executable.display());
    Ok(executable)
}

/// Windows builds: extract into a scratch directory, then replace the
/// version directory with the scratch contents.
fn install_zip(dirs: &DataDirs, archive: &Path, tag: &str) -> Result<PathBuf> {
    let scratch = dirs.extract_scratch_dir(tag);
    if scratch.exists() {
        fs::remove_dir_all(&scratch)?;
    }

    extract_zip(archive, &scratch)?;

    let version_dir = dirs.version_dir(tag);
    if version_dir.exists() {
        fs::remove_dir_all(&version_dir)?;
    }
    fs::create_dir_all(&version_dir)?;
    copy_dir_recursive(&scratch, &version_dir)?;
    fs::remove_dir_all(&scratch)?;

    find_executable(dirs, &version_dir).ok_or_else(|| {
        AppError::install(format!(
            "no Chromium executable found in archive for {tag}"
        ))
    })
}

/// macOS builds: mount the image read-only, copy the application bundle out,
/// detach on every path.
fn install_dmg(dirs: &DataDirs, archive: &Path, tag: &str) -> Result<PathBuf> {
    let mount_point = dirs.dmg_mount_point(tag);
    fs::create_dir_all(&mount_point)?;

    attach_dmg(archive, &mount_point)?;
    let result = copy_bundle_from_mount(dirs, &mount_point, tag);
    detach_dmg(&mount_point);
    let _ = fs::remove_dir(&mount_point);
    result
}

fn copy_bundle_from_mount(dirs: &DataDirs, mount_point: &Path, tag: &str) -> Result<PathBuf> {
    let bundle = find_app_bundle(mount_point)?
        .ok_or_else(|| AppError::install(format!("no {APP_BUNDLE_NAME} in mounted image")))?;

    let version_dir = dirs.version_dir(tag);
    if version_dir.exists() {
        fs::remove_dir_all(&version_dir)?;
    }
    fs::create_dir_all(&version_dir)?;

    let target = version_dir.join(APP_BUNDLE_NAME);
    copy_dir_recursive(&bundle, &target)?;

    let executable = target.join(BUNDLE_EXECUTABLE);
    if executable.is_file() {
        Ok(executable)
    } else {
        Err(AppError::install(format!(
            "bundle copied but executable missing at {}",
            executable.display()
        )))
    }
}

fn find_app_bundle(mount_point: &Path) -> Result<Option<PathBuf>> {
    for entry in WalkDir::new(mount_point) {
        let entry = entry.map_err(|e| AppError::install(e.to_string()))?;
        if entry.file_type().is_dir() && entry.file_name() == APP_BUNDLE_NAME {
            return Ok(Some(entry.path().to_path_buf()));
        }
    }
    Ok(None)
}

fn attach_dmg(archive: &Path, mount_point: &Path) -> Result<()> {
    log::info!("mounting {:?} at {:?}", archive, mount_point);
    let output = std::process::Command::new("hdiutil")
        .arg("attach")
        .arg(archive)
        .arg("-mountpoint")
        .arg(mount_point)
        .arg("-readonly")
        .output()
        .map_err(|e| AppError::install(format!("failed to run hdiutil attach: {e}")))?;

    if !output.status.success() {
        return Err(AppError::install(format!(
            "hdiutil attach failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

fn detach_dmg(mount_point: &Path) {
    let result = std::process::Command::new("hdiutil")
        .arg("detach")
        .arg(mount_point)
        .output();
    match result {
        Ok(output) if output.status.success() => {}
        Ok(output) => log::warn!(
            "hdiutil detach {:?} failed: {}",
            mount_point,
            String::from_utf8_lossy(&output.stderr).trim()
        ),
        Err(e) => log::warn!("failed to run hdiutil detach: {}", e),
    }
}

fn find_executable(dirs: &DataDirs, version_dir: &Path) -> Option<PathBuf> {
    dirs.platform()
        .executable_candidates()
        .iter()
        .map(|candidate| version_dir.join(candidate))
        .find(|path| path.is_file())
}

/// Recursively copy the contents of `src` into `dst`. Symlinks are followed,
/// so application bundles come out as plain trees; file modes survive
/// through `fs::copy`.
fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    for entry in WalkDir::new(src).follow_links(true) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| AppError::io(e.to_string()))?;
        if relative.as_os_str().is_empty() {
            continue;
        }
        let target = dst.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
