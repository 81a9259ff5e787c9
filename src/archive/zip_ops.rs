use std::fs;
use std::io;
use std::io::Read as _;
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};

use super::path::{parse_entry_rel_path, resolve_within_dir, validate_rel_link_target};

/// Extract a zip archive into `dest_dir`, preserving entry paths exactly as
/// stored. Entry paths are sanitized against traversal, unix modes are
/// restored, and symlink entries are recreated after all regular entries so
/// their targets already exist.
pub(crate) fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    fs::create_dir_all(dest_dir).map_err(|e| AppError::io(e.to_string()))?;
    let file = fs::File::open(archive_path).map_err(|e| AppError::io(e.to_string()))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| AppError::io(e.to_string()))?;
    let mut pending_symlinks: Vec<QueuedSymlink> = Vec::new();

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| AppError::io(e.to_string()))?;

        let raw_name = entry.name().to_string();

        let Some(relative) = parse_entry_rel_path(&raw_name) else {
            return Err(AppError::io(format!(
                "archive contains unsafe zip path: {raw_name:?}"
            )));
        };
        let resolved_out_path = resolve_within_dir(dest_dir, &dest_dir.join(relative))?;

        if entry.is_symlink() {
            let mut target = String::new();
            entry
                .read_to_string(&mut target)
                .map_err(|e| AppError::io(e.to_string()))?;
            let pending = queue_symlink(&resolved_out_path, Path::new(&target), dest_dir)?;
            pending_symlinks.push(pending);
        } else {
            let is_dir = entry.is_dir();
            let unix_mode = entry.unix_mode();
            let declared_size = if is_dir { None } else { Some(entry.size()) };
            write_entry(
                &resolved_out_path,
                is_dir,
                &mut entry,
                unix_mode,
                declared_size,
            )?;
        }
    }

    create_queued_symlinks(pending_symlinks)?;

    Ok(())
}

fn write_entry<R>(
    out_path: &Path,
    is_dir: bool,
    reader: &mut R,
    unix_mode: Option<u32>,
    declared_size: Option<u64>,
) -> Result<()>
where
    R: io::Read,
{
    if is_dir {
        fs::create_dir_all(out_path)
            .map_err(|e| AppError::io(format!("failed to create directory {out_path:?}: {e}")))?;
        return Ok(());
    }

    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| AppError::io(format!("failed to create directory {parent:?}: {e}")))?;
    }

    let mut outfile = fs::File::create(out_path).map_err(|e| AppError::io(e.to_string()))?;
    let written = io::copy(reader, &mut outfile).map_err(|e| AppError::io(e.to_string()))?;
    if let Some(expected_size) = declared_size {
        if written != expected_size {
            return Err(AppError::io(format!(
                "archive entry size mismatch: expected {expected_size} bytes, wrote {written} bytes",
            )));
        }
    }
    set_unix_permissions(out_path, unix_mode)?;
    Ok(())
}

#[cfg(unix)]
fn set_unix_permissions(path: &Path, mode: Option<u32>) -> Result<()> {
    use std::os::unix::fs::PermissionsExt as _;

    if let Some(mode) = mode {
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .map_err(|e| AppError::io(format!("failed to set permissions on {path:?}: {e}")))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_unix_permissions(_path: &Path, _mode: Option<u32>) -> Result<()> {
    Ok(())
}

struct QueuedSymlink {
    out_path: PathBuf,
    target: PathBuf,
    resolved_target: PathBuf,
}

/// Validate a symlink entry upfront; actual creation is deferred until all
/// regular entries exist.
fn queue_symlink(out_path: &Path, target: &Path, dest_dir: &Path) -> Result<QueuedSymlink> {
    validate_rel_link_target(target)?;

    let parent = out_path
        .parent()
        .ok_or_else(|| AppError::io("symlink entry has no parent directory"))?;
    let resolved_target = resolve_within_dir(dest_dir, &parent.join(target))?;
    Ok(QueuedSymlink {
        out_path: out_path.to_path_buf(),
        target: target.to_path_buf(),
        resolved_target,
    })
}

fn create_queued_symlinks(pending: Vec<QueuedSymlink>) -> Result<()> {
    for item in pending {
        let parent = item
            .out_path
            .parent()
            .ok_or_else(|| AppError::io("symlink entry has no parent directory"))?;
        fs::create_dir_all(parent)
            .map_err(|e| AppError::io(format!("failed to create directory {parent:?}: {e}")))?;
        let target_kind = if item.resolved_target.exists() {
            if item.resolved_target.is_dir() {
                Some(SymlinkTargetKind::Dir)
            } else {
                Some(SymlinkTargetKind::File)
            }
        } else {
            None
        };
        create_symlink(&item.target, &item.out_path, target_kind)?;
    }

    Ok(())
}

#[derive(Clone, Copy)]
enum SymlinkTargetKind {
    File,
    Dir,
}

#[cfg(unix)]
fn create_symlink(
    target: &Path,
    link_path: &Path,
    _target_kind: Option<SymlinkTargetKind>,
) -> Result<()> {
    std::os::unix::fs::symlink(target, link_path)
        .map_err(|e| AppError::io(format!("failed to create symlink at {link_path:?}: {e}")))
}

#[cfg(windows)]
fn create_symlink(
    target: &Path,
    link_path: &Path,
    target_kind: Option<SymlinkTargetKind>,
) -> Result<()> {
    let target_kind = target_kind.ok_or_else(|| {
        AppError::io(
            "cannot determine symlink type on Windows when target does not exist in archive",
        )
    })?;
    let result = match target_kind {
        SymlinkTargetKind::Dir => std::os::windows::fs::symlink_dir(target, link_path),
        SymlinkTargetKind::File => std::os::windows::fs::symlink_file(target, link_path),
    };
    result.map_err(|e| AppError::io(format!("failed to create symlink at {link_path:?}: {e}")))
}

#[cfg(not(any(unix, windows)))]
fn create_symlink(
    _target: &Path,
    _link_path: &Path,
    _target_kind: Option<SymlinkTargetKind>,
) -> Result<()> {
    Err(AppError::io(
        "symlink creation not supported on this platform",
    ))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Write as _;

    use super::extract_zip;

    fn build_zip(path: &std::path::Path, entries: &[(&str, &[u8], Option<u32>)]) {
        let file = fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        for (name, data, mode) in entries {
            let mut options = zip::write::SimpleFileOptions::default();
            if let Some(mode) = mode {
                options = options.unix_permissions(*mode);
            }
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn extracts_nested_entries_preserving_paths() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("build.zip");
        build_zip(
            &archive,
            &[
                ("chrome-win/chrome.exe", b"exe bytes", Some(0o755)),
                ("chrome-win/resources/app.pak", b"pak", None),
                ("readme.txt", b"hello", None),
            ],
        );

        let dest = dir.path().join("out");
        extract_zip(&archive, &dest).unwrap();

        assert_eq!(
            fs::read(dest.join("chrome-win/chrome.exe")).unwrap(),
            b"exe bytes"
        );
        assert!(dest.join("chrome-win/resources/app.pak").exists());
        assert!(dest.join("readme.txt").exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt as _;
            let mode = fs::metadata(dest.join("chrome-win/chrome.exe"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }

    #[test]
    fn missing_archive_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = extract_zip(&dir.path().join("absent.zip"), &dir.path().join("out"));
        assert!(err.is_err());
    }
}
