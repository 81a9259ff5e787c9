//! Registry CRUD operations.

use std::fs;

use super::types::InstanceStatus;
use crate::config::{ConfigStore, Instance};
use crate::error::{AppError, Result};
use crate::paths::DataDirs;
use crate::process::ProcessManager;
use crate::versions::is_installed;

fn ensure_version_installed(store: &ConfigStore, dirs: &DataDirs, version: &str) -> Result<()> {
    if is_installed(store, dirs, version) {
        Ok(())
    } else {
        Err(AppError::version_not_found(version))
    }
}

/// Add a new instance to the registry.
pub fn add_instance(store: &ConfigStore, dirs: &DataDirs, instance: Instance) -> Result<()> {
    if instance.name.trim().is_empty() {
        return Err(AppError::config("instance name must not be empty"));
    }
    ensure_version_installed(store, dirs, &instance.version)?;

    store.with_mut(|config| {
        if config.find_instance(&instance.name).is_some() {
            return Err(AppError::config(format!(
                "instance name already exists: {}",
                instance.name
            )));
        }
        let mut instance = instance;
        instance.apply_env_defaults();
        config.instances.push(instance);
        Ok(())
    })
}

/// Update an instance, looked up by its original name.
pub fn update_instance(
    store: &ConfigStore,
    dirs: &DataDirs,
    process_manager: &ProcessManager,
    original_name: &str,
    updated: Instance,
) -> Result<()> {
    if updated.name.trim().is_empty() {
        return Err(AppError::config("instance name must not be empty"));
    }
    if updated.name != original_name && process_manager.is_running(original_name) {
        return Err(AppError::instance_running(original_name));
    }
    ensure_version_installed(store, dirs, &updated.version)?;

    store.with_mut(|config| {
        if updated.name != original_name && config.find_instance(&updated.name).is_some() {
            return Err(AppError::config(format!(
                "instance name already exists: {}",
                updated.name
            )));
        }
        let slot = config
            .find_instance_mut(original_name)
            .ok_or_else(|| AppError::instance_not_found(original_name))?;
        let mut updated = updated;
        updated.apply_env_defaults();
        *slot = updated;
        Ok(())
    })
}

/// Delete an instance and its profile directory.
///
/// The profile directory goes first; the document is only touched once the
/// directory is gone, so a failed removal leaves the instance intact.
pub fn delete_instance(
    store: &ConfigStore,
    process_manager: &ProcessManager,
    name: &str,
) -> Result<()> {
    if process_manager.is_running(name) {
        return Err(AppError::instance_running(name));
    }

    let config = store.load()?;
    let instance = config
        .find_instance(name)
        .ok_or_else(|| AppError::instance_not_found(name))?;

    let profile_dir = instance.profile_dir.clone();
    if !profile_dir.as_os_str().is_empty() && profile_dir.exists() {
        fs::remove_dir_all(&profile_dir).map_err(|e| {
            AppError::io(format!(
                "Failed to remove profile directory {:?}: {}",
                profile_dir, e
            ))
        })?;
    }

    store.with_mut(|config| {
        let before = config.instances.len();
        config.instances.retain(|i| i.name != name);
        if config.instances.len() == before {
            return Err(AppError::instance_not_found(name));
        }
        Ok(())
    })
}

/// List all instances with their running status.
pub fn list_instances(
    store: &ConfigStore,
    process_manager: &ProcessManager,
) -> Result<Vec<InstanceStatus>> {
    let config = store.load()?;

    Ok(config
        .instances
        .iter()
        .map(|instance| {
            let running = process_manager.is_running(&instance.name);
            let pid = if running {
                process_manager.pid_of(&instance.name)
            } else {
                None
            };
            InstanceStatus {
                name: instance.name.clone(),
                fingerprint: instance.fingerprint.clone(),
                profile_dir: instance.profile_dir.clone(),
                timezone: instance.timezone.clone(),
                proxy_server: instance.proxy_server.clone(),
                version: instance.version.clone(),
                running,
                pid,
            }
        })
        .collect())
}
