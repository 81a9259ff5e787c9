//! Instance start/stop and the browser launch contract.

use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt as _, BufReader};
use tokio::process::Command;

use super::types::BatchOutcome;
use crate::config::{ConfigStore, Instance};
use crate::error::{AppError, Result};
use crate::paths::DataDirs;
use crate::process::ProcessManager;
use crate::versions::resolve_executable;

/// Flags appended to every launch after the per-instance arguments.
const LAUNCH_FLAGS: &[&str] = &[
    "--no-first-run",
    "--disable-default-apps",
    "--disable-background-mode",
];

/// Markers scanned for in early stderr output.
const STDERR_MARKERS: &[&str] = &["FATAL", "ERROR"];

/// Longest stderr excerpt surfaced through a launch warning.
const STDERR_EXCERPT_LIMIT: usize = 500;

/// Per-instance arguments in their fixed order: fingerprint, profile dir,
/// timezone, proxy (only when set), then the fixed flags.
pub(crate) fn build_launch_args(instance: &Instance) -> Vec<String> {
    let mut args = vec![
        format!("--fingerprint={}", instance.fingerprint),
        format!("--user-data-dir={}", instance.profile_dir.display()),
        format!("--timezone={}", instance.timezone),
    ];
    if !instance.proxy_server.is_empty() {
        args.push(format!("--proxy-server={}", instance.proxy_server));
    }
    args.extend(LAUNCH_FLAGS.iter().map(|flag| (*flag).to_string()));
    args
}

/// Start an instance's browser process and return its PID.
///
/// The entry is tracked before the function returns; stderr draining and
/// child reaping run as background tasks on the current runtime.
pub fn start_instance(
    store: &ConfigStore,
    dirs: &DataDirs,
    process_manager: &Arc<ProcessManager>,
    name: &str,
) -> Result<u32> {
    let config = store.load()?;
    let instance = config
        .find_instance(name)
        .ok_or_else(|| AppError::instance_not_found(name))?;

    if process_manager.is_tracked(name) {
        return Err(AppError::instance_running(name));
    }

    let executable = resolve_executable(store, dirs, &instance.version)?
        .ok_or_else(|| AppError::version_not_found(&instance.version))?;

    let args = build_launch_args(instance);
    log::info!("Starting instance {} ({})", name, executable.display());

    let mut child = Command::new(&executable)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| AppError::process(format!("Failed to start instance {}: {}", name, e)))?;

    let pid = child
        .id()
        .ok_or_else(|| AppError::process("Failed to get process ID"))?;

    process_manager.track(name, pid);

    if let Some(stderr) = child.stderr.take() {
        let instance_name = name.to_string();
        let manager = Arc::clone(process_manager);
        let mut reader = BufReader::new(stderr).lines();

        tokio::spawn(async move {
            let mut warned = false;
            while let Ok(Some(line)) = reader.next_line().await {
                log::error!("[{} stderr] {}", instance_name, line);
                if !warned && STDERR_MARKERS.iter().any(|marker| line.contains(marker)) {
                    warned = true;
                    let excerpt: String = line.chars().take(STDERR_EXCERPT_LIMIT).collect();
                    manager.emit_launch_warning(&instance_name, excerpt);
                }
            }
        });
    }

    let instance_name = name.to_string();
    let manager = Arc::clone(process_manager);
    tokio::spawn(async move {
        let _ = child.wait().await;
        log::info!("Instance {} process exited", instance_name);
        // Only mark the PID as exited; the reconciler handles removal.
        manager.mark_pid_exited(&instance_name, pid);
    });

    Ok(pid)
}

/// Stop an instance through the graceful-then-kill ladder.
pub async fn stop_instance(process_manager: &ProcessManager, name: &str) -> Result<()> {
    process_manager.stop(name).await
}

/// Start several instances, never aborting early.
pub fn start_instances(
    store: &ConfigStore,
    dirs: &DataDirs,
    process_manager: &Arc<ProcessManager>,
    names: &[String],
) -> Vec<BatchOutcome> {
    names
        .iter()
        .map(|name| BatchOutcome {
            name: name.clone(),
            result: start_instance(store, dirs, process_manager, name).map(|_| ()),
        })
        .collect()
}

/// Stop several instances, never aborting early.
pub async fn stop_instances(process_manager: &ProcessManager, names: &[String]) -> Vec<BatchOutcome> {
    let mut outcomes = Vec::with_capacity(names.len());
    for name in names {
        outcomes.push(BatchOutcome {
            name: name.clone(),
            result: process_manager.stop(name).await,
        });
    }
    outcomes
}

/// Open `url` in a running instance by spawning one extra untracked browser
/// process with the same argument vector plus the URL.
pub fn open_instance_url(
    store: &ConfigStore,
    dirs: &DataDirs,
    process_manager: &ProcessManager,
    name: &str,
    url: &str,
) -> Result<()> {
    let config = store.load()?;
    let instance = config
        .find_instance(name)
        .ok_or_else(|| AppError::instance_not_found(name))?;

    if !process_manager.is_running(name) {
        return Err(AppError::instance_not_running(name));
    }

    let executable = resolve_executable(store, dirs, &instance.version)?
        .ok_or_else(|| AppError::version_not_found(&instance.version))?;

    let mut args = build_launch_args(instance);
    args.push(url.to_string());

    log::info!("Opening {} in instance {}", url, name);
    Command::new(&executable)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| AppError::process(format!("Failed to open URL in {}: {}", name, e)))?;

    Ok(())
}
