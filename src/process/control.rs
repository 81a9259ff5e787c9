//! Platform process control primitives.

use std::time::{Duration, Instant};

use crate::error::{AppError, Result};

/// Check if a process is alive by PID.
#[cfg(target_os = "windows")]
pub(super) fn is_process_alive(pid: u32) -> bool {
    super::win_api::is_process_alive(pid)
}

/// Check if a process is alive by PID. A permission error still means the
/// process exists.
#[cfg(not(target_os = "windows"))]
pub(super) fn is_process_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    !matches!(kill(Pid::from_raw(pid as i32), None), Err(e) if e != Errno::EPERM)
}

/// Ask a process to exit without forcing it.
#[cfg(target_os = "windows")]
pub(super) fn graceful_signal(pid: u32) -> Result<()> {
    let output = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string()])
        .output()
        .map_err(|e| AppError::process(format!("Failed to run taskkill: {e}")))?;

    if output.status.success() {
        Ok(())
    } else {
        Err(AppError::process(format!(
            "taskkill failed for pid {}: {}",
            pid,
            command_detail(&output)
        )))
    }
}

/// Ask a process to exit without forcing it.
#[cfg(not(target_os = "windows"))]
pub(super) fn graceful_signal(pid: u32) -> Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
        .map_err(|e| AppError::process(format!("Failed to send SIGTERM to PID {}: {}", pid, e)))
}

#[cfg(target_os = "windows")]
pub(super) fn force_kill(pid: u32) -> Result<()> {
    let output = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .output()
        .map_err(|e| AppError::process(format!("Failed to run taskkill: {e}")))?;

    if output.status.success() {
        Ok(())
    } else {
        Err(AppError::process(format!(
            "taskkill failed for pid {}: {}",
            pid,
            command_detail(&output)
        )))
    }
}

#[cfg(target_os = "windows")]
fn command_detail(output: &std::process::Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let detail = stderr.trim();
    if !detail.is_empty() {
        return detail.to_string();
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let detail = stdout.trim();
    if detail.is_empty() {
        "(no output)".to_string()
    } else {
        detail.to_string()
    }
}

/// The browser process tears down its helper tree when it dies, so the
/// tracked PID is the only one signalled.
#[cfg(not(target_os = "windows"))]
pub(super) fn force_kill(pid: u32) -> Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    kill(Pid::from_raw(pid as i32), Signal::SIGKILL)
        .map_err(|e| AppError::process(format!("Failed to kill process {}: {}", pid, e)))
}

/// Send a graceful signal to each PID, wait up to `grace` for all to exit,
/// then force kill any that remain. Blocking.
pub(super) fn shutdown_all(pids: &[u32], grace: Duration) {
    let mut failed_signal_pids = Vec::new();

    for &pid in pids {
        if is_process_alive(pid) {
            if let Err(e) = graceful_signal(pid) {
                log::warn!(
                    "Graceful signal failed for PID {pid}: {e}, will force kill immediately"
                );
                failed_signal_pids.push(pid);
            }
        }
    }

    for &pid in &failed_signal_pids {
        if is_process_alive(pid) {
            if let Err(e) = force_kill(pid) {
                log::error!("Failed to force kill PID {pid}: {e}");
            }
        }
    }

    let signalled: Vec<u32> = pids
        .iter()
        .copied()
        .filter(|pid| !failed_signal_pids.contains(pid))
        .collect();

    if signalled.is_empty() || signalled.iter().all(|&pid| !is_process_alive(pid)) {
        return;
    }

    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        if signalled.iter().all(|&pid| !is_process_alive(pid)) {
            return;
        }
        std::thread::sleep(Duration::from_millis(500));
    }

    for &pid in &signalled {
        if is_process_alive(pid) {
            log::warn!(
                "PID {pid} did not exit within {}s, force killing",
                grace.as_secs()
            );
            if let Err(e) = force_kill(pid) {
                log::error!("Failed to force kill PID {pid}: {e}");
            }
        }
    }
}
