//! Process lifecycle management for running Chromium instances.

mod control;
mod manager;

#[cfg(target_os = "windows")]
pub(crate) mod win_api;

use std::time::Duration;

use serde::Serialize;

pub use manager::ProcessManager;

/// How long a stopped instance gets to exit after the graceful signal.
const STOP_GRACE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a stopped instance gets to exit after a force kill.
const STOP_KILL_TIMEOUT: Duration = Duration::from_secs(2);

/// Poll interval while waiting for a signalled process to exit.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Background reconciliation tick interval.
const RECONCILE_INTERVAL: Duration = Duration::from_millis(3000);

/// Grace period granted to instances during host shutdown.
const SHUTDOWN_GRACE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeEventReason {
    ProcessTracked,
    ProcessRemoved,
    ProcessExited,
    LaunchWarning { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct RuntimeEvent {
    pub instance: String,
    pub reason: RuntimeEventReason,
}

/// Tracking entry for one spawned browser process.
#[derive(Debug, Clone, Copy)]
pub struct ProcessEntry {
    pub pid: u32,
    /// Whether the spawned child has been reaped (reported by `child.wait()`).
    pub(crate) pid_exited: bool,
}

impl ProcessEntry {
    pub(crate) fn new(pid: u32) -> Self {
        Self {
            pid,
            pid_exited: false,
        }
    }
}
