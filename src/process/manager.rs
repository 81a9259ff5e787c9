//! Instance process tracking and reconciliation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::control::{force_kill, graceful_signal, is_process_alive, shutdown_all};
use super::{
    ProcessEntry, RuntimeEvent, RuntimeEventReason, RECONCILE_INTERVAL, SHUTDOWN_GRACE_TIMEOUT,
    STOP_GRACE_TIMEOUT, STOP_KILL_TIMEOUT, STOP_POLL_INTERVAL,
};
use crate::error::{AppError, Result};

/// Tracks running browser processes by instance name.
pub struct ProcessManager {
    processes: RwLock<HashMap<String, ProcessEntry>>,
    runtime_events: broadcast::Sender<RuntimeEvent>,
}

impl ProcessManager {
    pub fn new() -> Self {
        let (runtime_events, _) = broadcast::channel(128);

        Self {
            processes: RwLock::new(HashMap::new()),
            runtime_events,
        }
    }

    pub fn subscribe_runtime_events(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.runtime_events.subscribe()
    }

    fn emit_runtime_event(&self, instance: &str, reason: RuntimeEventReason) {
        let _ = self.runtime_events.send(RuntimeEvent {
            instance: instance.to_string(),
            reason,
        });
    }

    /// Surface launch-time diagnostics from the stderr drain.
    pub(crate) fn emit_launch_warning(&self, instance: &str, message: String) {
        self.emit_runtime_event(instance, RuntimeEventReason::LaunchWarning { message });
    }

    /// Track a freshly spawned browser process. Replaces any stale entry.
    pub fn track(&self, instance: &str, pid: u32) {
        let mut procs = self.processes.write().unwrap_or_else(|e| e.into_inner());
        procs.insert(instance.to_string(), ProcessEntry::new(pid));
        drop(procs);
        self.emit_runtime_event(instance, RuntimeEventReason::ProcessTracked);
        log::info!("Tracking instance {} (pid {})", instance, pid);
    }

    /// Mark that the spawned child has been reaped, without removing the
    /// tracking entry. The reconciler handles removal.
    pub fn mark_pid_exited(&self, instance: &str, expected_pid: u32) {
        let mut procs = self.processes.write().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = procs.get_mut(instance) {
            if entry.pid == expected_pid {
                entry.pid_exited = true;
                log::info!(
                    "Instance {} PID {} marked as exited",
                    instance,
                    expected_pid
                );
            }
        }
    }

    /// Remove an instance from tracking and return its entry.
    pub fn remove(&self, instance: &str) -> Option<ProcessEntry> {
        let mut procs = self.processes.write().unwrap_or_else(|e| e.into_inner());
        let removed = procs.remove(instance);
        drop(procs);
        if removed.is_some() {
            self.emit_runtime_event(instance, RuntimeEventReason::ProcessRemoved);
        }
        removed
    }

    /// Whether the instance is tracked and its process is still alive.
    pub fn is_running(&self, instance: &str) -> bool {
        let entry = {
            let procs = self.processes.read().unwrap_or_else(|e| e.into_inner());
            procs.get(instance).copied()
        };

        entry.is_some_and(|entry| !entry.pid_exited && is_process_alive(entry.pid))
    }

    /// Whether a tracking entry exists, regardless of liveness.
    pub fn is_tracked(&self, instance: &str) -> bool {
        let procs = self.processes.read().unwrap_or_else(|e| e.into_inner());
        procs.contains_key(instance)
    }

    pub fn pid_of(&self, instance: &str) -> Option<u32> {
        let procs = self.processes.read().unwrap_or_else(|e| e.into_inner());
        procs.get(instance).map(|entry| entry.pid)
    }

    /// Names of all tracked instances, without liveness checks.
    pub fn tracked_names(&self) -> Vec<String> {
        let procs = self.processes.read().unwrap_or_else(|e| e.into_inner());
        procs.keys().cloned().collect()
    }

    /// Drop tracking entries whose process has exited. Returns the names
    /// that were removed.
    pub fn reconcile(&self) -> Vec<String> {
        let entries: Vec<(String, ProcessEntry)> = {
            let procs = self.processes.read().unwrap_or_else(|e| e.into_inner());
            procs
                .iter()
                .map(|(name, entry)| (name.clone(), *entry))
                .collect()
        };

        let dead: Vec<(String, u32)> = entries
            .into_iter()
            .filter(|(_, entry)| entry.pid_exited || !is_process_alive(entry.pid))
            .map(|(name, entry)| (name, entry.pid))
            .collect();

        if dead.is_empty() {
            return Vec::new();
        }

        let mut removed = Vec::new();
        let mut procs = self.processes.write().unwrap_or_else(|e| e.into_inner());
        for (name, pid) in dead {
            // The instance may have been restarted since the scan.
            if procs.get(&name).is_some_and(|entry| entry.pid == pid) {
                procs.remove(&name);
                removed.push(name);
            }
        }
        drop(procs);

        for name in &removed {
            log::info!("Instance {} process exited, dropping tracking entry", name);
            self.emit_runtime_event(name, RuntimeEventReason::ProcessExited);
        }

        removed
    }

    /// Spawn the background reconciler.
    pub fn start_monitor(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(RECONCILE_INTERVAL);
            loop {
                interval.tick().await;
                self.reconcile();
            }
        })
    }

    /// Stop a tracked instance: graceful signal, bounded wait, then force
    /// kill. The tracking entry survives only if the process outlives the
    /// kill as well.
    pub async fn stop(&self, instance: &str) -> Result<()> {
        let entry = {
            let procs = self.processes.read().unwrap_or_else(|e| e.into_inner());
            procs.get(instance).copied()
        };
        let Some(entry) = entry else {
            return Err(AppError::instance_not_running(instance));
        };

        if entry.pid_exited || !is_process_alive(entry.pid) {
            self.remove(instance);
            return Ok(());
        }

        log::info!("Stopping instance {} (pid {})", instance, entry.pid);
        if let Err(e) = graceful_signal(entry.pid) {
            log::warn!("Graceful signal failed for PID {}: {}", entry.pid, e);
        }
        if self
            .wait_for_exit(instance, entry.pid, STOP_GRACE_TIMEOUT)
            .await
        {
            self.remove(instance);
            return Ok(());
        }

        log::warn!(
            "Instance {} did not exit within {}s, force killing",
            instance,
            STOP_GRACE_TIMEOUT.as_secs()
        );
        if let Err(e) = force_kill(entry.pid) {
            log::error!("Failed to force kill PID {}: {}", entry.pid, e);
        }
        if self
            .wait_for_exit(instance, entry.pid, STOP_KILL_TIMEOUT)
            .await
        {
            self.remove(instance);
            return Ok(());
        }

        Err(AppError::process(format!(
            "Instance {} (pid {}) survived force kill",
            instance, entry.pid
        )))
    }

    async fn wait_for_exit(&self, instance: &str, pid: u32, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.pid_reaped(instance, pid) || !is_process_alive(pid) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(STOP_POLL_INTERVAL).await;
        }
    }

    fn pid_reaped(&self, instance: &str, pid: u32) -> bool {
        let procs = self.processes.read().unwrap_or_else(|e| e.into_inner());
        procs
            .get(instance)
            .is_some_and(|entry| entry.pid == pid && entry.pid_exited)
    }

    /// Stop every tracked instance. Blocking; used during host shutdown.
    pub fn stop_all(&self) {
        let entries: Vec<(String, ProcessEntry)> = {
            let mut procs = self.processes.write().unwrap_or_else(|e| e.into_inner());
            procs.drain().collect()
        };
        if entries.is_empty() {
            return;
        }

        for (instance, entry) in &entries {
            log::info!("Stopping instance {} (pid {})", instance, entry.pid);
        }

        let pids: Vec<u32> = entries.iter().map(|(_, entry)| entry.pid).collect();
        shutdown_all(&pids, SHUTDOWN_GRACE_TIMEOUT);
    }
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new()
    }
}
