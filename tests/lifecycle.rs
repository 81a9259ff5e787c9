//! Process lifecycle tests driving real child processes.
//!
//! A shell script standing in for the browser executable keeps these
//! hermetic; they only run on unix hosts.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt as _;
use std::path::Path;
use std::time::Duration;

use chromium_fleet::{DataDirs, ErrorKind, Fleet, Instance, Platform, RuntimeEventReason};

const SLEEPER: &str = "#!/bin/sh\nsleep 30\n";
const NOISY: &str = "#!/bin/sh\n\
    echo '[0825/120000.000:ERROR:gpu_init.cc(523)] Passthrough is not supported' >&2\n\
    sleep 30\n";

/// Plant an executable at the spot the resolver probes for the
/// `default` tag on the macOS layout.
fn install_fake_chromium(dirs: &DataDirs, script: &str) {
    let exe = dirs
        .version_dir("default")
        .join("Chromium.app/Contents/MacOS/Chromium");
    fs::create_dir_all(exe.parent().unwrap()).unwrap();
    fs::write(&exe, script).unwrap();
    let mut perms = fs::metadata(&exe).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&exe, perms).unwrap();
}

fn add_named_instance(fleet: &Fleet, root: &Path, name: &str) {
    let instance = Instance {
        name: name.to_string(),
        fingerprint: "1000".to_string(),
        profile_dir: root.join("profiles").join(name),
        ..Instance::default()
    };
    fleet.add_instance(instance).unwrap();
}

fn fleet_with_instance(root: &Path, name: &str, script: &str) -> Fleet {
    let fleet = Fleet::new(DataDirs::new(root, Platform::MacOs)).unwrap();
    install_fake_chromium(fleet.dirs(), script);
    add_named_instance(&fleet, root, name);
    fleet
}

fn kill_hard(pid: u32) {
    let status = std::process::Command::new("kill")
        .args(["-9", &pid.to_string()])
        .status()
        .unwrap();
    assert!(status.success());
}

#[tokio::test]
async fn start_then_stop_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let fleet = fleet_with_instance(dir.path(), "alpha", SLEEPER);

    let pid = fleet.start_instance("alpha").unwrap();
    assert!(pid > 0);
    assert!(fleet.is_instance_running("alpha"));

    // A second start while the entry exists is rejected.
    let err = fleet.start_instance("alpha").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InstanceRunning);

    fleet.stop_instance("alpha").await.unwrap();
    assert!(!fleet.is_instance_running("alpha"));

    let statuses = fleet.list_instances().unwrap();
    assert_eq!(statuses.len(), 1);
    assert!(!statuses[0].running);
    assert_eq!(statuses[0].pid, None);
}

#[tokio::test]
async fn stop_succeeds_after_the_process_died_externally() {
    let dir = tempfile::tempdir().unwrap();
    let fleet = fleet_with_instance(dir.path(), "alpha", SLEEPER);

    let pid = fleet.start_instance("alpha").unwrap();
    kill_hard(pid);
    // Give the exit watcher a moment to reap the child.
    tokio::time::sleep(Duration::from_millis(300)).await;

    fleet.stop_instance("alpha").await.unwrap();
    assert!(!fleet.is_instance_running("alpha"));

    let err = fleet.stop_instance("alpha").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InstanceNotRunning);
}

#[tokio::test]
async fn reconciliation_removes_exactly_the_dead() {
    let dir = tempfile::tempdir().unwrap();
    let fleet = Fleet::new(DataDirs::new(dir.path(), Platform::MacOs)).unwrap();
    install_fake_chromium(fleet.dirs(), SLEEPER);
    add_named_instance(&fleet, dir.path(), "alpha");
    add_named_instance(&fleet, dir.path(), "beta");

    fleet.start_instance("alpha").unwrap();
    let beta_pid = fleet.start_instance("beta").unwrap();

    kill_hard(beta_pid);
    tokio::time::sleep(Duration::from_millis(300)).await;

    let removed = fleet.process_manager().reconcile();
    assert_eq!(removed, vec!["beta".to_string()]);
    assert!(fleet.is_instance_running("alpha"));
    assert!(!fleet.is_instance_running("beta"));

    fleet.stop_instance("alpha").await.unwrap();
}

#[tokio::test]
async fn batch_operations_report_per_instance_outcomes() {
    let dir = tempfile::tempdir().unwrap();
    let fleet = Fleet::new(DataDirs::new(dir.path(), Platform::MacOs)).unwrap();
    install_fake_chromium(fleet.dirs(), SLEEPER);
    add_named_instance(&fleet, dir.path(), "alpha");
    add_named_instance(&fleet, dir.path(), "beta");

    let names: Vec<String> = ["alpha", "beta", "ghost"]
        .iter()
        .map(|n| n.to_string())
        .collect();

    let started = fleet.start_instances(&names);
    assert_eq!(started.len(), 3);
    assert!(started[0].result.is_ok());
    assert!(started[1].result.is_ok());
    assert_eq!(started[2].name, "ghost");
    let err = started[2].result.as_ref().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InstanceNotFound);

    let stopped = fleet.stop_instances(&names).await;
    assert!(stopped[0].result.is_ok());
    assert!(stopped[1].result.is_ok());
    assert!(stopped[2].result.is_err());
    assert!(!fleet.is_instance_running("alpha"));
    assert!(!fleet.is_instance_running("beta"));
}

#[tokio::test]
async fn runtime_events_trace_the_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let fleet = fleet_with_instance(dir.path(), "alpha", SLEEPER);
    let mut events = fleet.subscribe_events();

    fleet.start_instance("alpha").unwrap();
    fleet.stop_instance("alpha").await.unwrap();

    let first = events.recv().await.unwrap();
    assert_eq!(first.instance, "alpha");
    assert!(matches!(first.reason, RuntimeEventReason::ProcessTracked));

    let second = events.recv().await.unwrap();
    assert_eq!(second.instance, "alpha");
    assert!(matches!(second.reason, RuntimeEventReason::ProcessRemoved));
}

#[tokio::test]
async fn stderr_markers_surface_a_launch_warning() {
    let dir = tempfile::tempdir().unwrap();
    let fleet = fleet_with_instance(dir.path(), "alpha", NOISY);
    let mut events = fleet.subscribe_events();

    fleet.start_instance("alpha").unwrap();

    let message = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.unwrap();
            if let RuntimeEventReason::LaunchWarning { message } = event.reason {
                break message;
            }
        }
    })
    .await
    .expect("no launch warning within five seconds");
    assert!(message.contains("ERROR:gpu_init.cc"), "got: {message}");

    fleet.stop_instance("alpha").await.unwrap();
}

#[tokio::test]
async fn open_url_requires_a_running_instance() {
    let dir = tempfile::tempdir().unwrap();
    let fleet = fleet_with_instance(dir.path(), "alpha", SLEEPER);

    let err = fleet
        .open_instance_url("alpha", "https://browserleaks.com/ip")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InstanceNotRunning);

    fleet.start_instance("alpha").unwrap();
    fleet
        .open_instance_url("alpha", "https://browserleaks.com/ip")
        .unwrap();
    fleet.stop_instance("alpha").await.unwrap();
}

#[tokio::test]
async fn delete_is_rejected_while_running() {
    let dir = tempfile::tempdir().unwrap();
    let fleet = fleet_with_instance(dir.path(), "alpha", SLEEPER);

    fleet.start_instance("alpha").unwrap();
    let err = fleet.delete_instance("alpha").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InstanceRunning);

    fleet.stop_instance("alpha").await.unwrap();
    fleet.delete_instance("alpha").unwrap();
    assert!(fleet.list_instances().unwrap().is_empty());
}
