//! Shared instance data shapes.

use std::path::PathBuf;

use serde::Serialize;

use crate::error::Result;

/// Registry entry joined with live run-state.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceStatus {
    pub name: String,
    pub fingerprint: String,
    pub profile_dir: PathBuf,
    pub timezone: String,
    pub proxy_server: String,
    pub version: String,
    pub running: bool,
    pub pid: Option<u32>,
}

/// Per-instance result of a batch start or stop.
#[derive(Debug)]
pub struct BatchOutcome {
    pub name: String,
    pub result: Result<()>,
}
