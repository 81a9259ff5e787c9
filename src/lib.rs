//! Single-host fleet manager for fingerprint-isolated Chromium instances.
//!
//! The crate keeps a persisted registry of named instances (fingerprint
//! seed, profile directory, timezone, proxy), a catalogue of installed
//! Chromium builds, and an in-memory table of running browser processes.
//! The [`Fleet`] facade ties them together: resolve a build from the
//! release feed, download and install it, then start isolated browser
//! processes against it.

mod archive;
mod config;
mod download;
mod error;
mod fleet;
mod github;
mod install;
mod instance;
mod ipinfo;
mod paths;
mod platform;
mod process;
mod versions;

pub use config::{
    default_env, ConfigStore, FleetConfig, Instance, VersionRecord, DEFAULT_VERSION_TAG,
};
pub use download::{spawn_download, DownloadEvent, DownloadHandle, DownloadOutcome, DownloadTask};
pub use error::{AppError, ErrorKind, Result};
pub use fleet::Fleet;
pub use github::{collect_platform_assets, GitHubAsset, GitHubRelease, ReleaseAsset};
pub use install::install_archive;
pub use instance::{default_instance, BatchOutcome, InstanceStatus};
pub use ipinfo::IpInfo;
pub use paths::DataDirs;
pub use platform::Platform;
pub use process::{ProcessEntry, ProcessManager, RuntimeEvent, RuntimeEventReason};
