//! The fleet facade: one handle owning the config store, HTTP client, and
//! process table.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::{ConfigStore, Instance};
use crate::download::{spawn_download, DownloadOutcome, DownloadTask};
use crate::error::{AppError, Result};
use crate::github::{self, ReleaseAsset};
use crate::install::install_archive;
use crate::instance::{BatchOutcome, InstanceStatus};
use crate::ipinfo::{self, IpInfo};
use crate::paths::DataDirs;
use crate::platform::Platform;
use crate::process::{ProcessManager, RuntimeEvent};
use crate::versions;

const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Single-host fleet manager for fingerprint-isolated Chromium instances.
///
/// One `Fleet` owns the persisted registry, the download client, and the
/// table of running processes; embedders hold it behind an `Arc` and call
/// into it from their own runtime.
pub struct Fleet {
    dirs: DataDirs,
    store: ConfigStore,
    client: Client,
    process_manager: Arc<ProcessManager>,
}

impl Fleet {
    /// Build a fleet over the given data directories, creating them as
    /// needed.
    pub fn new(dirs: DataDirs) -> Result<Self> {
        dirs.ensure()?;
        let store = ConfigStore::new(dirs.config_path());
        let client = Client::builder()
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| AppError::network(e.to_string()))?;

        Ok(Self {
            dirs,
            store,
            client,
            process_manager: Arc::new(ProcessManager::new()),
        })
    }

    /// Fleet over `~/.chromium-fleet` for the host platform.
    pub fn open_default() -> Result<Self> {
        let platform = Platform::host()?;
        Self::new(DataDirs::for_home(platform)?)
    }

    pub fn dirs(&self) -> &DataDirs {
        &self.dirs
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn platform(&self) -> Platform {
        self.dirs.platform()
    }

    pub fn process_manager(&self) -> &Arc<ProcessManager> {
        &self.process_manager
    }

    // === Registry ===

    pub fn list_instances(&self) -> Result<Vec<InstanceStatus>> {
        crate::instance::list_instances(&self.store, &self.process_manager)
    }

    pub fn add_instance(&self, instance: Instance) -> Result<()> {
        crate::instance::add_instance(&self.store, &self.dirs, instance)
    }

    pub fn update_instance(&self, original_name: &str, updated: Instance) -> Result<()> {
        crate::instance::update_instance(
            &self.store,
            &self.dirs,
            &self.process_manager,
            original_name,
            updated,
        )
    }

    pub fn delete_instance(&self, name: &str) -> Result<()> {
        crate::instance::delete_instance(&self.store, &self.process_manager, name)
    }

    /// Defaults for the next instance, derived from the current registry.
    pub fn default_instance(&self, ip_info: &IpInfo) -> Result<Instance> {
        let config = self.store.load()?;
        Ok(crate::instance::default_instance(
            &config.instances,
            ip_info,
            self.dirs.platform(),
        ))
    }

    /// Best-effort public IP lookup; failure is logged and yields empty info.
    pub async fn fetch_ip_info(&self) -> IpInfo {
        match ipinfo::fetch_ip_info(&self.client).await {
            Ok(info) => info,
            Err(e) => {
                log::warn!("IP info lookup failed: {}", e);
                IpInfo::default()
            }
        }
    }

    // === Versions ===

    /// Release assets available for this host, newest first.
    pub async fn available_versions(&self) -> Result<Vec<ReleaseAsset>> {
        github::fetch_available_versions(&self.client, self.dirs.platform()).await
    }

    pub fn is_version_installed(&self, tag: &str) -> bool {
        versions::is_installed(&self.store, &self.dirs, tag)
    }

    pub fn resolve_executable(&self, tag: &str) -> Result<Option<PathBuf>> {
        versions::resolve_executable(&self.store, &self.dirs, tag)
    }

    // === Acquisition ===

    /// Where a release asset's archive lands on disk.
    pub fn archive_destination(&self, asset: &ReleaseAsset) -> PathBuf {
        self.dirs.archive_path(&asset.asset_name)
    }

    /// Begin a background download of the asset's archive.
    pub fn start_download(&self, asset: &ReleaseAsset) -> DownloadTask {
        spawn_download(
            self.client.clone(),
            asset.download_url.clone(),
            self.archive_destination(asset),
        )
    }

    /// Install a downloaded archive under the given version tag.
    pub fn install_version(&self, archive: &Path, tag: &str) -> Result<PathBuf> {
        install_archive(&self.store, &self.dirs, archive, tag)
    }

    /// Download the asset and install it under its release tag.
    pub async fn download_and_install(&self, asset: &ReleaseAsset) -> Result<PathBuf> {
        let task = self.start_download(asset);
        let outcome = task
            .join
            .await
            .map_err(|e| AppError::other(format!("download task failed: {e}")))?;

        match outcome {
            DownloadOutcome::Completed => {
                self.install_version(&self.archive_destination(asset), &asset.tag)
            }
            DownloadOutcome::Cancelled => Err(AppError::other("download cancelled")),
            DownloadOutcome::Failed { kind, message } => Err(AppError::new(
                kind,
                HashMap::from([("detail".to_string(), message)]),
            )),
        }
    }

    // === Lifecycle ===

    pub fn start_instance(&self, name: &str) -> Result<u32> {
        crate::instance::start_instance(&self.store, &self.dirs, &self.process_manager, name)
    }

    pub async fn stop_instance(&self, name: &str) -> Result<()> {
        crate::instance::stop_instance(&self.process_manager, name).await
    }

    pub fn start_instances(&self, names: &[String]) -> Vec<BatchOutcome> {
        crate::instance::start_instances(&self.store, &self.dirs, &self.process_manager, names)
    }

    pub async fn stop_instances(&self, names: &[String]) -> Vec<BatchOutcome> {
        crate::instance::stop_instances(&self.process_manager, names).await
    }

    pub fn open_instance_url(&self, name: &str, url: &str) -> Result<()> {
        crate::instance::open_instance_url(
            &self.store,
            &self.dirs,
            &self.process_manager,
            name,
            url,
        )
    }

    pub fn is_instance_running(&self, name: &str) -> bool {
        self.process_manager.is_running(name)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.process_manager.subscribe_runtime_events()
    }

    /// Spawn the background reconciler on the current runtime.
    pub fn start_monitor(&self) -> JoinHandle<()> {
        Arc::clone(&self.process_manager).start_monitor()
    }

    /// Stop every running instance. Blocking; safe to call outside the
    /// runtime on the application exit path.
    pub fn shutdown(&self) {
        log::info!("Shutting down, stopping all instances...");
        self.process_manager.stop_all();
    }
}
