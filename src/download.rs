//! Streamed downloads with progress events and cooperative cancellation.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::StreamExt as _;
use reqwest::Client;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::ErrorKind;

/// Events for one download, delivered in emit order.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DownloadEvent {
    /// Emitted only when the server reports a content length; the value
    /// never decreases and each value is emitted at most once.
    Progress { percent: u8 },
    Status { message: String },
    /// Terminal; emitted exactly once per download.
    Finished { outcome: DownloadOutcome },
}

/// Terminal result of one download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DownloadOutcome {
    Completed,
    Cancelled,
    Failed { kind: ErrorKind, message: String },
}

impl DownloadOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    fn network(message: impl Into<String>) -> Self {
        Self::Failed {
            kind: ErrorKind::Network,
            message: message.into(),
        }
    }

    fn io(message: impl Into<String>) -> Self {
        Self::Failed {
            kind: ErrorKind::Io,
            message: message.into(),
        }
    }
}

/// Cancellation flag shared with one in-flight download. Cancelling takes
/// effect at the next chunk boundary; it has no effect on other downloads.
#[derive(Debug, Clone, Default)]
pub struct DownloadHandle {
    cancelled: Arc<AtomicBool>,
}

impl DownloadHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// A spawned download: its event stream, cancellation handle, and join
/// handle resolving to the terminal outcome.
#[derive(Debug)]
pub struct DownloadTask {
    pub events: mpsc::UnboundedReceiver<DownloadEvent>,
    pub handle: DownloadHandle,
    pub join: JoinHandle<DownloadOutcome>,
}

/// Spawn a download onto the runtime. Dropping the event receiver does not
/// abort the transfer; cancellation goes through the handle.
pub fn spawn_download(client: Client, url: String, dest: PathBuf) -> DownloadTask {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = DownloadHandle::new();
    let task_handle = handle.clone();
    let join =
        tokio::spawn(async move { download(&client, &url, &dest, &tx, &task_handle).await });
    DownloadTask {
        events: rx,
        handle,
        join,
    }
}

/// Run a download to completion. Exactly one `Finished` event is emitted,
/// and every non-success outcome removes the partial file.
pub async fn download(
    client: &Client,
    url: &str,
    dest: &Path,
    events: &mpsc::UnboundedSender<DownloadEvent>,
    handle: &DownloadHandle,
) -> DownloadOutcome {
    let outcome = transfer(client, url, dest, events, handle).await;
    if !outcome.is_completed() {
        remove_partial(dest);
    }
    let _ = events.send(DownloadEvent::Finished {
        outcome: outcome.clone(),
    });
    outcome
}

async fn transfer(
    client: &Client,
    url: &str,
    dest: &Path,
    events: &mpsc::UnboundedSender<DownloadEvent>,
    handle: &DownloadHandle,
) -> DownloadOutcome {
    if let Some(parent) = dest.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            return DownloadOutcome::io(e.to_string());
        }
    }

    send_status(events, format!("connecting to {url}"));

    let resp = match client
        .get(url)
        .header("User-Agent", "chromium-fleet")
        .send()
        .await
    {
        Ok(resp) => resp,
        Err(e) => return DownloadOutcome::network(e.to_string()),
    };

    if !resp.status().is_success() {
        return DownloadOutcome::network(format!("status {}", resp.status()));
    }

    let total = resp.content_length().unwrap_or(0);
    let mut file = match fs::File::create(dest) {
        Ok(file) => file,
        Err(e) => return DownloadOutcome::io(e.to_string()),
    };

    send_status(events, "downloading".to_string());

    let mut stream = resp.bytes_stream();
    let mut received: u64 = 0;
    let mut last_percent: u8 = 0;

    while let Some(chunk) = stream.next().await {
        if handle.is_cancelled() {
            return DownloadOutcome::Cancelled;
        }
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => return DownloadOutcome::network(e.to_string()),
        };
        if let Err(e) = file.write_all(&chunk) {
            return DownloadOutcome::io(e.to_string());
        }
        received = received.saturating_add(chunk.len() as u64);
        if total > 0 {
            let percent = percent_of(received, total);
            if percent > last_percent {
                last_percent = percent;
                let _ = events.send(DownloadEvent::Progress { percent });
            }
        }
    }

    if let Err(e) = file.flush() {
        return DownloadOutcome::io(e.to_string());
    }

    send_status(events, "download complete".to_string());
    DownloadOutcome::Completed
}

fn percent_of(received: u64, total: u64) -> u8 {
    let percent = received.saturating_mul(100) / total;
    percent.min(100) as u8
}

fn remove_partial(dest: &Path) {
    if dest.exists() {
        if let Err(e) = fs::remove_file(dest) {
            log::warn!("Failed to remove partial download {:?}: {}", dest, e);
        }
    }
}

fn send_status(events: &mpsc::UnboundedSender<DownloadEvent>, message: String) {
    let _ = events.send(DownloadEvent::Status { message });
}
