//! Owner of every in-flight transfer and of the download history.
//!
//! A single [`DownloadManager`] is built at startup and cloned into whatever needs
//! it; clones share the same registry, history and ID counter. Two locks guard
//! the shared state, one for the registry of active downloads and one for the
//! history, and no code path holds both at once.

use crate::downloads::{ActiveDownload, DownloadView, Downloads, RegistrySink};
use crate::error::{DownloadError, DuplicateReason};
use crate::fingerprint::filename_for;
use crate::history::{DownloadRecord, HistoryStore};
use crate::progress::{ProgressSink, WEB_INTERVAL};
use crate::transfer::{self, remove_partial};
use chrono::Utc;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct DownloadManager {
    output_dir: PathBuf,
    client: Client,
    history: Arc<RwLock<HistoryStore>>,
    downloads: Downloads,
    next_id: Arc<AtomicU64>,
    interval: Duration,
}

impl DownloadManager {
    /// `output_dir` must already exist; recorded paths are joined onto it as is.
    pub fn new(output_dir: PathBuf, history: HistoryStore) -> Self {
        Self {
            output_dir,
            client: Client::new(),
            history: Arc::new(RwLock::new(history)),
            downloads: Downloads::default(),
            next_id: Arc::new(AtomicU64::new(0)),
            interval: WEB_INTERVAL,
        }
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Rejects `url` if it, or the filename derived from it, is in the history.
    ///
    /// Returns the derived filename otherwise.
    pub async fn check_duplicate(&self, url: &str) -> Result<String, DownloadError> {
        let filename = filename_for(url);
        let history = self.history.read().await;
        if let Some(record) = history.lookup_by_url(url) {
            return Err(DownloadError::Duplicate {
                reason: DuplicateReason::SameUrl,
                name: record.filename.display().to_string(),
            });
        }
        if history.lookup_by_filename(&filename).is_some() {
            return Err(DownloadError::Duplicate {
                reason: DuplicateReason::SameFilename,
                name: filename,
            });
        }
        Ok(filename)
    }

    /// Registers `url` and transfers it in the background. Returns the new ID.
    pub async fn start(&self, url: &str) -> Result<String, DownloadError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(DownloadError::InvalidUrl(url.to_string()));
        }
        let filename = self.check_duplicate(url).await?;

        let token = CancellationToken::new();
        let id = {
            let mut downloads = self.downloads.write();
            if downloads.values().any(|d| d.view.url == url) {
                return Err(DownloadError::Duplicate {
                    reason: DuplicateReason::InFlight,
                    name: filename,
                });
            }
            let seq = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
            let entry = ActiveDownload::new(seq, url, filename, token.clone());
            let id = entry.id().to_string();
            downloads.insert(id.clone(), entry);
            id
        };
        info!("Starting download {}: {}", id, url);

        let manager = self.clone();
        let task_id = id.clone();
        let url = url.to_string();
        tokio::spawn(async move {
            manager.run(task_id, url, token).await;
        });

        Ok(id)
    }

    async fn run(self, id: String, url: String, token: CancellationToken) {
        let mut sink = RegistrySink::new(self.downloads.clone(), id.clone());
        match self.download(&url, &token, &mut sink).await {
            Ok(record) => info!(
                "Download {} finished: {:?} ({} bytes)",
                id, record.filename, record.size
            ),
            Err(DownloadError::Cancelled) => debug!("Download {} cancelled", id),
            Err(e) => warn!("Download {} failed: {}", id, e),
        }
        self.downloads.write().remove(&id);
    }

    /// Transfers `url` and records it in the history once it is complete.
    ///
    /// No duplicate check happens here; callers decide whether to run one.
    pub async fn download(
        &self,
        url: &str,
        token: &CancellationToken,
        sink: &mut dyn ProgressSink,
    ) -> Result<DownloadRecord, DownloadError> {
        let transfer = transfer::execute(
            &self.client,
            token,
            url,
            &self.output_dir,
            sink,
            self.interval,
        )
        .await?;

        if !sink.claim() || token.is_cancelled() {
            remove_partial(&transfer.path).await;
            return Err(DownloadError::Cancelled);
        }

        let mut history = self.history.write().await;
        let record = history.record(
            url,
            &filename_for(url),
            &transfer.path,
            transfer.bytes,
            Utc::now(),
        );
        if let Err(e) = history.persist().await {
            warn!("Could not save history to {:?}: {}", history.path(), e);
        }
        Ok(record)
    }

    /// Point-in-time copy of the active downloads, oldest first.
    pub fn snapshot(&self) -> Vec<DownloadView> {
        self.downloads.snapshot()
    }

    /// Aborts the transfer `id` and forgets it. Returns `false` for unknown IDs.
    pub async fn cancel(&self, id: &str) -> bool {
        let Some(entry) = self.downloads.write().remove(id) else {
            return false;
        };
        abort(entry).await;
        true
    }

    /// Cancels everything in flight.
    pub async fn cancel_all(&self) -> usize {
        let entries: Vec<ActiveDownload> = self
            .downloads
            .write()
            .drain()
            .map(|(_, entry)| entry)
            .collect();
        let count = entries.len();
        for entry in entries {
            abort(entry).await;
        }
        count
    }

    /// Completed downloads, newest first.
    pub async fn history(&self) -> Vec<DownloadRecord> {
        self.history.read().await.records_newest_first()
    }

    /// Filename index of the history as `(filename, url)` pairs.
    pub async fn downloaded_files(&self) -> Vec<(String, String)> {
        self.history.read().await.files()
    }
}

async fn abort(entry: ActiveDownload) {
    entry.cancel.cancel();
    if let Some(path) = &entry.output_path {
        remove_partial(path).await;
    }
    info!("Cancelled download {}: {}", entry.id(), entry.view.url);
}
