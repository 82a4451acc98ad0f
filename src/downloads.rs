use crate::progress::{Progress, ProgressSink};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio_util::sync::CancellationToken;

/// What `/api/progress` reports for one in-flight transfer.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DownloadView {
    pub id: String,
    pub url: String,
    pub filename: String,
    #[serde(rename = "progress")]
    pub bytes_transferred: u64,
    #[serde(rename = "total")]
    pub total_bytes: u64,
    #[serde(rename = "speed")]
    pub throughput: u64, // bytes per second
    pub started_at: DateTime<Utc>,
}

pub struct ActiveDownload {
    pub view: DownloadView,
    pub seq: u64,
    /// Known once the transfer has opened its output file.
    pub output_path: Option<PathBuf>,
    pub cancel: CancellationToken,
}

impl ActiveDownload {
    pub fn new(seq: u64, url: &str, filename: String, cancel: CancellationToken) -> Self {
        Self {
            view: DownloadView {
                id: format!("dl-{}", seq),
                url: url.to_string(),
                filename,
                bytes_transferred: 0,
                total_bytes: 0,
                throughput: 0,
                started_at: Utc::now(),
            },
            seq,
            output_path: None,
            cancel,
        }
    }

    pub fn id(&self) -> &str {
        &self.view.id
    }
}

/// In-flight transfers keyed by ID.
#[derive(Clone, Default)]
pub struct Downloads(Arc<RwLock<HashMap<String, ActiveDownload>>>);

impl Downloads {
    pub fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ActiveDownload>> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ActiveDownload>> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copies of every entry, oldest first.
    pub fn snapshot(&self) -> Vec<DownloadView> {
        let downloads = self.read();
        let mut entries: Vec<&ActiveDownload> = downloads.values().collect();
        entries.sort_by_key(|d| (d.view.started_at, d.seq));
        entries.into_iter().map(|d| d.view.clone()).collect()
    }
}

/// Feeds a transfer's progress into its registry entry.
///
/// Updates for an entry that is gone (cancelled) are dropped.
pub struct RegistrySink {
    downloads: Downloads,
    id: String,
}

impl RegistrySink {
    pub fn new(downloads: Downloads, id: String) -> Self {
        Self { downloads, id }
    }
}

impl ProgressSink for RegistrySink {
    fn opened(&mut self, path: &Path, total: u64) {
        if let Some(download) = self.downloads.write().get_mut(&self.id) {
            download.output_path = Some(path.to_path_buf());
            download.view.total_bytes = total;
            if let Some(name) = path.file_name() {
                download.view.filename = name.to_string_lossy().into_owned();
            }
        }
    }

    fn update(&mut self, progress: Progress) {
        if let Some(download) = self.downloads.write().get_mut(&self.id) {
            download.view.bytes_transferred = progress.transferred;
            download.view.total_bytes = progress.total;
            download.view.throughput = progress.speed;
        }
    }

    /// Clears the entry's output path so a later cancel leaves the file alone.
    /// Runs under the registry lock, the same one `cancel` removes entries under.
    fn claim(&mut self) -> bool {
        match self.downloads.write().get_mut(&self.id) {
            Some(download) if !download.cancel.is_cancelled() => {
                download.output_path = None;
                true
            }
            _ => false,
        }
    }
}
