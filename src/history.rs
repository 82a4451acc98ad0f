//! Persistent record of completed downloads.
//!
//! The history file holds two indices over the same records: URL → record and
//! fingerprint → URL. Both are consulted before any network activity.

use crate::error::HistoryError;
use crate::fingerprint::filename_for;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub url: String,
    /// Absolute path of the file written to disk.
    pub filename: PathBuf,
    #[serde(alias = "downloaded")]
    pub downloaded_at: DateTime<Utc>,
    pub size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    #[serde(default)]
    pub downloads: HashMap<String, DownloadRecord>,
    #[serde(default)]
    pub downloaded_files: HashMap<String, String>,
}

impl History {
    /// Rebuilds the filename index for files that only carry `downloads`.
    ///
    /// Returns whether anything had to be rebuilt.
    fn migrate(&mut self) -> bool {
        if !self.downloaded_files.is_empty() || self.downloads.is_empty() {
            return false;
        }
        self.downloaded_files = self
            .downloads
            .keys()
            .map(|url| (filename_for(url), url.clone()))
            .collect();
        true
    }
}

pub struct HistoryStore {
    path: PathBuf,
    history: History,
}

impl HistoryStore {
    /// Reads the history at `path`. A missing file yields an empty store.
    ///
    /// The flag is `true` when a legacy file was upgraded in memory and should be
    /// persisted once by the caller.
    pub async fn load(path: impl Into<PathBuf>) -> Result<(Self, bool), HistoryError> {
        let path = path.into();
        let history = match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str::<History>(&content)?,
            Err(e) if e.kind() == ErrorKind::NotFound => History::default(),
            Err(e) => return Err(e.into()),
        };

        let mut store = Self { path, history };
        let migrated = store.history.migrate();
        if migrated {
            info!(
                "Rebuilt filename index for {} history entries",
                store.history.downloads.len()
            );
        }
        Ok((store, migrated))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lookup_by_url(&self, url: &str) -> Option<&DownloadRecord> {
        self.history.downloads.get(url)
    }

    pub fn lookup_by_filename(&self, filename: &str) -> Option<&str> {
        self.history
            .downloaded_files
            .get(filename)
            .map(String::as_str)
    }

    /// Inserts into both indices. The caller persists afterwards.
    pub fn record(
        &mut self,
        url: &str,
        fingerprint: &str,
        path: &Path,
        size: u64,
        downloaded_at: DateTime<Utc>,
    ) -> DownloadRecord {
        let record = DownloadRecord {
            url: url.to_string(),
            filename: path.to_path_buf(),
            downloaded_at,
            size,
        };
        self.history
            .downloads
            .insert(url.to_string(), record.clone());
        self.history
            .downloaded_files
            .insert(fingerprint.to_string(), url.to_string());
        record
    }

    /// Overwrites the history file with the full, pretty-printed structure.
    pub async fn persist(&self) -> Result<(), HistoryError> {
        let json = serde_json::to_string_pretty(&self.history)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }

    /// Every `(filename, url)` pair of the filename index, sorted by filename.
    pub fn files(&self) -> Vec<(String, String)> {
        let mut files: Vec<(String, String)> = self
            .history
            .downloaded_files
            .iter()
            .map(|(name, url)| (name.clone(), url.clone()))
            .collect();
        files.sort();
        files
    }

    pub fn records_newest_first(&self) -> Vec<DownloadRecord> {
        let mut records: Vec<DownloadRecord> = self.history.downloads.values().cloned().collect();
        records.sort_by(|a, b| b.downloaded_at.cmp(&a.downloaded_at));
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let (store, migrated) = HistoryStore::load(dir.path().join("history.json"))
            .await
            .unwrap();
        assert!(store.history.downloads.is_empty());
        assert!(!migrated);
    }

    #[tokio::test]
    async fn test_malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            HistoryStore::load(&path).await,
            Err(HistoryError::Json(_))
        ));
    }

    #[tokio::test]
    async fn test_persist_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.json");
        let (mut store, _) = HistoryStore::load(&path).await.unwrap();

        let now = Utc::now();
        store.record(
            "https://example.com/a.iso",
            "a.iso",
            &dir.path().join("a.iso"),
            42,
            now,
        );
        store.record(
            "https://example.com/b.iso",
            "b.iso",
            &dir.path().join("b_1234.iso"),
            7,
            now + Duration::seconds(1),
        );
        store.persist().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\n  \"downloads\""));

        let (loaded, migrated) = HistoryStore::load(&path).await.unwrap();
        assert!(!migrated);
        assert_eq!(loaded.history, store.history);
        assert_eq!(
            loaded.lookup_by_filename("b.iso"),
            Some("https://example.com/b.iso")
        );
        assert_eq!(
            loaded.lookup_by_url("https://example.com/a.iso").map(|r| r.size),
            Some(42)
        );
    }

    #[tokio::test]
    async fn test_files_follow_filename_index() {
        let dir = tempdir().unwrap();
        let (mut store, _) = HistoryStore::load(dir.path().join("history.json"))
            .await
            .unwrap();
        let now = Utc::now();
        store.record(
            "https://a.example/x/data.csv",
            "data.csv",
            &dir.path().join("data.csv"),
            1,
            now,
        );
        store.record(
            "https://b.example/y/data.csv",
            "data.csv",
            &dir.path().join("data_1234.csv"),
            2,
            now,
        );
        store.record(
            "https://a.example/z.txt",
            "z.txt",
            &dir.path().join("z.txt"),
            3,
            now,
        );

        assert_eq!(store.records_newest_first().len(), 3);
        assert_eq!(
            store.files(),
            vec![
                ("data.csv".to_string(), "https://b.example/y/data.csv".to_string()),
                ("z.txt".to_string(), "https://a.example/z.txt".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_legacy_file_is_migrated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.json");
        let legacy = serde_json::json!({
            "downloads": {
                "https://example.com/files/report.pdf": {
                    "url": "https://example.com/files/report.pdf",
                    "filename": "/data/report.pdf",
                    "downloaded": "2024-03-01T10:00:00Z",
                    "size": 100
                },
                "https://example.com/": {
                    "url": "https://example.com/",
                    "filename": "/data/index",
                    "downloaded": "2024-03-02T10:00:00Z",
                    "size": 5
                }
            }
        });
        std::fs::write(&path, legacy.to_string()).unwrap();

        let (store, migrated) = HistoryStore::load(&path).await.unwrap();
        assert!(migrated);

        let expected: HashMap<String, String> = store
            .history
            .downloads
            .keys()
            .map(|u| (filename_for(u), u.clone()))
            .collect();
        assert_eq!(store.history.downloaded_files, expected);
        assert_eq!(
            store.lookup_by_filename("report.pdf"),
            Some("https://example.com/files/report.pdf")
        );

        let records = store.records_newest_first();
        assert_eq!(records[0].url, "https://example.com/");
        assert_eq!(records[1].url, "https://example.com/files/report.pdf");
    }
}
