//! Line-mode front end: one URL at a time, progress redrawn on a single line.

use crate::error::{DownloadError, DuplicateReason};
use crate::fingerprint::filename_for;
use crate::manager::DownloadManager;
use crate::progress::{ConsoleSink, format_bytes};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Stopped early by an interrupt signal.
    pub interrupted: bool,
}

/// Strips surrounding whitespace and any embedded line breaks.
pub fn clean_url(raw: &str) -> String {
    raw.trim().replace(['\r', '\n'], "")
}

/// Reads URLs one per line until an empty line or end of input.
pub async fn read_urls<R: AsyncBufRead + Unpin>(reader: R) -> std::io::Result<Vec<String>> {
    let mut lines = reader.lines();
    let mut urls = Vec::new();
    while let Some(line) = lines.next_line().await? {
        let url = clean_url(&line);
        if url.is_empty() {
            break;
        }
        urls.push(url);
    }
    Ok(urls)
}

/// URLs from the command line, or from stdin when none were given.
pub async fn collect_urls(args: &[String]) -> std::io::Result<Vec<String>> {
    if !args.is_empty() {
        return Ok(args
            .iter()
            .map(|u| clean_url(u))
            .filter(|u| !u.is_empty())
            .collect());
    }
    println!("Paste URLs (one per line, empty line or Ctrl+D to finish):");
    read_urls(tokio::io::BufReader::new(tokio::io::stdin())).await
}

pub async fn list(manager: &DownloadManager) {
    let files = manager.downloaded_files().await;
    if files.is_empty() {
        println!("No downloads in history");
        return;
    }
    println!("Downloaded files ({}):", files.len());
    for (name, url) in files {
        println!("  {}\n    URL: {}", name, truncate(&url, 80));
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

/// Downloads `urls` in order. The first time `interrupt` resolves, the running
/// transfer is cancelled (its partial file removed) and the batch stops.
pub async fn run_batch<F>(
    manager: &DownloadManager,
    urls: &[String],
    force: bool,
    interrupt: F,
) -> BatchOutcome
where
    F: Future<Output = ()> + Send + 'static,
{
    let shutdown = CancellationToken::new();
    let watcher = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            interrupt.await;
            shutdown.cancel();
        })
    };

    let mut outcome = BatchOutcome::default();
    for url in urls {
        if !force {
            match manager.check_duplicate(url).await {
                Ok(_) => {}
                Err(DownloadError::Duplicate { reason, name }) => {
                    let label = match reason {
                        DuplicateReason::SameUrl => "same URL",
                        _ => "already have",
                    };
                    println!("SKIP ({}): {}", label, name);
                    outcome.skipped += 1;
                    continue;
                }
                Err(e) => {
                    eprintln!("ERROR: {}", e);
                    outcome.failed += 1;
                    continue;
                }
            }
        }

        println!("Downloading: {}", filename_for(url));
        let token = shutdown.child_token();
        let mut sink = ConsoleSink::default();
        match manager.download(url, &token, &mut sink).await {
            Ok(record) => {
                println!(
                    "OK: {} ({})",
                    record.filename.display(),
                    format_bytes(record.size)
                );
                outcome.downloaded += 1;
            }
            Err(DownloadError::Cancelled) if shutdown.is_cancelled() => {
                println!("Cleaned up partial download: {}", filename_for(url));
                outcome.interrupted = true;
                break;
            }
            Err(e) => {
                eprintln!("ERROR: {}", e);
                outcome.failed += 1;
            }
        }
    }

    watcher.abort();
    info!(
        "Batch finished: {} downloaded, {} skipped, {} failed",
        outcome.downloaded, outcome.skipped, outcome.failed
    );
    outcome
}
