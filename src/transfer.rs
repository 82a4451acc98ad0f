//! A single HTTP GET streamed to disk.

use crate::error::DownloadError;
use crate::fingerprint::{disambiguate, filename_for};
use crate::progress::{ProgressReporter, ProgressSink};
use futures::StreamExt;
use reqwest::{Client, Response, StatusCode};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub path: PathBuf,
    /// Bytes actually written, independent of any advertised length.
    pub bytes: u64,
}

/// Downloads `url` into `output_dir`.
///
/// The token is checked between every chunk of the body. Whenever this returns an
/// error after the output file was created, the file has already been removed.
pub async fn execute(
    client: &Client,
    token: &CancellationToken,
    url: &str,
    output_dir: &Path,
    sink: &mut dyn ProgressSink,
    interval: Duration,
) -> Result<Transfer, DownloadError> {
    let response = tokio::select! {
        biased;
        _ = token.cancelled() => return Err(DownloadError::Cancelled),
        response = client.get(url).send() => response?,
    };

    if response.status() != StatusCode::OK {
        return Err(DownloadError::BadStatus(response.status().to_string()));
    }
    let total = response.content_length().unwrap_or(0);

    let (path, file) = create_output(output_dir, url).await?;
    debug!("Writing {} to {:?}", url, path);

    let mut reporter = ProgressReporter::new(sink, interval);
    reporter.start(&path, total);
    let result = stream_body(response, file, token, &mut reporter).await;
    reporter.finish();

    match result {
        Ok(bytes) => Ok(Transfer { path, bytes }),
        Err(e) => {
            remove_partial(&path).await;
            Err(e)
        }
    }
}

/// Opens the fingerprinted name, or the hash-suffixed one if it is taken.
async fn create_output(output_dir: &Path, url: &str) -> Result<(PathBuf, File), DownloadError> {
    let filename = filename_for(url);
    let primary = output_dir.join(&filename);
    match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&primary)
        .await
    {
        Ok(file) => return Ok((primary, file)),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
        Err(e) => return Err(e.into()),
    }

    let fallback = output_dir.join(disambiguate(&filename, url));
    let file = File::create(&fallback).await?;
    Ok((fallback, file))
}

async fn stream_body(
    response: Response,
    file: File,
    token: &CancellationToken,
    reporter: &mut ProgressReporter<'_>,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();

    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(DownloadError::Cancelled),
            next = stream.next() => next,
        };
        let Some(chunk) = next else {
            break;
        };
        let chunk = chunk?;
        writer.write_all(&chunk).await?;
        reporter.record(chunk.len() as u64);
    }

    writer.flush().await?;
    Ok(reporter.transferred())
}

/// Removes a file left behind by an unfinished transfer.
pub async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != ErrorKind::NotFound
    {
        warn!("Failed to remove partial download {:?}: {}", path, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::url_hash;
    use crate::testing::{NullSink, serve_throttled};
    use tempfile::tempdir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FAST: Duration = Duration::from_millis(1);

    async fn mock_file(server: &MockServer, route: &str, body: Vec<u8>) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(server)
            .await;
    }

    fn dir_is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn test_streams_body_to_disk() {
        let server = MockServer::start().await;
        let body: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        mock_file(&server, "/files/data.bin", body.clone()).await;
        let dir = tempdir().unwrap();

        let url = format!("{}/files/data.bin", server.uri());
        let transfer = execute(
            &Client::new(),
            &CancellationToken::new(),
            &url,
            dir.path(),
            &mut NullSink,
            FAST,
        )
        .await
        .unwrap();

        assert_eq!(transfer.path, dir.path().join("data.bin"));
        assert_eq!(transfer.bytes, body.len() as u64);
        assert_eq!(std::fs::read(&transfer.path).unwrap(), body);
    }

    #[tokio::test]
    async fn test_bad_status_leaves_nothing_behind() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let dir = tempdir().unwrap();

        let url = format!("{}/missing.zip", server.uri());
        let err = execute(
            &Client::new(),
            &CancellationToken::new(),
            &url,
            dir.path(),
            &mut NullSink,
            FAST,
        )
        .await
        .unwrap_err();

        match err {
            DownloadError::BadStatus(status) => assert_eq!(status, "404 Not Found"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_connection_failure_is_network_error() {
        let dir = tempdir().unwrap();
        let err = execute(
            &Client::new(),
            &CancellationToken::new(),
            "http://127.0.0.1:1/file.bin",
            dir.path(),
            &mut NullSink,
            FAST,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DownloadError::Network(_)));
    }

    #[tokio::test]
    async fn test_existing_file_gets_hash_suffix() {
        let server = MockServer::start().await;
        mock_file(&server, "/b/report.pdf", b"second".to_vec()).await;
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("report.pdf"), b"first").unwrap();

        let url = format!("{}/b/report.pdf", server.uri());
        let transfer = execute(
            &Client::new(),
            &CancellationToken::new(),
            &url,
            dir.path(),
            &mut NullSink,
            FAST,
        )
        .await
        .unwrap();

        assert_eq!(
            transfer.path,
            dir.path().join(format!("report_{}.pdf", url_hash(&url)))
        );
        assert_eq!(std::fs::read(dir.path().join("report.pdf")).unwrap(), b"first");
        assert_eq!(std::fs::read(&transfer.path).unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_before_request() {
        let server = MockServer::start().await;
        mock_file(&server, "/a.bin", vec![1; 16]).await;
        let dir = tempdir().unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let url = format!("{}/a.bin", server.uri());
        let err = execute(&Client::new(), &token, &url, dir.path(), &mut NullSink, FAST)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Cancelled));
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_cancel_mid_stream_removes_partial_file() {
        let base = serve_throttled(1024 * 1024, 16 * 1024, Duration::from_millis(20)).await;
        let dir = tempdir().unwrap();
        let token = CancellationToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            canceller.cancel();
        });

        let url = format!("{}/slow/big.bin", base);
        let err = execute(&Client::new(), &token, &url, dir.path(), &mut NullSink, FAST)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Cancelled));
        assert!(!dir.path().join("big.bin").exists());
    }
}
