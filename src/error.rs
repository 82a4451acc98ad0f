use std::fmt;

/// Why a URL was rejected as a duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateReason {
    SameUrl,
    SameFilename,
    InFlight,
}

impl fmt::Display for DuplicateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SameUrl => "already downloaded",
            Self::SameFilename => "already have",
            Self::InFlight => "already downloading",
        })
    }
}

/// Reasons a download is refused or ends without producing a file.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("invalid url: {0:?}")]
    InvalidUrl(String),

    /// The URL or its fingerprint is already in the history, or the URL is in flight.
    #[error("{reason}: {name}")]
    Duplicate {
        reason: DuplicateReason,
        name: String,
    },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("bad status: {0}")]
    BadStatus(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("download cancelled")]
    Cancelled,
}

/// Failures reading or writing the history file.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("history file io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("history file is not valid json: {0}")]
    Json(#[from] serde_json::Error),
}
