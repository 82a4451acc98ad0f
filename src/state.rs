use crate::manager::DownloadManager;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub manager: DownloadManager,
    pub tx: broadcast::Sender<String>,
    /// Cancelled when the server starts shutting down.
    pub shutdown: CancellationToken,
}
