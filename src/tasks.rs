use crate::progress::WEB_INTERVAL;
use crate::state::AppState;
use tracing::debug;

pub fn start_background_tasks(state: AppState) {
    // Progress broadcaster: pushes the active set to `/events` subscribers while
    // anything is running, plus one empty update when the last download ends.
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(WEB_INTERVAL);
        let mut was_active = false;

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = state.shutdown.cancelled() => break,
            }

            let downloads = state.manager.snapshot();
            if downloads.is_empty() && !was_active {
                continue;
            }
            was_active = !downloads.is_empty();

            let msg = serde_json::json!({
                "type": "downloads",
                "data": downloads
            })
            .to_string();
            let _ = state.tx.send(msg);
        }
        debug!("Progress broadcaster stopped");
    });
}
