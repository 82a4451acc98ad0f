//! Fixtures shared by the unit tests.

use crate::progress::{Progress, ProgressSink};
use axum::{
    Router,
    body::{Body, Bytes},
    http::header::CONTENT_LENGTH,
    routing::get,
};
use futures::StreamExt;
use std::time::Duration;
use tokio::net::TcpListener;

pub struct NullSink;

impl ProgressSink for NullSink {
    fn update(&mut self, _progress: Progress) {}
}

/// Starts a server answering `/slow/{name}` with `size` bytes, sent in `chunk`
/// sized pieces with `delay` before each. Returns its base URL.
pub async fn serve_throttled(size: usize, chunk: usize, delay: Duration) -> String {
    let app = Router::new().route(
        "/slow/{name}",
        get(move || async move {
            let pieces = size.div_ceil(chunk);
            let stream = futures::stream::iter(0..pieces).then(move |i| async move {
                tokio::time::sleep(delay).await;
                let len = chunk.min(size - i * chunk);
                Ok::<_, std::io::Error>(Bytes::from(vec![b'x'; len]))
            });
            ([(CONTENT_LENGTH, size.to_string())], Body::from_stream(stream))
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}
