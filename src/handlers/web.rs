use axum::{
    http::{StatusCode, Uri, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "frontend/"]
pub struct Assets;

/// Serves embedded assets; every unknown path gets the single page.
pub async fn static_handler(uri: Uri) -> Response {
    let path = match uri.path().trim_start_matches('/') {
        "" => "index.html",
        path => path,
    };

    let (path, asset) = match Assets::get(path) {
        Some(asset) => (path, asset),
        None => match Assets::get("index.html") {
            Some(asset) => ("index.html", asset),
            None => return (StatusCode::NOT_FOUND, "index.html not embedded").into_response(),
        },
    };

    let mime = mime_guess::from_path(path).first_or_octet_stream();
    ([(CONTENT_TYPE, mime.as_ref())], asset.data).into_response()
}
