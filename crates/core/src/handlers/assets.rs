use axum::{
    body::Body,
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use rust_embed::RustEmbed;

use crate::AppError;

#[derive(RustEmbed)]
#[folder = "web/"]
struct Asset;

fn respond(path: &str, data: std::borrow::Cow<'static, [u8]>) -> Response {
    let mime_type = mime_guess::from_path(path).first_or_octet_stream();
    Response::builder()
        .header(header::CONTENT_TYPE, mime_type.as_ref())
        .body(Body::from(data))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Serves the embedded dashboard. Unknown paths fall back to `index.html`;
/// unknown `/api/*` paths get a JSON 404.
pub async fn static_handler(uri: Uri) -> Response {
    let path = uri.path().trim_start_matches('/');
    if path == "api" || path.starts_with("api/") {
        return AppError::NotFound(format!("No API route for {}", uri.path())).into_response();
    }

    let path = if path.is_empty() { "index.html" } else { path };
    if let Some(file) = Asset::get(path) {
        return respond(path, file.data);
    }
    match Asset::get("index.html") {
        Some(index) => respond("index.html", index.data),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
