//! Static asset serving from a directory on disk (the client bundle and styles).

use std::{
    io::ErrorKind,
    path::{Component, Path as FsPath, PathBuf},
};

use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use mime_guess::Mime;
use tracing::error;

use crate::application::error::ErrorReport;

const SOURCE: &str = "infra::assets::serve_static";

#[derive(Debug, Clone)]
pub struct StaticAssets {
    root: PathBuf,
}

impl StaticAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &FsPath {
        &self.root
    }

    /// Map a request path onto a file below the root, rejecting traversal and
    /// directory requests.
    fn resolve(&self, requested: &str) -> Option<PathBuf> {
        let candidate = requested.trim_start_matches('/');
        if candidate.is_empty() || candidate.ends_with('/') {
            return None;
        }

        let relative = FsPath::new(candidate);
        let is_plain = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        is_plain.then(|| self.root.join(relative))
    }

    async fn load(&self, requested: &str) -> Result<Option<(Bytes, Mime)>, std::io::Error> {
        let Some(path) = self.resolve(requested) else {
            return Ok(None);
        };

        match tokio::fs::read(&path).await {
            Ok(contents) => {
                let mime = mime_guess::from_path(&path).first_or_octet_stream();
                Ok(Some((Bytes::from(contents), mime)))
            }
            Err(err) if matches!(err.kind(), ErrorKind::NotFound | ErrorKind::IsADirectory) => {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

pub async fn serve_static(State(assets): State<StaticAssets>, Path(path): Path<String>) -> Response {
    match assets.load(&path).await {
        Ok(Some((bytes, mime))) => build_response(bytes, mime),
        Ok(None) => not_found_response(),
        Err(err) => {
            error!(
                target: "covid_chart::assets",
                path = %path,
                error = %err,
                "failed to read static asset"
            );
            let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
            ErrorReport::from_error(SOURCE, StatusCode::INTERNAL_SERVER_ERROR, &err)
                .attach(&mut response);
            response
        }
    }
}

fn not_found_response() -> Response {
    let mut response = StatusCode::NOT_FOUND.into_response();
    ErrorReport::from_message(SOURCE, StatusCode::NOT_FOUND, "Static asset not found")
        .attach(&mut response);
    response
}

fn build_response(bytes: Bytes, mime: Mime) -> Response {
    let len = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&len.to_string()) {
        headers.insert(header::CONTENT_LENGTH, value);
    }
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=3600"),
    );

    response
}
