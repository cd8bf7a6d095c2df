use std::sync::Arc;

use axum::{
    Router,
    extract::{FromRef, Path, State},
    http::{StatusCode, Uri},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::{
    application::{chart::ChartService, error::HttpError},
    domain::jurisdiction::Jurisdiction,
    infra::assets::{StaticAssets, serve_static},
    presentation::views::{ChartTemplate, render_template_response},
};

use super::middleware::{log_responses, set_request_context};

#[derive(Clone)]
pub struct HttpState {
    pub charts: Arc<ChartService>,
    pub assets: StaticAssets,
}

impl FromRef<HttpState> for StaticAssets {
    fn from_ref(state: &HttpState) -> Self {
        state.assets.clone()
    }
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(us_page))
        .route("/state/{code}", get(state_page))
        .route("/static/{*path}", get(serve_static))
        .route("/_health", get(health))
        .fallback(fallback)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn us_page(State(state): State<HttpState>) -> Response {
    chart_page(&state, Jurisdiction::Us).await
}

async fn state_page(State(state): State<HttpState>, Path(code): Path<String>) -> Response {
    chart_page(&state, Jurisdiction::state(&code)).await
}

async fn chart_page(state: &HttpState, jurisdiction: Jurisdiction) -> Response {
    let payload = state.charts.payload(&jurisdiction).await;
    render_template_response(ChartTemplate::from_payload(&payload), StatusCode::OK)
}

async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn fallback(uri: Uri) -> Response {
    HttpError::new(
        "infra::http::public::fallback",
        StatusCode::NOT_FOUND,
        "Not found",
        format!("no route for `{}`", uri.path()),
    )
    .into_response()
}
