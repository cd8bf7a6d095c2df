use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::application::chart::ChartPayload;

const DEFAULT_TITLE: &str = "COVID-19 Chart";

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

/// HTML shell; the client bundle decodes `payload` and draws the charts.
#[derive(Template)]
#[template(path = "chart.html")]
pub struct ChartTemplate {
    pub title: String,
    pub payload: String,
}

impl ChartTemplate {
    pub fn new(payload: String) -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            payload,
        }
    }

    /// Encode `payload` for embedding. Serialization failures leave the
    /// payload empty so the page still loads.
    pub fn from_payload(payload: &ChartPayload) -> Self {
        let encoded = payload.to_base64().unwrap_or_else(|err| {
            error!(
                target: "covid_chart::presentation",
                page_type = %payload.page_type,
                error = %err,
                "failed to encode chart payload"
            );
            String::new()
        });
        Self::new(encoded)
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, TemplateRenderError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
    })
}

/// Render `template`; a failure is logged and an empty document is still sent.
pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => {
            error!(
                target: "covid_chart::presentation",
                source = err.source,
                error = %err.error,
                "execute template failed"
            );
            (status, Html(String::new())).into_response()
        }
    }
}
