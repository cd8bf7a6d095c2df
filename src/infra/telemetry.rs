use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::fetch::{
    METRIC_CACHE_FRESH_HIT, METRIC_CACHE_WRITE_FAILURE, METRIC_FETCH_FAILED,
    METRIC_STALE_FALLBACK, METRIC_UPSTREAM_FAILURE, METRIC_UPSTREAM_FETCH,
};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_CACHE_FRESH_HIT,
            Unit::Count,
            "Upstream reads served from a cache entry within its TTL."
        );
        describe_counter!(
            METRIC_UPSTREAM_FETCH,
            Unit::Count,
            "Live upstream fetches attempted."
        );
        describe_counter!(
            METRIC_UPSTREAM_FAILURE,
            Unit::Count,
            "Live upstream fetches that failed or returned no data."
        );
        describe_counter!(
            METRIC_STALE_FALLBACK,
            Unit::Count,
            "Reads served from an outdated cache entry after a failed fetch."
        );
        describe_counter!(
            METRIC_FETCH_FAILED,
            Unit::Count,
            "Reads with neither upstream data nor a cached body."
        );
        describe_counter!(
            METRIC_CACHE_WRITE_FAILURE,
            Unit::Count,
            "Background cache writes that failed."
        );
    });
}
