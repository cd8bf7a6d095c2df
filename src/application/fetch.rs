//! Cache-aside fetching of upstream JSON.
//!
//! Resolution order for every call:
//!
//! 1. a cached body whose timestamp is within the TTL,
//! 2. a live upstream fetch, persisted in the background on success,
//! 3. the cached body regardless of age, with only its timestamp refreshed in
//!    the background so the next callers within the TTL do not hit the broken
//!    upstream again,
//! 4. [`FetchError::FetchFailed`].
//!
//! Background writes are detached tasks. Callers never wait for them and a
//! failed write is only logged.

use std::{sync::Arc, time::Duration};

use metrics::counter;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::ports::{
    BODY_FIELD, CacheEntry, CacheStore, Clock, TS_FIELD, UpstreamError, UpstreamSource,
};

pub const CACHE_KEY_PREFIX: &str = "apicache:";

pub(crate) const METRIC_CACHE_FRESH_HIT: &str = "covid_chart_cache_fresh_hit_total";
pub(crate) const METRIC_UPSTREAM_FETCH: &str = "covid_chart_upstream_fetch_total";
pub(crate) const METRIC_UPSTREAM_FAILURE: &str = "covid_chart_upstream_failure_total";
pub(crate) const METRIC_STALE_FALLBACK: &str = "covid_chart_stale_fallback_total";
pub(crate) const METRIC_FETCH_FAILED: &str = "covid_chart_fetch_failed_total";
pub(crate) const METRIC_CACHE_WRITE_FAILURE: &str = "covid_chart_cache_write_failure_total";

const SOURCE: &str = "covid_chart::fetch";

#[derive(Debug, Error)]
pub enum FetchError {
    /// No usable fresh entry. Never returned to callers.
    #[error("cache miss: {reason}")]
    CacheMiss { reason: String },
    #[error(transparent)]
    Transport(#[from] UpstreamError),
    /// Upstream answered with whitespace, `[]` or `{}`.
    #[error("upstream body is empty: `{body}`")]
    EmptyBody { body: String },
    #[error("failed to decode body: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("fetching `{url}` failed: {source}")]
    FetchFailed {
        url: String,
        #[source]
        source: Box<FetchError>,
    },
}

impl FetchError {
    fn cache_miss(reason: impl Into<String>) -> Self {
        Self::CacheMiss {
            reason: reason.into(),
        }
    }

    fn failed(url: &str, source: FetchError) -> Self {
        Self::FetchFailed {
            url: url.to_string(),
            source: Box::new(source),
        }
    }
}

/// Store key for an upstream URL.
pub fn cache_key(url: &str) -> String {
    format!("{CACHE_KEY_PREFIX}{url}")
}

/// Whether a response body counts as "no data" even when it is valid JSON.
pub fn is_empty_body(body: &str) -> bool {
    matches!(body.trim(), "" | "[]" | "{}")
}

#[derive(Clone)]
pub struct FetchEngine {
    store: Arc<dyn CacheStore>,
    upstream: Arc<dyn UpstreamSource>,
    clock: Arc<dyn Clock>,
}

impl FetchEngine {
    pub fn new(
        store: Arc<dyn CacheStore>,
        upstream: Arc<dyn UpstreamSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            upstream,
            clock,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Resolve `url` to a JSON value through the cache.
    pub async fn fetch_object(&self, url: &str, ttl: Duration) -> Result<Value, FetchError> {
        self.fetch_as(url, ttl).await
    }

    /// Resolve `url` and decode it into `T`.
    ///
    /// A body that is valid JSON but does not decode into `T` is treated like
    /// a malformed body at every stage.
    pub async fn fetch_as<T: DeserializeOwned>(
        &self,
        url: &str,
        ttl: Duration,
    ) -> Result<T, FetchError> {
        let key = cache_key(url);
        let cached = self.lookup(&key, url).await;

        if let Some(entry) = cached.as_ref() {
            match self.fresh_value(entry, ttl) {
                Ok(value) => {
                    counter!(METRIC_CACHE_FRESH_HIT).increment(1);
                    debug!(target: SOURCE, url, "serving fresh cache entry");
                    return Ok(value);
                }
                Err(miss) => debug!(target: SOURCE, url, reason = %miss, "cache entry not usable"),
            }
        }

        info!(target: SOURCE, url, "fetching upstream");
        counter!(METRIC_UPSTREAM_FETCH).increment(1);
        let fetch_error = match self.fetch_live::<T>(url).await {
            Ok((body, value)) => {
                let now = self.clock.now().timestamp().to_string();
                self.persist_in_background(
                    key,
                    vec![(BODY_FIELD, body), (TS_FIELD, now)],
                    "store fetched body",
                );
                return Ok(value);
            }
            Err(err) => {
                counter!(METRIC_UPSTREAM_FAILURE).increment(1);
                error!(target: SOURCE, url, error = %err, "upstream fetch failed");
                err
            }
        };

        let Some(stale) = cached.as_ref().and_then(CacheEntry::stale_body) else {
            counter!(METRIC_FETCH_FAILED).increment(1);
            return Err(FetchError::failed(url, fetch_error));
        };

        match serde_json::from_str::<T>(stale) {
            Ok(value) => {
                counter!(METRIC_STALE_FALLBACK).increment(1);
                warn!(target: SOURCE, url, "falling back to outdated cache entry");
                let now = self.clock.now().timestamp().to_string();
                self.persist_in_background(key, vec![(TS_FIELD, now)], "refresh stale timestamp");
                Ok(value)
            }
            Err(err) => {
                counter!(METRIC_FETCH_FAILED).increment(1);
                error!(target: SOURCE, url, error = %err, "outdated cache entry is not decodable");
                Err(FetchError::failed(url, FetchError::Parse(err)))
            }
        }
    }

    async fn lookup(&self, key: &str, url: &str) -> Option<CacheEntry> {
        match self.store.get(key).await {
            Ok(Some(entry)) => Some(entry),
            Ok(None) => {
                info!(target: SOURCE, url, "cache entry not found");
                None
            }
            Err(err) => {
                warn!(target: SOURCE, url, error = %err, "cache lookup failed");
                None
            }
        }
    }

    fn fresh_value<T: DeserializeOwned>(
        &self,
        entry: &CacheEntry,
        ttl: Duration,
    ) -> Result<T, FetchError> {
        let raw_ts = entry
            .ts
            .as_deref()
            .ok_or_else(|| FetchError::cache_miss("timestamp missing"))?;
        let ts: i64 = raw_ts.trim().parse().map_err(|_| {
            warn!(target: SOURCE, ts = raw_ts, "cache timestamp is not an integer");
            FetchError::cache_miss(format!("malformed timestamp `{raw_ts}`"))
        })?;

        let age = self.clock.now().timestamp().saturating_sub(ts);
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        if age > ttl_secs {
            return Err(FetchError::cache_miss(format!(
                "outdated by {}s",
                age - ttl_secs
            )));
        }

        let body = entry
            .body
            .as_deref()
            .ok_or_else(|| FetchError::cache_miss("body missing"))?;
        serde_json::from_str(body).map_err(FetchError::Parse)
    }

    async fn fetch_live<T: DeserializeOwned>(&self, url: &str) -> Result<(String, T), FetchError> {
        let body = self.upstream.get_text(url).await?;
        if is_empty_body(&body) {
            return Err(FetchError::EmptyBody { body });
        }
        let value = serde_json::from_str(&body)?;
        Ok((body, value))
    }

    fn persist_in_background(
        &self,
        key: String,
        fields: Vec<(&'static str, String)>,
        op: &'static str,
    ) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if let Err(err) = store.set(&key, &fields).await {
                counter!(METRIC_CACHE_WRITE_FAILURE).increment(1);
                error!(target: SOURCE, key = %key, op, error = %err, "cache write failed");
            }
        });
    }
}
