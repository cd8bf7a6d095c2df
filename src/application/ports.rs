//! Capabilities the fetch pipeline depends on: cache store, upstream and clock.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub const BODY_FIELD: &str = "body";
pub const TS_FIELD: &str = "ts";

#[derive(Debug, Error)]
pub enum CacheStoreError {
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}

impl CacheStoreError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Raw field map of one cache entry. Fields are untyped strings as stored;
/// interpreting `ts` is the caller's job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheEntry {
    pub body: Option<String>,
    pub ts: Option<String>,
}

impl CacheEntry {
    pub fn from_fields(mut fields: HashMap<String, String>) -> Option<Self> {
        if fields.is_empty() {
            return None;
        }
        Some(Self {
            body: fields.remove(BODY_FIELD),
            ts: fields.remove(TS_FIELD),
        })
    }

    /// Non-empty body usable as a stale fallback.
    pub fn stale_body(&self) -> Option<&str> {
        self.body.as_deref().filter(|body| !body.is_empty())
    }
}

/// Field-structured key-value store shared by every request.
///
/// `set` merges the given fields into the entry and leaves other fields
/// untouched. Implementations must be safe for concurrent use; the pipeline
/// does not coordinate writers.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheStoreError>;

    async fn set(&self, key: &str, fields: &[(&str, String)]) -> Result<(), CacheStoreError>;
}

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("request to `{url}` failed: {message}")]
    Transport { url: String, message: String },
    #[error("reading body from `{url}` failed: {message}")]
    Body { url: String, message: String },
}

/// Opaque JSON source addressed by URL.
#[async_trait]
pub trait UpstreamSource: Send + Sync {
    async fn get_text(&self, url: &str) -> Result<String, UpstreamError>;
}

/// Wall clock, abstracted for testing.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
