#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicI64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use covid_chart::{
    application::ports::{
        CacheEntry, CacheStore, CacheStoreError, Clock, UpstreamError, UpstreamSource,
    },
    infra::memory_store::MemoryCacheStore,
};

/// Upstream whose answers are scripted per URL. Unscripted URLs fail.
#[derive(Default)]
pub struct ScriptedUpstream {
    responses: Mutex<HashMap<String, Result<String, String>>>,
    calls: AtomicUsize,
}

impl ScriptedUpstream {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, url: &str, body: impl Into<String>) {
        self.responses
            .lock()
            .expect("responses lock")
            .insert(url.to_string(), Ok(body.into()));
    }

    pub fn fail(&self, url: &str, message: &str) {
        self.responses
            .lock()
            .expect("responses lock")
            .insert(url.to_string(), Err(message.to_string()));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamSource for ScriptedUpstream {
    async fn get_text(&self, url: &str) -> Result<String, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self
            .responses
            .lock()
            .expect("responses lock")
            .get(url)
            .cloned();
        match scripted {
            Some(Ok(body)) => Ok(body),
            Some(Err(message)) => Err(UpstreamError::Transport {
                url: url.to_string(),
                message,
            }),
            None => Err(UpstreamError::Transport {
                url: url.to_string(),
                message: "connection refused".to_string(),
            }),
        }
    }
}

/// Clock pinned to a settable instant.
pub struct FixedClock {
    seconds: AtomicI64,
}

impl FixedClock {
    pub fn at(time: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            seconds: AtomicI64::new(time.timestamp()),
        })
    }

    pub fn advance(&self, by: Duration) {
        let secs = i64::try_from(by.as_secs()).expect("duration fits");
        self.seconds.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn timestamp(&self) -> i64 {
        self.seconds.load(Ordering::SeqCst)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.timestamp(), 0)
            .single()
            .expect("valid timestamp")
    }
}

/// Store that refuses every operation.
pub struct UnavailableStore;

#[async_trait]
impl CacheStore for UnavailableStore {
    async fn get(&self, _key: &str) -> Result<Option<CacheEntry>, CacheStoreError> {
        Err(CacheStoreError::Unavailable("connection refused".to_string()))
    }

    async fn set(&self, _key: &str, _fields: &[(&str, String)]) -> Result<(), CacheStoreError> {
        Err(CacheStoreError::Unavailable("connection refused".to_string()))
    }
}

pub fn utc(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0)
        .single()
        .expect("valid instant")
}

/// Wait until `field` of `key` holds `expected`; background writes are detached.
pub async fn wait_for_field(store: &MemoryCacheStore, key: &str, field: &str, expected: &str) {
    for _ in 0..100 {
        if store.field(key, field).as_deref() == Some(expected) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "field `{field}` of `{key}` never became `{expected}`, last value {:?}",
        store.field(key, field)
    );
}
