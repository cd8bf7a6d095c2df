//! Named upstream resources and their cache lifetimes.

use std::{sync::Arc, time::Duration};

use tracing::error;
use url::Url;

use crate::domain::records::{DailyRecord, OneOrMany};

use super::fetch::FetchEngine;

const SOURCE: &str = "covid_chart::dataset";

pub const DEFAULT_BASE_URL: &str = "https://covidtracking.com/api/";
pub const DEFAULT_DATA_TTL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_MOST_RECENT_TTL: Duration = Duration::from_secs(10 * 60);

/// Absolute URLs of the four upstream resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub state_daily: String,
    pub us_daily: String,
    pub us_most_recent: String,
    pub state_most_recent: String,
}

impl Endpoints {
    /// Resolve the resource paths against `base`, e.g. `https://covidtracking.com/api/`.
    pub fn from_base(base: &Url) -> Result<Self, url::ParseError> {
        let resolve = |path: &str| base.join(path).map(String::from);
        Ok(Self {
            state_daily: resolve("states/daily")?,
            us_daily: resolve("us/daily")?,
            us_most_recent: resolve("us")?,
            state_most_recent: resolve("states")?,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DatasetTtls {
    /// Daily history series.
    pub data: Duration,
    /// Most-recent snapshots.
    pub most_recent: Duration,
}

impl Default for DatasetTtls {
    fn default() -> Self {
        Self {
            data: DEFAULT_DATA_TTL,
            most_recent: DEFAULT_MOST_RECENT_TTL,
        }
    }
}

/// Typed access to the upstream datasets.
///
/// Every getter degrades to an empty value when the fetch pipeline has
/// nothing to offer; the failure is logged and never propagated.
#[derive(Clone)]
pub struct CovidDataService {
    engine: Arc<FetchEngine>,
    endpoints: Endpoints,
    ttls: DatasetTtls,
}

impl CovidDataService {
    pub fn new(engine: Arc<FetchEngine>, endpoints: Endpoints, ttls: DatasetTtls) -> Self {
        Self {
            engine,
            endpoints,
            ttls,
        }
    }

    pub fn engine(&self) -> &Arc<FetchEngine> {
        &self.engine
    }

    /// Daily history of every state.
    pub async fn state_daily(&self) -> Vec<DailyRecord> {
        self.records(&self.endpoints.state_daily, self.ttls.data, "state_daily")
            .await
    }

    /// Latest snapshot of every state.
    pub async fn state_most_recent(&self) -> Vec<DailyRecord> {
        self.records(
            &self.endpoints.state_most_recent,
            self.ttls.most_recent,
            "state_most_recent",
        )
        .await
    }

    /// Daily history of the national aggregate.
    pub async fn us_daily(&self) -> Vec<DailyRecord> {
        self.records(&self.endpoints.us_daily, self.ttls.data, "us_daily")
            .await
    }

    /// Latest national snapshot; the first element of the upstream list.
    pub async fn us_most_recent(&self) -> DailyRecord {
        let records = self
            .records(
                &self.endpoints.us_most_recent,
                self.ttls.most_recent,
                "us_most_recent",
            )
            .await;

        match records.into_iter().next() {
            Some(record) => record,
            None => {
                error!(
                    target: SOURCE,
                    dataset = "us_most_recent",
                    "unexpected data: no national record available"
                );
                DailyRecord::default()
            }
        }
    }

    async fn records(&self, url: &str, ttl: Duration, dataset: &'static str) -> Vec<DailyRecord> {
        match self.engine.fetch_as::<OneOrMany>(url, ttl).await {
            Ok(records) => records.into_vec(),
            Err(err) => {
                error!(target: SOURCE, dataset, error = %err, "dataset unavailable");
                Vec::new()
            }
        }
    }
}
