//! Assembles the chart payload embedded into every page.

use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono_tz::Tz;
use serde::Serialize;

use crate::{
    domain::{
        jurisdiction::Jurisdiction,
        records::DailyRecord,
        series::{self, PositiveNegative, RecordAndDiff, TotalAndNewPositive},
    },
    util::timezone::reference_yesterday,
};

use super::dataset::CovidDataService;

/// Named views consumed by the client-side renderer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartPayload {
    pub confirmed: Vec<TotalAndNewPositive>,
    pub test: Vec<PositiveNegative>,
    pub most_recently: [DailyRecord; 2],
    pub total_pos_neg: Vec<PositiveNegative>,
    pub daily_pos_neg: Vec<PositiveNegative>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_most_recent: Option<Vec<RecordAndDiff>>,
    pub page_type: String,
}

impl ChartPayload {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Standard base64 of the JSON document, as embedded in the page shell.
    pub fn to_base64(&self) -> Result<String, serde_json::Error> {
        Ok(STANDARD.encode(self.to_json()?))
    }
}

#[derive(Clone)]
pub struct ChartService {
    data: Arc<CovidDataService>,
    reference_zone: Tz,
}

impl ChartService {
    pub fn new(data: Arc<CovidDataService>, reference_zone: Tz) -> Self {
        Self {
            data,
            reference_zone,
        }
    }

    pub async fn payload(&self, jurisdiction: &Jurisdiction) -> ChartPayload {
        match jurisdiction {
            Jurisdiction::Us => self.us_payload().await,
            Jurisdiction::State(code) => self.state_payload(code).await,
        }
    }

    /// National page: national series plus a per-state summary table.
    pub async fn us_payload(&self) -> ChartPayload {
        let (daily, most_recent, state_daily, state_most_recent) = tokio::join!(
            self.data.us_daily(),
            self.data.us_most_recent(),
            self.data.state_daily(),
            self.data.state_most_recent(),
        );
        let yesterday = self.yesterday();

        ChartPayload {
            confirmed: series::total_and_new_positive(&daily),
            test: series::positive_negative_snapshot(&daily),
            most_recently: series::most_recent_with_diff(most_recent, &daily, yesterday),
            total_pos_neg: series::positive_negative_snapshot(&daily),
            daily_pos_neg: series::daily_positive_negative(&daily),
            state_most_recent: Some(series::per_jurisdiction_most_recent(
                &state_most_recent,
                &state_daily,
                yesterday,
            )),
            page_type: Jurisdiction::Us.page_type().to_string(),
        }
    }

    /// Single-jurisdiction page. `code` is expected upper-cased.
    pub async fn state_payload(&self, code: &str) -> ChartPayload {
        let (state_daily, state_most_recent) =
            tokio::join!(self.data.state_daily(), self.data.state_most_recent());
        let daily = series::records_for_state(&state_daily, code);
        let most_recent = series::most_recent_for_state(&state_most_recent, code);

        ChartPayload {
            confirmed: series::total_and_new_positive(&daily),
            test: series::positive_negative_snapshot(&daily),
            most_recently: series::most_recent_with_diff(most_recent, &daily, self.yesterday()),
            total_pos_neg: series::positive_negative_snapshot(&daily),
            daily_pos_neg: series::daily_positive_negative(&daily),
            state_most_recent: None,
            page_type: code.to_string(),
        }
    }

    fn yesterday(&self) -> chrono::NaiveDate {
        let now = self.data.engine().clock().now();
        reference_yesterday(now, self.reference_zone)
    }
}
