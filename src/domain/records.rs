//! Daily records as published by the covidtracking.com API.

use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Wire layout of upstream dates (`YYYYMMDD`).
const UPSTREAM_DATE_DIGITS: usize = 8;

/// A calendar day without a time component.
///
/// Upstream encodes dates as `YYYYMMDD`, either quoted or as a bare number.
/// Outbound the date is written as midnight UTC in RFC 3339 form, which is the
/// shape the charting bundle parses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordDate(NaiveDate);

impl RecordDate {
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    /// Parse the upstream `YYYYMMDD` representation.
    pub fn parse_compact(raw: &str) -> Option<Self> {
        let raw = raw.trim().trim_matches('"');
        if raw.len() != UPSTREAM_DATE_DIGITS || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        let year = raw[0..4].parse().ok()?;
        let month = raw[4..6].parse().ok()?;
        let day = raw[6..8].parse().ok()?;
        Self::from_ymd(year, month, day)
    }

    pub fn date(self) -> NaiveDate {
        self.0
    }

    /// The calendar day immediately before this one.
    pub fn previous_day(self) -> Option<Self> {
        self.0.pred_opt().map(Self)
    }

    /// Year, month and day equality, ignoring any notion of time.
    pub fn is_same_day(self, other: NaiveDate) -> bool {
        self.0.year() == other.year() && self.0.month() == other.month() && self.0.day() == other.day()
    }
}

impl fmt::Display for RecordDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl Serialize for RecordDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&format_args!("{}T00:00:00Z", self.0.format("%Y-%m-%d")))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDate {
    Text(String),
    Number(u64),
}

impl<'de> Deserialize<'de> for RecordDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = match RawDate::deserialize(deserializer)? {
            RawDate::Text(text) => text,
            RawDate::Number(number) => number.to_string(),
        };

        RecordDate::parse_compact(&raw).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid date `{raw}`, expected YYYYMMDD"))
        })
    }
}

/// One calendar day of cumulative counts for a jurisdiction.
///
/// Counters are signed so that the same shape can carry a diff between two
/// days; upstream corrections make negative diffs possible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<RecordDate>,
    #[serde(default, deserialize_with = "count", skip_serializing_if = "is_zero")]
    pub states: i64,
    #[serde(default, deserialize_with = "state_code", skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "count")]
    pub positive: i64,
    #[serde(default, deserialize_with = "count")]
    pub negative: i64,
    #[serde(default, deserialize_with = "count")]
    pub pos_neg: i64,
    #[serde(default, deserialize_with = "count")]
    pub pending: i64,
    #[serde(default, deserialize_with = "count")]
    pub death: i64,
    #[serde(default, deserialize_with = "count")]
    pub total: i64,
}

/// A [`DailyRecord`] holding `current - previous` per counter.
pub type DiffRecord = DailyRecord;

impl DailyRecord {
    /// An otherwise empty record that only carries a jurisdiction code.
    pub fn for_state(code: impl Into<String>) -> Self {
        Self {
            state: Some(code.into()),
            ..Self::default()
        }
    }

    pub fn state_code(&self) -> Option<&str> {
        self.state.as_deref()
    }

    /// Counter-wise difference `self - earlier`. Identity fields are left empty.
    pub fn diff(&self, earlier: &DailyRecord) -> DiffRecord {
        DailyRecord {
            date: None,
            states: 0,
            state: None,
            positive: self.positive - earlier.positive,
            negative: self.negative - earlier.negative,
            pos_neg: self.pos_neg - earlier.pos_neg,
            pending: self.pending - earlier.pending,
            death: self.death - earlier.death,
            total: self.total - earlier.total,
        }
    }
}

/// Upstream payloads are either a list of records or a single record.
///
/// A lone object must carry a `date` or a `state`. Every counter defaults, so
/// without that check an error body such as `{"error": true}` would pass for
/// an all-zero record.
#[derive(Debug, Clone)]
pub enum OneOrMany {
    Many(Vec<DailyRecord>),
    One(Box<DailyRecord>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPayload {
    Many(Vec<DailyRecord>),
    One(Box<DailyRecord>),
}

impl<'de> Deserialize<'de> for OneOrMany {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawPayload::deserialize(deserializer)? {
            RawPayload::Many(records) => Ok(OneOrMany::Many(records)),
            RawPayload::One(record) if record.date.is_some() || record.state.is_some() => {
                Ok(OneOrMany::One(record))
            }
            RawPayload::One(_) => Err(serde::de::Error::custom(
                "object carries neither `date` nor `state`",
            )),
        }
    }
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<DailyRecord> {
        match self {
            OneOrMany::Many(records) => records,
            OneOrMany::One(record) => vec![*record],
        }
    }
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

fn count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    Ok(Option::<i64>::deserialize(deserializer)?.unwrap_or_default())
}

fn state_code<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let code = Option::<String>::deserialize(deserializer)?;
    Ok(code.filter(|value| !value.is_empty()))
}
