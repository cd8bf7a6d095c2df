//! Derived chart series computed from ordered daily records.
//!
//! Every function here is pure. Output order always follows input order, and
//! the day-over-day lookback matches on exact calendar date rather than on the
//! neighbouring element, so a gap in the input produces a zero baseline for the
//! day after the gap.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;

use super::records::{DailyRecord, DiffRecord, RecordDate};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalAndNewPositive {
    pub date: RecordDate,
    pub total_positive: i64,
    pub new_positive: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositiveNegative {
    pub date: RecordDate,
    pub negative: i64,
    pub positive: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordAndDiff {
    pub record: DailyRecord,
    pub diff: DiffRecord,
}

/// Records without a date cannot be placed on a chart axis and are skipped.
fn dated(records: &[DailyRecord]) -> impl Iterator<Item = (RecordDate, &DailyRecord)> {
    records
        .iter()
        .filter_map(|record| record.date.map(|date| (date, record)))
}

/// Lookup of a counter by date. Later duplicates overwrite earlier ones.
fn counter_by_date(
    records: &[DailyRecord],
    counter: impl Fn(&DailyRecord) -> i64,
) -> HashMap<RecordDate, i64> {
    dated(records)
        .map(|(date, record)| (date, counter(record)))
        .collect()
}

/// Value of the counter on the previous calendar day, if that day is present.
fn previous_day_value(lookup: &HashMap<RecordDate, i64>, date: RecordDate) -> Option<i64> {
    date.previous_day()
        .and_then(|previous| lookup.get(&previous).copied())
}

/// Cumulative positives with the day-over-day increase.
///
/// When no record exists for the previous calendar day the previous total is
/// taken as zero, so `new_positive` equals the cumulative `positive`.
pub fn total_and_new_positive(records: &[DailyRecord]) -> Vec<TotalAndNewPositive> {
    let positives = counter_by_date(records, |record| record.positive);

    dated(records)
        .map(|(date, record)| {
            let previous = previous_day_value(&positives, date).unwrap_or(0);
            TotalAndNewPositive {
                date,
                total_positive: record.positive,
                new_positive: record.positive - previous,
            }
        })
        .collect()
}

/// Cumulative positive and negative counts, one entry per record.
pub fn positive_negative_snapshot(records: &[DailyRecord]) -> Vec<PositiveNegative> {
    dated(records)
        .map(|(date, record)| PositiveNegative {
            date,
            negative: record.negative,
            positive: record.positive,
        })
        .collect()
}

/// Day-over-day positive and negative deltas, each with a zero baseline.
pub fn daily_positive_negative(records: &[DailyRecord]) -> Vec<PositiveNegative> {
    let positives = counter_by_date(records, |record| record.positive);
    let negatives = counter_by_date(records, |record| record.negative);

    dated(records)
        .map(|(date, record)| PositiveNegative {
            date,
            negative: record.negative - previous_day_value(&negatives, date).unwrap_or(0),
            positive: record.positive - previous_day_value(&positives, date).unwrap_or(0),
        })
        .collect()
}

/// `[current, diff]` where `diff` compares `current` with the first record in
/// `series` dated `yesterday`. Without such a record the diff is all zero.
pub fn most_recent_with_diff(
    current: DailyRecord,
    series: &[DailyRecord],
    yesterday: NaiveDate,
) -> [DailyRecord; 2] {
    let previous = series.iter().find(|record| {
        record
            .date
            .is_some_and(|date| date.is_same_day(yesterday))
    });

    let diff = match previous {
        Some(previous) => DiffRecord {
            date: current.date,
            ..current.diff(previous)
        },
        None => DiffRecord::default(),
    };

    [current, diff]
}

/// [`most_recent_with_diff`] for every jurisdiction in `most_recent`.
///
/// Prior-day records are matched on state code and date; if the series holds
/// several candidates the last one wins. Jurisdictions without a candidate get
/// a zero diff that only carries their code.
pub fn per_jurisdiction_most_recent(
    most_recent: &[DailyRecord],
    series: &[DailyRecord],
    yesterday: NaiveDate,
) -> Vec<RecordAndDiff> {
    let previous_by_state: HashMap<&str, &DailyRecord> = series
        .iter()
        .filter(|record| {
            record
                .date
                .is_some_and(|date| date.is_same_day(yesterday))
        })
        .filter_map(|record| record.state_code().map(|code| (code, record)))
        .collect();

    most_recent
        .iter()
        .map(|record| {
            let code = record.state.clone().unwrap_or_default();
            let diff = match previous_by_state.get(code.as_str()) {
                Some(previous) => DiffRecord {
                    state: record.state.clone(),
                    ..record.diff(previous)
                },
                None => DiffRecord {
                    state: record.state.clone(),
                    ..DiffRecord::default()
                },
            };

            RecordAndDiff {
                record: record.clone(),
                diff,
            }
        })
        .collect()
}

/// All records belonging to `code`, in input order.
pub fn records_for_state(records: &[DailyRecord], code: &str) -> Vec<DailyRecord> {
    records
        .iter()
        .filter(|record| record.state_code() == Some(code))
        .cloned()
        .collect()
}

/// First record for `code`, or an empty record tagged with the code.
pub fn most_recent_for_state(records: &[DailyRecord], code: &str) -> DailyRecord {
    records
        .iter()
        .find(|record| record.state_code() == Some(code))
        .cloned()
        .unwrap_or_else(|| DailyRecord::for_state(code))
}
