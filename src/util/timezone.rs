use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use chrono_tz::Tz;

/// Zone used to decide which calendar day counts as "yesterday".
pub const DEFAULT_REFERENCE_ZONE: Tz = chrono_tz::America::Los_Angeles;

fn localized_date(time: DateTime<Utc>, tz: Tz) -> NaiveDate {
    time.with_timezone(&tz).date_naive()
}

/// Calendar date, in `tz`, of the instant exactly 24 hours before `now`.
///
/// Subtracting a fixed 24h rather than one calendar day means the result can
/// repeat or skip a date across DST transitions.
pub fn reference_yesterday(now: DateTime<Utc>, tz: Tz) -> NaiveDate {
    localized_date(now - TimeDelta::hours(24), tz)
}
