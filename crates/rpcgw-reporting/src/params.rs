//! Query-string parsing shared by the usage endpoints.

use rpcgw_storage::{DEFAULT_METHOD_LIMIT, MAX_METHOD_LIMIT, Period};
use serde::Deserialize;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime, Time};

const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");
const MAX_RANGE: Duration = Duration::days(365);
const MAX_HOURLY_RANGE: Duration = Duration::days(7);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DateRangeError {
    #[error("invalid {field} {value:?}, use YYYY-MM-DD")]
    Format { field: &'static str, value: String },
    #[error("end_date must be after start_date")]
    EndBeforeStart,
    #[error("date range cannot exceed 1 year")]
    TooLarge,
    #[error("hourly data limited to 7 days maximum")]
    HourlyTooLarge,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UsageQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub include_breakdown: Option<String>,
    pub chain: Option<String>,
    pub limit: Option<String>,
}

impl UsageQuery {
    pub fn period(&self, now: OffsetDateTime) -> Result<Period, DateRangeError> {
        parse_period(self.start_date.as_deref(), self.end_date.as_deref(), now)
    }

    pub fn include_breakdown(&self) -> bool {
        self.include_breakdown.as_deref() == Some("true")
    }

    pub fn chain(&self) -> Option<&str> {
        self.chain.as_deref().map(str::trim).filter(|chain| !chain.is_empty())
    }

    pub fn limit(&self) -> u32 {
        parse_limit(self.limit.as_deref())
    }
}

/// Missing start is the first day of `now`'s month; missing end is `now`.
/// A given end date covers the whole day, up to 23:59:59.
pub fn parse_period(
    start: Option<&str>,
    end: Option<&str>,
    now: OffsetDateTime,
) -> Result<Period, DateRangeError> {
    let now = now.to_offset(time::UtcOffset::UTC);
    let start = match non_empty(start) {
        Some(raw) => parse_date("start_date", raw)?.midnight().assume_utc(),
        None => Date::from_calendar_date(now.year(), now.month(), 1)
            .unwrap_or(now.date())
            .midnight()
            .assume_utc(),
    };
    let end = match non_empty(end) {
        Some(raw) => {
            let date = parse_date("end_date", raw)?;
            let end_of_day = Time::from_hms(23, 59, 59).unwrap_or(Time::MIDNIGHT);
            date.with_time(end_of_day).assume_utc()
        }
        None => now,
    };

    if end < start {
        return Err(DateRangeError::EndBeforeStart);
    }
    if end - start > MAX_RANGE {
        return Err(DateRangeError::TooLarge);
    }
    Ok(Period { start, end })
}

pub fn ensure_hourly_window(period: &Period) -> Result<(), DateRangeError> {
    if period.end - period.start > MAX_HOURLY_RANGE {
        return Err(DateRangeError::HourlyTooLarge);
    }
    Ok(())
}

/// Absent or unparsable is the default; non-positive too; capped at the max.
pub fn parse_limit(raw: Option<&str>) -> u32 {
    match non_empty(raw).map(str::parse::<i64>) {
        Some(Ok(limit)) if limit > 0 => u32::try_from(limit)
            .unwrap_or(MAX_METHOD_LIMIT)
            .min(MAX_METHOD_LIMIT),
        _ => DEFAULT_METHOD_LIMIT,
    }
}

fn parse_date(field: &'static str, raw: &str) -> Result<Date, DateRangeError> {
    Date::parse(raw, DATE_FORMAT).map_err(|_| DateRangeError::Format {
        field,
        value: raw.to_string(),
    })
}

fn non_empty(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|value| !value.is_empty())
}
