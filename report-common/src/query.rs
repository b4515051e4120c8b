use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::report::ReportType;

/// Format accepted for the `reported_at` filter, e.g. `2024-04-21 11:31 +00:00`.
pub const QUERY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M %:z";

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("{0:?} is not a valid report time, expected YYYY-MM-DD HH:MM ±HH:MM")]
    InvalidDate(String),
    #[error("failed to query reports")]
    Database(#[from] sqlx::Error),
}

/// Filter for the read-only report query. Every unset field matches all reports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportFilter {
    pub report_type: Option<ReportType>,
    /// Exact match on the storm time.
    pub reported_at: Option<DateTime<Utc>>,
    pub state: Option<String>,
    pub county: Option<String>,
}

impl ReportFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_type(report_type: ReportType) -> Self {
        Self {
            report_type: Some(report_type),
            ..Self::default()
        }
    }

    pub fn reported_at(mut self, reported_at: DateTime<Utc>) -> Self {
        self.reported_at = Some(reported_at);
        self
    }

    /// Set the time filter from its textual form. See `parse_query_time`.
    pub fn reported_at_str(self, value: &str) -> Result<Self, QueryError> {
        Ok(self.reported_at(parse_query_time(value)?))
    }

    pub fn state(mut self, state: &str) -> Self {
        self.state = Some(state.to_owned());
        self
    }

    pub fn county(mut self, county: &str) -> Self {
        self.county = Some(county.to_owned());
        self
    }
}

/// Parse a `YYYY-MM-DD HH:MM ±HH:MM` timestamp into UTC.
pub fn parse_query_time(value: &str) -> Result<DateTime<Utc>, QueryError> {
    DateTime::parse_from_str(value.trim(), QUERY_TIME_FORMAT)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|_| QueryError::InvalidDate(value.to_owned()))
}
