use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Sentinel stored when a report carries no reporting office and none can be recovered.
pub const UNKNOWN_OFFICE: &str = "unknown";

/// Enumeration of the storm report kinds we ingest.
/// Stored in PostgreSQL as the `report_type` enum, and carried in the `reportType` header
/// of every message on the reports topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, sqlx::Type)]
#[sqlx(type_name = "report_type")]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    Hail,
    Wind,
    Tornado,
}

impl ReportType {
    pub const ALL: [ReportType; 3] = [ReportType::Hail, ReportType::Wind, ReportType::Tornado];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Hail => "hail",
            ReportType::Wind => "wind",
            ReportType::Tornado => "tornado",
        }
    }

    /// The unit a `NormalizedReport::magnitude` of this type is expressed in.
    pub fn magnitude_unit(&self) -> MagnitudeUnit {
        match self {
            ReportType::Hail => MagnitudeUnit::HailSize,
            ReportType::Wind => MagnitudeUnit::MilesPerHour,
            ReportType::Tornado => MagnitudeUnit::EnhancedFujita,
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("{0:?} is not a valid ReportType")]
pub struct ParseReportTypeError(pub String);

/// Allow casting ReportType from header values, ignoring case and surrounding whitespace.
impl FromStr for ReportType {
    type Err = ParseReportTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        ReportType::ALL
            .into_iter()
            .find(|report_type| report_type.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| ParseReportTypeError(s.to_owned()))
    }
}

/// Units of the single variable measurement slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MagnitudeUnit {
    /// Hail diameter exactly as encoded upstream (1.75" arrives as 175).
    HailSize,
    /// Wind gust speed.
    MilesPerHour,
    /// Enhanced Fujita rating, 0 to 5. Upstream sends 6 when the rating is unknown.
    EnhancedFujita,
}

/// The canonical storm report, as persisted in the `reports` table.
///
/// Built once per decoded message and never mutated afterwards. There is no application
/// assigned identity: the table's unique constraint over (report_type, reported_at, county,
/// state, direction, distance_miles) decides whether two reports are the same.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct NormalizedReport {
    pub report_type: ReportType,
    /// When the storm was observed, from the event's own epoch time.
    pub reported_at: DateTime<Utc>,
    /// When this service normalized the event.
    pub recorded_at: DateTime<Utc>,
    /// Hail size, wind speed or EF rating depending on `report_type`.
    pub magnitude: i32,
    pub direction: String,
    pub distance_miles: i32,
    pub landmark: String,
    pub county: String,
    pub state: String,
    pub latitude: String,
    pub longitude: String,
    pub remarks: String,
    pub office: String,
}
