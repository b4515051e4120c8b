use chrono::{DateTime, Utc};

use crate::decode::DecodedEvent;
use crate::report::{NormalizedReport, UNKNOWN_OFFICE};

/// Map a decoded event into the canonical report, stamping `recorded_at` with the current time.
pub fn normalize(event: &DecodedEvent) -> NormalizedReport {
    normalize_at(event, Utc::now())
}

/// Map a decoded event into the canonical report, recorded at the given instant.
///
/// The mapping is the same for every variant: each schema only differs in which field
/// feeds `magnitude`, and that is resolved by its `ReportFields` implementation.
pub fn normalize_at(event: &DecodedEvent, recorded_at: DateTime<Utc>) -> NormalizedReport {
    let fields = event.fields();

    let office = fields
        .office()
        .map(str::trim)
        .filter(|office| !office.is_empty())
        .or_else(|| office_from_remarks(fields.remarks()))
        .unwrap_or(UNKNOWN_OFFICE)
        .to_owned();

    NormalizedReport {
        report_type: event.report_type(),
        // Out of range times are rejected while decoding.
        reported_at: DateTime::from_timestamp(fields.time(), 0).unwrap_or_default(),
        recorded_at,
        magnitude: fields.magnitude(),
        direction: fields.direction().to_owned(),
        distance_miles: fields.distance(),
        landmark: fields.location().to_owned(),
        county: fields.county().to_owned(),
        state: fields.state().to_owned(),
        latitude: fields.lat().to_owned(),
        longitude: fields.lon().to_owned(),
        remarks: fields.remarks().to_owned(),
        office,
    }
}

/// NWS remarks end with the issuing office in parentheses, e.g. `"... dam (TAE)"`.
fn office_from_remarks(remarks: &str) -> Option<&str> {
    let (_, tail) = remarks.trim_end().rsplit_once('(')?;
    let office = tail.strip_suffix(')')?;

    let valid = (3..=4).contains(&office.len())
        && office
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());

    valid.then_some(office)
}
