use chrono::DateTime;
use thiserror::Error;

use crate::proto::{HailMsg, ReportFields, ReportSchema, TornadoMsg, WindMsg};
use crate::report::ReportType;

/// A report payload decoded under the schema its report type implies.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedEvent {
    Hail(HailMsg),
    Wind(WindMsg),
    Tornado(TornadoMsg),
}

impl DecodedEvent {
    pub fn report_type(&self) -> ReportType {
        match self {
            DecodedEvent::Hail(_) => ReportType::Hail,
            DecodedEvent::Wind(_) => ReportType::Wind,
            DecodedEvent::Tornado(_) => ReportType::Tornado,
        }
    }

    /// The fields shared by every schema, regardless of variant.
    pub fn fields(&self) -> &dyn ReportFields {
        match self {
            DecodedEvent::Hail(msg) => msg,
            DecodedEvent::Wind(msg) => msg,
            DecodedEvent::Tornado(msg) => msg,
        }
    }
}

/// Enumeration of errors produced while decoding a report payload.
/// Every variant is permanent: the same bytes will never decode on a later attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed {report_type} payload: {reason}")]
    Malformed {
        report_type: ReportType,
        reason: String,
    },
}

impl DecodeError {
    fn malformed(report_type: ReportType, reason: impl Into<String>) -> Self {
        DecodeError::Malformed {
            report_type,
            reason: reason.into(),
        }
    }
}

type DecodeFn = fn(&[u8]) -> Result<DecodedEvent, DecodeError>;

/// Decoder per report type. Adding a report type means adding a schema and a row here.
const DECODERS: [(ReportType, DecodeFn); 3] = [
    (ReportType::Hail, decode_schema::<HailMsg>),
    (ReportType::Wind, decode_schema::<WindMsg>),
    (ReportType::Tornado, decode_schema::<TornadoMsg>),
];

/// Decode `payload` under the schema registered for `report_type`.
pub fn decode(report_type: ReportType, payload: &[u8]) -> Result<DecodedEvent, DecodeError> {
    let decoder = DECODERS
        .iter()
        .find(|(registered, _)| *registered == report_type)
        .map(|(_, decoder)| decoder)
        .ok_or_else(|| DecodeError::malformed(report_type, "no decoder registered"))?;

    decoder(payload)
}

fn decode_schema<S: ReportSchema>(payload: &[u8]) -> Result<DecodedEvent, DecodeError> {
    if payload.is_empty() {
        return Err(DecodeError::malformed(S::REPORT_TYPE, "empty payload"));
    }

    let msg = S::decode(payload)
        .map_err(|error| DecodeError::malformed(S::REPORT_TYPE, error.to_string()))?;

    // The schemas are wire-compatible, so the embedded type is the only schema check.
    let embedded = msg.embedded_type();
    if embedded.is_empty() {
        return Err(DecodeError::malformed(S::REPORT_TYPE, "payload has no type"));
    }
    if !embedded.eq_ignore_ascii_case(S::REPORT_TYPE.as_str()) {
        return Err(DecodeError::malformed(
            S::REPORT_TYPE,
            format!("payload is a {embedded:?} report"),
        ));
    }

    if DateTime::from_timestamp(msg.time(), 0).is_none() {
        return Err(DecodeError::malformed(
            S::REPORT_TYPE,
            format!("time {} is out of range", msg.time()),
        ));
    }

    Ok(msg.into_event())
}
