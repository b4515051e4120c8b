use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::report::NormalizedReport;
use crate::store::{is_transient_error, is_unique_violation, ReportWriter};

/// Outcome of a persistence attempt that needs no further work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// The report was written.
    Success,
    /// A report with the same natural key was already stored; nothing was written.
    Duplicate,
}

/// Enumeration of errors that can occur while persisting a report.
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("persisting report timed out after {0:?}")]
    Timeout(Duration),
    #[error("transient error persisting report")]
    Transient(#[source] sqlx::Error),
    #[error("fatal error persisting report")]
    Fatal(#[source] sqlx::Error),
}

impl PersistError {
    /// Whether the same write may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            PersistError::Timeout(_) | PersistError::Transient(_) => true,
            PersistError::Fatal(_) => false,
        }
    }

    /// Label used for metrics and logs.
    pub fn class(&self) -> &'static str {
        match self {
            PersistError::Timeout(_) => "timeout",
            PersistError::Transient(_) => "transient",
            PersistError::Fatal(_) => "fatal",
        }
    }
}

impl From<sqlx::Error> for PersistError {
    fn from(error: sqlx::Error) -> Self {
        if is_transient_error(&error) {
            PersistError::Transient(error)
        } else {
            PersistError::Fatal(error)
        }
    }
}

/// Destination of normalized reports, as seen by a partition consumer.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Make one durable write attempt for `report`.
    async fn persist(&self, report: &NormalizedReport) -> Result<Ack, PersistError>;
}

/// Writes reports through a `ReportWriter`, bounding each attempt by a deadline and
/// turning natural key conflicts into `Ack::Duplicate`.
pub struct PersistenceGateway<W> {
    writer: W,
    timeout: Duration,
}

impl<W: ReportWriter> PersistenceGateway<W> {
    pub fn new(writer: W, timeout: Duration) -> Self {
        Self { writer, timeout }
    }
}

#[async_trait]
impl<W: ReportWriter> ReportSink for PersistenceGateway<W> {
    async fn persist(&self, report: &NormalizedReport) -> Result<Ack, PersistError> {
        let result = tokio::time::timeout(self.timeout, self.writer.insert(report))
            .await
            .map_err(|_| PersistError::Timeout(self.timeout))?;

        match result {
            Ok(0) => Ok(Ack::Duplicate),
            Ok(_) => Ok(Ack::Success),
            Err(error) if is_unique_violation(&error) => {
                debug!(
                    report_type = %report.report_type,
                    reported_at = %report.reported_at,
                    county = %report.county,
                    state = %report.state,
                    "report already stored"
                );
                Ok(Ack::Duplicate)
            }
            Err(error) => Err(error.into()),
        }
    }
}
