use async_trait::async_trait;

use report_common::report::ReportType;

use crate::error::{SourceError, TagError};

/// Header carrying the report type of a message's payload.
pub const REPORT_TYPE_HEADER: &str = "reportType";

/// A message read from one partition, owned by the consumer that read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub partition: i32,
    pub offset: i64,
    /// Publish time in epoch milliseconds, when the broker provides one.
    pub timestamp: Option<i64>,
    pub headers: Vec<(String, Vec<u8>)>,
    pub payload: Option<Vec<u8>>,
}

impl RawMessage {
    /// First header whose key matches `key`, ignoring case.
    pub fn header(&self, key: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_slice())
    }

    /// The report type this message's payload should be decoded as.
    pub fn report_type(&self) -> Result<ReportType, TagError> {
        let value = self.header(REPORT_TYPE_HEADER).ok_or(TagError::Missing)?;
        let value = String::from_utf8_lossy(value);

        value
            .parse()
            .map_err(|_| TagError::Unrecognized(value.into_owned()))
    }

    pub fn payload(&self) -> &[u8] {
        self.payload.as_deref().unwrap_or_default()
    }
}

/// Ordered reads and commits against a single partition.
#[async_trait]
pub trait PartitionSource: Send + Sync {
    fn partition(&self) -> i32;

    /// Wait for the next message. `SourceError::Closed` means no message will ever follow.
    async fn next(&mut self) -> Result<RawMessage, SourceError>;

    /// Record that every message up to and including `offset` has been handled.
    async fn commit(&mut self, offset: i64) -> Result<(), SourceError>;
}

/// Access to a partitioned topic.
pub trait Broker: Send + Sync {
    fn topic(&self) -> &str;

    /// Partition ids of the topic, as known at call time.
    fn partitions(&self) -> Result<Vec<i32>, SourceError>;

    /// Start reading `partition` from its committed position.
    fn open(&self, partition: i32) -> Result<Box<dyn PartitionSource>, SourceError>;
}
