use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use thiserror::Error;

/// Enumeration of reasons a message's `reportType` header cannot select a decoder.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TagError {
    #[error("message has no reportType header")]
    Missing,
    #[error("{0:?} is not a recognized reportType")]
    Unrecognized(String),
}

impl TagError {
    /// Label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            TagError::Missing => "missing_tag",
            TagError::Unrecognized(_) => "unrecognized_tag",
        }
    }
}

/// Enumeration of errors produced while reading from or committing to a partition.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("kafka error")]
    Kafka(#[from] KafkaError),
    #[error("partition source is closed")]
    Closed,
}

impl SourceError {
    /// Whether the partition can no longer be consumed, as opposed to a hiccup a later
    /// read may get past.
    pub fn is_fatal(&self) -> bool {
        match self {
            SourceError::Closed => false,
            SourceError::Kafka(error) => matches!(
                error.rdkafka_error_code(),
                Some(
                    RDKafkaErrorCode::UnknownTopicOrPartition
                        | RDKafkaErrorCode::UnknownPartition
                        | RDKafkaErrorCode::UnknownTopic
                        | RDKafkaErrorCode::Fatal
                )
            ),
        }
    }
}

/// Enumeration of errors that end a partition consumer.
#[derive(Error, Debug)]
pub enum ConsumerError {
    #[error("partition {partition} can no longer be read")]
    Source {
        partition: i32,
        #[source]
        error: SourceError,
    },
}

/// Enumeration of errors that prevent the consumer group from starting.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("failed to discover partitions of topic {topic}")]
    Discovery {
        topic: String,
        #[source]
        error: SourceError,
    },
    #[error("topic {0} has no partitions")]
    NoPartitions(String),
}
