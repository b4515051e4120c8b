use std::time::Duration;

use async_trait::async_trait;
use rdkafka::consumer::{BaseConsumer, CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Headers, Message};
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use tracing::{debug, info};

use crate::config::KafkaConfig;
use crate::error::SourceError;
use crate::source::{Broker, PartitionSource, RawMessage};

/// A Kafka topic consumed one partition at a time, with manual assignment and commits.
pub struct KafkaBroker {
    client_config: ClientConfig,
    metadata: BaseConsumer,
    topic: String,
    metadata_timeout: Duration,
}

impl KafkaBroker {
    pub fn new(config: &KafkaConfig, metadata_timeout: Duration) -> Result<Self, SourceError> {
        let client_config = client_config(config);
        let metadata: BaseConsumer = client_config.create()?;

        Ok(Self {
            client_config,
            metadata,
            topic: config.kafka_consumer_topic.as_str().to_owned(),
            metadata_timeout,
        })
    }
}

fn client_config(config: &KafkaConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", &config.kafka_hosts)
        .set("statistics.interval.ms", "10000")
        .set("group.id", config.kafka_consumer_group.as_str())
        .set("enable.auto.commit", "false")
        .set("enable.auto.offset.store", "false")
        .set("enable.partition.eof", "false")
        .set("auto.offset.reset", &config.kafka_consumer_offset_reset);

    match (config.kafka_tls, config.sasl_credentials()) {
        (tls, Some((username, password))) => {
            client_config
                .set(
                    "security.protocol",
                    if tls { "sasl_ssl" } else { "sasl_plaintext" },
                )
                .set("sasl.mechanisms", "SCRAM-SHA-256")
                .set("sasl.username", username)
                .set("sasl.password", password);
        }
        (true, None) => {
            client_config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        }
        (false, None) => {}
    }

    client_config
}

impl Broker for KafkaBroker {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn partitions(&self) -> Result<Vec<i32>, SourceError> {
        let metadata = self
            .metadata
            .fetch_metadata(Some(&self.topic), self.metadata_timeout)?;

        let partitions = metadata
            .topics()
            .iter()
            .filter(|topic| topic.name() == self.topic)
            .flat_map(|topic| topic.partitions())
            .map(|partition| partition.id())
            .collect();

        Ok(partitions)
    }

    fn open(&self, partition: i32) -> Result<Box<dyn PartitionSource>, SourceError> {
        let consumer: StreamConsumer = self.client_config.create()?;

        let mut assignment = TopicPartitionList::new();
        assignment.add_partition_offset(&self.topic, partition, Offset::Stored)?;
        consumer.assign(&assignment)?;

        info!(topic = self.topic, partition, "assigned partition");

        Ok(Box::new(KafkaPartitionSource {
            consumer,
            topic: self.topic.clone(),
            partition,
        }))
    }
}

pub struct KafkaPartitionSource {
    consumer: StreamConsumer,
    topic: String,
    partition: i32,
}

#[async_trait]
impl PartitionSource for KafkaPartitionSource {
    fn partition(&self) -> i32 {
        self.partition
    }

    async fn next(&mut self) -> Result<RawMessage, SourceError> {
        let message = self.consumer.recv().await?;

        Ok(raw_message(&message))
    }

    async fn commit(&mut self, offset: i64) -> Result<(), SourceError> {
        // Kafka commits the position of the next message to read.
        let mut position = TopicPartitionList::new();
        position.add_partition_offset(&self.topic, self.partition, Offset::Offset(offset + 1))?;

        self.consumer.commit(&position, CommitMode::Async)?;
        debug!(partition = self.partition, offset, "committed offset");

        Ok(())
    }
}

fn raw_message(message: &BorrowedMessage<'_>) -> RawMessage {
    let headers: Vec<(String, Vec<u8>)> = message
        .headers()
        .map(|headers| {
            headers
                .iter()
                .filter_map(|header| header.value.map(|v| (header.key.to_string(), v.to_vec())))
                .collect()
        })
        .unwrap_or_default();

    RawMessage {
        partition: message.partition(),
        offset: message.offset(),
        timestamp: message.timestamp().to_millis(),
        headers,
        payload: message.payload().map(<[u8]>::to_vec),
    }
}
