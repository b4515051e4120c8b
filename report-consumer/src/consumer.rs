use std::sync::Arc;
use std::time::{Duration, Instant};

use report_common::decode::decode;
use report_common::gateway::{Ack, PersistError, ReportSink};
use report_common::health::{ComponentStatus, HealthHandle};
use report_common::normalize::normalize;
use report_common::report::ReportType;
use report_common::retry::RetryPolicy;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace, warn};

use crate::error::{ConsumerError, SourceError};
use crate::metrics_consts::{
    COMMIT_FAILURES, MESSAGES_RECEIVED, MESSAGES_SKIPPED, OFFSETS_COMMITTED, PERSIST_FAILURES,
    PERSIST_TIME, READ_ERRORS, REPORTS_DUPLICATE, REPORTS_STORED,
};
use crate::source::{PartitionSource, RawMessage, REPORT_TYPE_HEADER};

/// Where a partition consumer is in handling its current message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    Reading,
    Decoding,
    Normalizing,
    Persisting,
    /// The message was handled and its offset committed.
    Committed,
    /// The message could not be handled and will never be; its offset was committed.
    Skipped,
    Stopped,
}

#[derive(Clone, Debug)]
pub struct ConsumerSettings {
    /// How long to wait for a message before checking in with liveness again.
    pub read_timeout: Duration,
    /// Backoff between attempts at persisting the same message.
    pub retry_policy: RetryPolicy,
    /// How long a healthy report stays valid.
    pub liveness_deadline: time::Duration,
}

/// Counts of message dispositions over the life of a partition consumer.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PartitionStats {
    pub stored: u64,
    pub duplicates: u64,
    pub skipped: u64,
    /// Messages abandoned after a non-retryable persistence error.
    pub failed: u64,
    /// Persistence attempts that failed transiently and were retried.
    pub retries: u64,
}

impl PartitionStats {
    pub fn merge(&mut self, other: &PartitionStats) {
        self.stored += other.stored;
        self.duplicates += other.duplicates;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.retries += other.retries;
    }
}

enum Read {
    Message(RawMessage),
    Timeout,
    Cancelled,
    Closed,
    Error(SourceError),
}

enum Outcome {
    /// Commit the message, then move to the given state.
    Advance(ConsumerState),
    /// Keep the cursor on the message and try it again.
    Retry(ReportType, PersistError),
}

/// Reads a single partition in order, running every message through decode, normalize and
/// persist before committing it.
pub struct PartitionConsumer {
    source: Box<dyn PartitionSource>,
    sink: Arc<dyn ReportSink>,
    liveness: HealthHandle,
    settings: ConsumerSettings,
    state: ConsumerState,
    stats: PartitionStats,
}

impl PartitionConsumer {
    pub fn new(
        source: Box<dyn PartitionSource>,
        sink: Arc<dyn ReportSink>,
        liveness: HealthHandle,
        settings: ConsumerSettings,
    ) -> Self {
        Self {
            source,
            sink,
            liveness,
            settings,
            state: ConsumerState::Idle,
            stats: PartitionStats::default(),
        }
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    pub fn partition(&self) -> i32 {
        self.source.partition()
    }

    /// Consume until `cancel` fires or the partition closes.
    ///
    /// A message whose persistence fails transiently is retried in place, so the committed
    /// offset never moves past a message that was not resolved. Cancellation is only
    /// observed between messages, while reading and while backing off.
    pub async fn run(
        &mut self,
        cancel: CancellationToken,
    ) -> Result<PartitionStats, ConsumerError> {
        let partition = self.partition();
        info!(partition, "starting partition consumer");

        let mut pending: Option<RawMessage> = None;
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let message = match pending.take() {
                Some(message) => message,
                None => match self.read(&cancel).await {
                    Read::Message(message) => {
                        metrics::counter!(MESSAGES_RECEIVED).increment(1);
                        message
                    }
                    Read::Timeout => continue,
                    Read::Cancelled => break,
                    Read::Closed => {
                        info!(partition, "partition source closed");
                        break;
                    }
                    Read::Error(error) if error.is_fatal() => {
                        error!(partition, error = ?error, "fatal error reading partition");
                        self.transition(ConsumerState::Stopped);
                        return Err(ConsumerError::Source { partition, error });
                    }
                    Read::Error(error) => {
                        warn!(partition, error = ?error, "error reading partition, will retry");
                        metrics::counter!(READ_ERRORS).increment(1);
                        let backoff = self.settings.retry_policy.retry_interval(1);
                        if !self.pause(&cancel, backoff).await {
                            break;
                        }
                        continue;
                    }
                },
            };

            match self.handle(&message).await {
                Outcome::Advance(state) => {
                    attempt = 0;
                    self.commit(message.offset).await;
                    self.transition(state);
                }
                Outcome::Retry(report_type, error) => {
                    attempt = attempt.saturating_add(1);
                    self.stats.retries += 1;
                    let backoff = self.settings.retry_policy.retry_interval(attempt);

                    warn!(
                        report_type = %report_type,
                        partition,
                        offset = message.offset,
                        attempt,
                        backoff = ?backoff,
                        error = ?error,
                        "transient error persisting report, will retry"
                    );
                    self.liveness.report_status(ComponentStatus::Unhealthy);

                    pending = Some(message);
                    if !self.pause(&cancel, backoff).await {
                        break;
                    }
                }
            }
        }

        self.transition(ConsumerState::Stopped);
        info!(partition, stats = ?self.stats, "partition consumer stopped");

        Ok(self.stats.clone())
    }

    async fn read(&mut self, cancel: &CancellationToken) -> Read {
        self.transition(ConsumerState::Reading);
        self.liveness.report_healthy();

        let read = tokio::select! {
            _ = cancel.cancelled() => return Read::Cancelled,
            read = tokio::time::timeout(self.settings.read_timeout, self.source.next()) => read,
        };

        match read {
            Err(_) => Read::Timeout,
            Ok(Ok(message)) => Read::Message(message),
            Ok(Err(SourceError::Closed)) => Read::Closed,
            Ok(Err(error)) => Read::Error(error),
        }
    }

    /// Sleep for `duration` unless cancelled first. Returns false when cancelled.
    async fn pause(&self, cancel: &CancellationToken, duration: Duration) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    async fn handle(&mut self, message: &RawMessage) -> Outcome {
        let partition = message.partition;
        let offset = message.offset;
        self.transition(ConsumerState::Decoding);

        let report_type = match message.report_type() {
            Ok(report_type) => report_type,
            Err(error) => {
                let tag = message.header(REPORT_TYPE_HEADER).map(String::from_utf8_lossy);
                warn!(
                    report_type = ?tag,
                    partition,
                    offset,
                    error = %error,
                    "skipping message"
                );
                return self.skip(error.reason());
            }
        };

        let event = match decode(report_type, message.payload()) {
            Ok(event) => event,
            Err(error) => {
                warn!(
                    report_type = %report_type,
                    partition,
                    offset,
                    error = %error,
                    "skipping message"
                );
                return self.skip("malformed");
            }
        };

        self.transition(ConsumerState::Normalizing);
        let report = normalize(&event);

        self.transition(ConsumerState::Persisting);
        let start = Instant::now();
        let result = self.sink.persist(&report).await;
        metrics::histogram!(PERSIST_TIME).record(start.elapsed().as_millis() as f64);

        match result {
            Ok(Ack::Success) => {
                info!(report_type = %report_type, partition, offset, "stored report");
                metrics::counter!(REPORTS_STORED, "report_type" => report_type.as_str())
                    .increment(1);
                self.stats.stored += 1;
                Outcome::Advance(ConsumerState::Committed)
            }
            Ok(Ack::Duplicate) => {
                info!(report_type = %report_type, partition, offset, "report already stored");
                metrics::counter!(REPORTS_DUPLICATE, "report_type" => report_type.as_str())
                    .increment(1);
                self.stats.duplicates += 1;
                Outcome::Advance(ConsumerState::Committed)
            }
            Err(error) => {
                metrics::counter!(PERSIST_FAILURES, "class" => error.class()).increment(1);

                if error.is_transient() {
                    return Outcome::Retry(report_type, error);
                }

                error!(
                    report_type = %report_type,
                    partition,
                    offset,
                    error = ?error,
                    "failed to persist report, dropping it"
                );
                self.stats.failed += 1;
                Outcome::Advance(ConsumerState::Committed)
            }
        }
    }

    fn skip(&mut self, reason: &'static str) -> Outcome {
        metrics::counter!(MESSAGES_SKIPPED, "reason" => reason).increment(1);
        self.stats.skipped += 1;
        Outcome::Advance(ConsumerState::Skipped)
    }

    async fn commit(&mut self, offset: i64) {
        let partition = self.partition();

        match self.source.commit(offset).await {
            Ok(()) => {
                metrics::counter!(OFFSETS_COMMITTED).increment(1);
            }
            Err(error) => {
                // A later commit covers this offset, a restart before then reprocesses it.
                warn!(partition, offset, error = ?error, "failed to commit offset");
                metrics::counter!(COMMIT_FAILURES).increment(1);
            }
        }
    }

    fn transition(&mut self, state: ConsumerState) {
        trace!(partition = self.partition(), from = ?self.state, to = ?state, "state transition");
        self.state = state;
    }
}
