use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use report_common::gateway::ReportSink;
use report_common::health::HealthRegistry;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::consumer::{ConsumerSettings, PartitionConsumer, PartitionStats};
use crate::error::CoordinatorError;
use crate::metrics_consts::PARTITIONS_RUNNING;
use crate::source::Broker;

/// A partition that stopped because of an error rather than cancellation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionFailure {
    pub partition: i32,
    pub error: String,
}

/// What every partition consumer did before the group stopped.
#[derive(Debug, Default)]
pub struct GroupReport {
    pub partitions: BTreeMap<i32, PartitionStats>,
    pub failures: Vec<PartitionFailure>,
}

impl GroupReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn totals(&self) -> PartitionStats {
        self.partitions
            .values()
            .fold(PartitionStats::default(), |mut totals, stats| {
                totals.merge(stats);
                totals
            })
    }
}

/// Runs one `PartitionConsumer` per partition of a topic.
pub struct ConsumerGroup<B> {
    broker: B,
    sink: Arc<dyn ReportSink>,
    liveness: HealthRegistry,
    settings: ConsumerSettings,
}

impl<B: Broker> ConsumerGroup<B> {
    pub fn new(
        broker: B,
        sink: Arc<dyn ReportSink>,
        liveness: HealthRegistry,
        settings: ConsumerSettings,
    ) -> Self {
        Self {
            broker,
            sink,
            liveness,
            settings,
        }
    }

    /// Discover the topic's partitions and consume all of them until `cancel` fires or
    /// every consumer has stopped. A consumer failing does not stop the others.
    pub async fn run(&self, cancel: CancellationToken) -> Result<GroupReport, CoordinatorError> {
        let topic = self.broker.topic().to_owned();
        let partitions = self
            .broker
            .partitions()
            .map_err(|error| CoordinatorError::Discovery {
                topic: topic.clone(),
                error,
            })?;

        if partitions.is_empty() {
            return Err(CoordinatorError::NoPartitions(topic));
        }
        info!(topic, partitions = ?partitions, "starting partition consumers");

        let mut report = GroupReport::default();
        let mut tasks = JoinSet::new();
        // Lets a panicked task still be attributed to its partition.
        let mut task_partitions = HashMap::new();

        for partition in partitions {
            let source = match self.broker.open(partition) {
                Ok(source) => source,
                Err(error) => {
                    error!(partition, error = ?error, "failed to open partition");
                    report.failures.push(PartitionFailure {
                        partition,
                        error: error.to_string(),
                    });
                    continue;
                }
            };

            let liveness = self.liveness.register(
                format!("partition-{partition}"),
                self.settings.liveness_deadline,
            );
            let mut consumer =
                PartitionConsumer::new(source, self.sink.clone(), liveness, self.settings.clone());
            let token = cancel.child_token();

            let handle = tasks.spawn(async move { consumer.run(token).await });
            task_partitions.insert(handle.id(), partition);
        }

        metrics::gauge!(PARTITIONS_RUNNING).set(tasks.len() as f64);

        while let Some(joined) = tasks.join_next_with_id().await {
            let (id, result) = match joined {
                Ok((id, result)) => (id, Ok(result)),
                Err(join_error) => (join_error.id(), Err(join_error)),
            };
            let Some(partition) = task_partitions.remove(&id) else {
                error!(task = %id, "joined a task that was never spawned for a partition");
                continue;
            };

            match result {
                Ok(Ok(stats)) => {
                    report.partitions.insert(partition, stats);
                }
                Ok(Err(error)) => {
                    error!(partition, error = ?error, "partition consumer failed");
                    report.failures.push(PartitionFailure {
                        partition,
                        error: error.to_string(),
                    });
                }
                Err(join_error) => {
                    error!(partition, error = %join_error, "partition consumer panicked");
                    report.failures.push(PartitionFailure {
                        partition,
                        error: join_error.to_string(),
                    });
                }
            }
            metrics::gauge!(PARTITIONS_RUNNING).set(tasks.len() as f64);
        }

        info!(
            topic,
            totals = ?report.totals(),
            failures = report.failures.len(),
            "all partition consumers stopped"
        );

        Ok(report)
    }
}
