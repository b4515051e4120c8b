use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use prost::Message;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use report_common::gateway::{Ack, PersistError, ReportSink};
use report_common::proto::HailMsg;
use report_common::report::{NormalizedReport, ReportType};
use report_common::retry::RetryPolicy;
use tracing_subscriber::fmt::MakeWriter;

use crate::consumer::ConsumerSettings;
use crate::error::SourceError;
use crate::source::{Broker, PartitionSource, RawMessage};

pub fn settings() -> ConsumerSettings {
    ConsumerSettings {
        read_timeout: Duration::from_millis(20),
        retry_policy: RetryPolicy::build(1, Duration::from_millis(1))
            .maximum_interval(Duration::from_millis(10))
            .provide(),
        liveness_deadline: time::Duration::seconds(30),
    }
}

pub fn transient() -> PersistError {
    PersistError::Transient(sqlx::Error::PoolTimedOut)
}

/// A hail report 2 miles SSW of Lamont, placed in `county`, at `offset`.
pub fn hail_message(offset: i64, county: &str) -> RawMessage {
    let payload = HailMsg {
        r#type: "hail".to_owned(),
        time: 1_713_699_060,
        size: 175,
        distance: 2,
        direction: "SSW".to_owned(),
        location: "Lamont".to_owned(),
        county: county.to_owned(),
        state: "FL".to_owned(),
        lat: "30.35".to_owned(),
        lon: "-83.83".to_owned(),
        remarks: "golf ball size hail".to_owned(),
        office: None,
    }
    .encode_to_vec();

    RawMessage {
        partition: 0,
        offset,
        timestamp: Some(1_713_699_100_000),
        headers: vec![("reportType".to_owned(), b"hail".to_vec())],
        payload: Some(payload),
    }
}

/// An in-memory partition. Closes once drained, unless held open.
pub struct FakeSource {
    partition: i32,
    messages: VecDeque<Result<RawMessage, SourceError>>,
    commits: Arc<Mutex<Vec<i64>>>,
    hold_open: bool,
    panic_on_read: bool,
}

impl FakeSource {
    pub fn new(partition: i32, messages: Vec<RawMessage>) -> Self {
        Self::from_results(partition, messages.into_iter().map(Ok).collect())
    }

    pub fn from_results(
        partition: i32,
        messages: VecDeque<Result<RawMessage, SourceError>>,
    ) -> Self {
        Self {
            partition,
            messages,
            commits: Arc::default(),
            hold_open: false,
            panic_on_read: false,
        }
    }

    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    /// Panic on the first read instead of returning anything.
    pub fn panic_on_read(mut self) -> Self {
        self.panic_on_read = true;
        self
    }

    pub fn commits(&self) -> Arc<Mutex<Vec<i64>>> {
        self.commits.clone()
    }
}

#[async_trait]
impl PartitionSource for FakeSource {
    fn partition(&self) -> i32 {
        self.partition
    }

    async fn next(&mut self) -> Result<RawMessage, SourceError> {
        if self.panic_on_read {
            panic!("partition {} source blew up", self.partition);
        }

        match self.messages.pop_front() {
            Some(message) => message.map(|mut message| {
                message.partition = self.partition;
                message
            }),
            None if self.hold_open => std::future::pending().await,
            None => Err(SourceError::Closed),
        }
    }

    async fn commit(&mut self, offset: i64) -> Result<(), SourceError> {
        self.commits.lock().unwrap().push(offset);
        Ok(())
    }
}

/// Partitions backed by `FakeSource`s. Partitions listed without a source fail to open.
pub struct FakeBroker {
    pub partitions: Vec<i32>,
    pub sources: Mutex<HashMap<i32, FakeSource>>,
}

impl FakeBroker {
    pub fn new(sources: Vec<FakeSource>) -> Self {
        let partitions = sources.iter().map(|source| source.partition).collect();
        let sources = sources
            .into_iter()
            .map(|source| (source.partition, source))
            .collect();

        Self {
            partitions,
            sources: Mutex::new(sources),
        }
    }
}

impl Broker for FakeBroker {
    fn topic(&self) -> &str {
        "storm-reports"
    }

    fn partitions(&self) -> Result<Vec<i32>, SourceError> {
        Ok(self.partitions.clone())
    }

    fn open(&self, partition: i32) -> Result<Box<dyn PartitionSource>, SourceError> {
        match self.sources.lock().unwrap().remove(&partition) {
            Some(source) => Ok(Box::new(source)),
            None => Err(SourceError::Kafka(KafkaError::ClientCreation(format!(
                "no source for partition {partition}"
            )))),
        }
    }
}

/// A broker whose metadata lookups fail.
pub struct UnreachableBroker;

impl Broker for UnreachableBroker {
    fn topic(&self) -> &str {
        "storm-reports"
    }

    fn partitions(&self) -> Result<Vec<i32>, SourceError> {
        Err(SourceError::Kafka(KafkaError::MetadataFetch(
            RDKafkaErrorCode::BrokerTransportFailure,
        )))
    }

    fn open(&self, _partition: i32) -> Result<Box<dyn PartitionSource>, SourceError> {
        Err(SourceError::Closed)
    }
}

type NaturalKey = (ReportType, i64, String, String, String, i32);

/// Stores reports in memory, deduplicating on the natural key like the `reports` table.
#[derive(Default)]
pub struct MemorySink {
    keys: Mutex<HashSet<NaturalKey>>,
    reports: Mutex<Vec<NormalizedReport>>,
    delay: Option<Duration>,
}

impl MemorySink {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn reports(&self) -> Vec<NormalizedReport> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReportSink for MemorySink {
    async fn persist(&self, report: &NormalizedReport) -> Result<Ack, PersistError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let key = (
            report.report_type,
            report.reported_at.timestamp(),
            report.county.clone(),
            report.state.clone(),
            report.direction.clone(),
            report.distance_miles,
        );
        if !self.keys.lock().unwrap().insert(key) {
            return Ok(Ack::Duplicate);
        }

        self.reports.lock().unwrap().push(report.clone());
        Ok(Ack::Success)
    }
}

/// Answers persistence attempts from a script, then succeeds. Records every attempt.
pub struct ScriptedSink {
    script: Mutex<VecDeque<Result<Ack, PersistError>>>,
    fallback: Option<fn() -> PersistError>,
    attempts: Mutex<Vec<NormalizedReport>>,
}

impl ScriptedSink {
    pub fn new(script: Vec<Result<Ack, PersistError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: None,
            attempts: Mutex::default(),
        }
    }

    /// Fail every attempt with the given error.
    pub fn always(error: fn() -> PersistError) -> Self {
        Self {
            fallback: Some(error),
            ..Self::new(vec![])
        }
    }

    pub fn attempts(&self) -> Vec<NormalizedReport> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReportSink for ScriptedSink {
    async fn persist(&self, report: &NormalizedReport) -> Result<Ack, PersistError> {
        self.attempts.lock().unwrap().push(report.clone());

        if let Some(result) = self.script.lock().unwrap().pop_front() {
            return result;
        }
        match self.fallback {
            Some(error) => Err(error()),
            None => Ok(Ack::Success),
        }
    }
}

/// Log lines written by a `fmt` subscriber, kept for assertions.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Install a subscriber writing INFO and above into this buffer for the current thread.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .map(str::to_owned)
            .collect()
    }

    /// The captured line containing `message`, if any.
    pub fn find(&self, message: &str) -> Option<String> {
        self.lines().into_iter().find(|line| line.contains(message))
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
