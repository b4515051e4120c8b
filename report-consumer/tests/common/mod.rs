#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use prost::Message;
use report_common::proto::{HailMsg, TornadoMsg, WindMsg};
use report_common::retry::RetryPolicy;
use report_consumer::consumer::ConsumerSettings;
use report_consumer::error::SourceError;
use report_consumer::source::{Broker, PartitionSource, RawMessage};

pub const LAMONT_TIME: i64 = 1_713_699_060; // 2024-04-21T11:31:00Z

pub fn settings() -> ConsumerSettings {
    ConsumerSettings {
        read_timeout: Duration::from_millis(50),
        retry_policy: RetryPolicy::build(1, Duration::from_millis(5)).provide(),
        liveness_deadline: time::Duration::seconds(30),
    }
}

pub fn message(offset: i64, report_type: &str, payload: Vec<u8>) -> RawMessage {
    RawMessage {
        partition: 0,
        offset,
        timestamp: None,
        headers: vec![("reportType".to_owned(), report_type.as_bytes().to_vec())],
        payload: Some(payload),
    }
}

pub fn lamont_hail(state: &str) -> Vec<u8> {
    HailMsg {
        r#type: "hail".to_owned(),
        time: LAMONT_TIME,
        size: 175,
        distance: 2,
        direction: "SSW".to_owned(),
        location: "Lamont".to_owned(),
        county: "Jefferson".to_owned(),
        state: state.to_owned(),
        lat: "30.35".to_owned(),
        lon: "-83.83".to_owned(),
        remarks: "golf ball size hail".to_owned(),
        office: None,
    }
    .encode_to_vec()
}

pub fn wind(county: &str, state: &str, speed: i32) -> Vec<u8> {
    WindMsg {
        r#type: "wind".to_owned(),
        time: LAMONT_TIME + 600,
        speed,
        distance: 1,
        direction: "N".to_owned(),
        location: "Monticello".to_owned(),
        county: county.to_owned(),
        state: state.to_owned(),
        lat: "30.55".to_owned(),
        lon: "-83.87".to_owned(),
        remarks: "trees down on highway 19 (TAE)".to_owned(),
        office: None,
    }
    .encode_to_vec()
}

pub fn tornado(county: &str, state: &str, f_scale: i32) -> Vec<u8> {
    TornadoMsg {
        r#type: "tornado".to_owned(),
        time: LAMONT_TIME + 1200,
        f_scale,
        distance: 3,
        direction: "E".to_owned(),
        location: "Greenville".to_owned(),
        county: county.to_owned(),
        state: state.to_owned(),
        lat: "30.47".to_owned(),
        lon: "-83.63".to_owned(),
        remarks: "EF1 damage to outbuildings".to_owned(),
        office: Some("TAE".to_owned()),
    }
    .encode_to_vec()
}

/// A partition replaying a fixed list of messages, then closing.
pub struct VecSource {
    partition: i32,
    messages: VecDeque<RawMessage>,
    commits: Arc<Mutex<Vec<i64>>>,
}

impl VecSource {
    pub fn new(partition: i32, messages: Vec<RawMessage>) -> Self {
        Self {
            partition,
            messages: messages.into(),
            commits: Arc::default(),
        }
    }

    pub fn commits(&self) -> Arc<Mutex<Vec<i64>>> {
        self.commits.clone()
    }
}

#[async_trait]
impl PartitionSource for VecSource {
    fn partition(&self) -> i32 {
        self.partition
    }

    async fn next(&mut self) -> Result<RawMessage, SourceError> {
        let mut message = self.messages.pop_front().ok_or(SourceError::Closed)?;
        message.partition = self.partition;
        Ok(message)
    }

    async fn commit(&mut self, offset: i64) -> Result<(), SourceError> {
        self.commits.lock().unwrap().push(offset);
        Ok(())
    }
}

pub struct VecBroker {
    sources: Mutex<HashMap<i32, VecSource>>,
}

impl VecBroker {
    pub fn new(sources: Vec<VecSource>) -> Self {
        Self {
            sources: Mutex::new(
                sources
                    .into_iter()
                    .map(|source| (source.partition, source))
                    .collect(),
            ),
        }
    }
}

impl Broker for VecBroker {
    fn topic(&self) -> &str {
        "storm-reports"
    }

    fn partitions(&self) -> Result<Vec<i32>, SourceError> {
        let mut partitions: Vec<i32> = self.sources.lock().unwrap().keys().copied().collect();
        partitions.sort();
        Ok(partitions)
    }

    fn open(&self, partition: i32) -> Result<Box<dyn PartitionSource>, SourceError> {
        let source = self
            .sources
            .lock()
            .unwrap()
            .remove(&partition)
            .ok_or(SourceError::Closed)?;
        Ok(Box::new(source))
    }
}
