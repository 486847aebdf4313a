// tests/common/mod.rs
#![allow(dead_code)]

use go_zoom_kinesis_sink::config::properties;
use go_zoom_kinesis_sink::monitoring::{StreamEventType, WriteEvent, WriteEventType};
use go_zoom_kinesis_sink::test::mocks::MockKinesisClient;
use go_zoom_kinesis_sink::test::TestUtils;
use go_zoom_kinesis_sink::{DistributionMode, StreamTarget, WriterOptions};
use std::collections::HashMap;
use std::sync::Once;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

static INIT: Once = Once::new();

pub fn init_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive("go_zoom_kinesis_sink=debug".parse().unwrap())
                    .add_directive("test=debug".parse().unwrap()),
            )
            .with_test_writer()
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .try_init()
            .ok();
    });
}

/// Property map as the job framework would hand it over
pub fn test_properties(stream_name: &str) -> HashMap<String, String> {
    let mut props = HashMap::new();
    props.insert(properties::REFERENCE_NAME.to_string(), "KinesisSinkTest".to_string());
    props.insert(properties::NAME.to_string(), stream_name.to_string());
    props.insert(properties::ACCESS_ID.to_string(), "someId".to_string());
    props.insert(properties::ACCESS_KEY.to_string(), "SomeSecret".to_string());
    props.insert(properties::BODY_FIELD.to_string(), "body".to_string());
    props.insert(properties::MAX_RETRIES.to_string(), "3".to_string());
    props.insert(properties::INITIAL_BACKOFF_MS.to_string(), "1".to_string());
    props.insert(properties::MAX_BACKOFF_MS.to_string(), "5".to_string());
    props
}

pub fn spread_target(name: &str, shard_count: i32) -> StreamTarget {
    StreamTarget::new(name)
        .with_shard_count(shard_count)
        .with_mode(DistributionMode::Spread)
}

/// Shared state for a writer test
pub struct TestContext {
    pub client: MockKinesisClient,
    pub options: WriterOptions,
    pub shutdown_tx: watch::Sender<bool>,
    pub shutdown_rx: watch::Receiver<bool>,
}

impl TestContext {
    pub fn new(client: MockKinesisClient) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            client,
            options: TestUtils::fast_writer_options(3),
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Attach a monitoring channel to the writer options
    pub fn with_monitoring(mut self) -> (Self, mpsc::Receiver<WriteEvent>) {
        let (tx, rx) = mpsc::channel(100);
        self.options.monitoring_tx = Some(tx);
        (self, rx)
    }
}

/// Drain every event currently buffered in `rx`
pub fn drain_events(rx: &mut mpsc::Receiver<WriteEvent>) -> Vec<WriteEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn stream_events(events: &[WriteEvent]) -> Vec<StreamEventType> {
    events
        .iter()
        .filter_map(|e| match &e.event_type {
            WriteEventType::Stream { event_type, .. } => Some(*event_type),
            _ => None,
        })
        .collect()
}

pub async fn wait_for(condition: impl Fn() -> bool, timeout: Duration) -> anyhow::Result<()> {
    let start = std::time::Instant::now();
    while !condition() {
        if start.elapsed() > timeout {
            anyhow::bail!("Timeout waiting for condition after {:?}", timeout);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    Ok(())
}
