use super::types::{StreamEventType, WriteEvent, WriteEventType};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;
use tracing::{debug, info, trace, warn};

/// Aggregated write metrics for a single stream
#[derive(Debug, Clone)]
pub struct StreamMetrics {
    pub records_written: u64,
    pub records_failed: u64,
    /// Attempts beyond the first, summed over all records
    pub retry_attempts: u64,
    pub bytes_written: u64,
    /// Records acknowledged per shard id
    pub records_per_shard: HashMap<String, u64>,

    pub streams_created: u64,
    pub reshards: u64,
    pub provisioning_failures: u64,

    pub total_write_time: Duration,
    pub avg_write_time: Duration,
    pub max_write_time: Duration,

    pub window_start: Instant,
    pub last_updated: Instant,
}

impl Default for StreamMetrics {
    fn default() -> Self {
        let now = Instant::now();
        Self {
            records_written: 0,
            records_failed: 0,
            retry_attempts: 0,
            bytes_written: 0,
            records_per_shard: HashMap::new(),
            streams_created: 0,
            reshards: 0,
            provisioning_failures: 0,
            total_write_time: Duration::default(),
            avg_write_time: Duration::default(),
            max_write_time: Duration::default(),
            window_start: now,
            last_updated: now,
        }
    }
}

/// Aggregates write events into per-stream metrics
pub struct MetricsAggregator {
    metrics: Arc<RwLock<HashMap<String, StreamMetrics>>>,
    window_duration: Duration,
    monitoring_rx: mpsc::Receiver<WriteEvent>,
}

impl MetricsAggregator {
    pub fn new(window_duration: Duration, monitoring_rx: mpsc::Receiver<WriteEvent>) -> Self {
        Self {
            metrics: Arc::new(RwLock::new(HashMap::new())),
            window_duration,
            monitoring_rx,
        }
    }

    /// Handle to the live metrics, usable after `run` has taken ownership
    pub fn handle(&self) -> Arc<RwLock<HashMap<String, StreamMetrics>>> {
        self.metrics.clone()
    }

    /// Process events and emit metrics until every sender is dropped
    pub async fn run(mut self) {
        let mut ticker = interval(self.window_duration);

        loop {
            tokio::select! {
                event = self.monitoring_rx.recv() => match event {
                    Some(event) => self.process_event(event).await,
                    None => {
                        debug!("Monitoring channel closed, emitting final metrics");
                        self.emit_metrics().await;
                        return;
                    }
                },
                _ = ticker.tick() => {
                    self.emit_metrics().await;
                }
            }
        }
    }

    pub async fn process_event(&self, event: WriteEvent) {
        let mut metrics = self.metrics.write().await;
        let stream_metrics = metrics.entry(event.stream_name.clone()).or_default();

        match event.event_type {
            WriteEventType::RecordWritten {
                shard_id,
                partition_key,
                bytes,
                attempts,
                duration,
            } => {
                stream_metrics.records_written += 1;
                stream_metrics.bytes_written += bytes as u64;
                stream_metrics.retry_attempts += u64::from(attempts.saturating_sub(1));
                *stream_metrics
                    .records_per_shard
                    .entry(shard_id.clone())
                    .or_insert(0) += 1;

                stream_metrics.total_write_time += duration;
                stream_metrics.avg_write_time = stream_metrics
                    .total_write_time
                    .div_f64(stream_metrics.records_written as f64);
                if duration > stream_metrics.max_write_time {
                    stream_metrics.max_write_time = duration;
                }

                trace!(
                    stream = %event.stream_name,
                    shard_id = %shard_id,
                    partition_key = %partition_key,
                    "Record written"
                );
            }
            WriteEventType::RecordFailed {
                partition_key,
                attempts,
                error,
            } => {
                stream_metrics.records_failed += 1;
                stream_metrics.retry_attempts += u64::from(attempts.saturating_sub(1));
                warn!(
                    stream = %event.stream_name,
                    partition_key = %partition_key,
                    attempts = attempts,
                    error = %error,
                    "Record write failed"
                );
            }
            WriteEventType::Stream {
                event_type,
                details,
            } => match event_type {
                StreamEventType::Created => {
                    stream_metrics.streams_created += 1;
                    debug!(stream = %event.stream_name, details = ?details, "Stream created");
                }
                StreamEventType::Resharded => {
                    stream_metrics.reshards += 1;
                    debug!(stream = %event.stream_name, details = ?details, "Stream resharded");
                }
                StreamEventType::Active => {
                    trace!(stream = %event.stream_name, "Stream active");
                }
                StreamEventType::Failed => {
                    stream_metrics.provisioning_failures += 1;
                    warn!(stream = %event.stream_name, details = ?details, "Stream provisioning failed");
                }
            },
        }

        stream_metrics.last_updated = Instant::now();
    }

    async fn emit_metrics(&self) {
        let metrics = self.metrics.read().await;

        for (stream, metrics) in metrics.iter() {
            info!(
                stream = %stream,
                records_written = metrics.records_written,
                records_failed = metrics.records_failed,
                retry_attempts = metrics.retry_attempts,
                bytes_written = metrics.bytes_written,
                shards_used = metrics.records_per_shard.len(),
                avg_write_time_ms = %metrics.avg_write_time.as_millis(),
                max_write_time_ms = %metrics.max_write_time.as_millis(),
                "Write metrics for window"
            );

            if metrics.records_failed > 0 {
                warn!(
                    stream = %stream,
                    failed = metrics.records_failed,
                    "Records failed to write"
                );
            }
        }
    }

    /// Get current metrics for all streams
    pub async fn get_metrics(&self) -> HashMap<String, StreamMetrics> {
        self.metrics.read().await.clone()
    }

    /// Get metrics for a specific stream
    pub async fn get_stream_metrics(&self, stream_name: &str) -> Option<StreamMetrics> {
        self.metrics.read().await.get(stream_name).cloned()
    }
}
