use std::time::{Duration, SystemTime};

/// Configuration for the monitoring system
#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    /// Whether monitoring is enabled
    pub enabled: bool,
    /// Size of the monitoring channel buffer
    pub channel_size: usize,
    /// How often to emit aggregated metrics
    pub metrics_interval: Duration,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            channel_size: 1000,
            metrics_interval: Duration::from_secs(60),
        }
    }
}

/// A monitoring event from a stream writer
#[derive(Debug, Clone)]
pub struct WriteEvent {
    /// When the event occurred
    pub timestamp: SystemTime,
    /// Stream the writer targets
    pub stream_name: String,
    /// The type of event and its details
    pub event_type: WriteEventType,
}

#[derive(Debug, Clone)]
pub enum WriteEventType {
    /// A record was acknowledged by the stream
    RecordWritten {
        shard_id: String,
        partition_key: String,
        bytes: usize,
        attempts: u32,
        duration: Duration,
    },
    /// A record could not be written
    RecordFailed {
        partition_key: String,
        attempts: u32,
        error: String,
    },
    /// Provisioning progress of the target stream
    Stream {
        event_type: StreamEventType,
        details: Option<String>,
    },
}

/// Stream provisioning milestones
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEventType {
    /// The stream did not exist and was created
    Created,
    /// The shard count was changed to match the configuration
    Resharded,
    /// The stream is ready to accept writes
    Active,
    /// Provisioning failed
    Failed,
}

impl WriteEvent {
    pub fn record_written(
        stream_name: String,
        shard_id: String,
        partition_key: String,
        bytes: usize,
        attempts: u32,
        duration: Duration,
    ) -> Self {
        Self {
            timestamp: SystemTime::now(),
            stream_name,
            event_type: WriteEventType::RecordWritten {
                shard_id,
                partition_key,
                bytes,
                attempts,
                duration,
            },
        }
    }

    pub fn record_failed(
        stream_name: String,
        partition_key: String,
        attempts: u32,
        error: String,
    ) -> Self {
        Self {
            timestamp: SystemTime::now(),
            stream_name,
            event_type: WriteEventType::RecordFailed {
                partition_key,
                attempts,
                error,
            },
        }
    }

    pub fn stream_event(
        stream_name: String,
        event_type: StreamEventType,
        details: Option<String>,
    ) -> Self {
        Self {
            timestamp: SystemTime::now(),
            stream_name,
            event_type: WriteEventType::Stream {
                event_type,
                details,
            },
        }
    }
}
