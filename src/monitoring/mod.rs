//! Monitoring for stream writers
//!
//! Writers optionally publish [`WriteEvent`]s on a channel; the
//! [`MetricsAggregator`] folds them into per-stream metrics and logs them
//! periodically.

mod metrics;
mod types;

pub use metrics::{MetricsAggregator, StreamMetrics};
pub use types::{MonitoringConfig, StreamEventType, WriteEvent, WriteEventType};
