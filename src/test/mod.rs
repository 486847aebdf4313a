//! Test utilities and mock implementations for testing the Kinesis sink


use crate::config::{ConfigValue, SinkConfig};
use crate::record::{Record, Value};
use crate::retry::RetryConfig;
use crate::writer::{ProvisioningConfig, WriterOptions};
use std::time::Duration;

/// Helper functions for creating test data
pub struct TestUtils;

impl TestUtils {
    /// A record shaped like `rowkey, body, count`
    pub fn create_test_record(index: usize) -> Record {
        Record::builder()
            .field("rowkey", format!("row-{}", index))
            .field("body", format!("body-{}", index))
            .field("count", index as i64)
            .build()
    }

    /// Create a vector of test records
    pub fn create_test_records(count: usize) -> Vec<Record> {
        (0..count).map(Self::create_test_record).collect()
    }

    /// A record whose middle field is null
    pub fn create_sparse_record(index: usize) -> Record {
        Record::builder()
            .field("rowkey", format!("row-{}", index))
            .field("body", Value::Null)
            .field("count", index as i64)
            .build()
    }

    /// A valid literal configuration for `stream_name`
    pub fn create_test_config(stream_name: &str) -> SinkConfig {
        SinkConfig {
            reference_name: "KinesisSinkTest".to_string(),
            name: stream_name.to_string(),
            access_id: ConfigValue::Literal("someId".to_string()),
            access_key: ConfigValue::Literal("SomeSecret".to_string()),
            shard_count: None,
            distribute: None,
            body_field: Some("body".to_string()),
            retry: Self::fast_retry(3),
            ..Default::default()
        }
    }

    /// Retry settings with millisecond delays
    pub fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries: Some(max_retries),
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(10),
            jitter_factor: 0.0,
        }
    }

    /// Provisioning settings that poll every millisecond
    pub fn fast_provisioning() -> ProvisioningConfig {
        ProvisioningConfig {
            poll_interval: Duration::from_millis(1),
            activation_timeout: Duration::from_secs(1),
            reshard: true,
        }
    }

    pub fn fast_writer_options(max_retries: u32) -> WriterOptions {
        WriterOptions {
            retry: Self::fast_retry(max_retries),
            provisioning: Self::fast_provisioning(),
            monitoring_tx: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_records() {
        let records = TestUtils::create_test_records(3);
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].get("rowkey"), Some(&Value::from("row-1")));
        assert_eq!(records[2].get("count"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_create_test_config_is_valid() {
        let config = TestUtils::create_test_config("unitTest");
        assert!(config.validate().is_empty());
        assert_eq!(config.shard_count(), 1);
    }
}
