//! Go Zoom Kinesis Sink - write pipeline records to an AWS Kinesis stream
//!
//! This crate turns generic records into comma-delimited lines and puts them
//! into a Kinesis stream, creating or resharding the stream as needed and
//! assigning partition keys so records land on one shard or spread
//! round-robin across all of them.

pub mod client;
pub mod commit;
pub mod config;
pub mod distributor;
pub mod error;
pub mod monitoring;
pub mod record;
pub mod retry;
pub mod serializer;
pub mod sink;
pub mod writer;

// Make test utilities available for integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test;

pub use error::{Result, SinkError};
pub use retry::{Backoff, ExponentialBackoff, RetryConfig};

// Re-export main traits
pub use crate::client::{KinesisClientError, KinesisClientTrait};
pub use crate::commit::CommitPolicy;
pub use crate::serializer::RecordSerializer;

// Re-export implementations
pub use crate::commit::NoOpCommitPolicy;
pub use crate::config::{ConfigValue, Credentials, SinkConfig, StreamTarget, ValidationFailure};
pub use crate::distributor::{DistributionMode, ShardDistributor};
pub use crate::record::{Field, Record, Value};
pub use crate::serializer::DelimitedSerializer;
pub use crate::sink::{FailurePolicy, KinesisSink, OutputSpec, PreparedSink, SinkOptions, SinkTask};
pub use crate::writer::{ProvisioningConfig, StreamWriter, WriteReceipt, WriterOptions};
