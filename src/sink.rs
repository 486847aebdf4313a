//! Batch job integration for the Kinesis sink
//!
//! The job framework drives the sink through these steps:
//!
//! - [`KinesisSink::configure`] when the pipeline is deployed, reporting every
//!   configuration problem at once
//! - [`KinesisSink::prepare`] when a run starts, resolving deferred values and
//!   producing the [`OutputSpec`] the framework records
//! - [`PreparedSink::open_task`] once per parallel task, provisioning the
//!   stream and returning a [`SinkTask`]
//! - [`SinkTask::process`] (or [`SinkTask::run`]) for each record of the task
//!
//! Commit hooks come from [`PreparedSink::commit_policy`] and do nothing.

use crate::client::{self, KinesisClientTrait};
use crate::commit::{CommitPolicy, NoOpCommitPolicy};
use crate::config::{properties, ResolvedConfig, SinkConfig};
use crate::error::{Result, SinkError};
use crate::monitoring::{MonitoringConfig, WriteEvent};
use crate::record::Record;
use crate::serializer::{DelimitedSerializer, RecordSerializer};
use crate::writer::{ProvisioningConfig, StreamWriter, WriteReceipt, WriterOptions};
use futures::{pin_mut, Stream, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// What a task does when a record cannot be written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop the task and return the error
    #[default]
    FailTask,
    /// Count the record as skipped and continue with the next one
    SkipRecord,
}

/// Runtime options that are not part of the user-facing configuration
#[derive(Debug, Clone, Default)]
pub struct SinkOptions {
    pub provisioning: ProvisioningConfig,
    pub monitoring: MonitoringConfig,
    pub failure_policy: FailurePolicy,
}

/// Output destination descriptor handed to the job framework
///
/// The secret access key is present in `properties` but redacted from both
/// `Debug` and serialized output.
#[derive(Clone, Serialize)]
pub struct OutputSpec {
    pub reference_name: String,
    #[serde(serialize_with = "serialize_redacted")]
    pub properties: HashMap<String, String>,
}

const REDACTED: &str = "** redacted **";

fn redacted(props: &HashMap<String, String>) -> HashMap<&str, &str> {
    props
        .iter()
        .map(|(k, v)| {
            if k == properties::ACCESS_KEY {
                (k.as_str(), REDACTED)
            } else {
                (k.as_str(), v.as_str())
            }
        })
        .collect()
}

fn serialize_redacted<S>(
    props: &HashMap<String, String>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_map(redacted(props))
}

impl OutputSpec {
    fn from_resolved(resolved: &ResolvedConfig) -> Self {
        let mut props = HashMap::new();
        props.insert(
            properties::ACCESS_ID.to_string(),
            resolved.credentials.access_key_id.clone(),
        );
        props.insert(
            properties::ACCESS_KEY.to_string(),
            resolved.credentials.secret_access_key.clone(),
        );
        props.insert(
            properties::SHARD_COUNT.to_string(),
            resolved.target.shard_count.to_string(),
        );
        props.insert(
            properties::DISTRIBUTE.to_string(),
            resolved.target.mode.to_string(),
        );
        props.insert(properties::NAME.to_string(), resolved.target.name.clone());

        Self {
            reference_name: resolved.reference_name.clone(),
            properties: props,
        }
    }
}

impl fmt::Debug for OutputSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputSpec")
            .field("reference_name", &self.reference_name)
            .field("properties", &redacted(&self.properties))
            .finish()
    }
}

/// Sink that writes pipeline records to a Kinesis stream
///
/// # Examples
///
/// ```rust,no_run
/// use go_zoom_kinesis_sink::{KinesisSink, Record, SinkConfig};
/// use std::collections::HashMap;
/// use std::sync::Arc;
///
/// async fn write_all(props: HashMap<String, String>, records: Vec<Record>) -> anyhow::Result<()> {
///     let config = SinkConfig::from_properties(&props)?;
///     let (sink, _monitoring_rx) = KinesisSink::new(config);
///     sink.configure()?;
///
///     let prepared = sink.prepare(&HashMap::new())?;
///     let client = Arc::new(prepared.connect().await);
///     let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
///
///     let mut task = prepared.open_task(client, shutdown_rx).await?;
///     task.run(futures::stream::iter(records)).await?;
///     Ok(())
/// }
/// ```
pub struct KinesisSink<S = DelimitedSerializer>
where
    S: RecordSerializer + 'static,
{
    config: SinkConfig,
    serializer: Arc<S>,
    options: SinkOptions,
    monitoring_tx: Option<mpsc::Sender<WriteEvent>>,
}

impl KinesisSink<DelimitedSerializer> {
    /// Creates a sink with the default comma-delimited serializer
    ///
    /// Returns the sink and, when monitoring is enabled, the receiving end of
    /// the monitoring channel.
    pub fn new(config: SinkConfig) -> (Self, Option<mpsc::Receiver<WriteEvent>>) {
        Self::with_options(config, DelimitedSerializer::default(), SinkOptions::default())
    }
}

impl<S> KinesisSink<S>
where
    S: RecordSerializer + 'static,
{
    pub fn with_options(
        config: SinkConfig,
        serializer: S,
        options: SinkOptions,
    ) -> (Self, Option<mpsc::Receiver<WriteEvent>>) {
        let (monitoring_tx, monitoring_rx) = if options.monitoring.enabled {
            let (tx, rx) = mpsc::channel(options.monitoring.channel_size);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let sink = Self {
            config,
            serializer: Arc::new(serializer),
            options,
            monitoring_tx,
        };
        (sink, monitoring_rx)
    }

    pub fn config(&self) -> &SinkConfig {
        &self.config
    }

    /// Validate the configuration at pipeline deployment time
    pub fn configure(&self) -> Result<()> {
        let failures = self.config.validate();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(SinkError::Configuration(failures))
        }
    }

    /// Validate again, bind deferred values and describe the output
    pub fn prepare(&self, macros: &HashMap<String, String>) -> Result<PreparedSink<S>> {
        self.configure()?;
        let resolved = self.config.resolve(macros)?;
        let output = OutputSpec::from_resolved(&resolved);

        info!(
            reference = %resolved.reference_name,
            stream = %resolved.target.name,
            shard_count = resolved.target.shard_count,
            distribute = %resolved.target.mode,
            "Prepared Kinesis sink"
        );

        Ok(PreparedSink {
            resolved,
            output,
            serializer: self.serializer.clone(),
            options: self.options.clone(),
            monitoring_tx: self.monitoring_tx.clone(),
            commit_policy: NoOpCommitPolicy,
        })
    }
}

/// A sink whose configuration is fully resolved for one job run
pub struct PreparedSink<S>
where
    S: RecordSerializer + 'static,
{
    resolved: ResolvedConfig,
    output: OutputSpec,
    serializer: Arc<S>,
    options: SinkOptions,
    monitoring_tx: Option<mpsc::Sender<WriteEvent>>,
    commit_policy: NoOpCommitPolicy,
}

impl<S> PreparedSink<S>
where
    S: RecordSerializer + 'static,
{
    pub fn output_spec(&self) -> &OutputSpec {
        &self.output
    }

    pub fn resolved(&self) -> &ResolvedConfig {
        &self.resolved
    }

    pub fn commit_policy(&self) -> &dyn CommitPolicy {
        &self.commit_policy
    }

    /// Build an AWS client from the resolved credentials
    pub async fn connect(&self) -> aws_sdk_kinesis::Client {
        client::connect(
            &self.resolved.credentials,
            self.resolved.region.as_deref(),
            self.resolved.endpoint.as_deref(),
        )
        .await
    }

    /// Open the writer for one task, provisioning the stream if needed
    pub async fn open_task<C>(
        &self,
        client: Arc<C>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<SinkTask<C, S>>
    where
        C: KinesisClientTrait + 'static,
    {
        let options = WriterOptions {
            retry: self.resolved.retry.clone(),
            provisioning: self.options.provisioning.clone(),
            monitoring_tx: self.monitoring_tx.clone(),
        };
        let writer =
            StreamWriter::initialize(client, self.resolved.target.clone(), options, shutdown).await?;

        Ok(SinkTask {
            writer,
            serializer: self.serializer.clone(),
            failure_policy: self.options.failure_policy,
            summary: TaskSummary::default(),
        })
    }
}

/// Counts kept by a task while it writes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskSummary {
    pub records_written: u64,
    pub records_skipped: u64,
    /// Error of the most recently skipped record
    pub last_error: Option<String>,
}

/// Writes the records of one task, in the order they arrive
pub struct SinkTask<C, S>
where
    C: KinesisClientTrait + 'static,
    S: RecordSerializer + 'static,
{
    writer: StreamWriter<C>,
    serializer: Arc<S>,
    failure_policy: FailurePolicy,
    summary: TaskSummary,
}

impl<C, S> SinkTask<C, S>
where
    C: KinesisClientTrait + 'static,
    S: RecordSerializer + 'static,
{
    /// Serialize one record, assign its partition key and write it
    pub async fn process(&mut self, record: &Record) -> Result<WriteReceipt> {
        let line = self.serializer.serialize(record);
        let receipt = self.writer.write_next(&line).await?;
        self.summary.records_written += 1;
        Ok(receipt)
    }

    /// Write every record of `records`, applying the task's failure policy
    ///
    /// Shutdown and non-write errors always end the task.
    pub async fn run<St>(&mut self, records: St) -> Result<TaskSummary>
    where
        St: Stream<Item = Record>,
    {
        pin_mut!(records);

        while let Some(record) = records.next().await {
            if self.writer.is_shutdown() {
                info!("Shutdown requested, stopping task");
                return Err(SinkError::Shutdown);
            }

            match self.process(&record).await {
                Ok(receipt) => {
                    debug!(
                        partition_key = %receipt.partition_key,
                        shard_id = %receipt.shard_id,
                        "Record processed"
                    );
                }
                Err(e) if e.is_write_failure() && self.failure_policy == FailurePolicy::SkipRecord => {
                    warn!(error = %e, "Skipping record that could not be written");
                    self.summary.records_skipped += 1;
                    self.summary.last_error = Some(e.to_string());
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            stream = %self.writer.target().name,
            written = self.summary.records_written,
            skipped = self.summary.records_skipped,
            "Task finished"
        );
        Ok(self.summary.clone())
    }

    pub fn summary(&self) -> &TaskSummary {
        &self.summary
    }

    pub fn writer(&self) -> &StreamWriter<C> {
        &self.writer
    }
}
