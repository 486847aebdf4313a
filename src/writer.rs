//! Stream writer: provisions the target stream and puts records into it
//!
//! A writer is owned by a single task and used sequentially: each record is
//! written with one `put_record` call, retried with bounded exponential
//! backoff while the service reports transient failures. Provisioning is
//! idempotent, so every task may run it against the same stream.

use crate::client::{KinesisClientError, KinesisClientTrait, StreamState, StreamSummary};
use crate::config::StreamTarget;
use crate::distributor::ShardDistributor;
use crate::error::{Result, SinkError};
use crate::monitoring::{StreamEventType, WriteEvent};
use crate::retry::{shutdown_requested, ExponentialBackoff, RetryConfig, RetryError, RetryHandle};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, instrument, trace, warn};

/// Settings for creating and resharding the target stream
#[derive(Debug, Clone)]
pub struct ProvisioningConfig {
    /// Delay between status checks while the stream is not active
    pub poll_interval: Duration,
    /// Maximum time to wait for the stream to become active
    pub activation_timeout: Duration,
    /// Whether to change the shard count of an existing stream
    pub reshard: bool,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            activation_timeout: Duration::from_secs(300),
            reshard: true,
        }
    }
}

/// Options for opening a [`StreamWriter`]
#[derive(Debug, Clone, Default)]
pub struct WriterOptions {
    pub retry: RetryConfig,
    pub provisioning: ProvisioningConfig,
    /// Channel for monitoring events, if monitoring is enabled
    pub monitoring_tx: Option<mpsc::Sender<WriteEvent>>,
}

/// Where a record ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    pub partition_key: String,
    pub shard_id: String,
}

/// Writes serialized records to one Kinesis stream
pub struct StreamWriter<C>
where
    C: KinesisClientTrait + 'static,
{
    client: Arc<C>,
    target: StreamTarget,
    distributor: ShardDistributor,
    retry: RetryHandle<ExponentialBackoff>,
    shutdown: watch::Receiver<bool>,
    monitoring_tx: Option<mpsc::Sender<WriteEvent>>,
}

impl<C> StreamWriter<C>
where
    C: KinesisClientTrait + 'static,
{
    /// Open a writer, making sure the stream exists with the configured shard count
    ///
    /// # Errors
    ///
    /// * [`SinkError::InvalidShardCount`] if the target asks for fewer than one shard
    /// * [`SinkError::StreamProvisioning`] if the stream cannot be created,
    ///   resharded or brought to the active state
    /// * [`SinkError::Shutdown`] if shutdown is signalled while waiting
    pub async fn initialize(
        client: Arc<C>,
        target: StreamTarget,
        options: WriterOptions,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<Self> {
        if target.shard_count < 1 {
            return Err(SinkError::InvalidShardCount(target.shard_count));
        }

        provision_stream(
            client.as_ref(),
            &target,
            &options.provisioning,
            &options.retry,
            options.monitoring_tx.as_ref(),
            &mut shutdown,
        )
        .await?;

        let backoff = options.retry.backoff();
        let distributor = ShardDistributor::new(target.mode, target.shard_count as u32);

        info!(
            stream = %target.name,
            shard_count = target.shard_count,
            mode = %target.mode,
            "Stream writer ready"
        );

        Ok(Self {
            client,
            target,
            distributor,
            retry: RetryHandle::new(options.retry, backoff),
            shutdown,
            monitoring_tx: options.monitoring_tx,
        })
    }

    pub fn target(&self) -> &StreamTarget {
        &self.target
    }

    pub fn distributor(&self) -> &ShardDistributor {
        &self.distributor
    }

    /// Whether the job has asked this writer to stop
    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Write one line with the next partition key from this writer's sequence
    pub async fn write_next(&mut self, line: &str) -> Result<WriteReceipt> {
        let partition_key = self.distributor.next_key();
        let shard_id = self.write(line, &partition_key).await?;
        Ok(WriteReceipt {
            partition_key,
            shard_id,
        })
    }

    /// Put one line into the stream, returning the shard that stored it
    ///
    /// Transient failures are retried up to the configured bound; anything
    /// else is returned as [`SinkError::Write`] for the caller to handle.
    #[instrument(skip(self, line), fields(stream = %self.target.name))]
    pub async fn write(&mut self, line: &str, partition_key: &str) -> Result<String> {
        let data = Bytes::copy_from_slice(line.as_bytes());
        let stream = self.target.name.as_str();
        let client = &self.client;
        let start = Instant::now();

        self.retry.reset();
        let result = self
            .retry
            .retry_if(
                || {
                    let data = data.clone();
                    async move { client.put_record(stream, partition_key, data).await }
                },
                KinesisClientError::is_transient,
                &mut self.shutdown,
            )
            .await;
        let attempts = self.retry.attempts();

        match result {
            Ok(shard_id) => {
                trace!(
                    shard_id = %shard_id,
                    attempts = attempts,
                    "Record written"
                );
                self.send_monitoring_event(WriteEvent::record_written(
                    self.target.name.clone(),
                    shard_id.clone(),
                    partition_key.to_string(),
                    line.len(),
                    attempts,
                    start.elapsed(),
                ))
                .await;
                Ok(shard_id)
            }
            Err(e) => {
                warn!(
                    attempts = attempts,
                    error = %e,
                    "Failed to write record"
                );
                self.send_monitoring_event(WriteEvent::record_failed(
                    self.target.name.clone(),
                    partition_key.to_string(),
                    attempts,
                    e.to_string(),
                ))
                .await;

                Err(write_error(&self.target.name, partition_key, e))
            }
        }
    }

    async fn send_monitoring_event(&self, event: WriteEvent) {
        if let Some(tx) = &self.monitoring_tx {
            if let Err(e) = tx.send(event).await {
                warn!(error = %e, "Failed to send monitoring event");
            }
        }
    }
}

/// Make sure `target` exists, is active and has the configured shard count
///
/// Safe to call concurrently from several tasks: a create or reshard that
/// races with another caller's is tolerated and the callers converge on the
/// same active stream.
#[instrument(skip_all, fields(stream = %target.name, shard_count = target.shard_count))]
pub async fn provision_stream<C>(
    client: &C,
    target: &StreamTarget,
    config: &ProvisioningConfig,
    retry: &RetryConfig,
    monitoring_tx: Option<&mpsc::Sender<WriteEvent>>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<StreamSummary>
where
    C: KinesisClientTrait + ?Sized,
{
    let result = provision(client, target, config, retry, monitoring_tx, shutdown).await;

    if let Err(e) = &result {
        notify(
            monitoring_tx,
            WriteEvent::stream_event(
                target.name.clone(),
                StreamEventType::Failed,
                Some(e.to_string()),
            ),
        )
        .await;
    }
    result
}

async fn provision<C>(
    client: &C,
    target: &StreamTarget,
    config: &ProvisioningConfig,
    retry: &RetryConfig,
    monitoring_tx: Option<&mpsc::Sender<WriteEvent>>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<StreamSummary>
where
    C: KinesisClientTrait + ?Sized,
{
    let name = target.name.as_str();
    let mut handle = RetryHandle::new(retry.clone(), retry.backoff());

    let existing = handle
        .retry_if(
            || client.describe_stream(name),
            KinesisClientError::is_transient,
            shutdown,
        )
        .await
        .map_err(|e| provisioning_error(name, e))?;

    let mut summary = match existing {
        None => {
            info!("Stream does not exist, creating it");
            let shard_count = target.shard_count;
            handle.reset();
            let created = handle
                .retry_if(
                    || async move { applied(client.create_stream(name, shard_count).await) },
                    KinesisClientError::is_transient,
                    shutdown,
                )
                .await
                .map_err(|e| provisioning_error(name, e))?;
            if created {
                notify(
                    monitoring_tx,
                    WriteEvent::stream_event(
                        name.to_string(),
                        StreamEventType::Created,
                        Some(format!("{} shards", target.shard_count)),
                    ),
                )
                .await;
            } else {
                debug!("Stream is being created by another writer");
            }
            wait_for_active(client, name, config, shutdown).await?
        }
        Some(summary) if summary.state == StreamState::Deleting => {
            return Err(SinkError::provisioning(name, "stream is being deleted"));
        }
        Some(summary) if summary.state != StreamState::Active => {
            debug!(state = ?summary.state, "Stream exists but is not active yet");
            wait_for_active(client, name, config, shutdown).await?
        }
        Some(summary) => summary,
    };

    if summary.open_shard_count != target.shard_count {
        if !config.reshard {
            warn!(
                open_shards = summary.open_shard_count,
                "Stream shard count differs from configuration, resharding disabled"
            );
        } else {
            info!(
                from = summary.open_shard_count,
                to = target.shard_count,
                "Resharding stream"
            );
            let shard_count = target.shard_count;
            handle.reset();
            let resharded = handle
                .retry_if(
                    || async move { applied(client.update_shard_count(name, shard_count).await) },
                    KinesisClientError::is_transient,
                    shutdown,
                )
                .await
                .map_err(|e| provisioning_error(name, e))?;
            if resharded {
                notify(
                    monitoring_tx,
                    WriteEvent::stream_event(
                        name.to_string(),
                        StreamEventType::Resharded,
                        Some(format!(
                            "{} -> {} shards",
                            summary.open_shard_count, target.shard_count
                        )),
                    ),
                )
                .await;
            } else {
                debug!("Stream is being updated by another writer");
            }
            summary = wait_for_active(client, name, config, shutdown).await?;
        }
    }

    notify(
        monitoring_tx,
        WriteEvent::stream_event(name.to_string(), StreamEventType::Active, None),
    )
    .await;
    debug!(open_shards = summary.open_shard_count, "Stream is active");

    Ok(summary)
}

/// Poll the stream until it reports the active state
async fn wait_for_active<C>(
    client: &C,
    name: &str,
    config: &ProvisioningConfig,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<StreamSummary>
where
    C: KinesisClientTrait + ?Sized,
{
    let deadline = Instant::now() + config.activation_timeout;

    loop {
        match client.describe_stream(name).await {
            Ok(Some(summary)) if summary.state == StreamState::Active => return Ok(summary),
            Ok(Some(summary)) if summary.state == StreamState::Deleting => {
                return Err(SinkError::provisioning(name, "stream is being deleted"));
            }
            Ok(Some(summary)) => {
                trace!(state = ?summary.state, "Waiting for stream to become active");
            }
            Ok(None) => {
                trace!("Stream not visible yet");
            }
            Err(e) if e.is_transient() => {
                warn!(error = %e, "Transient failure describing stream, will retry");
            }
            Err(e) => return Err(SinkError::provisioning(name, e.to_string())),
        }

        if Instant::now() + config.poll_interval > deadline {
            return Err(SinkError::provisioning(
                name,
                format!(
                    "stream did not become active within {:?}",
                    config.activation_timeout
                ),
            ));
        }

        tokio::select! {
            _ = tokio::time::sleep(config.poll_interval) => {}
            _ = shutdown_requested(shutdown) => return Err(SinkError::Shutdown),
        }
    }
}

/// `Ok(false)` when another writer's create or reshard is already in progress
fn applied(
    result: std::result::Result<(), KinesisClientError>,
) -> std::result::Result<bool, KinesisClientError> {
    match result {
        Ok(()) => Ok(true),
        Err(KinesisClientError::ResourceInUse(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

fn write_error(stream: &str, partition_key: &str, err: RetryError) -> SinkError {
    match err {
        RetryError::Interrupted => SinkError::Shutdown,
        other => SinkError::Write {
            stream: stream.to_string(),
            partition_key: partition_key.to_string(),
            reason: other.reason(),
        },
    }
}

fn provisioning_error(name: &str, err: RetryError) -> SinkError {
    match err {
        RetryError::Interrupted => SinkError::Shutdown,
        other => SinkError::provisioning(name, other.reason()),
    }
}

async fn notify(monitoring_tx: Option<&mpsc::Sender<WriteEvent>>, event: WriteEvent) {
    if let Some(tx) = monitoring_tx {
        if let Err(e) = tx.send(event).await {
            warn!(error = %e, "Failed to send monitoring event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributor::DistributionMode;
    use crate::test::mocks::MockKinesisClient;
    use pretty_assertions::assert_eq;

    fn fast_options() -> WriterOptions {
        WriterOptions {
            retry: RetryConfig {
                max_retries: Some(3),
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
                jitter_factor: 0.0,
            },
            provisioning: ProvisioningConfig {
                poll_interval: Duration::from_millis(1),
                activation_timeout: Duration::from_millis(500),
                reshard: true,
            },
            monitoring_tx: None,
        }
    }

    #[tokio::test]
    async fn test_rejects_non_positive_shard_count() {
        let client = Arc::new(MockKinesisClient::new());
        let (_tx, rx) = watch::channel(false);

        for count in [0, -2] {
            let target = StreamTarget::new("orders").with_shard_count(count);
            let result = StreamWriter::initialize(client.clone(), target, fast_options(), rx.clone()).await;
            assert!(matches!(result, Err(SinkError::InvalidShardCount(c)) if c == count));
        }
        assert_eq!(client.describe_count(), 0);
    }

    #[tokio::test]
    async fn test_write_next_spreads_keys() -> anyhow::Result<()> {
        let client = Arc::new(MockKinesisClient::new().with_stream(3));
        let (_tx, rx) = watch::channel(false);
        let target = StreamTarget::new("orders")
            .with_shard_count(3)
            .with_mode(DistributionMode::Spread);

        let mut writer = StreamWriter::initialize(client.clone(), target, fast_options(), rx).await?;

        let mut keys = Vec::new();
        for i in 0..4 {
            keys.push(writer.write_next(&format!("line-{}", i)).await?.partition_key);
        }
        assert_eq!(keys, vec!["0", "1", "2", "0"]);
        assert_eq!(writer.distributor().assigned(), 4);
        assert_eq!(client.put_records().len(), 4);
        Ok(())
    }

    #[test]
    fn test_retry_outcomes_map_to_sink_errors() {
        let err = write_error("orders", "1", RetryError::MaxRetriesExceeded(5, "throttled".into()));
        assert!(err.is_write_failure());
        assert!(matches!(err, SinkError::Write { ref partition_key, .. } if partition_key == "1"));

        let err = write_error("orders", "0", RetryError::NonRetryable("Access denied".into()));
        assert!(err.is_write_failure());
        assert!(matches!(write_error("orders", "0", RetryError::Interrupted), SinkError::Shutdown));

        let err = provisioning_error("orders", RetryError::MaxRetriesExceeded(5, "busy".into()));
        assert!(matches!(err, SinkError::StreamProvisioning { .. }));
        assert!(matches!(provisioning_error("orders", RetryError::Interrupted), SinkError::Shutdown));
    }

    #[test]
    fn test_concurrent_create_or_reshard_counts_as_not_applied() {
        assert_eq!(applied(Ok(())).ok(), Some(true));
        assert_eq!(applied(Err(KinesisClientError::ResourceInUse("busy".into()))).ok(), Some(false));
        assert!(applied(Err(KinesisClientError::AccessDenied)).is_err());
    }

    #[tokio::test]
    async fn test_non_transient_write_error_is_not_retried() -> anyhow::Result<()> {
        let client = Arc::new(MockKinesisClient::new().with_stream(1));
        client.mock_put_error(KinesisClientError::AccessDenied);
        let (_tx, rx) = watch::channel(false);

        let mut writer =
            StreamWriter::initialize(client.clone(), StreamTarget::new("orders"), fast_options(), rx).await?;

        let err = writer.write("a,b", "0").await.unwrap_err();
        assert!(err.is_write_failure());
        assert_eq!(client.put_attempts(), 1);
        Ok(())
    }
}
