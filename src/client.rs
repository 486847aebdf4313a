use crate::config::Credentials;
use async_trait::async_trait;
use aws_sdk_kinesis::config::Region;
use aws_sdk_kinesis::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_kinesis::types::{ScalingType, StreamDescriptionSummary, StreamStatus};
use aws_sdk_kinesis::Client;
use aws_smithy_types::error::display::DisplayErrorContext;
use aws_smithy_types::Blob;
use bytes::Bytes;
use thiserror::Error;
use tracing::debug;

/// Failures reported by the Kinesis service, classified for retry decisions
#[derive(Debug, Clone, Error)]
pub enum KinesisClientError {
    #[error("Provisioned throughput exceeded")]
    ThroughputExceeded,

    #[error("Access denied")]
    AccessDenied,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Resource in use: {0}")]
    ResourceInUse(String),

    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("KMS error: {0}")]
    KmsError(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("{0}")]
    Other(String),
}

impl KinesisClientError {
    /// Whether the same request may succeed if sent again later
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            KinesisClientError::ThroughputExceeded
                | KinesisClientError::ServiceUnavailable(_)
                | KinesisClientError::Timeout(_)
                | KinesisClientError::ConnectionError(_)
        )
    }

    /// Classify an error by the service's error code
    pub fn from_code(code: Option<&str>, message: String) -> Self {
        match code {
            Some("ProvisionedThroughputExceededException") | Some("ThrottlingException") => {
                KinesisClientError::ThroughputExceeded
            }
            Some("AccessDeniedException") => KinesisClientError::AccessDenied,
            Some("InvalidArgumentException") | Some("ValidationException") => {
                KinesisClientError::InvalidArgument(message)
            }
            Some("ResourceNotFoundException") => KinesisClientError::ResourceNotFound(message),
            Some("ResourceInUseException") => KinesisClientError::ResourceInUse(message),
            Some("LimitExceededException") => KinesisClientError::LimitExceeded(message),
            Some(code) if code.starts_with("KMS") => KinesisClientError::KmsError(message),
            Some("InternalFailureException")
            | Some("InternalFailure")
            | Some("ServiceUnavailable")
            | Some("ServiceUnavailableException") => KinesisClientError::ServiceUnavailable(message),
            _ => KinesisClientError::Other(message),
        }
    }
}

impl<E, R> From<SdkError<E, R>> for KinesisClientError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    fn from(err: SdkError<E, R>) -> Self {
        let message = DisplayErrorContext(&err).to_string();
        match &err {
            SdkError::TimeoutError(_) => KinesisClientError::Timeout(message),
            SdkError::DispatchFailure(_) => KinesisClientError::ConnectionError(message),
            _ => KinesisClientError::from_code(err.code(), message),
        }
    }
}

/// Lifecycle state of a stream as reported by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Creating,
    Active,
    Updating,
    Deleting,
}

/// The parts of a stream description the writer acts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSummary {
    pub state: StreamState,
    pub open_shard_count: i32,
}

/// Client capabilities the sink needs from Kinesis
#[async_trait]
pub trait KinesisClientTrait: Send + Sync {
    /// Describe a stream, `Ok(None)` when it does not exist
    async fn describe_stream(
        &self,
        stream_name: &str,
    ) -> Result<Option<StreamSummary>, KinesisClientError>;

    async fn create_stream(
        &self,
        stream_name: &str,
        shard_count: i32,
    ) -> Result<(), KinesisClientError>;

    async fn update_shard_count(
        &self,
        stream_name: &str,
        target_shard_count: i32,
    ) -> Result<(), KinesisClientError>;

    /// Put a single record, returning the id of the shard that stored it
    async fn put_record(
        &self,
        stream_name: &str,
        partition_key: &str,
        data: Bytes,
    ) -> Result<String, KinesisClientError>;
}

/// Build a Kinesis client from literal credentials
///
/// Region falls back to the environment's default provider chain when unset.
pub async fn connect(
    credentials: &Credentials,
    region: Option<&str>,
    endpoint: Option<&str>,
) -> Client {
    let provider = aws_credential_types::Credentials::new(
        credentials.access_key_id.clone(),
        credentials.secret_access_key.clone(),
        None,
        None,
        "kinesis-sink",
    );

    let mut loader =
        aws_config::defaults(aws_config::BehaviorVersion::latest()).credentials_provider(provider);
    if let Some(region) = region {
        loader = loader.region(Region::new(region.to_string()));
    }
    if let Some(endpoint) = endpoint {
        loader = loader.endpoint_url(endpoint);
    }

    let sdk_config = loader.load().await;
    debug!(region = ?sdk_config.region(), "Created Kinesis client");
    Client::new(&sdk_config)
}

fn stream_state(status: &StreamStatus) -> Option<StreamState> {
    match status {
        StreamStatus::Creating => Some(StreamState::Creating),
        StreamStatus::Active => Some(StreamState::Active),
        StreamStatus::Updating => Some(StreamState::Updating),
        StreamStatus::Deleting => Some(StreamState::Deleting),
        _ => None,
    }
}

#[async_trait]
impl KinesisClientTrait for Client {
    async fn describe_stream(
        &self,
        stream_name: &str,
    ) -> Result<Option<StreamSummary>, KinesisClientError> {
        let response = match self
            .describe_stream_summary()
            .stream_name(stream_name)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return match KinesisClientError::from(e) {
                    KinesisClientError::ResourceNotFound(_) => Ok(None),
                    other => Err(other),
                };
            }
        };

        let summary: Option<&StreamDescriptionSummary> =
            response.stream_description_summary().into();
        let summary = summary.ok_or_else(|| {
            KinesisClientError::Other(format!("Empty description for stream {}", stream_name))
        })?;

        let status: Option<&StreamStatus> = summary.stream_status().into();
        let state = status.and_then(stream_state).ok_or_else(|| {
            KinesisClientError::Other(format!("Unknown status for stream {}", stream_name))
        })?;
        let open_shard_count: Option<i32> = summary.open_shard_count().into();

        Ok(Some(StreamSummary {
            state,
            open_shard_count: open_shard_count.unwrap_or_default(),
        }))
    }

    async fn create_stream(
        &self,
        stream_name: &str,
        shard_count: i32,
    ) -> Result<(), KinesisClientError> {
        self.create_stream()
            .stream_name(stream_name)
            .shard_count(shard_count)
            .send()
            .await?;
        Ok(())
    }

    async fn update_shard_count(
        &self,
        stream_name: &str,
        target_shard_count: i32,
    ) -> Result<(), KinesisClientError> {
        self.update_shard_count()
            .stream_name(stream_name)
            .target_shard_count(target_shard_count)
            .scaling_type(ScalingType::UniformScaling)
            .send()
            .await?;
        Ok(())
    }

    async fn put_record(
        &self,
        stream_name: &str,
        partition_key: &str,
        data: Bytes,
    ) -> Result<String, KinesisClientError> {
        let response = self
            .put_record()
            .stream_name(stream_name)
            .partition_key(partition_key)
            .data(Blob::new(data.to_vec()))
            .send()
            .await?;
        Ok(response.shard_id().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let throttled =
            KinesisClientError::from_code(Some("ProvisionedThroughputExceededException"), "slow down".into());
        assert!(matches!(throttled, KinesisClientError::ThroughputExceeded));

        let missing = KinesisClientError::from_code(Some("ResourceNotFoundException"), "gone".into());
        assert!(matches!(missing, KinesisClientError::ResourceNotFound(ref m) if m == "gone"));

        let kms = KinesisClientError::from_code(Some("KMSThrottlingException"), "kms".into());
        assert!(matches!(kms, KinesisClientError::KmsError(_)));

        let unknown = KinesisClientError::from_code(None, "mystery".into());
        assert!(matches!(unknown, KinesisClientError::Other(_)));
    }

    #[test]
    fn test_transient_errors() {
        assert!(KinesisClientError::ThroughputExceeded.is_transient());
        assert!(KinesisClientError::ServiceUnavailable("503".into()).is_transient());
        assert!(KinesisClientError::Timeout("slow".into()).is_transient());
        assert!(KinesisClientError::ConnectionError("reset".into()).is_transient());

        assert!(!KinesisClientError::AccessDenied.is_transient());
        assert!(!KinesisClientError::ResourceNotFound("s".into()).is_transient());
        assert!(!KinesisClientError::InvalidArgument("key".into()).is_transient());
        assert!(!KinesisClientError::KmsError("kms".into()).is_transient());
    }
}
