//! Sink configuration, validation and macro resolution
//!
//! Configuration arrives from the pipeline host as a flat property map.
//! Credentials and the shard count may be deferred with `${macro}` syntax;
//! deferred values skip the emptiness checks in [`SinkConfig::validate`] and
//! are bound to literals by [`SinkConfig::resolve`] when the job starts.

use crate::distributor::DistributionMode;
use crate::error::{Result, SinkError};
use crate::retry::RetryConfig;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Property names recognized by the sink
pub mod properties {
    pub const REFERENCE_NAME: &str = "referenceName";
    pub const NAME: &str = "name";
    pub const BODY_FIELD: &str = "bodyField";
    pub const ACCESS_ID: &str = "accessID";
    pub const ACCESS_KEY: &str = "accessKey";
    pub const DISTRIBUTE: &str = "distribute";
    pub const SHARD_COUNT: &str = "shardCount";
    pub const REGION: &str = "region";
    pub const ENDPOINT: &str = "endpoint";
    pub const MAX_RETRIES: &str = "maxRetries";
    pub const INITIAL_BACKOFF_MS: &str = "initialBackoffMs";
    pub const MAX_BACKOFF_MS: &str = "maxBackoffMs";
}

pub const DEFAULT_SHARD_COUNT: i32 = 1;

const MACRO_START: &str = "${";
const MACRO_END: char = '}';

/// A configuration value given literally or deferred until job start
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue<T> {
    Literal(T),
    /// Unresolved expression containing one or more `${name}` macros
    Deferred(String),
}

impl<T> ConfigValue<T> {
    pub fn is_deferred(&self) -> bool {
        matches!(self, ConfigValue::Deferred(_))
    }

    pub fn literal(&self) -> Option<&T> {
        match self {
            ConfigValue::Literal(value) => Some(value),
            ConfigValue::Deferred(_) => None,
        }
    }
}

impl ConfigValue<String> {
    /// Classify a raw property value, treating any `${` as a macro
    pub fn from_raw(raw: &str) -> Self {
        if raw.contains(MACRO_START) {
            ConfigValue::Deferred(raw.to_string())
        } else {
            ConfigValue::Literal(raw.to_string())
        }
    }
}

impl<T: Default> Default for ConfigValue<T> {
    fn default() -> Self {
        ConfigValue::Literal(T::default())
    }
}

/// A single configuration problem, tagged with the offending property
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub message: String,
    pub property: String,
}

impl ValidationFailure {
    pub fn new(message: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            property: property.into(),
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (property: {})", self.message, self.property)
    }
}

/// AWS access key pair used to reach the stream
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .finish()
    }
}

/// The destination stream and how records are spread over it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTarget {
    pub name: String,
    pub shard_count: i32,
    pub mode: DistributionMode,
}

impl StreamTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shard_count: DEFAULT_SHARD_COUNT,
            mode: DistributionMode::default(),
        }
    }

    pub fn with_shard_count(mut self, shard_count: i32) -> Self {
        self.shard_count = shard_count;
        self
    }

    pub fn with_mode(mut self, mode: DistributionMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Configuration for the Kinesis sink
#[derive(Debug, Clone, Default)]
pub struct SinkConfig {
    /// Lineage identifier, opaque to the sink
    pub reference_name: String,
    /// Name of the stream to write to; created if it does not exist
    pub name: String,
    pub access_id: ConfigValue<String>,
    pub access_key: ConfigValue<String>,
    /// Desired shard count, [`DEFAULT_SHARD_COUNT`] when unset
    pub shard_count: Option<ConfigValue<i32>>,
    /// Raw distribution flag as given by the user
    pub distribute: Option<String>,
    /// Accepted for compatibility, not used when serializing
    pub body_field: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub retry: RetryConfig,
}

impl SinkConfig {
    /// Build a configuration from the host's property map
    ///
    /// Every malformed value is reported in a single
    /// [`SinkError::Configuration`].
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self> {
        let mut failures = Vec::new();
        let get = |key: &str| props.get(key).map(String::as_str);

        let shard_count = match get(properties::SHARD_COUNT).map(str::trim) {
            None | Some("") => None,
            Some(raw) if raw.contains(MACRO_START) => Some(ConfigValue::Deferred(raw.to_string())),
            Some(raw) => match raw.parse::<i32>() {
                Ok(count) => Some(ConfigValue::Literal(count)),
                Err(_) => {
                    failures.push(ValidationFailure::new(
                        format!("Shard count '{}' is not an integer.", raw),
                        properties::SHARD_COUNT,
                    ));
                    None
                }
            },
        };

        let mut retry = RetryConfig::default();
        if let Some(raw) = get(properties::MAX_RETRIES) {
            match raw.trim().parse::<u32>() {
                Ok(max) => retry.max_retries = Some(max.max(1)),
                Err(_) => failures.push(ValidationFailure::new(
                    format!("Max retries '{}' is not a non-negative integer.", raw),
                    properties::MAX_RETRIES,
                )),
            }
        }
        if let Some(raw) = get(properties::INITIAL_BACKOFF_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => retry.initial_backoff = Duration::from_millis(ms),
                Err(_) => failures.push(ValidationFailure::new(
                    format!("Initial backoff '{}' is not a number of milliseconds.", raw),
                    properties::INITIAL_BACKOFF_MS,
                )),
            }
        }
        if let Some(raw) = get(properties::MAX_BACKOFF_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => retry.max_backoff = Duration::from_millis(ms),
                Err(_) => failures.push(ValidationFailure::new(
                    format!("Max backoff '{}' is not a number of milliseconds.", raw),
                    properties::MAX_BACKOFF_MS,
                )),
            }
        }

        if !failures.is_empty() {
            return Err(SinkError::Configuration(failures));
        }

        Ok(Self {
            reference_name: get(properties::REFERENCE_NAME).unwrap_or_default().to_string(),
            name: get(properties::NAME).unwrap_or_default().to_string(),
            access_id: ConfigValue::from_raw(get(properties::ACCESS_ID).unwrap_or_default()),
            access_key: ConfigValue::from_raw(get(properties::ACCESS_KEY).unwrap_or_default()),
            shard_count,
            distribute: get(properties::DISTRIBUTE).map(str::to_string),
            body_field: get(properties::BODY_FIELD).map(str::to_string),
            region: get(properties::REGION).map(str::to_string),
            endpoint: get(properties::ENDPOINT).map(str::to_string),
            retry,
        })
    }

    /// Shard count to provision; deferred values count as unset until resolved
    pub fn shard_count(&self) -> i32 {
        self.shard_count
            .as_ref()
            .and_then(ConfigValue::literal)
            .copied()
            .unwrap_or(DEFAULT_SHARD_COUNT)
    }

    pub fn distribute(&self) -> DistributionMode {
        DistributionMode::parse(self.distribute.as_deref())
    }

    /// Check the configuration, collecting every problem found
    ///
    /// An empty list means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationFailure> {
        let mut failures = Vec::new();

        if self.name.is_empty() {
            failures.push(ValidationFailure::new(
                "Stream name should be non-null, non-empty.",
                properties::NAME,
            ));
        }
        if let ConfigValue::Literal(id) = &self.access_id {
            if id.is_empty() {
                failures.push(ValidationFailure::new(
                    "Access Key should be non-null, non-empty.",
                    properties::ACCESS_ID,
                ));
            }
        }
        if let ConfigValue::Literal(secret) = &self.access_key {
            if secret.is_empty() {
                failures.push(ValidationFailure::new(
                    "Access Key secret should be non-null, non-empty.",
                    properties::ACCESS_KEY,
                ));
            }
        }

        failures
    }

    /// Bind deferred values to literals using the job's macro values
    pub fn resolve(&self, macros: &HashMap<String, String>) -> Result<ResolvedConfig> {
        let access_key_id = resolve_string(&self.access_id, macros)?;
        let secret_access_key = resolve_string(&self.access_key, macros)?;

        let shard_count = match &self.shard_count {
            None => DEFAULT_SHARD_COUNT,
            Some(ConfigValue::Literal(count)) => *count,
            Some(ConfigValue::Deferred(expr)) => {
                let raw = expand_macros(expr, macros)?;
                raw.trim().parse::<i32>().map_err(|_| {
                    SinkError::Configuration(vec![ValidationFailure::new(
                        format!("Shard count '{}' is not an integer.", raw),
                        properties::SHARD_COUNT,
                    )])
                })?
            }
        };

        let credentials = Credentials::new(access_key_id, secret_access_key);
        let failures = ResolvedConfig::check_credentials(&credentials);
        if !failures.is_empty() {
            return Err(SinkError::Configuration(failures));
        }

        Ok(ResolvedConfig {
            reference_name: self.reference_name.clone(),
            target: StreamTarget {
                name: self.name.clone(),
                shard_count,
                mode: self.distribute(),
            },
            credentials,
            body_field: self.body_field.clone(),
            region: self.region.clone(),
            endpoint: self.endpoint.clone(),
            retry: self.retry.clone(),
        })
    }
}

/// Configuration with every deferred value bound, ready to open writers
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub reference_name: String,
    pub target: StreamTarget,
    pub credentials: Credentials,
    pub body_field: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub retry: RetryConfig,
}

impl ResolvedConfig {
    fn check_credentials(credentials: &Credentials) -> Vec<ValidationFailure> {
        let mut failures = Vec::new();
        if credentials.access_key_id.is_empty() {
            failures.push(ValidationFailure::new(
                "Access Key resolved to an empty value.",
                properties::ACCESS_ID,
            ));
        }
        if credentials.secret_access_key.is_empty() {
            failures.push(ValidationFailure::new(
                "Access Key secret resolved to an empty value.",
                properties::ACCESS_KEY,
            ));
        }
        failures
    }
}

fn resolve_string(value: &ConfigValue<String>, macros: &HashMap<String, String>) -> Result<String> {
    match value {
        ConfigValue::Literal(literal) => Ok(literal.clone()),
        ConfigValue::Deferred(expr) => expand_macros(expr, macros),
    }
}

/// Replace every `${name}` in `expr` with its bound value
fn expand_macros(expr: &str, macros: &HashMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(expr.len());
    let mut rest = expr;

    while let Some(start) = rest.find(MACRO_START) {
        out.push_str(&rest[..start]);
        let after = &rest[start + MACRO_START.len()..];
        let end = after
            .find(MACRO_END)
            .ok_or_else(|| SinkError::UnresolvedMacro(expr.to_string()))?;
        let name = &after[..end];
        let value = macros
            .get(name)
            .ok_or_else(|| SinkError::UnresolvedMacro(name.to_string()))?;
        out.push_str(value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);

    Ok(out)
}
