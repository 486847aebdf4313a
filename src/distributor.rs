//! Partition key assignment across the shards of a stream

use serde::{Deserialize, Serialize};
use std::fmt;

/// Partition key used by every record in single-shard mode
pub const SINGLE_SHARD_KEY: &str = "0";

/// How records are spread across the shards of the target stream
///
/// Parsed from a boolean-like string: only a case-insensitive `"true"` means
/// [`DistributionMode::Spread`]; every other input, including an absent
/// value, means [`DistributionMode::Single`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DistributionMode {
    /// Cycle through `shard_count` partition keys
    Spread,
    /// Send every record with the same partition key
    #[default]
    Single,
}

impl DistributionMode {
    pub fn parse(input: Option<&str>) -> Self {
        match input {
            Some(value) if value.eq_ignore_ascii_case("true") => DistributionMode::Spread,
            _ => DistributionMode::Single,
        }
    }

    /// Normalized property value, `"true"` or `"false"`
    pub fn as_str(&self) -> &'static str {
        match self {
            DistributionMode::Spread => "true",
            DistributionMode::Single => "false",
        }
    }
}

impl fmt::Display for DistributionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for DistributionMode {
    fn from(value: String) -> Self {
        DistributionMode::parse(Some(&value))
    }
}

impl From<DistributionMode> for String {
    fn from(mode: DistributionMode) -> Self {
        mode.as_str().to_string()
    }
}

/// Assigns partition keys to records in the order they are written
///
/// Each writer owns its distributor; the sequence counter starts at zero and
/// is never shared.
#[derive(Debug, Clone)]
pub struct ShardDistributor {
    mode: DistributionMode,
    shard_count: u32,
    next_index: u64,
}

impl ShardDistributor {
    /// `shard_count` must already be validated as at least 1
    pub(crate) fn new(mode: DistributionMode, shard_count: u32) -> Self {
        Self {
            mode,
            shard_count: shard_count.max(1),
            next_index: 0,
        }
    }

    /// Partition key for the record at `record_index`
    pub fn assign(record_index: u64, mode: DistributionMode, shard_count: u32) -> String {
        match mode {
            DistributionMode::Single => SINGLE_SHARD_KEY.to_string(),
            DistributionMode::Spread => (record_index % u64::from(shard_count.max(1))).to_string(),
        }
    }

    /// Key for the next record, advancing the sequence counter
    pub fn next_key(&mut self) -> String {
        let key = Self::assign(self.next_index, self.mode, self.shard_count);
        self.next_index += 1;
        key
    }

    pub fn mode(&self) -> DistributionMode {
        self.mode
    }

    pub fn shard_count(&self) -> u32 {
        self.shard_count
    }

    /// Number of keys handed out so far
    pub fn assigned(&self) -> u64 {
        self.next_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_normalizes_to_two_values() {
        for input in ["true", "TRUE", "True"] {
            assert_eq!(DistributionMode::parse(Some(input)), DistributionMode::Spread);
        }
        for input in ["false", "", "yes", "1", "tru", "truee", " true ", "true\n"] {
            assert_eq!(DistributionMode::parse(Some(input)), DistributionMode::Single);
        }
        assert_eq!(DistributionMode::parse(None), DistributionMode::Single);

        for input in ["true", "nonsense", "FALSE"] {
            let normalized = DistributionMode::parse(Some(input)).as_str();
            assert!(normalized == "true" || normalized == "false");
        }
    }

    #[test]
    fn test_spread_cycles_through_shards() {
        let keys: Vec<String> = (0..6)
            .map(|i| ShardDistributor::assign(i, DistributionMode::Spread, 3))
            .collect();
        assert_eq!(keys, vec!["0", "1", "2", "0", "1", "2"]);
    }

    #[test]
    fn test_single_mode_uses_constant_key() {
        for i in [0, 1, 2, 17, u64::MAX] {
            assert_eq!(
                ShardDistributor::assign(i, DistributionMode::Single, 4),
                SINGLE_SHARD_KEY
            );
        }
    }

    #[test]
    fn test_next_key_advances_owned_counter() {
        let mut first = ShardDistributor::new(DistributionMode::Spread, 2);
        let mut second = ShardDistributor::new(DistributionMode::Spread, 2);

        assert_eq!(first.next_key(), "0");
        assert_eq!(first.next_key(), "1");
        assert_eq!(first.next_key(), "0");
        assert_eq!(first.assigned(), 3);

        // Counters are per instance
        assert_eq!(second.next_key(), "0");
    }

    #[test]
    fn test_serde_uses_normalized_strings() -> anyhow::Result<()> {
        assert_eq!(serde_json::to_string(&DistributionMode::Spread)?, "\"true\"");
        let mode: DistributionMode = serde_json::from_str("\"Yes\"")?;
        assert_eq!(mode, DistributionMode::Single);
        Ok(())
    }
}
