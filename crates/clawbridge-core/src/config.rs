//! Configuration management for ClawBridge
//!
//! Provides presets for the usual deployment shapes and a `validate()` pass
//! that the engine and write batches run before trusting a config.

use crate::error::{BridgeError, BridgeResult};

/// What the engine does when a merge operator declines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeFailurePolicy {
    /// Store the newest operand as a fresh base value
    UseOperand,
    /// Report `BridgeError::MergeFailed` to the caller
    Surface,
}

/// ClawBridge configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum key size in bytes
    pub max_key_size: usize,
    /// Maximum value size in bytes
    pub max_value_size: usize,
    /// Maximum records in one write batch
    pub max_batch_records: u32,
    /// Keys summarized by one filter block at flush
    pub filter_block_keys: usize,
    /// Pending operands per key before flush tries partial-merge folding
    pub max_merge_operands: usize,
    /// Engine behavior on a declined merge
    pub merge_failure_policy: MergeFailurePolicy,
}

impl Config {
    /// Server-class: large entries, wide filter blocks
    pub fn server() -> Self {
        Self {
            max_key_size: 8 * 1024,
            max_value_size: 32 * 1024 * 1024,
            max_batch_records: 1_000_000,
            filter_block_keys: 4096,
            max_merge_operands: 2,
            merge_failure_policy: MergeFailurePolicy::UseOperand,
        }
    }

    /// Embedded: small entries and small filter blocks
    pub fn embedded() -> Self {
        Self {
            max_key_size: 1024,
            max_value_size: 4 * 1024 * 1024,
            max_batch_records: 65_536,
            filter_block_keys: 512,
            max_merge_operands: 2,
            merge_failure_policy: MergeFailurePolicy::UseOperand,
        }
    }

    /// Strict: like server, but declined merges are reported instead of papered over
    pub fn strict() -> Self {
        Self {
            merge_failure_policy: MergeFailurePolicy::Surface,
            ..Self::server()
        }
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> BridgeResult<()> {
        if self.max_key_size == 0 || self.max_key_size > 64 * 1024 {
            return Err(invalid("max_key_size must be in [1, 64KB]"));
        }
        if self.max_value_size == 0 || self.max_value_size > 128 * 1024 * 1024 {
            return Err(invalid("max_value_size must be in [1, 128MB]"));
        }
        if self.max_batch_records == 0 {
            return Err(invalid("max_batch_records must be > 0"));
        }
        if self.filter_block_keys == 0 {
            return Err(invalid("filter_block_keys must be > 0"));
        }
        if self.max_merge_operands < 2 {
            return Err(invalid("max_merge_operands must be >= 2"));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self { Self::server() }
}

fn invalid(msg: &str) -> BridgeError {
    BridgeError::InvalidConfig(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_presets_valid() {
        assert!(Config::server().validate().is_ok());
        assert!(Config::embedded().validate().is_ok());
        assert!(Config::strict().validate().is_ok());
    }

    #[test]
    fn test_strict_surfaces_merge_failures() {
        assert_eq!(Config::strict().merge_failure_policy, MergeFailurePolicy::Surface);
        assert_eq!(Config::default().merge_failure_policy, MergeFailurePolicy::UseOperand);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut c = Config::default();
        c.filter_block_keys = 0;
        assert!(matches!(c.validate(), Err(BridgeError::InvalidConfig(_))));

        let mut c = Config::default();
        c.max_merge_operands = 1;
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.max_key_size = 0;
        assert!(c.validate().is_err());
    }
}
