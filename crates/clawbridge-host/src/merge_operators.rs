//! Built-in host merge operators.
//!
//! Both are associative, so they plug in through `AssociativeMergeAdapter`
//! and the engine may fold their operands in any grouping.

use std::sync::Arc;

use crate::merge::{AssociativeMergeAdapter, HostAssociativeMerge};
use crate::scope::CallScope;

/// Adds little-endian `u64` values. Named `uint64add`.
///
/// Operands and base values must be exactly 8 bytes; anything else declines
/// the merge with a reason. An empty base counts as no base. Addition wraps on
/// overflow.
#[derive(Debug, Default, Clone, Copy)]
pub struct UintAddOperator;

impl UintAddOperator {
    pub const NAME: &'static str = "uint64add";

    pub fn adapter() -> AssociativeMergeAdapter {
        AssociativeMergeAdapter::new(Self::NAME, Arc::new(Self))
    }

    pub fn encode(value: u64) -> [u8; 8] {
        value.to_le_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Option<u64> {
        let raw: [u8; 8] = bytes.try_into().ok()?;
        Some(u64::from_le_bytes(raw))
    }
}

impl HostAssociativeMerge for UintAddOperator {
    fn merge(&self, scope: &mut CallScope<'_>, _key: &[u8], existing: Option<&[u8]>, operand: &[u8]) -> Option<Vec<u8>> {
        let Some(add) = Self::decode(operand) else {
            scope.fail(format!("operand is {} bytes, expected 8", operand.len()));
            return None;
        };
        let base = match existing.filter(|b| !b.is_empty()) {
            Some(bytes) => match Self::decode(bytes) {
                Some(v) => v,
                None => {
                    scope.fail(format!("existing value is {} bytes, expected 8", bytes.len()));
                    return None;
                }
            },
            None => 0,
        };
        Some(Self::encode(base.wrapping_add(add)).to_vec())
    }
}

/// Joins values with a delimiter. Named `StringAppendOperator`.
///
/// An empty base counts as no base, so appending to `""` adds no delimiter.
#[derive(Debug, Clone)]
pub struct StringAppendOperator {
    delimiter: Vec<u8>,
}

impl StringAppendOperator {
    pub const NAME: &'static str = "StringAppendOperator";

    pub fn new() -> Self {
        Self::with_delimiter(",")
    }

    pub fn with_delimiter(delimiter: impl Into<Vec<u8>>) -> Self {
        Self { delimiter: delimiter.into() }
    }

    pub fn delimiter(&self) -> &[u8] {
        &self.delimiter
    }

    pub fn adapter(self) -> AssociativeMergeAdapter {
        AssociativeMergeAdapter::new(Self::NAME, Arc::new(self))
    }
}

impl Default for StringAppendOperator {
    fn default() -> Self { Self::new() }
}

impl HostAssociativeMerge for StringAppendOperator {
    fn merge(&self, _scope: &mut CallScope<'_>, _key: &[u8], existing: Option<&[u8]>, operand: &[u8]) -> Option<Vec<u8>> {
        match existing.filter(|b| !b.is_empty()) {
            Some(base) => {
                let mut out = Vec::with_capacity(base.len() + self.delimiter.len() + operand.len());
                out.extend_from_slice(base);
                out.extend_from_slice(&self.delimiter);
                out.extend_from_slice(operand);
                Some(out)
            }
            None => Some(operand.to_vec()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clawbridge_core::{AssociativeMergeOperator, Extension, MergeOutcome};

    #[test]
    fn test_uint_add() {
        let op = UintAddOperator::adapter();
        assert_eq!(op.name(), b"uint64add");

        let one = UintAddOperator::encode(1);
        let five = UintAddOperator::encode(5);
        assert_eq!(op.merge(b"k", None, &five).into_value(), Some(five.to_vec()));
        assert_eq!(op.merge(b"k", Some(five.as_slice()), &one).into_value(), Some(UintAddOperator::encode(6).to_vec()));
    }

    #[test]
    fn test_uint_add_wraps() {
        let op = UintAddOperator::adapter();
        let max = UintAddOperator::encode(u64::MAX);
        let two = UintAddOperator::encode(2);
        let out = op.merge(b"k", Some(max.as_slice()), &two).into_value().unwrap();
        assert_eq!(UintAddOperator::decode(&out), Some(1));
    }

    #[test]
    fn test_uint_add_declines_malformed() {
        let op = UintAddOperator::adapter();
        let outcome = op.merge(b"k", None, b"abc");
        assert_eq!(outcome, MergeOutcome::Declined { reason: Some("operand is 3 bytes, expected 8".into()) });

        let one = UintAddOperator::encode(1);
        let outcome = op.merge(b"k", Some(b"junk".as_slice()), &one);
        assert_eq!(outcome.reason(), Some("existing value is 4 bytes, expected 8"));
    }

    #[test]
    fn test_string_append() {
        let op = StringAppendOperator::new().adapter();
        assert_eq!(op.name(), b"StringAppendOperator");
        assert_eq!(op.merge(b"k", None, b"a").into_value(), Some(b"a".to_vec()));
        assert_eq!(op.merge(b"k", Some(b"a".as_slice()), b"b").into_value(), Some(b"a,b".to_vec()));
    }

    #[test]
    fn test_empty_base_counts_as_absent() {
        let op = StringAppendOperator::new().adapter();
        assert_eq!(op.merge(b"k", Some(b"".as_slice()), b"x").into_value(), Some(b"x".to_vec()));

        let op = UintAddOperator::adapter();
        let three = UintAddOperator::encode(3);
        assert_eq!(op.merge(b"k", Some(b"".as_slice()), &three).into_value(), Some(three.to_vec()));
    }

    #[test]
    fn test_string_append_custom_delimiter() {
        let op = StringAppendOperator::with_delimiter("::");
        assert_eq!(op.delimiter(), b"::");
        let op = op.adapter();
        assert_eq!(op.merge(b"k", Some(b"x".as_slice()), b"y").into_value(), Some(b"x::y".to_vec()));
    }
}
