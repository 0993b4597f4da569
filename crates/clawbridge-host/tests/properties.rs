//! Property-based tests for the adapter contracts.
//!
//! These tests use proptest to check that ordering, filtering, merging and
//! batch decoding hold their invariants across randomly generated inputs.

#![allow(clippy::unwrap_used)]

mod common;

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;

use clawbridge_core::{
    decode, AssociativeFold, AssociativeMergeOperator, BatchItem, Comparator, FilterPolicy, MergeOperator, WriteBatch,
};
use clawbridge_host::{FilterAdapter, StringAppendOperator, UintAddOperator};

use common::{numeric_comparator, BloomPolicy};

/// Largest tolerated false positive rate for a 10 bits/key Bloom filter
const MAX_FALSE_POSITIVE_RATE: f64 = 0.05;

/// Generates an arbitrary decoded batch record.
fn arb_item() -> impl Strategy<Value = BatchItem> {
    (
        0u8..3,                                      // op
        prop::sample::select(vec![0u32, 1, 7, 300]), // column family
        prop::collection::vec(any::<u8>(), 0..32),   // key
        prop::collection::vec(any::<u8>(), 0..64),   // value
    )
        .prop_map(|(op, cf, key, value)| match op {
            0 => BatchItem::put(cf, key, value),
            1 => BatchItem::merge(cf, key, value),
            _ => BatchItem::delete(cf, key),
        })
}

fn u64_value(bytes: Option<Vec<u8>>) -> Option<u64> {
    bytes.as_deref().and_then(UintAddOperator::decode)
}

proptest! {
    #[test]
    fn prop_comparator_total_order(a in 0i64..10_000, b in 0i64..10_000, c in 0i64..10_000) {
        let cmp = numeric_comparator();
        let (ka, kb, kc) = (a.to_string(), b.to_string(), c.to_string());
        let (ka, kb, kc) = (ka.as_bytes(), kb.as_bytes(), kc.as_bytes());

        prop_assert_eq!(cmp.compare(ka, ka).unwrap(), Ordering::Equal);
        prop_assert_eq!(cmp.compare(ka, kb).unwrap(), cmp.compare(kb, ka).unwrap().reverse());
        if cmp.compare(ka, kb).unwrap().is_lt() && cmp.compare(kb, kc).unwrap().is_lt() {
            prop_assert!(cmp.compare(ka, kc).unwrap().is_lt());
        }
        // Repeated calls agree
        prop_assert_eq!(cmp.compare(ka, kc).unwrap(), cmp.compare(ka, kc).unwrap());
    }

    #[test]
    fn prop_filter_no_false_negatives(
        keys in prop::collection::hash_set(prop::collection::vec(any::<u8>(), 1..16), 0..300),
        probes in prop::collection::vec(prop::collection::vec(any::<u8>(), 16..24), 400..500),
    ) {
        let filter = FilterAdapter::new("clawbridge.BloomFilter", Arc::new(BloomPolicy::new(10)));
        let refs: Vec<&[u8]> = keys.iter().map(|k| k.as_slice()).collect();
        let blob = filter.create_filter(&refs).unwrap();

        for key in &refs {
            prop_assert!(filter.key_may_match(key, &blob).unwrap());
        }

        // Probes are longer than every stored key, so all of them are absent
        let absent: HashSet<&Vec<u8>> = probes.iter().collect();
        let false_positives = absent.iter().filter(|p| filter.key_may_match(p, &blob).unwrap()).count();
        let rate = false_positives as f64 / absent.len() as f64;
        prop_assert!(rate <= MAX_FALSE_POSITIVE_RATE, "false positive rate {} over {} keys", rate, keys.len());
    }

    #[test]
    fn prop_uint_add_grouping(v in any::<u64>(), x in any::<u64>(), y in any::<u64>()) {
        let op = UintAddOperator::adapter();
        let (v, x, y) = (UintAddOperator::encode(v), UintAddOperator::encode(x), UintAddOperator::encode(y));

        let left = op.merge(b"k", Some(v.as_slice()), &x).into_value().unwrap();
        let left = op.merge(b"k", Some(left.as_slice()), &y).into_value();

        let folded = op.merge(b"k", Some(x.as_slice()), &y).into_value().unwrap();
        let right = op.merge(b"k", Some(v.as_slice()), &folded).into_value();

        prop_assert_eq!(u64_value(left), u64_value(right));
    }

    #[test]
    fn prop_partial_then_full_equals_full(
        base in prop::option::of("[a-z]{0,4}"),
        // Empty operands are excluded: an empty base counts as absent, which
        // makes appending an empty string non-associative
        operands in prop::collection::vec("[a-z]{1,4}", 1..12),
        split in 0usize..12,
    ) {
        let fold = AssociativeFold::new(Arc::new(StringAppendOperator::new().adapter()));
        let operands: Vec<Vec<u8>> = operands.into_iter().map(String::into_bytes).collect();
        let base = base.map(String::into_bytes);

        let expected = fold.full_merge(b"k", base.as_deref(), &operands).into_value();

        // Fold the operands after `split` into one with partial_merge first
        let split = split.min(operands.len() - 1);
        let mut grouped: Vec<Vec<u8>> = operands[..split].to_vec();
        let mut acc = operands[split].clone();
        for next in &operands[split + 1..] {
            acc = fold.partial_merge(b"k", &acc, next).into_value().unwrap();
        }
        grouped.push(acc);

        prop_assert_eq!(fold.full_merge(b"k", base.as_deref(), &grouped).into_value(), expected);
    }

    #[test]
    fn prop_decode_encode_roundtrip(items in prop::collection::vec(arb_item(), 0..50)) {
        let mut batch = WriteBatch::new();
        for item in &items {
            batch.push_item(item).unwrap();
        }
        prop_assert_eq!(decode(&batch.encode()).unwrap(), items);
    }
}
