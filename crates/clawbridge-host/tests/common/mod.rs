//! Host capabilities shared by the integration and property tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use clawbridge_host::{CallScope, HostFilterPolicy, HostMergeOperator, HostSliceTransform, OrderingAdapter};

// ---------------------------------------------------------------------------
// Bloom filter
// ---------------------------------------------------------------------------

/// Classic Bloom filter with double hashing over CRC32C. The probe count is
/// stored in the last byte of the filter.
pub struct BloomPolicy {
    bits_per_key: usize,
    probes: u8,
}

impl BloomPolicy {
    pub fn new(bits_per_key: usize) -> Self {
        // ln(2) * bits_per_key minimizes the false positive rate
        let probes = ((bits_per_key as f64) * 0.69) as usize;
        Self { bits_per_key, probes: probes.clamp(1, 30) as u8 }
    }
}

fn bloom_hash(key: &[u8]) -> u32 {
    crc32c::crc32c(key)
}

impl HostFilterPolicy for BloomPolicy {
    fn create_filter(&self, _scope: &mut CallScope<'_>, keys: &[&[u8]], dst: &mut Vec<u8>) {
        let bits = (keys.len() * self.bits_per_key).max(64);
        let bytes = (bits + 7) / 8;
        let bits = bytes * 8;

        let start = dst.len();
        dst.resize(start + bytes, 0);
        for key in keys {
            let mut h = bloom_hash(key);
            let delta = h.rotate_right(17);
            for _ in 0..self.probes {
                let pos = (h as usize) % bits;
                dst[start + pos / 8] |= 1 << (pos % 8);
                h = h.wrapping_add(delta);
            }
        }
        dst.push(self.probes);
    }

    fn key_may_match(&self, scope: &mut CallScope<'_>, key: &[u8], filter: &[u8]) -> bool {
        if filter.len() < 2 {
            scope.fail(format!("bloom filter too short: {} bytes", filter.len()));
            return true;
        }
        let probes = filter[filter.len() - 1];
        if probes > 30 {
            // Reserved for other encodings
            return true;
        }
        let bits = (filter.len() - 1) * 8;
        let mut h = bloom_hash(key);
        let delta = h.rotate_right(17);
        for _ in 0..probes {
            let pos = (h as usize) % bits;
            if filter[pos / 8] & (1 << (pos % 8)) == 0 {
                return false;
            }
            h = h.wrapping_add(delta);
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Prefix extractor
// ---------------------------------------------------------------------------

/// Fixed-length prefix. Counts calls that reach `transform` with a key outside
/// the domain, which must never happen.
pub struct FixedPrefix {
    len: usize,
    pub transforms: AtomicUsize,
    pub out_of_domain: AtomicUsize,
}

impl FixedPrefix {
    pub fn new(len: usize) -> Self {
        Self { len, transforms: AtomicUsize::new(0), out_of_domain: AtomicUsize::new(0) }
    }
}

impl HostSliceTransform for FixedPrefix {
    fn transform(&self, scope: &mut CallScope<'_>, key: &[u8]) -> Vec<u8> {
        self.transforms.fetch_add(1, Ordering::SeqCst);
        if key.len() < self.len {
            self.out_of_domain.fetch_add(1, Ordering::SeqCst);
            scope.fail("key shorter than prefix");
            return Vec::new();
        }
        key[..self.len].to_vec()
    }

    fn in_domain(&self, _scope: &mut CallScope<'_>, key: &[u8]) -> bool {
        key.len() >= self.len
    }

    fn in_range(&self, _scope: &mut CallScope<'_>, prefix: &[u8]) -> bool {
        prefix.len() == self.len
    }
}

// ---------------------------------------------------------------------------
// Counters and comparators
// ---------------------------------------------------------------------------

pub fn parse_decimal(bytes: &[u8]) -> Option<i64> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

/// Orders decimal keys numerically; a non-numeric key is a host failure.
pub fn numeric_comparator() -> OrderingAdapter {
    OrderingAdapter::from_fn("mycompare", |scope, a, b| match (parse_decimal(a), parse_decimal(b)) {
        (Some(x), Some(y)) => x.cmp(&y) as i32,
        _ => {
            scope.fail("key is not a number");
            0
        }
    })
}

/// Decimal counter with a real partial merge
pub struct FullCounter;

impl HostMergeOperator for FullCounter {
    fn full_merge(
        &self,
        scope: &mut CallScope<'_>,
        _key: &[u8],
        existing: Option<&[u8]>,
        operands: &[Vec<u8>],
    ) -> Option<Vec<u8>> {
        let mut total = match existing {
            Some(bytes) => parse_decimal(bytes)?,
            None => 0,
        };
        for operand in operands {
            match parse_decimal(operand) {
                Some(v) => total += v,
                None => {
                    scope.fail(format!("operand {:?} is not a number", String::from_utf8_lossy(operand)));
                    return None;
                }
            }
        }
        Some(total.to_string().into_bytes())
    }

    fn partial_merge(&self, _scope: &mut CallScope<'_>, _key: &[u8], left: &[u8], right: &[u8]) -> Option<Vec<u8>> {
        Some((parse_decimal(left)? + parse_decimal(right)?).to_string().into_bytes())
    }
}
