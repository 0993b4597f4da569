//! Filter blocks over a frozen run.
//!
//! Keys of a run are cut into blocks of `filter_block_keys`; each block gets a
//! filter from the configured `FilterPolicy` and a separator key from the
//! comparator hints. Lookups pick the first block whose separator is not less
//! than the key, then ask the policy.
//!
//! A hint that violates its contract would route keys to the wrong block and
//! turn into false negatives, so hint results are checked and discarded when
//! out of bounds.

use crate::diagnostics::{DiagnosticSink, LogLevel};
use crate::error::BridgeResult;
use crate::extension::{Comparator, FilterPolicy, SliceTransform};

/// One block: filter bytes plus the upper bound of its keys
#[derive(Debug, Clone)]
pub struct FilterBlock {
    pub separator: Vec<u8>,
    pub data: Vec<u8>,
    pub key_count: usize,
}

/// Ordered filter blocks of one run
#[derive(Debug, Clone, Default)]
pub struct FilterIndex {
    blocks: Vec<FilterBlock>,
    /// Whether transformed prefixes were added to the filters
    with_prefixes: bool,
}

/// Extensions a filter index build or probe needs
pub struct FilterContext<'a> {
    pub comparator: &'a dyn Comparator,
    pub policy: &'a dyn FilterPolicy,
    pub prefix_extractor: Option<&'a dyn SliceTransform>,
    pub sink: &'a dyn DiagnosticSink,
}

impl FilterIndex {
    /// Build blocks over `keys`, which must be distinct and in comparator order.
    pub fn build(ctx: &FilterContext<'_>, keys: &[&[u8]], block_keys: usize) -> BridgeResult<Self> {
        let block_keys = block_keys.max(1);
        let chunks: Vec<&[&[u8]]> = keys.chunks(block_keys).collect();
        let mut blocks = Vec::with_capacity(chunks.len());

        for (i, chunk) in chunks.iter().enumerate() {
            let mut filter_keys: Vec<Vec<u8>> = chunk.iter().map(|k| k.to_vec()).collect();
            if let Some(extractor) = ctx.prefix_extractor {
                let mut last_prefix: Option<Vec<u8>> = None;
                for key in chunk.iter() {
                    if !extractor.in_domain(key)? {
                        continue;
                    }
                    let prefix = extractor.transform(key)?;
                    if last_prefix.as_deref() != Some(prefix.as_slice()) {
                        filter_keys.push(prefix.clone());
                        last_prefix = Some(prefix);
                    }
                }
            }
            let refs: Vec<&[u8]> = filter_keys.iter().map(|k| k.as_slice()).collect();
            let data = ctx.policy.create_filter(&refs)?;

            // chunks() never yields an empty slice
            let last = chunk[chunk.len() - 1];
            let separator = match chunks.get(i + 1) {
                Some(next) => shortest_separator(ctx, last, next[0])?,
                None => short_successor(ctx, last)?,
            };

            blocks.push(FilterBlock { separator, data, key_count: chunk.len() });
        }

        Ok(Self { blocks, with_prefixes: ctx.prefix_extractor.is_some() })
    }

    pub fn blocks(&self) -> &[FilterBlock] {
        &self.blocks
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// False only if `key` is definitely absent from the run.
    pub fn may_contain(&self, ctx: &FilterContext<'_>, key: &[u8]) -> BridgeResult<bool> {
        for block in &self.blocks {
            if !ctx.comparator.compare(key, &block.separator)?.is_gt() {
                return ctx.policy.key_may_match(key, &block.data);
            }
        }
        Ok(false)
    }

    /// False only if no key in the run transforms to `prefix`.
    pub fn may_contain_prefix(&self, ctx: &FilterContext<'_>, prefix: &[u8]) -> BridgeResult<bool> {
        if !self.with_prefixes {
            return Ok(true);
        }
        for block in &self.blocks {
            if ctx.policy.key_may_match(prefix, &block.data)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

fn shortest_separator(ctx: &FilterContext<'_>, last: &[u8], next: &[u8]) -> BridgeResult<Vec<u8>> {
    let mut separator = last.to_vec();
    ctx.comparator.find_shortest_separator(&mut separator, next)?;
    let cmp = ctx.comparator;
    if cmp.compare(&separator, last)?.is_lt() || !cmp.compare(&separator, next)?.is_lt() {
        ctx.sink.log(
            LogLevel::Warn,
            &ctx.comparator.display_name(),
            "find_shortest_separator returned a key outside [start, limit); ignoring hint",
        );
        return Ok(last.to_vec());
    }
    Ok(separator)
}

fn short_successor(ctx: &FilterContext<'_>, last: &[u8]) -> BridgeResult<Vec<u8>> {
    let mut successor = last.to_vec();
    ctx.comparator.find_short_successor(&mut successor)?;
    if ctx.comparator.compare(&successor, last)?.is_lt() {
        ctx.sink.log(
            LogLevel::Warn,
            &ctx.comparator.display_name(),
            "find_short_successor returned a smaller key; ignoring hint",
        );
        return Ok(last.to_vec());
    }
    Ok(successor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingSink;
    use crate::extension::{BytewiseComparator, Extension};
    use std::cmp::Ordering;

    /// Exact-set "filter": the blob is the keys joined by 0x00
    struct ExactSet;

    impl Extension for ExactSet {
        fn name(&self) -> &[u8] { b"exact" }
    }

    impl FilterPolicy for ExactSet {
        fn create_filter(&self, keys: &[&[u8]]) -> BridgeResult<Vec<u8>> {
            Ok(keys.join(&0u8))
        }

        fn key_may_match(&self, key: &[u8], filter: &[u8]) -> BridgeResult<bool> {
            Ok(filter.split(|b| *b == 0).any(|k| k == key))
        }
    }

    /// Comparator whose separator hint is wrong
    struct LyingHints;

    impl Extension for LyingHints {
        fn name(&self) -> &[u8] { b"lying" }
    }

    impl Comparator for LyingHints {
        fn compare(&self, a: &[u8], b: &[u8]) -> BridgeResult<Ordering> {
            Ok(a.cmp(b))
        }

        fn find_shortest_separator(&self, start: &mut Vec<u8>, _limit: &[u8]) -> BridgeResult<()> {
            start.clear();
            Ok(())
        }
    }

    struct FirstByte;

    impl Extension for FirstByte {
        fn name(&self) -> &[u8] { b"first-byte" }
    }

    impl SliceTransform for FirstByte {
        fn transform(&self, key: &[u8]) -> BridgeResult<Vec<u8>> { Ok(key[..1].to_vec()) }
        fn in_domain(&self, key: &[u8]) -> BridgeResult<bool> { Ok(!key.is_empty()) }
        fn in_range(&self, prefix: &[u8]) -> BridgeResult<bool> { Ok(prefix.len() == 1) }
    }

    fn keys() -> Vec<Vec<u8>> {
        (0..10).map(|i| format!("key{:02}", i).into_bytes()).collect()
    }

    #[test]
    fn test_every_key_found() {
        let sink = RecordingSink::new();
        let ctx = FilterContext { comparator: &BytewiseComparator, policy: &ExactSet, prefix_extractor: None, sink: &sink };
        let owned = keys();
        let refs: Vec<&[u8]> = owned.iter().map(|k| k.as_slice()).collect();
        let index = FilterIndex::build(&ctx, &refs, 3).unwrap();

        assert_eq!(index.blocks().len(), 4);
        for key in &refs {
            assert!(index.may_contain(&ctx, key).unwrap());
        }
        assert!(!index.may_contain(&ctx, b"key05x").unwrap());
        assert!(!index.may_contain(&ctx, b"zzz").unwrap());
        assert!(sink.is_empty());
    }

    #[test]
    fn test_bad_separator_hint_ignored() {
        let sink = RecordingSink::new();
        let ctx = FilterContext { comparator: &LyingHints, policy: &ExactSet, prefix_extractor: None, sink: &sink };
        let owned = keys();
        let refs: Vec<&[u8]> = owned.iter().map(|k| k.as_slice()).collect();
        let index = FilterIndex::build(&ctx, &refs, 4).unwrap();

        for key in &refs {
            assert!(index.may_contain(&ctx, key).unwrap(), "false negative for {:?}", key);
        }
        assert!(sink.contains("ignoring hint"));
    }

    #[test]
    fn test_prefix_probe() {
        let sink = RecordingSink::new();
        let ctx = FilterContext {
            comparator: &BytewiseComparator,
            policy: &ExactSet,
            prefix_extractor: Some(&FirstByte),
            sink: &sink,
        };
        let owned: Vec<Vec<u8>> = vec![b"apple".to_vec(), b"avocado".to_vec(), b"banana".to_vec()];
        let refs: Vec<&[u8]> = owned.iter().map(|k| k.as_slice()).collect();
        let index = FilterIndex::build(&ctx, &refs, 2).unwrap();

        assert!(index.may_contain_prefix(&ctx, b"a").unwrap());
        assert!(index.may_contain_prefix(&ctx, b"b").unwrap());
        assert!(!index.may_contain_prefix(&ctx, b"c").unwrap());
    }

    #[test]
    fn test_empty_run() {
        let sink = RecordingSink::new();
        let ctx = FilterContext { comparator: &BytewiseComparator, policy: &ExactSet, prefix_extractor: None, sink: &sink };
        let index = FilterIndex::build(&ctx, &[], 8).unwrap();
        assert!(index.is_empty());
        assert!(!index.may_contain(&ctx, b"anything").unwrap());
    }
}
