//! Sorted in-memory table ordered by a pluggable comparator.
//!
//! Entries are kept in a vector sorted by user key (comparator order) and, for
//! equal keys, by sequence number descending, so the newest version of a key
//! is always the first one found. Every comparison goes through the
//! configured `Comparator` and any failure aborts the operation.

use crate::error::BridgeResult;
use crate::extension::Comparator;

/// What a stored version means
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Value,
    Merge,
    Deletion,
}

/// One version of a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: Vec<u8>,
    pub sequence: u64,
    pub kind: EntryKind,
    pub value: Vec<u8>,
}

impl Entry {
    pub fn new(key: &[u8], sequence: u64, kind: EntryKind, value: &[u8]) -> Self {
        Self { key: key.to_vec(), sequence, kind, value: value.to_vec() }
    }
}

/// Comparator-ordered multi-version table
#[derive(Debug, Default, Clone)]
pub struct MemTable {
    entries: Vec<Entry>,
}

impl MemTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from entries already in table order
    pub(crate) fn from_sorted(entries: Vec<Entry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Index of the first entry whose key is not less than `key`.
    fn lower_bound(&self, cmp: &dyn Comparator, key: &[u8]) -> BridgeResult<usize> {
        let (mut lo, mut hi) = (0usize, self.entries.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if cmp.compare(&self.entries[mid].key, key)?.is_lt() {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo)
    }

    /// Insert a version. It must carry a sequence newer than any stored
    /// version of the same key, so it lands in front of them.
    pub fn insert(&mut self, cmp: &dyn Comparator, entry: Entry) -> BridgeResult<()> {
        let pos = self.lower_bound(cmp, &entry.key)?;
        self.entries.insert(pos, entry);
        Ok(())
    }

    /// Drop every version newer than `sequence`. Needs no comparisons, so it
    /// cannot fail. Returns how many entries were removed.
    pub(crate) fn discard_newer_than(&mut self, sequence: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.sequence <= sequence);
        before - self.entries.len()
    }

    /// All versions of `key`, newest first.
    pub fn versions(&self, cmp: &dyn Comparator, key: &[u8]) -> BridgeResult<&[Entry]> {
        let start = self.lower_bound(cmp, key)?;
        let mut end = start;
        while end < self.entries.len() && cmp.compare(&self.entries[end].key, key)?.is_eq() {
            end += 1;
        }
        Ok(&self.entries[start..end])
    }

    /// Entries split into runs of equal keys, in table order.
    pub fn groups(&self, cmp: &dyn Comparator) -> BridgeResult<Vec<&[Entry]>> {
        let mut groups = Vec::new();
        let mut start = 0;
        for i in 1..=self.entries.len() {
            let boundary = i == self.entries.len()
                || !cmp.compare(&self.entries[i - 1].key, &self.entries[i].key)?.is_eq();
            if boundary {
                groups.push(&self.entries[start..i]);
                start = i;
            }
        }
        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use crate::extension::{BytewiseComparator, Extension, ExtensionKind};
    use std::cmp::Ordering;

    struct Reverse;

    impl Extension for Reverse {
        fn name(&self) -> &[u8] { b"reverse" }
    }

    impl Comparator for Reverse {
        fn compare(&self, a: &[u8], b: &[u8]) -> BridgeResult<Ordering> {
            Ok(b.cmp(a))
        }
    }

    struct Broken;

    impl Extension for Broken {
        fn name(&self) -> &[u8] { b"broken" }
    }

    impl Comparator for Broken {
        fn compare(&self, _a: &[u8], _b: &[u8]) -> BridgeResult<Ordering> {
            Err(BridgeError::callback(ExtensionKind::Comparator, "broken", "no"))
        }
    }

    #[test]
    fn test_newest_version_first() {
        let cmp = BytewiseComparator;
        let mut table = MemTable::new();
        table.insert(&cmp, Entry::new(b"k", 1, EntryKind::Value, b"v1")).unwrap();
        table.insert(&cmp, Entry::new(b"a", 2, EntryKind::Value, b"x")).unwrap();
        table.insert(&cmp, Entry::new(b"k", 3, EntryKind::Merge, b"+")).unwrap();

        let versions = table.versions(&cmp, b"k").unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].sequence, 3);
        assert_eq!(versions[1].sequence, 1);
        assert!(table.versions(&cmp, b"zz").unwrap().is_empty());
    }

    #[test]
    fn test_custom_order() {
        let cmp = Reverse;
        let mut table = MemTable::new();
        for (seq, key) in [b"a", b"c", b"b"].iter().enumerate() {
            table.insert(&cmp, Entry::new(*key, seq as u64 + 1, EntryKind::Value, b"")).unwrap();
        }
        let keys: Vec<&[u8]> = table.entries().iter().map(|e| e.key.as_slice()).collect();
        assert_eq!(keys, vec![b"c".as_slice(), b"b".as_slice(), b"a".as_slice()]);
    }

    #[test]
    fn test_groups() {
        let cmp = BytewiseComparator;
        let mut table = MemTable::new();
        table.insert(&cmp, Entry::new(b"a", 1, EntryKind::Value, b"1")).unwrap();
        table.insert(&cmp, Entry::new(b"b", 2, EntryKind::Value, b"2")).unwrap();
        table.insert(&cmp, Entry::new(b"a", 3, EntryKind::Deletion, b"")).unwrap();

        let groups = table.groups(&cmp).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[1][0].key, b"b");
        assert!(MemTable::new().groups(&cmp).unwrap().is_empty());
    }

    #[test]
    fn test_comparator_failure_propagates() {
        let mut table = MemTable::new();
        table.insert(&Broken, Entry::new(b"a", 1, EntryKind::Value, b"1")).unwrap();
        let err = table.insert(&Broken, Entry::new(b"b", 2, EntryKind::Value, b"2")).unwrap_err();
        assert_eq!(err.callback_message(), Some("no"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_discard_newer_than() {
        let cmp = BytewiseComparator;
        let mut table = MemTable::new();
        table.insert(&cmp, Entry::new(b"a", 1, EntryKind::Value, b"1")).unwrap();
        table.insert(&cmp, Entry::new(b"b", 2, EntryKind::Value, b"2")).unwrap();
        table.insert(&cmp, Entry::new(b"a", 3, EntryKind::Merge, b"+")).unwrap();

        assert_eq!(table.discard_newer_than(1), 2);
        assert_eq!(table.entries(), &[Entry::new(b"a", 1, EntryKind::Value, b"1")]);
        assert_eq!(table.discard_newer_than(5), 0);
    }
}
