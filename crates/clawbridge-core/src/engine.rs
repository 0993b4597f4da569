//! Reference engine driving the extension points the way a storage engine does.
//!
//! BridgeEngine keeps per-column-family memtables ordered by the configured
//! comparator, resolves merge operands on read, and on flush freezes the
//! memtable into an immutable run with filter blocks. Nothing is persisted.
//!
//! **Write path**: decode batch, assign sequence numbers in record order, insert
//! **Read path**: memtable, then frozen runs newest first (filters consulted)
//! **Flush**: collapse versions per key, fold operands, build filters
//!
//! A failed batch is rolled back. A failing comparator still leaves the tables
//! in an unknown order, so the first comparator error during a write is stored
//! and returned by every later write.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::MergeFailurePolicy;
use crate::decoder::BatchHandler;
use crate::diagnostics::{DiagnosticSink, LogLevel, TracingSink};
use crate::error::{BridgeError, BridgeResult};
use crate::extension::{Comparator, MergeOperator, MergeOutcome};
use crate::filter_index::{FilterContext, FilterIndex};
use crate::format::ColumnFamilyId;
use crate::memtable::{Entry, EntryKind, MemTable};
use crate::options::Options;
use crate::write_batch::WriteBatch;

/// Frozen memtable plus its filter blocks
struct Run {
    table: MemTable,
    filters: Option<FilterIndex>,
}

/// State of one column family
#[derive(Default)]
struct Family {
    memtable: MemTable,
    /// Newest first
    runs: Vec<Run>,
}

/// In-memory engine over pluggable extension points.
///
/// All public methods take `&self`. Readers share the family map through a
/// RwLock; a write holds the write lock for the whole batch so batches apply
/// atomically with respect to readers.
pub struct BridgeEngine {
    options: Options,
    families: RwLock<HashMap<ColumnFamilyId, Family>>,
    /// Last sequence number handed out
    sequence: AtomicU64,
    /// First comparator failure seen by a write
    background_error: Mutex<Option<BridgeError>>,
    sink: Arc<dyn DiagnosticSink>,
}

impl BridgeEngine {
    /// Open an engine logging through `tracing`.
    pub fn open(options: Options) -> BridgeResult<Self> {
        Self::open_with_sink(options, Arc::new(TracingSink))
    }

    /// Open an engine and hand `sink` to every configured extension.
    ///
    /// Extensions are built before the engine exists, so this is where they
    /// first get a diagnostic sink. An extension already attached to another
    /// engine keeps its first sink.
    pub fn open_with_sink(options: Options, sink: Arc<dyn DiagnosticSink>) -> BridgeResult<Self> {
        options.config().validate()?;

        let mut attached = 1;
        keep_first_sink(options.comparator().attach_diagnostic_sink(Arc::clone(&sink)))?;
        if let Some(op) = options.merge_operator() {
            keep_first_sink(op.attach_diagnostic_sink(Arc::clone(&sink)))?;
            attached += 1;
        }
        if let Some(policy) = options.filter_policy() {
            keep_first_sink(policy.attach_diagnostic_sink(Arc::clone(&sink)))?;
            attached += 1;
        }
        if let Some(extractor) = options.prefix_extractor() {
            keep_first_sink(extractor.attach_diagnostic_sink(Arc::clone(&sink)))?;
            attached += 1;
        }

        info!(
            comparator = %options.comparator().display_name(),
            merge_operator = options.merge_operator().is_some(),
            filter_policy = options.filter_policy().is_some(),
            prefix_extractor = options.prefix_extractor().is_some(),
            "ClawBridge engine opened"
        );
        sink.log(LogLevel::Header, "engine", &format!("extensions attached: {}", attached));

        Ok(Self {
            options,
            families: RwLock::new(HashMap::new()),
            sequence: AtomicU64::new(0),
            background_error: Mutex::new(None),
            sink,
        })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Last sequence number assigned to a record.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(AtomicOrdering::Acquire)
    }

    fn comparator(&self) -> &dyn Comparator {
        self.options.comparator().as_ref()
    }

    // -----------------------------------------------------------------------
    // Write path
    // -----------------------------------------------------------------------

    /// Apply every record of `batch` in order.
    ///
    /// Records are inserted under the write lock and removed again if any of
    /// them fails, so readers see the whole batch or none of it.
    pub fn write(&self, batch: &WriteBatch) -> BridgeResult<()> {
        if let Some(err) = self.background_error.lock().clone() {
            return Err(err);
        }

        let mut families = self.families.write();
        let start = self.sequence.load(AtomicOrdering::Acquire);
        let mut inserter = MemTableInserter {
            families: &mut *families,
            comparator: self.comparator(),
            merges_allowed: self.options.merge_operator().is_some(),
            sequence: start,
            failure: None,
        };
        batch.iterate(&mut inserter)?;

        let MemTableInserter { sequence, failure, .. } = inserter;
        let Some(failure) = failure else {
            self.sequence.store(sequence, AtomicOrdering::Release);
            return Ok(());
        };

        let discarded: usize = families.values_mut().map(|f| f.memtable.discard_newer_than(start)).sum();
        debug!(discarded, "rolled back failed batch");

        match failure {
            InsertFailure::MergeWithoutOperator => {
                Err(BridgeError::NotSupported("merge requires a merge operator".into()))
            }
            InsertFailure::Comparator(err) => {
                warn!(error = %err, "comparator failed during write; engine is now read-only");
                self.sink.log(LogLevel::Fatal, "engine", &err.to_string());
                *self.background_error.lock() = Some(err.clone());
                Err(err)
            }
        }
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> BridgeResult<()> {
        self.put_cf(ColumnFamilyId::DEFAULT, key, value)
    }

    pub fn put_cf(&self, cf: ColumnFamilyId, key: &[u8], value: &[u8]) -> BridgeResult<()> {
        let mut batch = WriteBatch::with_config(self.options.config());
        batch.put_cf(cf, key, value)?;
        self.write(&batch)
    }

    pub fn merge(&self, key: &[u8], value: &[u8]) -> BridgeResult<()> {
        self.merge_cf(ColumnFamilyId::DEFAULT, key, value)
    }

    pub fn merge_cf(&self, cf: ColumnFamilyId, key: &[u8], value: &[u8]) -> BridgeResult<()> {
        let mut batch = WriteBatch::with_config(self.options.config());
        batch.merge_cf(cf, key, value)?;
        self.write(&batch)
    }

    pub fn delete(&self, key: &[u8]) -> BridgeResult<()> {
        self.delete_cf(ColumnFamilyId::DEFAULT, key)
    }

    pub fn delete_cf(&self, cf: ColumnFamilyId, key: &[u8]) -> BridgeResult<()> {
        let mut batch = WriteBatch::with_config(self.options.config());
        batch.delete_cf(cf, key)?;
        self.write(&batch)
    }

    // -----------------------------------------------------------------------
    // Read path
    // -----------------------------------------------------------------------

    pub fn get(&self, key: &[u8]) -> BridgeResult<Option<Vec<u8>>> {
        self.get_cf(ColumnFamilyId::DEFAULT, key)
    }

    /// Newest visible value of `key`, with pending merge operands applied.
    pub fn get_cf(&self, cf: ColumnFamilyId, key: &[u8]) -> BridgeResult<Option<Vec<u8>>> {
        let families = self.families.read();
        match families.get(&cf) {
            Some(family) => self.lookup(family, key),
            None => Ok(None),
        }
    }

    /// False only when `key` is certainly absent. Consults filters, never
    /// resolves merges.
    pub fn key_may_exist(&self, key: &[u8]) -> BridgeResult<bool> {
        self.key_may_exist_cf(ColumnFamilyId::DEFAULT, key)
    }

    pub fn key_may_exist_cf(&self, cf: ColumnFamilyId, key: &[u8]) -> BridgeResult<bool> {
        let families = self.families.read();
        let Some(family) = families.get(&cf) else {
            return Ok(false);
        };
        if !family.memtable.versions(self.comparator(), key)?.is_empty() {
            return Ok(true);
        }
        for run in &family.runs {
            let maybe = match (&run.filters, self.filter_context()) {
                (Some(index), Some(ctx)) => index.may_contain(&ctx, key)?,
                _ => !run.table.versions(self.comparator(), key)?.is_empty(),
            };
            if maybe {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn lookup(&self, family: &Family, key: &[u8]) -> BridgeResult<Option<Vec<u8>>> {
        let cmp = self.comparator();
        let filter_ctx = self.filter_context();
        // Newest first
        let mut operands: Vec<Vec<u8>> = Vec::new();

        let layers = std::iter::once(&family.memtable).chain(family.runs.iter().map(|r| &r.table));
        let filters = std::iter::once(None).chain(family.runs.iter().map(|r| r.filters.as_ref()));

        for (table, filter) in layers.zip(filters) {
            if let (Some(index), Some(ctx)) = (filter, filter_ctx.as_ref()) {
                if !index.may_contain(ctx, key)? {
                    continue;
                }
            }
            for entry in table.versions(cmp, key)? {
                match entry.kind {
                    EntryKind::Value => return self.resolve(key, Some(entry.value.as_slice()), operands),
                    EntryKind::Deletion => return self.resolve(key, None, operands),
                    EntryKind::Merge => operands.push(entry.value.clone()),
                }
            }
        }
        self.resolve(key, None, operands)
    }

    /// Apply pending operands (newest first) to `base`.
    fn resolve(&self, key: &[u8], base: Option<&[u8]>, mut operands: Vec<Vec<u8>>) -> BridgeResult<Option<Vec<u8>>> {
        if operands.is_empty() {
            return Ok(base.map(|b| b.to_vec()));
        }
        let op = self.require_merge_operator()?;
        operands.reverse();
        match op.full_merge(key, base, &operands) {
            MergeOutcome::Merged(value) => Ok(Some(value)),
            MergeOutcome::Declined { reason } => self.on_declined(key, reason, operands),
        }
    }

    fn on_declined(&self, key: &[u8], reason: Option<String>, mut operands: Vec<Vec<u8>>) -> BridgeResult<Option<Vec<u8>>> {
        let reason = reason.unwrap_or_else(|| "merge operator declined".to_string());
        match self.options.config().merge_failure_policy {
            MergeFailurePolicy::UseOperand => {
                debug!(reason = %reason, "merge declined; using newest operand as base value");
                Ok(operands.pop())
            }
            MergeFailurePolicy::Surface => Err(BridgeError::MergeFailed { key: key.to_vec(), reason }),
        }
    }

    fn require_merge_operator(&self) -> BridgeResult<&dyn MergeOperator> {
        self.options
            .merge_operator()
            .map(|op| op.as_ref())
            .ok_or_else(|| BridgeError::NotSupported("merge requires a merge operator".into()))
    }

    fn filter_context(&self) -> Option<FilterContext<'_>> {
        self.options.filter_policy().map(|policy| FilterContext {
            comparator: self.comparator(),
            policy: policy.as_ref(),
            prefix_extractor: self.options.prefix_extractor().map(|p| p.as_ref()),
            sink: self.sink.as_ref(),
        })
    }

    // -----------------------------------------------------------------------
    // Iteration
    // -----------------------------------------------------------------------

    pub fn scan(&self) -> BridgeResult<Vec<(Vec<u8>, Vec<u8>)>> {
        self.scan_cf(ColumnFamilyId::DEFAULT)
    }

    /// Every live key/value of a family, in comparator order.
    pub fn scan_cf(&self, cf: ColumnFamilyId) -> BridgeResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let families = self.families.read();
        let Some(family) = families.get(&cf) else {
            return Ok(Vec::new());
        };
        let keys = self.distinct_keys(family, |_| Ok(true))?;
        self.materialize(family, keys)
    }

    /// Live entries whose key transforms to `prefix`, in comparator order.
    ///
    /// Keys outside the extractor's domain are skipped without being
    /// transformed.
    pub fn prefix_scan_cf(&self, cf: ColumnFamilyId, prefix: &[u8]) -> BridgeResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let extractor = self
            .options
            .prefix_extractor()
            .ok_or_else(|| BridgeError::NotSupported("prefix scan requires a prefix extractor".into()))?;
        if !extractor.in_range(prefix)? {
            return Err(BridgeError::InvalidArgument(format!(
                "{:?} is not a prefix produced by '{}'",
                String::from_utf8_lossy(prefix),
                extractor.display_name()
            )));
        }

        let families = self.families.read();
        let Some(family) = families.get(&cf) else {
            return Ok(Vec::new());
        };

        let filter_ctx = self.filter_context();
        let keys = self.distinct_keys(family, |run| match (&run.filters, filter_ctx.as_ref()) {
            (Some(index), Some(ctx)) => index.may_contain_prefix(ctx, prefix),
            _ => Ok(true),
        })?;

        let mut matching = Vec::new();
        for key in keys {
            if extractor.in_domain(&key)? && extractor.transform(&key)? == prefix {
                matching.push(key);
            }
        }
        self.materialize(family, matching)
    }

    pub fn prefix_scan(&self, prefix: &[u8]) -> BridgeResult<Vec<(Vec<u8>, Vec<u8>)>> {
        self.prefix_scan_cf(ColumnFamilyId::DEFAULT, prefix)
    }

    /// Distinct keys across the memtable and every run `include` accepts,
    /// sorted by the comparator.
    fn distinct_keys<F>(&self, family: &Family, mut include: F) -> BridgeResult<Vec<Vec<u8>>>
    where
        F: FnMut(&Run) -> BridgeResult<bool>,
    {
        let cmp = self.comparator();
        let mut keys: Vec<Vec<u8>> = family.memtable.entries().iter().map(|e| e.key.clone()).collect();
        for run in &family.runs {
            if include(run)? {
                keys.extend(run.table.entries().iter().map(|e| e.key.clone()));
            }
        }

        // sort_by cannot fail; park the first comparator error and report it after
        let mut failure: Option<BridgeError> = None;
        keys.sort_by(|a, b| match cmp.compare(a, b) {
            Ok(ord) => ord,
            Err(e) => {
                failure.get_or_insert(e);
                Ordering::Equal
            }
        });
        if let Some(e) = failure {
            return Err(e);
        }

        let mut distinct: Vec<Vec<u8>> = Vec::with_capacity(keys.len());
        for key in keys {
            let duplicate = match distinct.last() {
                Some(prev) => cmp.compare(prev, &key)?.is_eq(),
                None => false,
            };
            if !duplicate {
                distinct.push(key);
            }
        }
        Ok(distinct)
    }

    fn materialize(&self, family: &Family, keys: Vec<Vec<u8>>) -> BridgeResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.lookup(family, &key)? {
                out.push((key, value));
            }
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Flush
    // -----------------------------------------------------------------------

    pub fn flush(&self) -> BridgeResult<()> {
        self.flush_cf(ColumnFamilyId::DEFAULT)
    }

    /// Freeze the memtable of `cf` into an immutable run.
    ///
    /// Each key keeps a single version when a base value is reachable;
    /// otherwise adjacent operands are folded with `partial_merge` where the
    /// operator allows it.
    pub fn flush_cf(&self, cf: ColumnFamilyId) -> BridgeResult<()> {
        let mut families = self.families.write();
        let Some(family) = families.get_mut(&cf) else {
            return Ok(());
        };
        if family.memtable.is_empty() {
            return Ok(());
        }

        let cmp = self.comparator();
        let memtable = std::mem::take(&mut family.memtable);
        let input_entries = memtable.len();

        let mut collapsed: Vec<Entry> = Vec::with_capacity(input_entries);
        let collapse_result = memtable
            .groups(cmp)
            .and_then(|groups| {
                for group in groups {
                    collapsed.extend(self.collapse(group));
                }
                Ok(())
            });
        if let Err(e) = collapse_result {
            // Put the memtable back untouched; nothing was frozen
            family.memtable = memtable;
            return Err(e);
        }

        let table = MemTable::from_sorted(collapsed);
        let filters = match self.filter_context() {
            Some(ctx) => {
                let mut keys: Vec<&[u8]> = Vec::new();
                for entry in table.entries() {
                    if keys.last() != Some(&entry.key.as_slice()) {
                        keys.push(&entry.key);
                    }
                }
                match FilterIndex::build(&ctx, &keys, self.options.config().filter_block_keys) {
                    Ok(index) => Some(index),
                    Err(e) => {
                        family.memtable = memtable;
                        return Err(e);
                    }
                }
            }
            None => None,
        };

        debug!(
            family = cf.0,
            input_entries,
            output_entries = table.len(),
            filter_blocks = filters.as_ref().map_or(0, |f| f.blocks().len()),
            "memtable flushed"
        );
        family.runs.insert(0, Run { table, filters });
        Ok(())
    }

    /// Reduce the versions of one key (newest first) to what a run keeps.
    fn collapse(&self, group: &[Entry]) -> Vec<Entry> {
        let newest = &group[0];
        // Newest first
        let mut operands: Vec<&Entry> = Vec::new();
        let mut base: Option<&Entry> = None;
        for entry in group {
            match entry.kind {
                EntryKind::Merge => operands.push(entry),
                EntryKind::Value | EntryKind::Deletion => {
                    base = Some(entry);
                    break;
                }
            }
        }

        let Some(op) = self.options.merge_operator() else {
            // No operator means no merge records were accepted
            return vec![base.unwrap_or(newest).clone()];
        };

        match base {
            Some(base) if operands.is_empty() => vec![base.clone()],
            Some(base) => {
                let base_value = match base.kind {
                    EntryKind::Value => Some(base.value.as_slice()),
                    _ => None,
                };
                let ordered: Vec<Vec<u8>> = operands.iter().rev().map(|e| e.value.clone()).collect();
                match op.full_merge(&newest.key, base_value, &ordered) {
                    MergeOutcome::Merged(value) => {
                        vec![Entry::new(&newest.key, newest.sequence, EntryKind::Value, &value)]
                    }
                    MergeOutcome::Declined { reason } => match self.options.config().merge_failure_policy {
                        MergeFailurePolicy::UseOperand => {
                            debug!(reason = ?reason, "merge declined at flush; keeping newest operand");
                            vec![Entry::new(&newest.key, newest.sequence, EntryKind::Value, &newest.value)]
                        }
                        // Keep the raw versions so reads report the failure
                        MergeFailurePolicy::Surface => {
                            let mut kept: Vec<Entry> = operands.iter().map(|e| (*e).clone()).collect();
                            kept.push(base.clone());
                            kept
                        }
                    },
                }
            }
            None => self.fold_operands(op.as_ref(), &operands),
        }
    }

    /// Fold adjacent operands pairwise, oldest first; a declined fold keeps both.
    fn fold_operands(&self, op: &dyn MergeOperator, operands: &[&Entry]) -> Vec<Entry> {
        if operands.len() < self.options.config().max_merge_operands {
            return operands.iter().map(|e| (*e).clone()).collect();
        }

        // Oldest first while folding
        let mut folded: Vec<Entry> = Vec::new();
        let mut iter = operands.iter().rev();
        let Some(first) = iter.next() else {
            return folded;
        };
        let mut acc: Entry = (*first).clone();
        for next in iter {
            match op.partial_merge(&acc.key, &acc.value, &next.value) {
                MergeOutcome::Merged(value) => {
                    acc = Entry::new(&next.key, next.sequence, EntryKind::Merge, &value);
                }
                MergeOutcome::Declined { .. } => {
                    folded.push(std::mem::replace(&mut acc, (*next).clone()));
                }
            }
        }
        folded.push(acc);
        folded.reverse();
        folded
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Versions currently held in the memtable of `cf`.
    pub fn memtable_entries(&self, cf: ColumnFamilyId) -> usize {
        self.families.read().get(&cf).map_or(0, |f| f.memtable.len())
    }

    /// Frozen runs of `cf`.
    pub fn frozen_runs(&self, cf: ColumnFamilyId) -> usize {
        self.families.read().get(&cf).map_or(0, |f| f.runs.len())
    }

    /// The error that made this engine read-only, if any.
    pub fn background_error(&self) -> Option<BridgeError> {
        self.background_error.lock().clone()
    }
}

impl std::fmt::Debug for BridgeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeEngine")
            .field("options", &self.options)
            .field("sequence", &self.sequence())
            .field("families", &self.families.read().len())
            .finish()
    }
}

/// An extension shared with another engine keeps the sink it got first.
fn keep_first_sink(result: BridgeResult<()>) -> BridgeResult<()> {
    match result {
        Err(BridgeError::SinkAlreadyAttached { adapter }) => {
            warn!(extension = %adapter, "extension already has a diagnostic sink; keeping it");
            Ok(())
        }
        other => other,
    }
}

/// Why a batch stopped being applied
enum InsertFailure {
    MergeWithoutOperator,
    Comparator(BridgeError),
}

/// Batch visitor that inserts records into memtables.
///
/// Stops inserting at the first failure and keeps it. Entries already
/// inserted carry sequences above the starting one and are rolled back by the
/// caller.
struct MemTableInserter<'a> {
    families: &'a mut HashMap<ColumnFamilyId, Family>,
    comparator: &'a dyn Comparator,
    merges_allowed: bool,
    sequence: u64,
    failure: Option<InsertFailure>,
}

impl MemTableInserter<'_> {
    fn insert(&mut self, cf: ColumnFamilyId, key: &[u8], kind: EntryKind, value: &[u8]) {
        if self.failure.is_some() {
            return;
        }
        if kind == EntryKind::Merge && !self.merges_allowed {
            self.failure = Some(InsertFailure::MergeWithoutOperator);
            return;
        }
        let sequence = self.sequence + 1;
        let family = self.families.entry(cf).or_default();
        match family.memtable.insert(self.comparator, Entry::new(key, sequence, kind, value)) {
            Ok(()) => self.sequence = sequence,
            Err(e) => self.failure = Some(InsertFailure::Comparator(e)),
        }
    }
}

impl BatchHandler for MemTableInserter<'_> {
    fn put(&mut self, cf: ColumnFamilyId, key: &[u8], value: &[u8]) {
        self.insert(cf, key, EntryKind::Value, value);
    }

    fn merge(&mut self, cf: ColumnFamilyId, key: &[u8], value: &[u8]) {
        self.insert(cf, key, EntryKind::Merge, value);
    }

    fn delete(&mut self, cf: ColumnFamilyId, key: &[u8]) {
        self.insert(cf, key, EntryKind::Deletion, &[]);
    }
}
