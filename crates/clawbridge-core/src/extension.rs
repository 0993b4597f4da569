//! Extension-point contracts the engine calls into.
//!
//! Every trait here is `Send + Sync`: the engine invokes extensions
//! synchronously from whichever of its threads is active (foreground reads,
//! writes, flushes) and never serializes those calls. An implementation must
//! not rely on per-call mutable state of its own.
//!
//! Foreign failures come back as `BridgeError::Callback` and are fatal to the
//! engine operation in flight. Merges are the exception: they answer with a
//! `MergeOutcome`, and a declined merge is something the engine handles.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::diagnostics::DiagnosticSink;
use crate::error::BridgeResult;

/// Which extension point an error or log line belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtensionKind {
    Comparator,
    FilterPolicy,
    MergeOperator,
    SliceTransform,
}

impl fmt::Display for ExtensionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExtensionKind::Comparator => "comparator",
            ExtensionKind::FilterPolicy => "filter policy",
            ExtensionKind::MergeOperator => "merge operator",
            ExtensionKind::SliceTransform => "slice transform",
        };
        f.write_str(s)
    }
}

/// Behavior shared by all extension points.
pub trait Extension: Send + Sync {
    /// Stable identity used for logging and compatibility checks.
    fn name(&self) -> &[u8];

    /// Called by the engine at most once, after construction and before the
    /// extension sees hot-path traffic. Extensions without a use for the sink
    /// may ignore it.
    fn attach_diagnostic_sink(&self, sink: Arc<dyn DiagnosticSink>) -> BridgeResult<()> {
        let _ = sink;
        Ok(())
    }

    /// Name rendered for humans (lossy for non-UTF-8 names).
    fn display_name(&self) -> String {
        String::from_utf8_lossy(self.name()).into_owned()
    }
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

/// Total order over every key stored under one comparator.
///
/// `compare` must be a strict weak ordering and deterministic for equal
/// inputs. The two hints may do nothing; leaving the input untouched is
/// always correct.
pub trait Comparator: Extension {
    fn compare(&self, a: &[u8], b: &[u8]) -> BridgeResult<Ordering>;

    /// If `start < limit`, may shorten `start` to any key `s` with
    /// `start <= s < limit`.
    fn find_shortest_separator(&self, start: &mut Vec<u8>, limit: &[u8]) -> BridgeResult<()> {
        let _ = (start, limit);
        Ok(())
    }

    /// May change `key` to any key `k >= key`.
    fn find_short_successor(&self, key: &mut Vec<u8>) -> BridgeResult<()> {
        let _ = key;
        Ok(())
    }
}

/// Lexicographic byte order; the engine's default.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytewiseComparator;

impl Extension for BytewiseComparator {
    fn name(&self) -> &[u8] {
        b"clawbridge.BytewiseComparator"
    }
}

impl Comparator for BytewiseComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> BridgeResult<Ordering> {
        Ok(a.cmp(b))
    }

    fn find_shortest_separator(&self, start: &mut Vec<u8>, limit: &[u8]) -> BridgeResult<()> {
        let shared = start.iter().zip(limit).take_while(|(a, b)| a == b).count();
        if shared >= start.len().min(limit.len()) {
            // One is a prefix of the other
            return Ok(());
        }
        let byte = start[shared];
        if byte < 0xff && byte + 1 < limit[shared] {
            start[shared] = byte + 1;
            start.truncate(shared + 1);
        }
        Ok(())
    }

    fn find_short_successor(&self, key: &mut Vec<u8>) -> BridgeResult<()> {
        if let Some(pos) = key.iter().position(|&b| b != 0xff) {
            key[pos] += 1;
            key.truncate(pos + 1);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

/// Probabilistic membership summary over a set of keys written together.
///
/// `key_may_match(k, create_filter(K))` must be true for every `k` in `K`.
pub trait FilterPolicy: Extension {
    fn create_filter(&self, keys: &[&[u8]]) -> BridgeResult<Vec<u8>>;

    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> BridgeResult<bool>;
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

/// Result of a merge call. `Declined` is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged(Vec<u8>),
    Declined {
        /// Why the operator refused, when it said
        reason: Option<String>,
    },
}

impl MergeOutcome {
    pub fn declined() -> Self {
        MergeOutcome::Declined { reason: None }
    }

    pub fn is_merged(&self) -> bool {
        matches!(self, MergeOutcome::Merged(_))
    }

    pub fn into_value(self) -> Option<Vec<u8>> {
        match self {
            MergeOutcome::Merged(v) => Some(v),
            MergeOutcome::Declined { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            MergeOutcome::Declined { reason } => reason.as_deref(),
            MergeOutcome::Merged(_) => None,
        }
    }
}

/// Pairwise merge that may be applied in any grouping of pending operands.
pub trait AssociativeMergeOperator: Extension {
    fn merge(&self, key: &[u8], existing: Option<&[u8]>, operand: &[u8]) -> MergeOutcome;
}

/// Multi-operand merge against a base value, with optional operand folding.
pub trait MergeOperator: Extension {
    /// Collapse `operands` (oldest first) onto `existing`.
    fn full_merge(&self, key: &[u8], existing: Option<&[u8]>, operands: &[Vec<u8>]) -> MergeOutcome;

    /// Fold two adjacent operands before the base value is known. Declining
    /// means "keep both".
    fn partial_merge(&self, key: &[u8], left: &[u8], right: &[u8]) -> MergeOutcome {
        let _ = (key, left, right);
        MergeOutcome::declined()
    }
}

/// Presents an associative operator through the full/partial contract.
///
/// `full_merge` is a left fold; `partial_merge` merges the right operand onto
/// the left one.
pub struct AssociativeFold {
    inner: Arc<dyn AssociativeMergeOperator>,
}

impl AssociativeFold {
    pub fn new(inner: Arc<dyn AssociativeMergeOperator>) -> Self {
        Self { inner }
    }
}

impl Extension for AssociativeFold {
    fn name(&self) -> &[u8] {
        self.inner.name()
    }

    fn attach_diagnostic_sink(&self, sink: Arc<dyn DiagnosticSink>) -> BridgeResult<()> {
        self.inner.attach_diagnostic_sink(sink)
    }
}

impl MergeOperator for AssociativeFold {
    fn full_merge(&self, key: &[u8], existing: Option<&[u8]>, operands: &[Vec<u8>]) -> MergeOutcome {
        let mut acc: Option<Vec<u8>> = existing.map(|v| v.to_vec());
        for operand in operands {
            match self.inner.merge(key, acc.as_deref(), operand) {
                MergeOutcome::Merged(v) => acc = Some(v),
                declined => return declined,
            }
        }
        match acc {
            Some(v) => MergeOutcome::Merged(v),
            None => MergeOutcome::Declined { reason: Some("no operands and no base value".into()) },
        }
    }

    fn partial_merge(&self, key: &[u8], left: &[u8], right: &[u8]) -> MergeOutcome {
        self.inner.merge(key, Some(left), right)
    }
}

impl fmt::Debug for AssociativeFold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssociativeFold")
            .field("name", &self.inner.display_name())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Key transformation
// ---------------------------------------------------------------------------

/// Deterministic prefix extraction for prefix-based indexing.
///
/// Callers never invoke `transform(k)` unless `in_domain(k)` is true.
pub trait SliceTransform: Extension {
    fn transform(&self, key: &[u8]) -> BridgeResult<Vec<u8>>;

    fn in_domain(&self, key: &[u8]) -> BridgeResult<bool>;

    fn in_range(&self, prefix: &[u8]) -> BridgeResult<bool>;
}
