//! MergeAdapter: host-backed merge operators in both engine shapes.
//!
//! - `AssociativeMergeAdapter`: one pairwise `merge(existing?, operand)`.
//! - `MergeAdapter`: `full_merge` over all pending operands plus an optional
//!   `partial_merge` that folds two adjacent operands.
//!
//! A merge callback returns `None` to decline. A signalled message also
//! declines, with the message kept as the reason. Neither is an error: the
//! engine decides what a declined merge means.

use std::fmt;
use std::sync::Arc;

use clawbridge_core::{
    AssociativeMergeOperator, BridgeResult, DiagnosticSink, Extension, MergeOperator, MergeOutcome, SinkSlot,
};

use crate::identity::AdapterIdentity;
use crate::scope::{invoke_merge, CallScope};

// ---------------------------------------------------------------------------
// Host capabilities
// ---------------------------------------------------------------------------

/// Pairwise merge. Must be associative: any grouping of pending operands
/// gives the same result as a left-to-right fold.
pub trait HostAssociativeMerge: Send + Sync {
    fn merge(&self, scope: &mut CallScope<'_>, key: &[u8], existing: Option<&[u8]>, operand: &[u8]) -> Option<Vec<u8>>;
}

/// Multi-operand merge.
pub trait HostMergeOperator: Send + Sync {
    /// Collapse `operands` (oldest first) onto `existing`.
    fn full_merge(
        &self,
        scope: &mut CallScope<'_>,
        key: &[u8],
        existing: Option<&[u8]>,
        operands: &[Vec<u8>],
    ) -> Option<Vec<u8>>;

    /// Fold two adjacent operands. Must equal deferring both to `full_merge`.
    /// `None` keeps both.
    fn partial_merge(&self, _scope: &mut CallScope<'_>, _key: &[u8], _left: &[u8], _right: &[u8]) -> Option<Vec<u8>> {
        None
    }
}

struct FnAssociativeMerge<F>(F);

impl<F> HostAssociativeMerge for FnAssociativeMerge<F>
where
    F: Fn(&mut CallScope<'_>, &[u8], Option<&[u8]>, &[u8]) -> Option<Vec<u8>> + Send + Sync,
{
    fn merge(&self, scope: &mut CallScope<'_>, key: &[u8], existing: Option<&[u8]>, operand: &[u8]) -> Option<Vec<u8>> {
        (self.0)(scope, key, existing, operand)
    }
}

// ---------------------------------------------------------------------------
// AssociativeMergeAdapter
// ---------------------------------------------------------------------------

/// Associative merge extension point forwarding to a `HostAssociativeMerge`
pub struct AssociativeMergeAdapter {
    identity: AdapterIdentity,
    host: Arc<dyn HostAssociativeMerge>,
    sink: SinkSlot,
}

impl AssociativeMergeAdapter {
    pub fn new(name: impl Into<Vec<u8>>, host: Arc<dyn HostAssociativeMerge>) -> Self {
        Self { identity: AdapterIdentity::new(name), host, sink: SinkSlot::new() }
    }

    /// Adapter over a `(scope, key, existing, operand)` closure.
    pub fn from_fn<F>(name: impl Into<Vec<u8>>, merge: F) -> Self
    where
        F: Fn(&mut CallScope<'_>, &[u8], Option<&[u8]>, &[u8]) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        Self::new(name, Arc::new(FnAssociativeMerge(merge)))
    }

    pub fn identity(&self) -> &AdapterIdentity {
        &self.identity
    }

    pub fn is_sink_attached(&self) -> bool {
        self.sink.is_attached()
    }
}

impl Extension for AssociativeMergeAdapter {
    fn name(&self) -> &[u8] {
        self.identity.as_bytes()
    }

    fn attach_diagnostic_sink(&self, sink: Arc<dyn DiagnosticSink>) -> BridgeResult<()> {
        self.sink.attach(&self.identity.to_string(), sink)
    }
}

impl AssociativeMergeOperator for AssociativeMergeAdapter {
    fn merge(&self, key: &[u8], existing: Option<&[u8]>, operand: &[u8]) -> MergeOutcome {
        invoke_merge(&self.identity, &self.sink, |scope| self.host.merge(scope, key, existing, operand))
    }
}

impl fmt::Debug for AssociativeMergeAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssociativeMergeAdapter")
            .field("identity", &self.identity)
            .field("sink", &self.sink)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// MergeAdapter
// ---------------------------------------------------------------------------

/// Full/partial merge extension point forwarding to a `HostMergeOperator`
pub struct MergeAdapter {
    identity: AdapterIdentity,
    host: Arc<dyn HostMergeOperator>,
    sink: SinkSlot,
}

impl MergeAdapter {
    pub fn new(name: impl Into<Vec<u8>>, host: Arc<dyn HostMergeOperator>) -> Self {
        Self { identity: AdapterIdentity::new(name), host, sink: SinkSlot::new() }
    }

    pub fn identity(&self) -> &AdapterIdentity {
        &self.identity
    }

    pub fn is_sink_attached(&self) -> bool {
        self.sink.is_attached()
    }
}

impl Extension for MergeAdapter {
    fn name(&self) -> &[u8] {
        self.identity.as_bytes()
    }

    fn attach_diagnostic_sink(&self, sink: Arc<dyn DiagnosticSink>) -> BridgeResult<()> {
        self.sink.attach(&self.identity.to_string(), sink)
    }
}

impl MergeOperator for MergeAdapter {
    fn full_merge(&self, key: &[u8], existing: Option<&[u8]>, operands: &[Vec<u8>]) -> MergeOutcome {
        invoke_merge(&self.identity, &self.sink, |scope| self.host.full_merge(scope, key, existing, operands))
    }

    fn partial_merge(&self, key: &[u8], left: &[u8], right: &[u8]) -> MergeOutcome {
        invoke_merge(&self.identity, &self.sink, |scope| self.host.partial_merge(scope, key, left, right))
    }
}

impl fmt::Debug for MergeAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeAdapter")
            .field("identity", &self.identity)
            .field("sink", &self.sink)
            .finish()
    }
}
