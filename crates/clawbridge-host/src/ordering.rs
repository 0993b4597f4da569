//! OrderingAdapter: the engine's comparator, backed by host logic.
//!
//! The host returns a three-way integer; only its sign matters. The host
//! comparator must be a strict weak ordering and must not depend on mutable
//! state, since every sorted structure in the engine is built on it. A
//! signalled failure is returned as an error, never as `Equal`.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use clawbridge_core::{BridgeResult, Comparator, DiagnosticSink, Extension, ExtensionKind, SinkSlot};

use crate::identity::AdapterIdentity;
use crate::scope::{invoke, CallScope};

/// Host-side comparator capability.
///
/// The hint methods may be left as no-ops; an unshortened key is always
/// correct.
pub trait HostComparator: Send + Sync {
    /// Negative, zero or positive as `a` sorts before, with or after `b`.
    fn compare(&self, scope: &mut CallScope<'_>, a: &[u8], b: &[u8]) -> i32;

    /// Shorten `start` to a key in `[start, limit)`.
    fn find_shortest_separator(&self, _scope: &mut CallScope<'_>, _start: &mut Vec<u8>, _limit: &[u8]) {}

    /// Shorten `key` to a key `>= key`.
    fn find_short_successor(&self, _scope: &mut CallScope<'_>, _key: &mut Vec<u8>) {}
}

/// Closure-backed comparator without hints
struct FnComparator<F>(F);

impl<F> HostComparator for FnComparator<F>
where
    F: Fn(&mut CallScope<'_>, &[u8], &[u8]) -> i32 + Send + Sync,
{
    fn compare(&self, scope: &mut CallScope<'_>, a: &[u8], b: &[u8]) -> i32 {
        (self.0)(scope, a, b)
    }
}

/// Comparator extension point forwarding to a `HostComparator`
pub struct OrderingAdapter {
    identity: AdapterIdentity,
    host: Arc<dyn HostComparator>,
    sink: SinkSlot,
}

impl OrderingAdapter {
    pub fn new(name: impl Into<Vec<u8>>, host: Arc<dyn HostComparator>) -> Self {
        Self { identity: AdapterIdentity::new(name), host, sink: SinkSlot::new() }
    }

    /// Adapter over a plain comparison closure.
    pub fn from_fn<F>(name: impl Into<Vec<u8>>, compare: F) -> Self
    where
        F: Fn(&mut CallScope<'_>, &[u8], &[u8]) -> i32 + Send + Sync + 'static,
    {
        Self::new(name, Arc::new(FnComparator(compare)))
    }

    pub fn identity(&self) -> &AdapterIdentity {
        &self.identity
    }

    pub fn is_sink_attached(&self) -> bool {
        self.sink.is_attached()
    }
}

impl Extension for OrderingAdapter {
    fn name(&self) -> &[u8] {
        self.identity.as_bytes()
    }

    fn attach_diagnostic_sink(&self, sink: Arc<dyn DiagnosticSink>) -> BridgeResult<()> {
        self.sink.attach(&self.identity.to_string(), sink)
    }
}

impl Comparator for OrderingAdapter {
    fn compare(&self, a: &[u8], b: &[u8]) -> BridgeResult<Ordering> {
        let raw = invoke(ExtensionKind::Comparator, &self.identity, &self.sink, |scope| {
            self.host.compare(scope, a, b)
        })?;
        Ok(raw.cmp(&0))
    }

    fn find_shortest_separator(&self, start: &mut Vec<u8>, limit: &[u8]) -> BridgeResult<()> {
        invoke(ExtensionKind::Comparator, &self.identity, &self.sink, |scope| {
            self.host.find_shortest_separator(scope, start, limit)
        })
    }

    fn find_short_successor(&self, key: &mut Vec<u8>) -> BridgeResult<()> {
        invoke(ExtensionKind::Comparator, &self.identity, &self.sink, |scope| {
            self.host.find_short_successor(scope, key)
        })
    }
}

impl fmt::Debug for OrderingAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderingAdapter")
            .field("identity", &self.identity)
            .field("sink", &self.sink)
            .finish()
    }
}
