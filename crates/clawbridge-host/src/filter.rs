//! FilterAdapter: the engine's probabilistic filter, backed by host logic.
//!
//! Pure forwarding. The adapter never builds or reads filter bytes itself; it
//! only guarantees that a host failure is reported as an error instead of a
//! blob or a verdict, so a broken filter can never turn into a false negative.

use std::fmt;
use std::sync::Arc;

use clawbridge_core::{BridgeResult, DiagnosticSink, Extension, ExtensionKind, FilterPolicy, SinkSlot};

use crate::identity::AdapterIdentity;
use crate::scope::{invoke, CallScope};

/// Host-side filter capability.
///
/// `key_may_match(k, create_filter(K))` must be true for every `k` in `K`.
/// An empty `K` is legal and must still produce a filter that answers
/// deterministically.
pub trait HostFilterPolicy: Send + Sync {
    /// Append a filter for `keys` to `dst`.
    fn create_filter(&self, scope: &mut CallScope<'_>, keys: &[&[u8]], dst: &mut Vec<u8>);

    fn key_may_match(&self, scope: &mut CallScope<'_>, key: &[u8], filter: &[u8]) -> bool;
}

/// Filter extension point forwarding to a `HostFilterPolicy`
pub struct FilterAdapter {
    identity: AdapterIdentity,
    host: Arc<dyn HostFilterPolicy>,
    sink: SinkSlot,
}

impl FilterAdapter {
    pub fn new(name: impl Into<Vec<u8>>, host: Arc<dyn HostFilterPolicy>) -> Self {
        Self { identity: AdapterIdentity::new(name), host, sink: SinkSlot::new() }
    }

    pub fn identity(&self) -> &AdapterIdentity {
        &self.identity
    }

    pub fn is_sink_attached(&self) -> bool {
        self.sink.is_attached()
    }
}

impl Extension for FilterAdapter {
    fn name(&self) -> &[u8] {
        self.identity.as_bytes()
    }

    fn attach_diagnostic_sink(&self, sink: Arc<dyn DiagnosticSink>) -> BridgeResult<()> {
        self.sink.attach(&self.identity.to_string(), sink)
    }
}

impl FilterPolicy for FilterAdapter {
    fn create_filter(&self, keys: &[&[u8]]) -> BridgeResult<Vec<u8>> {
        let mut dst = Vec::new();
        invoke(ExtensionKind::FilterPolicy, &self.identity, &self.sink, |scope| {
            self.host.create_filter(scope, keys, &mut dst)
        })?;
        Ok(dst)
    }

    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> BridgeResult<bool> {
        invoke(ExtensionKind::FilterPolicy, &self.identity, &self.sink, |scope| {
            self.host.key_may_match(scope, key, filter)
        })
    }
}

impl fmt::Debug for FilterAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterAdapter")
            .field("identity", &self.identity)
            .field("sink", &self.sink)
            .finish()
    }
}
