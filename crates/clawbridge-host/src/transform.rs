//! KeyTransformAdapter: the engine's prefix extractor, backed by host logic.
//!
//! `transform` is only defined for keys where `in_domain` holds. The adapter
//! enforces that itself: before forwarding a `transform` call it asks the host
//! `in_domain`, and an out-of-domain key is rejected without reaching the
//! host's `transform`.

use std::fmt;
use std::sync::Arc;

use clawbridge_core::{BridgeError, BridgeResult, DiagnosticSink, Extension, ExtensionKind, SinkSlot, SliceTransform};

use crate::identity::AdapterIdentity;
use crate::scope::{invoke, CallScope};

/// Host-side prefix extractor capability. All three methods must be pure.
pub trait HostSliceTransform: Send + Sync {
    /// Prefix of `key`. Only called when `in_domain(key)` is true.
    fn transform(&self, scope: &mut CallScope<'_>, key: &[u8]) -> Vec<u8>;

    fn in_domain(&self, scope: &mut CallScope<'_>, key: &[u8]) -> bool;

    /// Whether `prefix` is something `transform` can return.
    fn in_range(&self, scope: &mut CallScope<'_>, prefix: &[u8]) -> bool;
}

/// Prefix-extractor extension point forwarding to a `HostSliceTransform`
pub struct KeyTransformAdapter {
    identity: AdapterIdentity,
    host: Arc<dyn HostSliceTransform>,
    sink: SinkSlot,
}

impl KeyTransformAdapter {
    pub fn new(name: impl Into<Vec<u8>>, host: Arc<dyn HostSliceTransform>) -> Self {
        Self { identity: AdapterIdentity::new(name), host, sink: SinkSlot::new() }
    }

    pub fn identity(&self) -> &AdapterIdentity {
        &self.identity
    }

    pub fn is_sink_attached(&self) -> bool {
        self.sink.is_attached()
    }
}

impl Extension for KeyTransformAdapter {
    fn name(&self) -> &[u8] {
        self.identity.as_bytes()
    }

    fn attach_diagnostic_sink(&self, sink: Arc<dyn DiagnosticSink>) -> BridgeResult<()> {
        self.sink.attach(&self.identity.to_string(), sink)
    }
}

impl SliceTransform for KeyTransformAdapter {
    fn transform(&self, key: &[u8]) -> BridgeResult<Vec<u8>> {
        if !self.in_domain(key)? {
            return Err(BridgeError::InvalidArgument(format!(
                "key {:?} is outside the domain of '{}'",
                String::from_utf8_lossy(key),
                self.identity
            )));
        }
        invoke(ExtensionKind::SliceTransform, &self.identity, &self.sink, |scope| {
            self.host.transform(scope, key)
        })
    }

    fn in_domain(&self, key: &[u8]) -> BridgeResult<bool> {
        invoke(ExtensionKind::SliceTransform, &self.identity, &self.sink, |scope| {
            self.host.in_domain(scope, key)
        })
    }

    fn in_range(&self, prefix: &[u8]) -> BridgeResult<bool> {
        invoke(ExtensionKind::SliceTransform, &self.identity, &self.sink, |scope| {
            self.host.in_range(scope, prefix)
        })
    }
}

impl fmt::Debug for KeyTransformAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyTransformAdapter")
            .field("identity", &self.identity)
            .field("sink", &self.sink)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fixed 3-byte prefix; counts how often `transform` runs
    #[derive(Default)]
    struct FixedPrefix {
        transforms: AtomicUsize,
    }

    impl HostSliceTransform for FixedPrefix {
        fn transform(&self, scope: &mut CallScope<'_>, key: &[u8]) -> Vec<u8> {
            self.transforms.fetch_add(1, Ordering::SeqCst);
            if key.len() < 3 {
                scope.fail("transform called outside domain");
                return Vec::new();
            }
            key[..3].to_vec()
        }

        fn in_domain(&self, _scope: &mut CallScope<'_>, key: &[u8]) -> bool {
            key.len() >= 3
        }

        fn in_range(&self, _scope: &mut CallScope<'_>, prefix: &[u8]) -> bool {
            prefix.len() == 3
        }
    }

    #[test]
    fn test_transform_in_domain() {
        let adapter = KeyTransformAdapter::new("fixed3", Arc::new(FixedPrefix::default()));
        assert!(adapter.in_domain(b"user:1").unwrap());
        assert_eq!(adapter.transform(b"user:1").unwrap(), b"use");
        assert!(adapter.in_range(b"use").unwrap());
        assert!(!adapter.in_range(b"us").unwrap());
    }

    #[test]
    fn test_out_of_domain_never_reaches_host() {
        let host = Arc::new(FixedPrefix::default());
        let adapter = KeyTransformAdapter::new("fixed3", host.clone());
        assert!(!adapter.in_domain(b"ab").unwrap());
        assert!(matches!(adapter.transform(b"ab"), Err(BridgeError::InvalidArgument(_))));
        assert_eq!(host.transforms.load(Ordering::SeqCst), 0);
    }

    struct Failing;

    impl HostSliceTransform for Failing {
        fn transform(&self, _scope: &mut CallScope<'_>, key: &[u8]) -> Vec<u8> {
            key.to_vec()
        }

        fn in_domain(&self, scope: &mut CallScope<'_>, _key: &[u8]) -> bool {
            scope.fail("prefix table unavailable");
            true
        }

        fn in_range(&self, _scope: &mut CallScope<'_>, _prefix: &[u8]) -> bool {
            true
        }
    }

    #[test]
    fn test_signal_is_fatal() {
        let adapter = KeyTransformAdapter::new("failing", Arc::new(Failing));
        let err = adapter.in_domain(b"k").unwrap_err();
        assert_eq!(err.callback_message(), Some("prefix table unavailable"));
        assert!(matches!(err, BridgeError::Callback { extension: ExtensionKind::SliceTransform, .. }));
        // transform checks the domain first, so it fails the same way
        assert_eq!(adapter.transform(b"k").unwrap_err().callback_message(), Some("prefix table unavailable"));
    }
}
