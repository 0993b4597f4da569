//! Per-invocation call scope handed to every host callback.
//!
//! Engine-side signatures have no room for host failures: a comparator returns
//! an ordering, a filter returns a verdict. The host reports failure instead
//! by writing a message into the scope's `ErrorSignal`. After the callback
//! returns, the adapter inspects the signal before it trusts the returned
//! value, and turns a non-empty message into an error at the boundary.
//!
//! A scope lives for exactly one invocation, so concurrent engine threads each
//! get their own signal and adapters stay free of per-call mutable state.

use std::fmt;

use clawbridge_core::{BridgeError, BridgeResult, ExtensionKind, LogLevel, MergeOutcome, SinkSlot};
use tracing::debug;

use crate::identity::AdapterIdentity;

/// Out-of-band failure slot. Empty means success.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ErrorSignal {
    message: String,
}

impl ErrorSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure. A later call replaces the message.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.message = message.into();
    }

    pub fn is_set(&self) -> bool {
        !self.message.is_empty()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Take the message, leaving the slot empty. `None` when nothing failed.
    pub fn take(&mut self) -> Option<String> {
        if self.message.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.message))
        }
    }
}

/// What a host callback can reach during one invocation
pub struct CallScope<'a> {
    adapter: &'a AdapterIdentity,
    sink: &'a SinkSlot,
    signal: ErrorSignal,
}

impl<'a> CallScope<'a> {
    pub fn new(adapter: &'a AdapterIdentity, sink: &'a SinkSlot) -> Self {
        Self { adapter, sink, signal: ErrorSignal::new() }
    }

    /// Identity of the adapter making this call
    pub fn adapter(&self) -> &AdapterIdentity {
        self.adapter
    }

    /// Log through the engine's diagnostic sink; a no-op before the engine
    /// attaches one.
    pub fn log(&self, level: LogLevel, message: &str) {
        self.sink.log(level, &self.adapter.to_string(), message);
    }

    /// Shorthand for `signal_mut().fail(..)`
    pub fn fail(&mut self, message: impl Into<String>) {
        self.signal.fail(message);
    }

    pub fn signal(&self) -> &ErrorSignal {
        &self.signal
    }

    pub fn signal_mut(&mut self) -> &mut ErrorSignal {
        &mut self.signal
    }

    /// The value the callback returned, or the signalled message.
    pub fn finish<T>(mut self, value: T) -> Result<T, String> {
        match self.signal.take() {
            Some(message) => Err(message),
            None => Ok(value),
        }
    }
}

impl fmt::Debug for CallScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallScope")
            .field("adapter", self.adapter)
            .field("signal", &self.signal)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Boundary helpers shared by the adapters
// ---------------------------------------------------------------------------

/// Run a fallible-by-signal callback; a signalled message becomes
/// `BridgeError::Callback` carrying the text unmodified.
pub(crate) fn invoke<T>(
    kind: ExtensionKind,
    identity: &AdapterIdentity,
    sink: &SinkSlot,
    call: impl FnOnce(&mut CallScope<'_>) -> T,
) -> BridgeResult<T> {
    let mut scope = CallScope::new(identity, sink);
    let value = call(&mut scope);
    scope.finish(value).map_err(|message| {
        debug!(extension = %kind, adapter = %identity, message = %message, "host callback failed");
        BridgeError::callback(kind, identity.to_string(), message)
    })
}

/// Run a merge callback. `None` or a signalled message declines the merge;
/// a merge never raises.
pub(crate) fn invoke_merge(
    identity: &AdapterIdentity,
    sink: &SinkSlot,
    call: impl FnOnce(&mut CallScope<'_>) -> Option<Vec<u8>>,
) -> MergeOutcome {
    let mut scope = CallScope::new(identity, sink);
    let value = call(&mut scope);
    match scope.finish(value) {
        Ok(Some(merged)) => MergeOutcome::Merged(merged),
        Ok(None) => MergeOutcome::Declined { reason: None },
        Err(reason) => MergeOutcome::Declined { reason: Some(reason) },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clawbridge_core::RecordingSink;
    use std::sync::Arc;

    #[test]
    fn test_signal_empty_means_success() {
        let mut signal = ErrorSignal::new();
        assert!(!signal.is_set());
        signal.fail("");
        assert!(!signal.is_set());
        assert_eq!(signal.take(), None);

        signal.fail("disk full");
        assert!(signal.is_set());
        assert_eq!(signal.message(), "disk full");
        assert_eq!(signal.take(), Some("disk full".to_string()));
        assert!(!signal.is_set());
    }

    #[test]
    fn test_invoke_converts_signal() {
        let id = AdapterIdentity::new("cmp");
        let sink = SinkSlot::new();
        let ok = invoke(ExtensionKind::Comparator, &id, &sink, |_| 7);
        assert_eq!(ok, Ok(7));

        let err = invoke(ExtensionKind::Comparator, &id, &sink, |scope| {
            scope.fail("disk full");
            0
        })
        .unwrap_err();
        assert_eq!(err.callback_message(), Some("disk full"));
        assert!(err.to_string().contains("'cmp'"));
    }

    #[test]
    fn test_invoke_merge_declines() {
        let id = AdapterIdentity::new("merge");
        let sink = SinkSlot::new();
        assert_eq!(invoke_merge(&id, &sink, |_| Some(b"v".to_vec())), MergeOutcome::Merged(b"v".to_vec()));
        assert_eq!(invoke_merge(&id, &sink, |_| None), MergeOutcome::Declined { reason: None });

        // The signal wins over a returned value
        let outcome = invoke_merge(&id, &sink, |scope| {
            scope.fail("bad operand");
            Some(b"ignored".to_vec())
        });
        assert_eq!(outcome.reason(), Some("bad operand"));
    }

    #[test]
    fn test_log_goes_to_attached_sink() {
        let id = AdapterIdentity::new("logger");
        let slot = SinkSlot::new();
        CallScope::new(&id, &slot).log(LogLevel::Info, "before attach");

        let recording = Arc::new(RecordingSink::new());
        slot.attach("logger", recording.clone()).unwrap();
        CallScope::new(&id, &slot).log(LogLevel::Warn, "after attach");

        let records = recording.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source, "logger");
        assert_eq!(records[0].message, "after attach");
    }
}
