//! Adapter identity: the name an adapter reports to the engine.

use std::fmt;

/// Immutable byte-string name of one adapter instance.
///
/// The engine compares names for compatibility checks, so the bytes are kept
/// exactly as given. `Display` is lossy and meant for logs only.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AdapterIdentity {
    name: Box<[u8]>,
}

impl AdapterIdentity {
    pub fn new(name: impl Into<Vec<u8>>) -> Self {
        Self { name: name.into().into_boxed_slice() }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.name
    }
}

impl fmt::Display for AdapterIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.name))
    }
}

impl fmt::Debug for AdapterIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AdapterIdentity({:?})", String::from_utf8_lossy(&self.name))
    }
}
