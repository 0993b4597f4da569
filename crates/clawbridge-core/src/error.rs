//! Error types for ClawBridge operations
//!
//! All ClawBridge errors are represented by the BridgeError enum. Foreign-call
//! failures keep the host's message text untouched so the engine can surface it
//! to whoever configured the extension.

use thiserror::Error;

use crate::extension::ExtensionKind;

/// ClawBridge error types with detailed context
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// A host callback reported failure through its error signal.
    /// Fatal to the engine operation that triggered the call.
    #[error("{extension} '{adapter}' callback failed: {message}")]
    Callback {
        /// Which extension point was being invoked
        extension: ExtensionKind,
        /// Display name of the adapter instance
        adapter: String,
        /// Message written by the host, verbatim
        message: String,
    },

    /// Write batch could not be walked to completion
    #[error("write batch corrupted at offset {offset}: {reason}")]
    Corruption {
        /// Byte offset where the walk stopped
        offset: u64,
        /// Description of the corruption
        reason: String,
    },

    /// Write batch body checksum did not match its header
    #[error("write batch checksum mismatch: expected 0x{expected:08x}, got 0x{actual:08x}")]
    ChecksumMismatch {
        /// Checksum recorded in the header
        expected: u32,
        /// Checksum computed over the body
        actual: u32,
    },

    /// The engine's merge policy requires a declined merge to be reported
    #[error("merge declined for key {key:?}: {reason}")]
    MergeFailed {
        /// Key whose operands could not be merged
        key: Vec<u8>,
        /// Reason given by the merge operator, or a generic one
        reason: String,
    },

    /// Entry size exceeds maximum allowed
    #[error("entry {component} too large: {entry_size} bytes exceeds limit of {max_size} bytes")]
    OversizedEntry {
        /// Size of the oversized entry
        entry_size: u64,
        /// Maximum allowed size
        max_size: u64,
        /// Whether it's the key or value that's oversized
        component: String,
    },

    /// The engine already attached a diagnostic sink to this adapter
    #[error("diagnostic sink already attached to '{adapter}'")]
    SinkAlreadyAttached {
        /// Display name of the adapter instance
        adapter: String,
    },

    /// Caller passed an argument the contract forbids
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation needs an extension point that was not configured
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Configuration failed validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BridgeError {
    /// Build a foreign-call failure for the given extension and adapter name.
    pub fn callback(extension: ExtensionKind, adapter: impl Into<String>, message: impl Into<String>) -> Self {
        BridgeError::Callback {
            extension,
            adapter: adapter.into(),
            message: message.into(),
        }
    }

    /// Build a structural decode failure.
    pub fn corruption(offset: usize, reason: impl Into<String>) -> Self {
        BridgeError::Corruption {
            offset: offset as u64,
            reason: reason.into(),
        }
    }

    /// The host's own message when this is a foreign-call failure.
    pub fn callback_message(&self) -> Option<&str> {
        match self {
            BridgeError::Callback { message, .. } => Some(message),
            _ => None,
        }
    }

    /// True for failures that mean a write batch cannot be trusted.
    pub fn is_corruption(&self) -> bool {
        matches!(self, BridgeError::Corruption { .. } | BridgeError::ChecksumMismatch { .. })
    }
}

/// Result type alias for ClawBridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
