//! ClawBridge Core: Engine-Side Extension Points
//!
//! The contracts a key-value engine calls into when it needs behavior it does
//! not own: key ordering, probabilistic filters, merge resolution, prefix
//! extraction. Each contract is a trait; implementations may live anywhere,
//! including a host process reached through callbacks.
//!
//! # Architecture
//!
//! - **Extension traits**: `Comparator`, `FilterPolicy`, `MergeOperator`, `SliceTransform`
//! - **Diagnostics**: a sink the engine attaches once after construction
//! - **Write batches**: checksummed record stream plus a validating decoder
//! - **Reference engine**: memtables and frozen runs that drive every extension point
//!
//! # No Host Assumptions
//!
//! Nothing here knows how a host represents callbacks or context.
//! Host adapters live in a separate crate (clawbridge-host).

pub mod config;
pub mod decoder;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod extension;
pub mod filter_index;
pub mod format;
pub mod memtable;
pub mod options;
pub mod write_batch;

// Re-export key types for convenience
pub use config::{Config, MergeFailurePolicy};
pub use decoder::{decode, iterate, BatchHandler, BatchItem, ItemCollector};
pub use diagnostics::{DiagnosticSink, LogLevel, LogRecord, RecordingSink, SinkSlot, TracingSink};
pub use engine::BridgeEngine;
pub use error::{BridgeError, BridgeResult};
pub use extension::{
    AssociativeFold, AssociativeMergeOperator, BytewiseComparator, Comparator, Extension, ExtensionKind,
    FilterPolicy, MergeOperator, MergeOutcome, SliceTransform,
};
pub use format::{ColumnFamilyId, OpType};
pub use options::Options;
pub use write_batch::WriteBatch;
