//! ClawBridge host adapters
//!
//! Implements the clawbridge-core extension traits (`Comparator`,
//! `FilterPolicy`, `AssociativeMergeOperator`, `MergeOperator`,
//! `SliceTransform`) over host-supplied capability objects.
//!
//! # Architecture
//!
//! The engine calls extension points synchronously, from any of its threads,
//! through signatures with no room for foreign failures. The bridge works as
//! follows:
//! - The host implements a `Host*` trait (or passes a closure); the object
//!   itself is the opaque context and is never inspected by the adapter
//! - Every callback receives a fresh `CallScope` holding an `ErrorSignal` and
//!   the adapter's diagnostic sink
//! - After the callback returns, a non-empty signal becomes
//!   `BridgeError::Callback` (or a declined merge) before the return value is
//!   trusted
//! - The engine attaches its diagnostic sink once, after construction

pub mod filter;
pub mod identity;
pub mod merge;
pub mod merge_operators;
pub mod ordering;
pub mod scope;
pub mod transform;

pub use filter::{FilterAdapter, HostFilterPolicy};
pub use identity::AdapterIdentity;
pub use merge::{AssociativeMergeAdapter, HostAssociativeMerge, HostMergeOperator, MergeAdapter};
pub use merge_operators::{StringAppendOperator, UintAddOperator};
pub use ordering::{HostComparator, OrderingAdapter};
pub use scope::{CallScope, ErrorSignal};
pub use transform::{HostSliceTransform, KeyTransformAdapter};
