//! Common types used across the memory layer.
//!
//! The closed [`MemoryType`] enumeration is the single routing authority:
//! collection, embedding model, truncation policy and source authority are
//! all derived from the tag, never decided ad hoc at call sites.

mod memory_type;
mod record;

pub use memory_type::{Collection, MemoryType, ModelKind, TruncationPolicy};
pub use record::{
    content_hash, EmbeddingStatus, MemoryRecord, StoreOutcome, StoreStatus,
    SOURCE_HOOK_WHITELIST,
};

#[cfg(test)]
mod tests;
