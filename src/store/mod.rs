//! Local Store Accessor
//!
//! Read-only access to the partitions this member currently materializes.
//!
//! A read either finds a value, finds nothing, or fails with
//! `StoreUnavailable` when the store cannot answer yet (startup, or the key's
//! partition is still being restored after a rebalance). Callers must not
//! treat the last case as "not found".

pub mod memory;

pub use memory::MemoryStore;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("local store unavailable: {0}")]
pub struct StoreUnavailable(pub String);

pub trait LocalStore: Send + Sync {
    fn get_local(&self, key: &str) -> Result<Option<String>, StoreUnavailable>;
}
