//! Table Engine
//!
//! Materializes a partitioned topic into a key-value table spread over the
//! members of one application.
//!
//! ## Data Flow
//! - **Topic Log**: one JSON-lines file per partition under `{log.dir}/{topic}/`.
//!   A `null` value is a tombstone.
//! - **Assignment**: every `poll.interval.ms` the engine takes the alive members
//!   from gossip, sorts them, and assigns partition `p` to `members[p % n]`.
//! - **Restore & Tail**: newly owned partitions are replayed from the start and
//!   only then made visible; owned partitions are tailed for new records;
//!   partitions lost to another member are dropped.
//!
//! The engine exposes what the lookup path needs through [`EngineDirectory`]
//! and [`EngineStore`].

pub mod adapters;
pub mod log;
pub mod service;
pub mod table;

#[cfg(test)]
mod tests;

pub use adapters::{EngineDirectory, EngineStore, string_key_encoder};
pub use log::{Record, TopicLog};
pub use service::{MaterializedView, TableEngine};
pub use table::MaterializedTable;
