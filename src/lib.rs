//! Streams Store Library
//!
//! Interactive point lookups over a key-value table that is partitioned across
//! the members of one application. Any member answers any key: it serves keys
//! it owns from its local store and forwards the rest, once, to the owner.
//!
//! ## Architecture Modules
//! - **`config`**: Command-line flags and engine properties.
//! - **`directory`**: Partition ownership. Key hashing, assignment of
//!   partitions to members, and the `PartitionDirectory` view the router reads.
//! - **`store`**: The `LocalStore` view of locally materialized data.
//! - **`remote`**: `RemoteFetch`, one HTTP call to the owning member.
//! - **`router`**: `KeyRouter`, the per-key decision between local read and forward.
//! - **`gateway`**: The axum HTTP surface and status-code translation.
//! - **`membership`**: UDP gossip (SWIM-like) discovery and failure detection.
//! - **`engine`**: `TableEngine`, which materializes a topic log into the
//!   table and keeps partition ownership in step with membership.

pub mod config;
pub mod directory;
pub mod engine;
pub mod gateway;
pub mod membership;
pub mod remote;
pub mod router;
pub mod store;
