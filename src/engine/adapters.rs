use std::sync::Arc;

use super::service::TableEngine;
use crate::directory::{Member, MemberPartitions, PartitionDirectory};
use crate::store::{LocalStore, StoreUnavailable};

/// Keys are plain strings; the partitioner hashes their UTF-8 bytes.
pub fn string_key_encoder(key: &str) -> Vec<u8> {
    key.as_bytes().to_vec()
}

/// Partition directory backed by the engine's current assignment.
pub struct EngineDirectory {
    engine: Arc<TableEngine>,
    store_name: String,
}

impl EngineDirectory {
    pub fn new(engine: Arc<TableEngine>, store_name: impl Into<String>) -> Self {
        Self {
            engine,
            store_name: store_name.into(),
        }
    }
}

impl PartitionDirectory for EngineDirectory {
    fn locate_owner(&self, key: &str) -> Option<Member> {
        self.engine
            .locate_owner(&self.store_name, key, string_key_encoder)
    }

    fn list_members(&self) -> Vec<MemberPartitions> {
        self.engine.list_all_members(&self.store_name)
    }
}

/// Local store that asks the engine for the table handle on every read, so a
/// closed or not yet ready engine answers `StoreUnavailable`.
pub struct EngineStore {
    engine: Arc<TableEngine>,
    store_name: String,
}

impl EngineStore {
    pub fn new(engine: Arc<TableEngine>, store_name: impl Into<String>) -> Self {
        Self {
            engine,
            store_name: store_name.into(),
        }
    }
}

impl LocalStore for EngineStore {
    fn get_local(&self, key: &str) -> Result<Option<String>, StoreUnavailable> {
        match self.engine.local_store_handle(&self.store_name) {
            Some(table) => table.get_local(key),
            None => Err(StoreUnavailable(format!(
                "store {} is not ready",
                self.store_name
            ))),
        }
    }
}
