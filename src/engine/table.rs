use dashmap::DashMap;

use super::log::Record;
use crate::directory::{PartitionId, Partitioner};
use crate::store::{LocalStore, StoreUnavailable};

/// The partitions of a table this member currently holds.
///
/// A partition only becomes visible once it is fully restored; until then
/// reads of its keys are `StoreUnavailable`.
pub struct MaterializedTable {
    name: String,
    partitioner: Partitioner,
    partitions: DashMap<PartitionId, DashMap<String, String>>,
}

impl MaterializedTable {
    pub fn new(name: impl Into<String>, partitioner: Partitioner) -> Self {
        Self {
            name: name.into(),
            partitioner,
            partitions: DashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Builds the contents of a partition by replaying records in order.
    pub fn restore<'a>(records: impl IntoIterator<Item = &'a Record>) -> DashMap<String, String> {
        let data = DashMap::new();
        for record in records {
            apply_to(&data, record);
        }
        data
    }

    pub fn install_partition(&self, partition: PartitionId, data: DashMap<String, String>) {
        self.partitions.insert(partition, data);
    }

    /// Applies a record to an installed partition. Returns false if the
    /// partition is not held here.
    pub fn apply(&self, partition: PartitionId, record: &Record) -> bool {
        match self.partitions.get(&partition) {
            Some(data) => {
                apply_to(&data, record);
                true
            }
            None => false,
        }
    }

    pub fn drop_partition(&self, partition: PartitionId) -> bool {
        self.partitions.remove(&partition).is_some()
    }

    pub fn clear(&self) {
        self.partitions.clear();
    }

    pub fn owned_partitions(&self) -> Vec<PartitionId> {
        let mut owned: Vec<PartitionId> = self.partitions.iter().map(|entry| *entry.key()).collect();
        owned.sort_unstable();
        owned
    }

    pub fn entry_count(&self) -> usize {
        self.partitions.iter().map(|entry| entry.value().len()).sum()
    }
}

fn apply_to(data: &DashMap<String, String>, record: &Record) {
    match &record.value {
        Some(value) => {
            data.insert(record.key.clone(), value.clone());
        }
        None => {
            data.remove(&record.key);
        }
    }
}

impl LocalStore for MaterializedTable {
    fn get_local(&self, key: &str) -> Result<Option<String>, StoreUnavailable> {
        let partition = self.partitioner.partition_for(key);
        match self.partitions.get(&partition) {
            Some(data) => Ok(data.get(key).map(|value| value.clone())),
            None => Err(StoreUnavailable(format!(
                "partition {} of {} is not available on this member",
                partition, self.name
            ))),
        }
    }
}
