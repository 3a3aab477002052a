//! Partition Directory
//!
//! Read-only view of cluster membership and partition ownership.
//!
//! The directory is produced by whatever engine materializes the table; the
//! lookup core only ever asks two questions of it:
//! - **Who owns this key?** `locate_owner` answers with a `Member`, or with
//!   `None` while the cluster has not assigned the key's partition yet.
//! - **Who owns what?** `list_members` lists every member with its partitions.
//!
//! Snapshots are eventually consistent. During startup or a rebalance they may
//! be empty or stale, and callers treat that as temporary unavailability.

pub mod partitioner;
pub mod types;


pub use partitioner::{Assignment, Partitioner};
pub use types::{Member, MemberPartitions, PartitionId};

pub trait PartitionDirectory: Send + Sync {
    /// Owner of the partition `key` hashes to, if one is assigned.
    fn locate_owner(&self, key: &str) -> Option<Member>;

    /// Every known member with the partitions it owns, sorted by member.
    fn list_members(&self) -> Vec<MemberPartitions>;
}

/// Directory over a fixed member list.
///
/// Used for statically configured clusters and to stand in for the engine in
/// tests: ownership never changes after construction.
#[derive(Debug, Clone)]
pub struct StaticDirectory {
    partitioner: Partitioner,
    assignment: Assignment,
}

impl StaticDirectory {
    pub fn new(members: Vec<Member>, num_partitions: u32) -> Self {
        let partitioner = Partitioner::new(num_partitions);
        Self {
            partitioner,
            assignment: Assignment::new(members, partitioner.num_partitions()),
        }
    }

    /// A directory for a cluster that has not assigned any partition yet.
    pub fn unassigned(num_partitions: u32) -> Self {
        Self::new(Vec::new(), num_partitions)
    }

    pub fn partitioner(&self) -> &Partitioner {
        &self.partitioner
    }

    pub fn assignment(&self) -> &Assignment {
        &self.assignment
    }
}

impl PartitionDirectory for StaticDirectory {
    fn locate_owner(&self, key: &str) -> Option<Member> {
        let partition = self.partitioner.partition_for(key);
        self.assignment.owner(partition).cloned()
    }

    fn list_members(&self) -> Vec<MemberPartitions> {
        self.assignment.members()
    }
}
