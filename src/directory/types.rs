use serde::{Deserialize, Serialize};
use std::fmt;

/// Partition identifier within the source topic.
pub type PartitionId = u32;

/// A cluster participant, identified by its advertised HTTP endpoint.
///
/// Ordering is `(host, port)`, which is also the order partitions are dealt
/// out in by [`Assignment`](super::partitioner::Assignment).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Member {
    pub host: String,
    pub port: u16,
}

impl Member {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A member together with the partitions it currently owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberPartitions {
    pub member: Member,
    pub partitions: Vec<PartitionId>,
}
