use super::types::{Member, MemberPartitions, PartitionId};

const MURMUR2_SEED: u32 = 0x9747_b28c;
const MURMUR2_M: u32 = 0x5bd1_e995;
const MURMUR2_R: u32 = 24;

/// Maps keys onto the partitions of the source topic.
///
/// Uses the same murmur2 hash as the Kafka default partitioner, so keys land
/// in the partition a Kafka producer would have written them to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partitioner {
    num_partitions: u32,
}

impl Partitioner {
    pub fn new(num_partitions: u32) -> Self {
        Self {
            num_partitions: num_partitions.max(1),
        }
    }

    pub fn num_partitions(&self) -> u32 {
        self.num_partitions
    }

    pub fn partition_for(&self, key: &str) -> PartitionId {
        self.partition_for_bytes(key.as_bytes())
    }

    pub fn partition_for_bytes(&self, key: &[u8]) -> PartitionId {
        (murmur2(key) & 0x7fff_ffff) % self.num_partitions
    }
}

/// Kafka's murmur2 variant (32-bit, seed `0x9747b28c`).
pub fn murmur2(data: &[u8]) -> u32 {
    let length = data.len();
    let mut h = MURMUR2_SEED ^ (length as u32);

    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(MURMUR2_M);
        k ^= k >> MURMUR2_R;
        k = k.wrapping_mul(MURMUR2_M);
        h = h.wrapping_mul(MURMUR2_M);
        h ^= k;
    }

    let tail = chunks.remainder();
    if tail.len() >= 3 {
        h ^= (tail[2] as u32) << 16;
    }
    if tail.len() >= 2 {
        h ^= (tail[1] as u32) << 8;
    }
    if !tail.is_empty() {
        h ^= tail[0] as u32;
        h = h.wrapping_mul(MURMUR2_M);
    }

    h ^= h >> 13;
    h = h.wrapping_mul(MURMUR2_M);
    h ^= h >> 15;
    h
}

/// Partition ownership for one cluster snapshot.
///
/// Members are sorted and deduplicated; partition `p` belongs to
/// `members[p % members.len()]`. An assignment without members owns nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignment {
    members: Vec<Member>,
    num_partitions: u32,
}

impl Assignment {
    pub fn new(mut members: Vec<Member>, num_partitions: u32) -> Self {
        members.sort();
        members.dedup();
        Self {
            members,
            num_partitions,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty() || self.num_partitions == 0
    }

    pub fn num_partitions(&self) -> u32 {
        self.num_partitions
    }

    pub fn owner(&self, partition: PartitionId) -> Option<&Member> {
        if self.is_empty() || partition >= self.num_partitions {
            return None;
        }
        self.members
            .get(partition as usize % self.members.len())
    }

    pub fn partitions_of(&self, member: &Member) -> Vec<PartitionId> {
        (0..self.num_partitions)
            .filter(|&partition| self.owner(partition) == Some(member))
            .collect()
    }

    pub fn members(&self) -> Vec<MemberPartitions> {
        self.members
            .iter()
            .map(|member| MemberPartitions {
                member: member.clone(),
                partitions: self.partitions_of(member),
            })
            .collect()
    }
}
