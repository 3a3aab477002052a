//! Gateway Wire Protocol
//!
//! Endpoint paths and the JSON bodies exchanged with clients and between
//! members.

use serde::{Deserialize, Serialize};

use crate::directory::{MemberPartitions, PartitionId};

// --- API Endpoints ---

/// Public lookup endpoint; routes to the owning member.
pub const ENDPOINT_GET: &str = "/messages/:key";
/// Public listing of members and the partitions they own.
pub const ENDPOINT_PROCESSORS: &str = "/messages/processors";
/// Peer lookup endpoint; answers from the local store only, never forwards.
pub const ENDPOINT_GET_LOCAL: &str = "/internal/messages/:key";
/// Path segments of [`ENDPOINT_GET_LOCAL`] before the key.
pub const GET_LOCAL_SEGMENTS: [&str; 2] = ["internal", "messages"];

// --- Data Transfer Objects ---

/// A found record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// One entry of the processors listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorMetadata {
    pub host: String,
    pub port: u16,
    pub topic_partitions: Vec<PartitionId>,
}

impl From<MemberPartitions> for ProcessorMetadata {
    fn from(entry: MemberPartitions) -> Self {
        Self {
            host: entry.member.host,
            port: entry.member.port,
            topic_partitions: entry.partitions,
        }
    }
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
