//! Membership & Discovery Module
//!
//! Gossip-based membership (inspired by SWIM) used by the table engine to learn
//! which processes of the same application are alive.
//!
//! ## Core Mechanisms
//! - **Gossip Protocol**: Nodes periodically ping a random peer over UDP and merge the member list in the reply.
//! - **Application Scoping**: Every datagram carries the application id; traffic from other applications is dropped.
//! - **Failure Detection**: "Suspect" -> "Dead" transitions driven by timeouts; a `Leave` marks a node dead at once.
//! - **Incarnation Numbers**: Resolve disputes about a node's state (Alive/Suspect).
//!
//! Each node advertises its HTTP endpoint (`Member`); the sorted set of alive
//! endpoints is what partitions get assigned to.

pub mod service;
pub mod types;


pub use service::MembershipService;
pub use types::{Envelope, GossipMessage, Node, NodeId, NodeState};
