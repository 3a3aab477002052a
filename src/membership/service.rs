use anyhow::Result;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use std::{net::SocketAddr, time::Duration};
use tokio::net::UdpSocket;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::info;

use super::types::{Envelope, GossipMessage, Node, NodeId, NodeState};
use crate::directory::Member;

const GOSSIP_INTERVAL: Duration = Duration::from_millis(500);
const FAILURE_DETECTION_INTERVAL: Duration = Duration::from_secs(2);
const SUSPECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEAD_TIMEOUT: Duration = Duration::from_secs(10);
/// Dead nodes are forgotten this long after they were last heard from.
const DEAD_RETENTION: Duration = Duration::from_secs(30);

pub struct MembershipService {
    pub local_node: Node,
    pub members: Arc<DashMap<NodeId, Node>>,
    cluster: String,
    socket: Arc<UdpSocket>,
    incarnation: Arc<RwLock<u64>>,
    seed_nodes: Vec<SocketAddr>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MembershipService {
    pub async fn new(
        cluster: &str,
        bind_addr: SocketAddr,
        advertised: Member,
        seed_nodes: Vec<SocketAddr>,
    ) -> Result<Arc<Self>> {
        let socket = UdpSocket::bind(bind_addr).await?;
        let gossip_addr = socket.local_addr()?;
        let incarnation_counter = Arc::new(RwLock::new(1));
        let current_inc = *incarnation_counter.read().await;
        let local_node = Node {
            id: NodeId::new(),
            gossip_addr,
            member: advertised,
            state: NodeState::Alive,
            incarnation: current_inc,
            last_seen: Some(Instant::now()),
        };
        let members = Arc::new(DashMap::new());
        members.insert(local_node.id.clone(), local_node.clone());

        let service = Arc::new(Self {
            local_node,
            members,
            cluster: cluster.to_string(),
            socket: Arc::new(socket),
            incarnation: incarnation_counter,
            seed_nodes,
            tasks: Mutex::new(Vec::new()),
        });

        if !service.seed_nodes.is_empty() {
            info!("Joining cluster via {} seed node(s)", service.seed_nodes.len());
            service.join_seeds().await?;
        }

        Ok(service)
    }

    async fn join_seeds(&self) -> Result<()> {
        let mut node = self.local_node.clone();
        node.incarnation = *self.incarnation.read().await;

        for seed_node in self.seed_nodes.iter() {
            if *seed_node == self.local_node.gossip_addr {
                continue;
            }
            let msg = GossipMessage::Join { node: node.clone() };
            self.send(msg, *seed_node).await?;
            tracing::debug!("Sent join request to {}", seed_node);
        }
        Ok(())
    }

    pub async fn start(self: Arc<Self>) {
        tracing::info!("Starting membership service...");

        let gossip_handle = {
            let service = self.clone();
            tokio::spawn(async move {
                service.gossip_loop().await;
            })
        };

        let receive_handle = {
            let service = self.clone();
            tokio::spawn(async move {
                service.receive_loop().await;
            })
        };

        let failure_detection_handle = {
            let service = self.clone();
            tokio::spawn(async move {
                service.failure_detection_loop().await;
            })
        };

        self.tasks
            .lock()
            .extend([gossip_handle, receive_handle, failure_detection_handle]);

        tracing::info!("All background tasks started");
    }

    /// Tells alive peers this node is going away and stops the background tasks.
    pub async fn leave(&self) {
        let msg = GossipMessage::Leave {
            node_id: self.local_node.id.clone(),
        };
        self.broadcast_message(msg).await;

        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
        tracing::info!("Left cluster {}", self.cluster);
    }

    pub fn get_alive_members(&self) -> Vec<Node> {
        self.members
            .iter()
            .filter(|entry| entry.value().state == NodeState::Alive)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Advertised endpoints of alive nodes, sorted and deduplicated.
    pub fn alive_members(&self) -> Vec<Member> {
        let mut members: Vec<Member> = self
            .get_alive_members()
            .into_iter()
            .map(|node| node.member)
            .collect();
        members.sort();
        members.dedup();
        members
    }

    pub fn get_member(&self, node_id: &NodeId) -> Option<Node> {
        self.members.get(node_id).map(|entry| entry.value().clone())
    }

    async fn send(&self, message: GossipMessage, target: SocketAddr) -> Result<()> {
        let envelope = Envelope {
            cluster: self.cluster.clone(),
            message,
        };
        let encoded = bincode::serialize(&envelope)?;
        self.socket.send_to(&encoded, target).await?;
        Ok(())
    }

    async fn gossip_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(GOSSIP_INTERVAL);

        loop {
            interval.tick().await;

            let (alive, unreachable): (Vec<Node>, Vec<Node>) = self
                .members
                .iter()
                .filter(|entry| entry.value().id != self.local_node.id)
                .map(|entry| entry.value().clone())
                .partition(|node| node.state == NodeState::Alive);

            if alive.is_empty() {
                // Alone, possibly after being declared dead by everybody else.
                if let Err(e) = self.join_seeds().await {
                    tracing::warn!("Failed to contact seed nodes: {}", e);
                }
            }

            // One alive peer per round, plus one suspect or dead peer so a
            // node that comes back gets the chance to refute.
            let targets = {
                use rand::seq::SliceRandom;
                let mut rng = rand::thread_rng();
                [alive.choose(&mut rng), unreachable.choose(&mut rng)]
                    .into_iter()
                    .flatten()
                    .cloned()
                    .collect::<Vec<Node>>()
            };

            let incarnation = *self.incarnation.read().await;
            for target in targets {
                let msg = GossipMessage::Ping {
                    from: self.local_node.id.clone(),
                    member: self.local_node.member.clone(),
                    incarnation,
                };

                if let Err(e) = self.send(msg, target.gossip_addr).await {
                    tracing::warn!("Failed to send ping to {:?}: {}", target.id, e);
                } else {
                    tracing::debug!("Sent ping to {:?}", target.id);
                }
            }
        }
    }

    async fn receive_loop(self: Arc<Self>) {
        let mut buf = vec![0u8; 65536];

        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((len, src)) => match bincode::deserialize::<Envelope>(&buf[..len]) {
                    Ok(envelope) if envelope.cluster == self.cluster => {
                        if let Err(e) = self.handle_message(envelope.message, src).await {
                            tracing::error!("Error handling message from {}: {}", src, e);
                        }
                    }
                    Ok(envelope) => {
                        tracing::debug!(
                            "Ignoring gossip for cluster {:?} from {}",
                            envelope.cluster,
                            src
                        );
                    }
                    Err(e) => {
                        tracing::warn!("Failed to deserialize message from {}: {}", src, e);
                    }
                },
                Err(e) => {
                    tracing::error!("Failed to receive UDP packet: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    pub(crate) async fn handle_message(&self, msg: GossipMessage, src: SocketAddr) -> Result<()> {
        match msg {
            GossipMessage::Ping {
                from,
                member,
                incarnation,
            } => {
                self.handle_ping(from, member, incarnation, src).await?;
            }

            GossipMessage::Ack {
                from,
                incarnation,
                members,
            } => {
                self.handle_ack(from, incarnation, members).await?;
            }

            GossipMessage::Join { node } => {
                self.handle_join(node, src).await?;
            }

            GossipMessage::Suspect {
                node_id,
                incarnation,
            } => {
                self.handle_suspect(node_id, incarnation).await?;
            }

            GossipMessage::Alive {
                node_id,
                incarnation,
            } => {
                self.handle_alive(node_id, incarnation).await?;
            }

            GossipMessage::Leave { node_id } => {
                self.handle_leave(node_id);
            }
        }

        Ok(())
    }

    async fn handle_ping(
        &self,
        from: NodeId,
        member: Member,
        from_incarnation: u64,
        src: SocketAddr,
    ) -> Result<()> {
        tracing::debug!("Received ping from {:?}", from);

        let mut accusation = None;
        if let Some(mut existing) = self.members.get_mut(&from) {
            existing.last_seen = Some(Instant::now());

            if from_incarnation > existing.incarnation {
                existing.incarnation = from_incarnation;
                existing.state = NodeState::Alive;
            } else if existing.state != NodeState::Alive {
                // The sender cannot refute a suspicion it never heard of.
                accusation = Some(GossipMessage::Suspect {
                    node_id: from.clone(),
                    incarnation: existing.incarnation,
                });
            }
        } else {
            tracing::info!("Discovered new member via ping: {} at {}", member, src);

            let new_node = Node {
                id: from.clone(),
                gossip_addr: src,
                member,
                state: NodeState::Alive,
                incarnation: from_incarnation,
                last_seen: Some(Instant::now()),
            };

            self.members.insert(new_node.id.clone(), new_node);
        }

        if let Some(msg) = accusation {
            tracing::debug!("Telling {:?} it is suspected", from);
            self.send(msg, src).await?;
        }

        self.send_ack(src).await?;
        tracing::debug!("Sent ack to {:?} with {} members", from, self.members.len());

        Ok(())
    }

    async fn send_ack(&self, target: SocketAddr) -> Result<()> {
        let all_members: Vec<Node> = self
            .members
            .iter()
            .filter(|entry| entry.value().state != NodeState::Dead)
            .map(|entry| entry.value().clone())
            .collect();

        let my_incarnation = *self.incarnation.read().await;
        let reply = GossipMessage::Ack {
            from: self.local_node.id.clone(),
            incarnation: my_incarnation,
            members: all_members,
        };

        self.send(reply, target).await
    }

    async fn handle_ack(
        &self,
        from: NodeId,
        from_incarnation: u64,
        members: Vec<Node>,
    ) -> Result<()> {
        tracing::debug!(
            "Received ack from {:?} (inc={}) with {} members",
            from,
            from_incarnation,
            members.len()
        );

        if let Some(mut member) = self.members.get_mut(&from) {
            member.last_seen = Some(Instant::now());
            if from_incarnation > member.incarnation {
                member.incarnation = from_incarnation;
                member.state = NodeState::Alive;
            }
        }

        for member in members {
            self.merge_member(member);
        }

        Ok(())
    }

    fn merge_member(&self, new_member: Node) {
        if new_member.id == self.local_node.id {
            return;
        }

        match self.members.get_mut(&new_member.id) {
            Some(mut existing) => {
                if new_member.incarnation > existing.incarnation {
                    tracing::debug!(
                        "Updating {:?}: inc {} -> {}",
                        new_member.id,
                        existing.incarnation,
                        new_member.incarnation,
                    );

                    existing.state = new_member.state;
                    existing.incarnation = new_member.incarnation;
                    existing.last_seen = Some(Instant::now());
                } else if new_member.incarnation == existing.incarnation
                    && new_member.state == NodeState::Alive
                    && existing.state == NodeState::Suspect
                {
                    tracing::info!("{:?} refuted suspicion", new_member.id);
                    existing.state = NodeState::Alive;
                    existing.last_seen = Some(Instant::now());
                }
            }
            None => {
                if new_member.state == NodeState::Dead {
                    return;
                }
                tracing::info!(
                    "Discovered new member: {} at {}",
                    new_member.member,
                    new_member.gossip_addr
                );

                let mut member_with_timestamp = new_member;
                member_with_timestamp.last_seen = Some(Instant::now());

                self.members
                    .insert(member_with_timestamp.id.clone(), member_with_timestamp);
            }
        }
    }

    async fn handle_suspect(&self, node_id: NodeId, incarnation: u64) -> Result<()> {
        if node_id == self.local_node.id {
            let my_incarnation = {
                let mut inc = self.incarnation.write().await;
                if incarnation < *inc {
                    return Ok(());
                }
                *inc = incarnation + 1;
                *inc
            };
            tracing::info!("Refuting suspicion of {}", self.local_node.member);

            if let Some(mut me) = self.members.get_mut(&node_id) {
                me.incarnation = my_incarnation;
                me.state = NodeState::Alive;
                me.last_seen = Some(Instant::now());
            }

            let msg = GossipMessage::Alive {
                node_id,
                incarnation: my_incarnation,
            };
            self.broadcast_message(msg).await;
            return Ok(());
        }

        match self.members.get_mut(&node_id) {
            Some(mut existing) => {
                if incarnation >= existing.incarnation && existing.state == NodeState::Alive {
                    tracing::info!("Node {} suspected", existing.member);
                    existing.state = NodeState::Suspect;
                    existing.incarnation = incarnation;
                    existing.last_seen = Some(Instant::now());
                }
            }
            None => {
                tracing::debug!("Suspected node {:?} doesn't exist", node_id);
            }
        }

        Ok(())
    }

    async fn handle_alive(&self, node_id: NodeId, incarnation: u64) -> Result<()> {
        match self.members.get_mut(&node_id) {
            Some(mut existing) => {
                if incarnation > existing.incarnation {
                    tracing::info!(
                        "Node {} is now Alive (inc={})",
                        existing.member,
                        incarnation
                    );
                    existing.state = NodeState::Alive;
                    existing.incarnation = incarnation;
                    existing.last_seen = Some(Instant::now());
                } else if incarnation == existing.incarnation
                    && existing.state == NodeState::Suspect
                {
                    tracing::info!("Node {} successfully refuted suspicion", existing.member);
                    existing.state = NodeState::Alive;
                    existing.last_seen = Some(Instant::now());
                }
            }
            None => {
                tracing::debug!("Alive message for unknown node {:?}", node_id);
            }
        }

        Ok(())
    }

    async fn handle_join(&self, mut node: Node, src: SocketAddr) -> Result<()> {
        tracing::info!("Node {} joining cluster from {}", node.member, src);

        node.last_seen = Some(Instant::now());
        node.state = NodeState::Alive;
        self.members.insert(node.id.clone(), node);

        tracing::info!("Cluster size now: {}", self.get_alive_members().len());

        // The joiner knows nobody yet; hand it the current view right away.
        self.send_ack(src).await
    }

    fn handle_leave(&self, node_id: NodeId) {
        if node_id == self.local_node.id {
            return;
        }
        if let Some(mut existing) = self.members.get_mut(&node_id) {
            tracing::info!("Node {} left the cluster", existing.member);
            existing.state = NodeState::Dead;
        }
    }

    async fn failure_detection_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(FAILURE_DETECTION_INTERVAL);

        loop {
            interval.tick().await;

            for (msg, suspect_addr) in self.detect_failures(Instant::now()) {
                self.broadcast_message(msg.clone()).await;
                // The suspect itself is no longer Alive here, so tell it directly.
                if let Err(e) = self.send(msg, suspect_addr).await {
                    tracing::warn!("Failed to notify suspect at {}: {}", suspect_addr, e);
                }
            }
        }
    }

    /// Advances node states by silence at `now` and forgets long-dead nodes.
    /// Returns the `Suspect` messages to send, with the suspect's address.
    pub(crate) fn detect_failures(&self, now: Instant) -> Vec<(GossipMessage, SocketAddr)> {
        let mut suspicions = Vec::new();
        let mut forgotten = Vec::new();

        for mut entry in self.members.iter_mut() {
            let member = entry.value_mut();

            if member.id == self.local_node.id {
                continue;
            }

            let Some(last_seen) = member.last_seen else {
                member.last_seen = Some(now);
                continue;
            };
            let elapsed = now.saturating_duration_since(last_seen);

            match member.state {
                NodeState::Alive => {
                    if elapsed > SUSPECT_TIMEOUT {
                        tracing::warn!(
                            "Node {} suspected (no contact for {:?})",
                            member.member,
                            elapsed
                        );

                        member.state = NodeState::Suspect;

                        suspicions.push((
                            GossipMessage::Suspect {
                                node_id: member.id.clone(),
                                incarnation: member.incarnation,
                            },
                            member.gossip_addr,
                        ));
                    }
                }

                NodeState::Suspect => {
                    if elapsed > DEAD_TIMEOUT {
                        tracing::info!(
                            "Node {} declared DEAD (no contact for {:?})",
                            member.member,
                            elapsed
                        );

                        member.state = NodeState::Dead;
                    }
                }

                NodeState::Dead => {
                    if elapsed > DEAD_RETENTION {
                        forgotten.push(member.id.clone());
                    }
                }
            }
        }

        for node_id in forgotten {
            if let Some((_, node)) = self.members.remove(&node_id) {
                tracing::debug!("Forgetting dead node {} ({:?})", node.member, node.id);
            }
        }

        suspicions
    }

    async fn broadcast_message(&self, msg: GossipMessage) {
        let targets: Vec<SocketAddr> = self
            .members
            .iter()
            .filter(|entry| {
                entry.value().id != self.local_node.id && entry.value().state == NodeState::Alive
            })
            .map(|entry| entry.value().gossip_addr)
            .collect();

        for target in targets {
            if let Err(e) = self.send(msg.clone(), target).await {
                tracing::warn!("Failed to broadcast to {}: {}", target, e);
            }
        }
    }
}

