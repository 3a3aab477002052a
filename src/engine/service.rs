use anyhow::{Result, bail};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::log::TopicLog;
use super::table::MaterializedTable;
use crate::config::EngineConfig;
use crate::directory::{Assignment, Member, MemberPartitions, PartitionId, Partitioner};
use crate::membership::MembershipService;

/// Handle to a table registered with [`TableEngine::build_table`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedView {
    pub topic: String,
    pub store_name: String,
}

struct TableState {
    table: Arc<MaterializedTable>,
    log: TopicLog,
    offsets: DashMap<PartitionId, u64>,
}

pub struct TableEngine {
    application_id: String,
    local: Member,
    config: EngineConfig,
    partitioner: Partitioner,
    membership: Arc<MembershipService>,
    tables: DashMap<String, Arc<TableState>>,
    assignment: RwLock<Option<Assignment>>,
    started: AtomicBool,
    ready: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl TableEngine {
    /// Binds the gossip socket and contacts the seed nodes. Nothing is
    /// materialized until [`start`](Self::start).
    pub async fn new(application_id: &str, local: Member, config: EngineConfig) -> Result<Arc<Self>> {
        let membership = MembershipService::new(
            application_id,
            config.gossip_addr,
            local.clone(),
            config.seed_nodes.clone(),
        )
        .await?;

        info!(
            "Engine for {} on {} (gossip {})",
            application_id, local, membership.local_node.gossip_addr
        );

        Ok(Arc::new(Self {
            application_id: application_id.to_string(),
            local,
            partitioner: Partitioner::new(config.num_partitions),
            config,
            membership,
            tables: DashMap::new(),
            assignment: RwLock::new(None),
            started: AtomicBool::new(false),
            ready: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        }))
    }

    pub fn local_member(&self) -> &Member {
        &self.local
    }

    pub fn membership(&self) -> &Arc<MembershipService> {
        &self.membership
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Registers `source_topic` to be materialized into `store_name`.
    pub fn build_table(&self, source_topic: &str, store_name: &str) -> Result<MaterializedView> {
        if self.started.load(Ordering::Acquire) {
            bail!("cannot add table {} to a started engine", store_name);
        }
        if self.tables.contains_key(store_name) {
            bail!("store {} is already registered", store_name);
        }

        let state = TableState {
            table: Arc::new(MaterializedTable::new(store_name, self.partitioner)),
            log: TopicLog::new(&self.config.log_dir, source_topic, self.partitioner.num_partitions()),
            offsets: DashMap::new(),
        };
        self.tables.insert(store_name.to_string(), Arc::new(state));

        info!("Materializing topic {} into store {}", source_topic, store_name);
        Ok(MaterializedView {
            topic: source_topic.to_string(),
            store_name: store_name.to_string(),
        })
    }

    pub async fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::AcqRel) {
            return;
        }

        self.membership.clone().start().await;

        let engine = self.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(engine.config.poll_interval);
            loop {
                interval.tick().await;
                engine.rebalance().await;
            }
        });
        self.tasks.lock().push(handle);

        info!("Engine {} started", self.application_id);
    }

    /// Owner of the partition the encoded key falls into, or `None` while no
    /// assignment has been computed.
    pub fn locate_owner<K, F>(&self, store_name: &str, key: &K, key_encoder: F) -> Option<Member>
    where
        K: ?Sized,
        F: Fn(&K) -> Vec<u8>,
    {
        if !self.is_ready() || !self.tables.contains_key(store_name) {
            return None;
        }
        let partition = self.partitioner.partition_for_bytes(&key_encoder(key));
        self.assignment
            .read()
            .as_ref()
            .and_then(|assignment| assignment.owner(partition).cloned())
    }

    pub fn local_store_handle(&self, store_name: &str) -> Option<Arc<MaterializedTable>> {
        if !self.is_ready() {
            return None;
        }
        self.tables.get(store_name).map(|state| state.table.clone())
    }

    pub fn list_all_members(&self, store_name: &str) -> Vec<MemberPartitions> {
        if !self.is_ready() || !self.tables.contains_key(store_name) {
            return Vec::new();
        }
        self.assignment
            .read()
            .as_ref()
            .map(Assignment::members)
            .unwrap_or_default()
    }

    /// Stops materializing, leaves the cluster and drops all local state.
    pub async fn close(&self) {
        let handles: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for handle in handles {
            handle.abort();
            let _ = handle.await;
        }
        self.ready.store(false, Ordering::Release);
        *self.assignment.write() = None;

        self.membership.leave().await;

        for state in self.table_states() {
            state.table.clear();
            state.offsets.clear();
        }
        info!("Engine {} closed", self.application_id);
    }

    fn table_states(&self) -> Vec<Arc<TableState>> {
        self.tables.iter().map(|entry| entry.value().clone()).collect()
    }

    /// One tick: recompute ownership, drop lost partitions, restore gained
    /// ones, then tail everything owned.
    pub(crate) async fn rebalance(&self) {
        let assignment = Assignment::new(
            self.membership.alive_members(),
            self.partitioner.num_partitions(),
        );
        let owned: BTreeSet<PartitionId> = assignment.partitions_of(&self.local).into_iter().collect();

        let changed = self.assignment.read().as_ref() != Some(&assignment);
        if changed {
            info!(
                "Rebalance: {} member(s), {} owns partitions {:?}",
                assignment.members().len(),
                self.local,
                owned
            );
            *self.assignment.write() = Some(assignment);
        }

        for state in self.table_states() {
            for partition in state.table.owned_partitions() {
                if !owned.contains(&partition) {
                    state.table.drop_partition(partition);
                    state.offsets.remove(&partition);
                    info!("Released partition {} of {}", partition, state.table.name());
                }
            }

            for &partition in &owned {
                let offset = state.offsets.get(&partition).map(|entry| *entry);
                let result = match offset {
                    Some(offset) => self.tail(&state, partition, offset).await,
                    None => self.restore(&state, partition).await,
                };
                if let Err(e) = result {
                    warn!(
                        "Failed to read partition {} of {}: {}",
                        partition,
                        state.log.topic(),
                        e
                    );
                }
            }
        }

        if !self.ready.swap(true, Ordering::AcqRel) {
            info!("Engine {} is ready", self.application_id);
        }
    }

    async fn restore(&self, state: &TableState, partition: PartitionId) -> Result<()> {
        let (records, next) = state.log.read_from(partition, 0).await?;
        let data = MaterializedTable::restore(&records);
        info!(
            "Restored partition {} of {}: {} record(s), {} key(s)",
            partition,
            state.table.name(),
            records.len(),
            data.len()
        );
        state.table.install_partition(partition, data);
        state.offsets.insert(partition, next);
        Ok(())
    }

    async fn tail(&self, state: &TableState, partition: PartitionId, offset: u64) -> Result<()> {
        let (records, next) = state.log.read_from(partition, offset).await?;
        for record in &records {
            state.table.apply(partition, record);
        }
        if next != offset {
            state.offsets.insert(partition, next);
        }
        if records.is_empty() {
            return Ok(());
        }
        debug!(
            "Applied {} record(s) to partition {} of {}",
            records.len(),
            partition,
            state.table.name()
        );
        Ok(())
    }
}
