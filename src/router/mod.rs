//! Key Router
//!
//! Decides, per lookup, where the answer comes from.
//!
//! ## Routing
//! 1. Ask the `PartitionDirectory` who owns the key.
//! 2. No owner yet: `Unavailable`.
//! 3. Owned here: read the `LocalStore`.
//! 4. Owned elsewhere: one `RemoteFetch` call to the owner, bounded by the
//!    fetch timeout. Failures become `RemoteUnreachable`.
//!
//! A request is forwarded at most once. The owner is asked through its local
//! lookup endpoint, which never forwards again; if it cannot answer for a key
//! it is supposed to own, that surfaces here as an error rather than a second
//! hop to some other member.


use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::directory::{Member, MemberPartitions, PartitionDirectory};
use crate::gateway::protocol::KeyValue;
use crate::remote::{FetchError, RemoteFetch};
use crate::store::LocalStore;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("key not found")]
    NotFound,

    #[error("{0}")]
    Unavailable(String),

    #[error("partition is owned by {owner}, not by this member")]
    NotOwner { owner: Member },

    #[error("member {member} could not answer: {source}")]
    RemoteUnreachable {
        member: Member,
        #[source]
        source: FetchError,
    },
}

pub struct KeyRouter {
    local: Member,
    directory: Arc<dyn PartitionDirectory>,
    store: Arc<dyn LocalStore>,
    fetcher: Arc<dyn RemoteFetch>,
    fetch_timeout: Duration,
}

impl KeyRouter {
    pub fn new(
        local: Member,
        directory: Arc<dyn PartitionDirectory>,
        store: Arc<dyn LocalStore>,
        fetcher: Arc<dyn RemoteFetch>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            local,
            directory,
            store,
            fetcher,
            fetch_timeout,
        }
    }

    pub fn local_member(&self) -> &Member {
        &self.local
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// Resolves `key` locally or on its owner.
    pub async fn route(&self, key: &str) -> Result<KeyValue, LookupError> {
        let owner = self.directory.locate_owner(key).ok_or_else(|| {
            LookupError::Unavailable("no member owns the partition of this key yet".to_string())
        })?;

        if owner == self.local {
            tracing::debug!("GET {}: served locally", key);
            return self.read_local(key);
        }

        tracing::debug!("GET {}: forwarding to {}", key, owner);
        match self
            .fetcher
            .fetch_remote(&owner, key, self.fetch_timeout)
            .await
        {
            Ok(Some(value)) => Ok(KeyValue::new(key, value)),
            Ok(None) => Err(LookupError::NotFound),
            Err(source) => {
                tracing::warn!("GET {}: owner {} unreachable: {}", key, owner, source);
                Err(LookupError::RemoteUnreachable {
                    member: owner,
                    source,
                })
            }
        }
    }

    /// Answers from the local store only. Serves lookups forwarded by peers.
    pub fn route_local(&self, key: &str) -> Result<KeyValue, LookupError> {
        match self.directory.locate_owner(key) {
            Some(owner) if owner == self.local => self.read_local(key),
            Some(owner) => Err(LookupError::NotOwner { owner }),
            None => Err(LookupError::Unavailable(
                "no member owns the partition of this key yet".to_string(),
            )),
        }
    }

    pub fn list_members(&self) -> Vec<MemberPartitions> {
        self.directory.list_members()
    }

    fn read_local(&self, key: &str) -> Result<KeyValue, LookupError> {
        match self.store.get_local(key) {
            Ok(Some(value)) => Ok(KeyValue::new(key, value)),
            Ok(None) => Err(LookupError::NotFound),
            Err(e) => Err(LookupError::Unavailable(e.to_string())),
        }
    }
}
