//! Split-key state cache
//!
//! Two-tier read-through cache over the remote store. Each proposal lives
//! under four keys that expire together; reads are one pipelined round
//! trip, writes are one atomic MULTI/EXEC so readers see either the old or
//! the new version, never a mix. A remote-store failure on read falls
//! through to the loader (log + counter); the system of record stays the
//! ultimate source of truth.

use super::codec::{self, EncodedState, StateParts};
use super::loader::StateLoader;
use super::model::LoanState;
use crate::error::StateError;
use crate::metrics::global;
use crate::value::FieldMap;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Shared TTL for the four split keys.
pub const STATE_TTL: Duration = Duration::from_secs(3600);

/// Narrow interface over the remote key/value store.
///
/// The split-key layout and atomicity contract live here; implementations
/// only move bytes.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read all four parts in one round trip.
    async fn read(&self, proposal_pid: &str) -> Result<StateParts, StateError>;

    /// Write all four parts atomically with a shared TTL.
    async fn write(
        &self,
        proposal_pid: &str,
        encoded: &EncodedState,
        ttl: Duration,
    ) -> Result<(), StateError>;

    /// Drop every key for a proposal.
    async fn remove(&self, proposal_pid: &str) -> Result<(), StateError>;

    /// Presence check against the `:fields` witness key.
    async fn contains(&self, proposal_pid: &str) -> Result<bool, StateError>;

    /// Liveness probe.
    async fn ping(&self) -> Result<(), StateError>;
}

fn part_keys(pid: &str) -> [String; 4] {
    [
        format!("loan:{pid}:fields"),
        format!("loan:{pid}:entities"),
        format!("loan:{pid}:answered"),
        format!("loan:{pid}:meta"),
    ]
}

/// Redis-backed [`StateStore`].
///
/// Uses a multiplexed connection manager (automatic reconnection); the
/// `:answered` key is a native set so updates stay O(1) on the store side.
#[derive(Clone)]
pub struct RedisStateStore {
    manager: ConnectionManager,
    op_timeout: Duration,
}

impl RedisStateStore {
    /// Connect to the remote store.
    ///
    /// # Errors
    ///
    /// Invalid URL or connection failure.
    pub async fn connect(url: &str, op_timeout: Duration) -> Result<Self, StateError> {
        let client = redis::Client::open(url)
            .map_err(|e| StateError::Store(format!("invalid redis url: {e}")))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| StateError::Store(format!("redis connect failed: {e}")))?;
        Ok(Self { manager, op_timeout })
    }

    async fn bounded<T>(
        &self,
        fut: impl std::future::Future<Output = redis::RedisResult<T>>,
    ) -> Result<T, StateError> {
        tokio::time::timeout(self.op_timeout, fut)
            .await
            .map_err(|_| StateError::Store(format!("redis op timed out after {:?}", self.op_timeout)))?
            .map_err(|e| StateError::Store(format!("redis op failed: {e}")))
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn read(&self, proposal_pid: &str) -> Result<StateParts, StateError> {
        let [fields_key, entities_key, answered_key, meta_key] = part_keys(proposal_pid);
        let mut conn = self.manager.clone();

        let mut pipe = redis::pipe();
        pipe.get(&fields_key)
            .get(&entities_key)
            .smembers(&answered_key)
            .get(&meta_key);

        let (fields, entities, answered, meta): (
            Option<Vec<u8>>,
            Option<Vec<u8>>,
            Vec<String>,
            Option<Vec<u8>>,
        ) = self.bounded(pipe.query_async(&mut conn)).await?;

        Ok(StateParts { fields, entities, meta, answered })
    }

    async fn write(
        &self,
        proposal_pid: &str,
        encoded: &EncodedState,
        ttl: Duration,
    ) -> Result<(), StateError> {
        let [fields_key, entities_key, answered_key, meta_key] = part_keys(proposal_pid);
        let ttl_secs = ttl.as_secs();
        let mut conn = self.manager.clone();

        let mut pipe = redis::pipe();
        pipe.atomic()
            .set_ex(&fields_key, encoded.fields.as_slice(), ttl_secs)
            .ignore()
            .set_ex(&entities_key, encoded.entities.as_slice(), ttl_secs)
            .ignore()
            .set_ex(&meta_key, encoded.meta.as_slice(), ttl_secs)
            .ignore()
            .del(&answered_key)
            .ignore();
        if !encoded.answered.is_empty() {
            pipe.sadd(&answered_key, encoded.answered.as_slice())
                .ignore()
                .expire(&answered_key, ttl_secs as i64)
                .ignore();
        }

        self.bounded(pipe.query_async::<()>(&mut conn)).await?;
        debug!(proposal_pid, ttl_secs, "loan state written to remote store");
        Ok(())
    }

    async fn remove(&self, proposal_pid: &str) -> Result<(), StateError> {
        let keys = part_keys(proposal_pid);
        let mut conn = self.manager.clone();
        self.bounded(conn.del::<_, ()>(&keys[..])).await
    }

    async fn contains(&self, proposal_pid: &str) -> Result<bool, StateError> {
        let mut conn = self.manager.clone();
        let key = format!("loan:{proposal_pid}:fields");
        self.bounded(conn.exists::<_, bool>(&key)).await
    }

    async fn ping(&self) -> Result<(), StateError> {
        let mut conn = self.manager.clone();
        self.bounded(redis::cmd("PING").query_async::<String>(&mut conn))
            .await
            .map(|_| ())
    }
}

/// In-memory [`StateStore`] for development and tests. TTLs are not
/// enforced; writes and reads keep the same whole-entry atomicity as the
/// pipelined store.
#[derive(Default)]
pub struct MemoryStateStore {
    entries: RwLock<HashMap<String, EncodedState>>,
}

impl MemoryStateStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn read(&self, proposal_pid: &str) -> Result<StateParts, StateError> {
        let entries = self.entries.read().await;
        Ok(match entries.get(proposal_pid) {
            Some(encoded) => StateParts {
                fields: Some(encoded.fields.clone()),
                entities: Some(encoded.entities.clone()),
                meta: Some(encoded.meta.clone()),
                answered: encoded.answered.clone(),
            },
            None => StateParts::default(),
        })
    }

    async fn write(
        &self,
        proposal_pid: &str,
        encoded: &EncodedState,
        _ttl: Duration,
    ) -> Result<(), StateError> {
        let mut entries = self.entries.write().await;
        entries.insert(proposal_pid.to_string(), encoded.clone());
        Ok(())
    }

    async fn remove(&self, proposal_pid: &str) -> Result<(), StateError> {
        let mut entries = self.entries.write().await;
        entries.remove(proposal_pid);
        Ok(())
    }

    async fn contains(&self, proposal_pid: &str) -> Result<bool, StateError> {
        Ok(self.entries.read().await.contains_key(proposal_pid))
    }

    async fn ping(&self) -> Result<(), StateError> {
        Ok(())
    }
}

/// Read-through cache implementing the split-key coherence protocol.
pub struct StateCache {
    store: std::sync::Arc<dyn StateStore>,
    loader: StateLoader,
    ttl: Duration,
}

impl StateCache {
    /// Create a cache over a store and loader.
    #[must_use]
    pub fn new(store: std::sync::Arc<dyn StateStore>, loader: StateLoader) -> Self {
        Self { store, loader, ttl: STATE_TTL }
    }

    /// Override the TTL (tests).
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Get the loan state, loading from the system of record on a miss or
    /// incomplete entry. Store failures fall through to the loader.
    ///
    /// # Errors
    ///
    /// [`StateError::ProposalNotFound`] or a loader failure on the miss
    /// branch.
    pub async fn get(&self, proposal_pid: &str) -> Result<LoanState, StateError> {
        match self.store.read(proposal_pid).await {
            Ok(parts) => match codec::decode(proposal_pid, parts) {
                Ok(Some(state)) => {
                    debug!(proposal_pid, version = state.version, "cache hit");
                    return Ok(state);
                }
                Ok(None) => debug!(proposal_pid, "cache miss or incomplete entry"),
                Err(e) => {
                    warn!(proposal_pid, error = %e, "cached state undecodable, reloading");
                    global::counter("cache_read_failures").inc();
                }
            },
            Err(e) => {
                warn!(proposal_pid, error = %e, "remote store read failed, falling through");
                global::counter("cache_read_failures").inc();
            }
        }

        let state = self.loader.load(proposal_pid).await?;
        self.write_back(&state).await;
        Ok(state)
    }

    /// Merge a field delta, record an answered question, bump the version
    /// and rewrite the four keys atomically. Returns the updated state.
    ///
    /// A store-write failure is logged and counted but the updated state is
    /// still returned: the response must not stall on the cache, the delta
    /// also rides the write-back queue, and the next read reloads from the
    /// system of record.
    ///
    /// # Errors
    ///
    /// Read-through errors from [`StateCache::get`].
    pub async fn update(
        &self,
        proposal_pid: &str,
        field_delta: FieldMap,
        answered_question_id: &str,
    ) -> Result<LoanState, StateError> {
        let mut state = self.get(proposal_pid).await?;

        state.version = state.next_version();
        for (field, value) in field_delta {
            state.fields.insert(field, value);
        }
        state.answered.insert(answered_question_id.to_string());

        self.write_back(&state).await;
        debug!(
            proposal_pid,
            version = state.version,
            question_id = answered_question_id,
            "loan state updated"
        );
        Ok(state)
    }

    /// Drop every cached key for a proposal.
    ///
    /// # Errors
    ///
    /// Store failure.
    pub async fn invalidate(&self, proposal_pid: &str) -> Result<(), StateError> {
        self.store.remove(proposal_pid).await
    }

    /// Whether the proposal is currently cached (presence witness).
    ///
    /// # Errors
    ///
    /// Store failure.
    pub async fn is_cached(&self, proposal_pid: &str) -> Result<bool, StateError> {
        self.store.contains(proposal_pid).await
    }

    /// Liveness probe against the remote store.
    ///
    /// # Errors
    ///
    /// Store failure.
    pub async fn ping(&self) -> Result<(), StateError> {
        self.store.ping().await
    }

    async fn write_back(&self, state: &LoanState) {
        let encoded = match codec::encode(state) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(proposal_pid = %state.proposal_pid, error = %e, "state encode failed");
                global::counter("cache_write_failures").inc();
                return;
            }
        };
        if let Err(e) = self.store.write(&state.proposal_pid, &encoded, self.ttl).await {
            warn!(proposal_pid = %state.proposal_pid, error = %e, "state write-back failed");
            global::counter("cache_write_failures").inc();
        }
    }
}
