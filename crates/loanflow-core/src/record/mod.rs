//! System-of-record access
//!
//! The relational system of record is an external collaborator consumed
//! through the narrow [`SystemOfRecord`] trait: the state loader only ever
//! needs a handful of keyed row fetches. [`PgRecordStore`] is the production
//! implementation; [`MemoryRecordStore`] backs development and tests.

mod postgres;

pub use postgres::{PgRecordStore, RecordStoreConfig};

use crate::error::RecordError;
use crate::value::FieldMap;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// One row from the system of record, keyed by raw column name.
pub type RecordRow = FieldMap;

/// Narrow read interface over the system of record.
///
/// Implementations own their driver, pool and per-call timeouts; callers see
/// only row maps. Empty child collections return empty vectors, never an
/// error.
#[async_trait]
pub trait SystemOfRecord: Send + Sync {
    /// Fetch a proposal row by pid.
    async fn proposal(&self, proposal_pid: &str) -> Result<Option<RecordRow>, RecordError>;

    /// Borrowers belonging to a deal.
    async fn borrowers(&self, deal_pid: &str) -> Result<Vec<RecordRow>, RecordError>;

    /// Employment records for a set of borrowers.
    async fn jobs(&self, borrower_pids: &[String]) -> Result<Vec<RecordRow>, RecordError>;

    /// Assets for a set of borrowers.
    async fn assets(&self, borrower_pids: &[String]) -> Result<Vec<RecordRow>, RecordError>;

    /// Liabilities for a set of borrowers.
    async fn liabilities(&self, borrower_pids: &[String]) -> Result<Vec<RecordRow>, RecordError>;

    /// Owned real-estate records for a set of borrowers.
    async fn real_estate_owned(
        &self,
        borrower_pids: &[String],
    ) -> Result<Vec<RecordRow>, RecordError>;

    /// Subject-property row for a deal.
    async fn property(&self, deal_pid: &str) -> Result<Option<RecordRow>, RecordError>;

    /// Distinct question ids already answered for a deal.
    async fn answered_question_ids(&self, deal_pid: &str) -> Result<Vec<String>, RecordError>;
}

/// In-memory system of record for development and tests.
///
/// Rows are registered up front; `proposal_fetches` counts loader hits so
/// cache-coherence tests can assert the loader ran at most once.
#[derive(Default)]
pub struct MemoryRecordStore {
    inner: RwLock<MemoryRecords>,
    proposal_fetches: AtomicUsize,
}

#[derive(Default)]
struct MemoryRecords {
    proposals: HashMap<String, RecordRow>,
    borrowers: HashMap<String, Vec<RecordRow>>,
    jobs: HashMap<String, Vec<RecordRow>>,
    assets: HashMap<String, Vec<RecordRow>>,
    liabilities: HashMap<String, Vec<RecordRow>>,
    real_estate_owned: HashMap<String, Vec<RecordRow>>,
    properties: HashMap<String, RecordRow>,
    answered: HashMap<String, Vec<String>>,
}

impl MemoryRecordStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a proposal row under its pid.
    pub async fn put_proposal(&self, pid: &str, row: RecordRow) {
        self.inner.write().await.proposals.insert(pid.to_string(), row);
    }

    /// Register a borrower row under a deal pid.
    pub async fn put_borrower(&self, deal_pid: &str, row: RecordRow) {
        self.inner
            .write()
            .await
            .borrowers
            .entry(deal_pid.to_string())
            .or_default()
            .push(row);
    }

    /// Register a job row under a borrower pid.
    pub async fn put_job(&self, borrower_pid: &str, row: RecordRow) {
        self.inner
            .write()
            .await
            .jobs
            .entry(borrower_pid.to_string())
            .or_default()
            .push(row);
    }

    /// Register an asset row under a borrower pid.
    pub async fn put_asset(&self, borrower_pid: &str, row: RecordRow) {
        self.inner
            .write()
            .await
            .assets
            .entry(borrower_pid.to_string())
            .or_default()
            .push(row);
    }

    /// Register a liability row under a borrower pid.
    pub async fn put_liability(&self, borrower_pid: &str, row: RecordRow) {
        self.inner
            .write()
            .await
            .liabilities
            .entry(borrower_pid.to_string())
            .or_default()
            .push(row);
    }

    /// Register an owned real-estate row under a borrower pid.
    pub async fn put_real_estate(&self, borrower_pid: &str, row: RecordRow) {
        self.inner
            .write()
            .await
            .real_estate_owned
            .entry(borrower_pid.to_string())
            .or_default()
            .push(row);
    }

    /// Register the subject-property row for a deal.
    pub async fn put_property(&self, deal_pid: &str, row: RecordRow) {
        self.inner.write().await.properties.insert(deal_pid.to_string(), row);
    }

    /// Register already-answered question ids for a deal.
    pub async fn put_answered(&self, deal_pid: &str, ids: Vec<String>) {
        self.inner.write().await.answered.insert(deal_pid.to_string(), ids);
    }

    /// Number of proposal fetches served so far.
    #[must_use]
    pub fn proposal_fetches(&self) -> usize {
        self.proposal_fetches.load(Ordering::Relaxed)
    }

    async fn by_borrowers(
        map: &HashMap<String, Vec<RecordRow>>,
        borrower_pids: &[String],
    ) -> Vec<RecordRow> {
        borrower_pids
            .iter()
            .flat_map(|pid| map.get(pid).cloned().unwrap_or_default())
            .collect()
    }
}

#[async_trait]
impl SystemOfRecord for MemoryRecordStore {
    async fn proposal(&self, proposal_pid: &str) -> Result<Option<RecordRow>, RecordError> {
        self.proposal_fetches.fetch_add(1, Ordering::Relaxed);
        Ok(self.inner.read().await.proposals.get(proposal_pid).cloned())
    }

    async fn borrowers(&self, deal_pid: &str) -> Result<Vec<RecordRow>, RecordError> {
        Ok(self
            .inner
            .read()
            .await
            .borrowers
            .get(deal_pid)
            .cloned()
            .unwrap_or_default())
    }

    async fn jobs(&self, borrower_pids: &[String]) -> Result<Vec<RecordRow>, RecordError> {
        let inner = self.inner.read().await;
        Ok(Self::by_borrowers(&inner.jobs, borrower_pids).await)
    }

    async fn assets(&self, borrower_pids: &[String]) -> Result<Vec<RecordRow>, RecordError> {
        let inner = self.inner.read().await;
        Ok(Self::by_borrowers(&inner.assets, borrower_pids).await)
    }

    async fn liabilities(&self, borrower_pids: &[String]) -> Result<Vec<RecordRow>, RecordError> {
        let inner = self.inner.read().await;
        Ok(Self::by_borrowers(&inner.liabilities, borrower_pids).await)
    }

    async fn real_estate_owned(
        &self,
        borrower_pids: &[String],
    ) -> Result<Vec<RecordRow>, RecordError> {
        let inner = self.inner.read().await;
        Ok(Self::by_borrowers(&inner.real_estate_owned, borrower_pids).await)
    }

    async fn property(&self, deal_pid: &str) -> Result<Option<RecordRow>, RecordError> {
        Ok(self.inner.read().await.properties.get(deal_pid).cloned())
    }

    async fn answered_question_ids(&self, deal_pid: &str) -> Result<Vec<String>, RecordError> {
        Ok(self
            .inner
            .read()
            .await
            .answered
            .get(deal_pid)
            .cloned()
            .unwrap_or_default())
    }
}
