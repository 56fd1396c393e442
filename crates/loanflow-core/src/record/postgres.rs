//! Postgres system-of-record implementation
//!
//! Rows come back as dynamic column maps so the loader can flatten them
//! without a compiled schema; columns decode through a short type-probe
//! chain (int, float, bool, text, timestamp). Every query carries a
//! per-call timeout; the loader sits on the hot path's cache-miss branch
//! and gets a few-millisecond budget, not the pool default.

use super::{RecordRow, SystemOfRecord};
use crate::error::RecordError;
use crate::value::FieldValue;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Column, PgPool, Row};
use std::time::Duration;

/// Connection settings for the system of record.
#[derive(Debug, Clone)]
pub struct RecordStoreConfig {
    /// Database host.
    pub host: String,
    /// Database port.
    pub port: u16,
    /// Role name.
    pub user: String,
    /// Role password.
    pub password: String,
    /// Database name.
    pub database: String,
    /// Pool size.
    pub pool_size: u32,
    /// Per-query timeout in milliseconds.
    pub query_timeout_ms: u64,
}

/// Postgres-backed [`SystemOfRecord`].
pub struct PgRecordStore {
    pool: PgPool,
    query_timeout: Duration,
}

impl PgRecordStore {
    /// Connect a pool with the configured size and timeouts.
    ///
    /// # Errors
    ///
    /// Connection or authentication failure.
    pub async fn connect(config: &RecordStoreConfig) -> Result<Self, RecordError> {
        let url = format!(
            "postgres://{}:{}@{}:{}/{}",
            config.user, config.password, config.host, config.port, config.database
        );
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_millis(config.query_timeout_ms.max(100)))
            .connect(&url)
            .await?;
        Ok(Self {
            pool,
            query_timeout: Duration::from_millis(config.query_timeout_ms),
        })
    }

    /// Wrap an existing pool (tests, shared pools).
    #[must_use]
    pub fn with_pool(pool: PgPool, query_timeout: Duration) -> Self {
        Self { pool, query_timeout }
    }

    async fn fetch_all(
        &self,
        query: &str,
        bind: Bind<'_>,
    ) -> Result<Vec<RecordRow>, RecordError> {
        let q = sqlx::query(query);
        let q = match bind {
            Bind::Text(value) => q.bind(value.to_string()),
            Bind::TextArray(values) => q.bind(values.to_vec()),
        };
        let rows = tokio::time::timeout(self.query_timeout, q.fetch_all(&self.pool))
            .await
            .map_err(|_| RecordError::Timeout(self.query_timeout))??;
        Ok(rows.iter().map(row_fields).collect())
    }

    async fn fetch_optional(
        &self,
        query: &str,
        pid: &str,
    ) -> Result<Option<RecordRow>, RecordError> {
        let fut = sqlx::query(query).bind(pid.to_string()).fetch_optional(&self.pool);
        let row = tokio::time::timeout(self.query_timeout, fut)
            .await
            .map_err(|_| RecordError::Timeout(self.query_timeout))??;
        Ok(row.as_ref().map(row_fields))
    }
}

enum Bind<'a> {
    Text(&'a str),
    TextArray(&'a [String]),
}

#[async_trait]
impl SystemOfRecord for PgRecordStore {
    async fn proposal(&self, proposal_pid: &str) -> Result<Option<RecordRow>, RecordError> {
        self.fetch_optional("SELECT * FROM proposals WHERE pid = $1", proposal_pid)
            .await
    }

    async fn borrowers(&self, deal_pid: &str) -> Result<Vec<RecordRow>, RecordError> {
        self.fetch_all(
            "SELECT * FROM borrowers WHERE deal_pid = $1 ORDER BY pid",
            Bind::Text(deal_pid),
        )
        .await
    }

    async fn jobs(&self, borrower_pids: &[String]) -> Result<Vec<RecordRow>, RecordError> {
        if borrower_pids.is_empty() {
            return Ok(Vec::new());
        }
        self.fetch_all(
            "SELECT * FROM jobs WHERE borrower_pid = ANY($1) ORDER BY pid",
            Bind::TextArray(borrower_pids),
        )
        .await
    }

    async fn assets(&self, borrower_pids: &[String]) -> Result<Vec<RecordRow>, RecordError> {
        if borrower_pids.is_empty() {
            return Ok(Vec::new());
        }
        self.fetch_all(
            "SELECT * FROM assets WHERE borrower_pid = ANY($1) ORDER BY pid",
            Bind::TextArray(borrower_pids),
        )
        .await
    }

    async fn liabilities(&self, borrower_pids: &[String]) -> Result<Vec<RecordRow>, RecordError> {
        if borrower_pids.is_empty() {
            return Ok(Vec::new());
        }
        self.fetch_all(
            "SELECT * FROM liabilities WHERE borrower_pid = ANY($1) ORDER BY pid",
            Bind::TextArray(borrower_pids),
        )
        .await
    }

    async fn real_estate_owned(
        &self,
        borrower_pids: &[String],
    ) -> Result<Vec<RecordRow>, RecordError> {
        if borrower_pids.is_empty() {
            return Ok(Vec::new());
        }
        self.fetch_all(
            "SELECT * FROM real_estate_owned WHERE borrower_pid = ANY($1) ORDER BY pid",
            Bind::TextArray(borrower_pids),
        )
        .await
    }

    async fn property(&self, deal_pid: &str) -> Result<Option<RecordRow>, RecordError> {
        self.fetch_optional("SELECT * FROM properties WHERE deal_pid = $1", deal_pid)
            .await
    }

    async fn answered_question_ids(&self, deal_pid: &str) -> Result<Vec<String>, RecordError> {
        let fut = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT question_id FROM question_answers WHERE deal_pid = $1",
        )
        .bind(deal_pid.to_string())
        .fetch_all(&self.pool);
        tokio::time::timeout(self.query_timeout, fut)
            .await
            .map_err(|_| RecordError::Timeout(self.query_timeout))?
            .map_err(RecordError::from)
    }
}

/// Decode every column of a row into a [`FieldValue`] by probing the small
/// set of types the system of record uses. Undecodable columns become null
/// rather than failing the whole row.
fn row_fields(row: &PgRow) -> RecordRow {
    let mut fields = RecordRow::with_capacity(row.len());
    for column in row.columns() {
        let name = column.name();
        let value = decode_column(row, name);
        fields.insert(name.to_string(), value);
    }
    fields
}

fn decode_column(row: &PgRow, name: &str) -> FieldValue {
    if let Ok(v) = row.try_get::<Option<i64>, _>(name) {
        return v.map(|n| FieldValue::Number(n as f64)).unwrap_or(FieldValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(name) {
        return v.map(|n| FieldValue::Number(f64::from(n))).unwrap_or(FieldValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(name) {
        return v.map(FieldValue::Number).unwrap_or(FieldValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(name) {
        return v.map(FieldValue::Bool).unwrap_or(FieldValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(name) {
        return v.map(FieldValue::Text).unwrap_or(FieldValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<DateTime<Utc>>, _>(name) {
        return v
            .map(|ts| FieldValue::Text(ts.to_rfc3339()))
            .unwrap_or(FieldValue::Null);
    }
    FieldValue::Null
}
