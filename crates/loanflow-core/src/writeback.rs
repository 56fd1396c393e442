//! Durable write-back queue
//!
//! Answers are applied to the hot cache synchronously and persisted to the
//! system of record asynchronously through an external message queue. The
//! engine only publishes; the consumer is a separate service. Publishing is
//! fire-and-forget: a failure is logged and counted
//! (`writeback_publish_failures`) but never fails the voice response,
//! because the hot cache is authoritative for the session.

use crate::error::QueueError;
use crate::value::FieldMap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// One answer mutation bound for the system of record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    /// Proposal the answer belongs to.
    pub proposal_pid: String,
    /// Question that was answered.
    pub question_id: String,
    /// Entity the answer applies to, when the question is entity-scoped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_pid: Option<String>,
    /// Access field → value updates to persist.
    pub field_updates: FieldMap,
    /// Submission time.
    pub timestamp: DateTime<Utc>,
    /// Verbatim agent transcription, when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_input: Option<String>,
    /// Extraction confidence from the conversational layer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Publish-side interface of the external message queue.
#[async_trait]
pub trait WritebackQueue: Send + Sync {
    /// Publish one answer record.
    async fn publish(&self, record: &AnswerRecord) -> Result<(), QueueError>;
}

/// Redis Streams implementation: records land on one stream via `XADD` with
/// a JSON payload; the consumer reads with a consumer group.
pub struct RedisStreamQueue {
    manager: ConnectionManager,
    stream_key: String,
    publish_timeout: Duration,
}

impl RedisStreamQueue {
    /// Connect a publisher to `url`, appending to `stream_key`.
    ///
    /// # Errors
    ///
    /// Invalid URL or connection failure.
    pub async fn connect(
        url: &str,
        stream_key: &str,
        publish_timeout: Duration,
    ) -> Result<Self, QueueError> {
        let client = redis::Client::open(url)
            .map_err(|e| QueueError::Publish(format!("invalid queue url: {e}")))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| QueueError::Publish(format!("queue connect failed: {e}")))?;
        Ok(Self {
            manager,
            stream_key: stream_key.to_string(),
            publish_timeout,
        })
    }
}

#[async_trait]
impl WritebackQueue for RedisStreamQueue {
    async fn publish(&self, record: &AnswerRecord) -> Result<(), QueueError> {
        let payload = serde_json::to_string(record)?;
        let mut conn = self.manager.clone();

        let mut cmd = redis::cmd("XADD");
        cmd.arg(&self.stream_key).arg("*").arg("record").arg(&payload);
        let fut = cmd.query_async::<String>(&mut conn);

        let id = tokio::time::timeout(self.publish_timeout, fut)
            .await
            .map_err(|_| {
                QueueError::Publish(format!("publish timed out after {:?}", self.publish_timeout))
            })?
            .map_err(|e| QueueError::Publish(format!("XADD failed: {e}")))?;

        debug!(
            stream = %self.stream_key,
            entry_id = %id,
            proposal_pid = %record.proposal_pid,
            question_id = %record.question_id,
            "answer record published"
        );
        Ok(())
    }
}

/// In-memory queue for development and tests; keeps every published record.
#[derive(Default)]
pub struct MemoryWritebackQueue {
    records: Mutex<Vec<AnswerRecord>>,
    fail: std::sync::atomic::AtomicBool,
}

impl MemoryWritebackQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far.
    pub async fn records(&self) -> Vec<AnswerRecord> {
        self.records.lock().await.clone()
    }

    /// Make subsequent publishes fail (durability-warning tests).
    pub fn fail_publishes(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::Relaxed);
    }
}

#[async_trait]
impl WritebackQueue for MemoryWritebackQueue {
    async fn publish(&self, record: &AnswerRecord) -> Result<(), QueueError> {
        if self.fail.load(std::sync::atomic::Ordering::Relaxed) {
            return Err(QueueError::Publish("queue unavailable".to_string()));
        }
        self.records.lock().await.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::FieldValue;

    fn sample_record() -> AnswerRecord {
        let mut updates = FieldMap::new();
        updates.insert("citizenship_type".into(), FieldValue::Text("US_CITIZEN".into()));
        AnswerRecord {
            proposal_pid: "P-1".into(),
            question_id: "Q100".into(),
            entity_pid: Some("B-1".into()),
            field_updates: updates,
            timestamp: Utc::now(),
            raw_input: Some("I'm a US citizen".into()),
            confidence: Some(0.93),
        }
    }

    #[test]
    fn test_record_wire_shape() {
        let json = serde_json::to_value(sample_record()).unwrap();
        assert!(json.get("proposalPid").is_some());
        assert!(json.get("questionId").is_some());
        assert!(json.get("fieldUpdates").is_some());
        assert_eq!(json["fieldUpdates"]["citizenship_type"], "US_CITIZEN");
    }

    #[test]
    fn test_optional_fields_omitted() {
        let record = AnswerRecord {
            entity_pid: None,
            raw_input: None,
            confidence: None,
            ..sample_record()
        };
        let json = serde_json::to_value(record).unwrap();
        assert!(json.get("entityPid").is_none());
        assert!(json.get("rawInput").is_none());
        assert!(json.get("confidence").is_none());
    }

    #[tokio::test]
    async fn test_memory_queue_records() {
        let queue = MemoryWritebackQueue::new();
        queue.publish(&sample_record()).await.unwrap();
        let records = queue.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].question_id, "Q100");
    }

    #[tokio::test]
    async fn test_memory_queue_failure_mode() {
        let queue = MemoryWritebackQueue::new();
        queue.fail_publishes(true);
        assert!(queue.publish(&sample_record()).await.is_err());
    }
}
