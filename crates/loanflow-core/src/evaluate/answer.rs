//! Answer handler
//!
//! Maps a submitted answer onto system-of-record fields, applies it to the
//! hot cache, and enqueues the durable write record. Publishing is
//! fire-and-forget; the caller re-runs the evaluator against the returned
//! state to build the fresh response.

use crate::catalog::{Catalog, Question};
use crate::error::ServiceError;
use crate::metrics::global;
use crate::state::{LoanState, StateCache};
use crate::value::{FieldMap, FieldValue};
use crate::writeback::{AnswerRecord, WritebackQueue};
use chrono::Utc;
use std::sync::Arc;
use tracing::warn;

/// One answer submission.
#[derive(Debug, Clone)]
pub struct AnswerRequest {
    /// Proposal being worked.
    pub proposal_pid: String,
    /// Question being answered.
    pub question_id: String,
    /// Entity the answer applies to, for entity-scoped questions.
    pub entity_pid: Option<String>,
    /// Opaque JSON answer: a scalar for single-field questions, an object
    /// keyed by form-field label for multi-field ones.
    pub answer: serde_json::Value,
    /// Verbatim transcription from the conversational layer.
    pub raw_input: Option<String>,
    /// Extraction confidence.
    pub confidence: Option<f64>,
}

/// Applies answers to the cache and enqueues write-back records.
pub struct AnswerHandler {
    catalog: Arc<Catalog>,
    cache: Arc<StateCache>,
    queue: Arc<dyn WritebackQueue>,
}

impl AnswerHandler {
    /// Create a handler.
    #[must_use]
    pub fn new(
        catalog: Arc<Catalog>,
        cache: Arc<StateCache>,
        queue: Arc<dyn WritebackQueue>,
    ) -> Self {
        Self { catalog, cache, queue }
    }

    /// Apply one answer and return the updated loan state.
    ///
    /// # Errors
    ///
    /// [`ServiceError::InvalidArgument`] for empty identifiers or a
    /// malformed answer mapping; [`ServiceError::NotFound`] for an unknown
    /// question or proposal.
    pub async fn submit(&self, request: &AnswerRequest) -> Result<LoanState, ServiceError> {
        if request.proposal_pid.trim().is_empty() {
            return Err(ServiceError::InvalidArgument("proposal_pid is required".into()));
        }
        if request.question_id.trim().is_empty() {
            return Err(ServiceError::InvalidArgument("question_id is required".into()));
        }

        let question = self
            .catalog
            .question(&request.question_id)
            .ok_or_else(|| ServiceError::NotFound(format!("question {}", request.question_id)))?
            .clone();

        let delta = derive_delta(&question, &request.answer)?;

        let state = self
            .cache
            .update(&request.proposal_pid, delta.clone(), &question.id)
            .await?;

        let record = AnswerRecord {
            proposal_pid: request.proposal_pid.clone(),
            question_id: question.id.clone(),
            entity_pid: request.entity_pid.clone(),
            field_updates: delta,
            timestamp: Utc::now(),
            raw_input: request.raw_input.clone(),
            confidence: request.confidence,
        };
        if let Err(e) = self.queue.publish(&record).await {
            // Durability warning only: the hot cache is authoritative for
            // the session and the consumer can be replayed.
            warn!(
                proposal_pid = %request.proposal_pid,
                question_id = %question.id,
                error = %e,
                "write-back publish failed"
            );
            global::counter("writeback_publish_failures").inc();
        }

        Ok(state)
    }
}

/// Derive the access-field delta from an opaque answer value.
///
/// Single form field: the answer is the value. Multiple: the answer must be
/// an object whose keys match form-field labels; unknown keys fail.
fn derive_delta(
    question: &Question,
    answer: &serde_json::Value,
) -> Result<FieldMap, ServiceError> {
    let mut delta = FieldMap::new();

    match question.form_fields.len() {
        0 => {}
        1 => {
            let field = &question.form_fields[0];
            let value = FieldValue::from_json(answer).ok_or_else(|| {
                ServiceError::InvalidArgument(format!(
                    "answer for {} must be a scalar value",
                    question.id
                ))
            })?;
            delta.insert(field.access_field.clone(), value);
        }
        _ => {
            let object = answer.as_object().ok_or_else(|| {
                ServiceError::InvalidArgument(format!(
                    "answer for {} must map form-field labels to values",
                    question.id
                ))
            })?;
            for (label, raw) in object {
                let field = question
                    .form_fields
                    .iter()
                    .find(|f| f.label == *label)
                    .ok_or_else(|| {
                        ServiceError::InvalidArgument(format!(
                            "unknown form field \"{label}\" for {}",
                            question.id
                        ))
                    })?;
                let value = FieldValue::from_json(raw).ok_or_else(|| {
                    ServiceError::InvalidArgument(format!(
                        "value for form field \"{label}\" must be a scalar"
                    ))
                })?;
                delta.insert(field.access_field.clone(), value);
            }
        }
    }

    Ok(delta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{EntityLevel, Flexibility, FormField, InputKind};

    fn question(form_fields: Vec<FormField>) -> Question {
        Question {
            id: "Q1".into(),
            name: "Test".into(),
            section: "s".into(),
            section_sequence: 1,
            ordinal: 1,
            level: EntityLevel::Proposal,
            instructions: "Test?".into(),
            input: InputKind::Text,
            form_fields,
            criteria: String::new(),
            flexibility: Flexibility::Conversational,
            options: None,
            can_combine_with: Vec::new(),
            extraction_hints: Vec::new(),
            always_applicable: true,
        }
    }

    fn field(label: &str, access: &str) -> FormField {
        FormField {
            order: 1,
            label: label.into(),
            access_field: access.into(),
            prepopulate: false,
        }
    }

    #[test]
    fn test_single_field_binds_scalar() {
        let q = question(vec![field("Citizenship", "citizenship_type")]);
        let delta = derive_delta(&q, &serde_json::json!("US_CITIZEN")).unwrap();
        assert_eq!(
            delta.get("citizenship_type"),
            Some(&FieldValue::Text("US_CITIZEN".into()))
        );
    }

    #[test]
    fn test_single_field_rejects_object() {
        let q = question(vec![field("Citizenship", "citizenship_type")]);
        let err = derive_delta(&q, &serde_json::json!({"a": 1})).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidArgument(_)));
    }

    #[test]
    fn test_multi_field_distributes_by_label() {
        let q = question(vec![
            field("City", "property_city"),
            field("State", "property_state"),
        ]);
        let delta = derive_delta(
            &q,
            &serde_json::json!({"City": "Austin", "State": "TX"}),
        )
        .unwrap();
        assert_eq!(delta.get("property_city"), Some(&FieldValue::Text("Austin".into())));
        assert_eq!(delta.get("property_state"), Some(&FieldValue::Text("TX".into())));
    }

    #[test]
    fn test_multi_field_rejects_unknown_label() {
        let q = question(vec![
            field("City", "property_city"),
            field("State", "property_state"),
        ]);
        let err = derive_delta(&q, &serde_json::json!({"Zip": "78701"})).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidArgument(_)));
    }

    #[test]
    fn test_multi_field_requires_object() {
        let q = question(vec![
            field("City", "property_city"),
            field("State", "property_state"),
        ]);
        let err = derive_delta(&q, &serde_json::json!("Austin")).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidArgument(_)));
    }

    #[test]
    fn test_no_form_fields_is_empty_delta() {
        let q = question(Vec::new());
        let delta = derive_delta(&q, &serde_json::json!("anything")).unwrap();
        assert!(delta.is_empty());
    }
}
