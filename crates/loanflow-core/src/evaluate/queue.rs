//! Queue builder
//!
//! Takes the evaluator's per-level items and produces the response: a
//! globally ordered queue, per-section progress, runs of questions that may
//! be asked together, and the next recommended question.

use crate::catalog::{Catalog, EntityLevel, Flexibility, InputKind};
use crate::state::LoanState;
use crate::value::FieldValue;
use serde::Serialize;
use std::sync::Arc;

/// A question instantiated against a specific entity (or the null slot for
/// singleton levels), merge fields resolved.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    /// Question id.
    pub question_id: String,
    /// Entity the instance applies to, absent for singleton levels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_pid: Option<String>,
    /// Display name of that entity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_display_name: Option<String>,
    /// Prompt text with merge fields resolved.
    pub rendered_text: String,
    /// Input shape.
    pub input_kind: InputKind,
    /// Options for choice questions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    /// Primary system-of-record column the answer writes to.
    pub access_field: String,
    /// Matching strictness for the conversational layer.
    pub flexibility: Flexibility,
    /// Existing value offered back for confirmation, when the question's
    /// primary form field asks for prepopulation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefill_value: Option<FieldValue>,
}

/// Per-section completion status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    /// Nothing answered yet.
    Pending,
    /// Some, but not all, questions answered.
    InProgress,
    /// Every question answered.
    Complete,
}

/// Per-section progress counters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionProgress {
    /// Section id.
    pub section_id: String,
    /// Display name.
    pub name: String,
    /// Distinct questions in the section.
    pub total: usize,
    /// Distinct answered questions in the section.
    pub answered: usize,
    /// Completion status.
    pub status: SectionStatus,
}

/// Full question-queue response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionQueueResponse {
    /// Ordered applicable questions.
    pub queue: Vec<QueueItem>,
    /// Per-section progress, in section order.
    pub sections: Vec<SectionProgress>,
    /// Runs of adjacent queue items that may be asked in one turn
    /// (question ids, length ≥ 2).
    pub can_ask_together: Vec<Vec<String>>,
    /// Question id of the first queue item, or empty when the queue is.
    pub next_recommended: String,
    /// Loan state version the queue was computed from.
    pub state_version: i64,
}

/// Orders queue items and assembles the response.
pub struct QueueBuilder {
    catalog: Arc<Catalog>,
}

impl QueueBuilder {
    /// Create a builder over the catalog.
    #[must_use]
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    /// Build the response from evaluator output and the loan state.
    #[must_use]
    pub fn build(&self, state: &LoanState, mut items: Vec<QueueItem>) -> QuestionQueueResponse {
        items.sort_by(|a, b| self.sort_key(a).cmp(&self.sort_key(b)));

        let sections = self.section_progress(state);
        let can_ask_together = self.groupable_runs(&items);
        let next_recommended = items
            .first()
            .map(|item| item.question_id.clone())
            .unwrap_or_default();

        QuestionQueueResponse {
            queue: items,
            sections,
            can_ask_together,
            next_recommended,
            state_version: state.version,
        }
    }

    fn sort_key(&self, item: &QueueItem) -> (u32, u32, Option<String>) {
        match self.catalog.question(&item.question_id) {
            Some(q) => (q.section_sequence, q.ordinal, item.entity_pid.clone()),
            // Unknown ids sort last; they cannot occur for evaluator output.
            None => (u32::MAX, u32::MAX, item.entity_pid.clone()),
        }
    }

    /// Progress counts are per distinct question id, so `answered ≤ total`
    /// holds regardless of the entity population.
    fn section_progress(&self, state: &LoanState) -> Vec<SectionProgress> {
        self.catalog
            .sections()
            .iter()
            .filter_map(|section| {
                let questions = self.catalog.questions_in_section(&section.id);
                if questions.is_empty() {
                    return None;
                }
                let total = questions.len();
                let answered = questions
                    .iter()
                    .filter(|q| state.answered.contains(&q.id))
                    .count();
                let status = if answered == total {
                    SectionStatus::Complete
                } else if answered == 0 {
                    SectionStatus::Pending
                } else {
                    SectionStatus::InProgress
                };
                Some(SectionProgress {
                    section_id: section.id.clone(),
                    name: section.name.clone(),
                    total,
                    answered,
                    status,
                })
            })
            .collect()
    }

    /// Scan the ordered queue for runs of items sharing section, entity
    /// level and flexibility where each question lists its predecessor in
    /// `can_combine_with`. Runs of length ≥ 2 are emitted.
    fn groupable_runs(&self, items: &[QueueItem]) -> Vec<Vec<String>> {
        let mut runs = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut prev: Option<(&QueueItem, String, EntityLevel)> = None;

        for item in items {
            let Some(question) = self.catalog.question(&item.question_id) else {
                continue;
            };
            let continues = match &prev {
                Some((prev_item, prev_section, prev_level)) => {
                    question.section == *prev_section
                        && question.level == *prev_level
                        && item.flexibility == prev_item.flexibility
                        && question
                            .can_combine_with
                            .contains(&prev_item.question_id)
                }
                None => false,
            };

            if continues {
                current.push(item.question_id.clone());
            } else {
                if current.len() >= 2 {
                    runs.push(std::mem::take(&mut current));
                } else {
                    current.clear();
                }
                current.push(item.question_id.clone());
            }
            prev = Some((item, question.section.clone(), question.level));
        }
        if current.len() >= 2 {
            runs.push(current);
        }
        runs
    }
}
