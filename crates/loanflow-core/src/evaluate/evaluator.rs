//! Question evaluator
//!
//! Expands every unanswered question across its entity population, runs the
//! compiled rules in batches and produces queue items with merge fields
//! resolved. The whole pass runs under a local latency budget: the check
//! sits between level batches, partial results are valid, and the first
//! level always runs so callers always get some queue back.

use crate::catalog::{Catalog, EntityLevel, Question};
use crate::metrics::global;
use crate::rules::{EvalContext, EvalJob, RulesEngine};
use crate::state::{EntityRef, LoanState};
use crate::value::{normalize_field, normalize_keys, FieldValue};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::queue::QueueItem;

/// Evaluator settings.
#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    /// Local latency budget for one evaluation pass.
    pub budget: Duration,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self { budget: Duration::from_millis(8) }
    }
}

impl EvaluatorConfig {
    /// Config with a budget in milliseconds.
    #[must_use]
    pub fn with_budget_ms(budget_ms: u64) -> Self {
        Self { budget: Duration::from_millis(budget_ms) }
    }
}

/// Evaluates which questions currently apply to a loan state.
pub struct QuestionEvaluator {
    catalog: Arc<Catalog>,
    engine: Arc<RulesEngine>,
    config: EvaluatorConfig,
}

impl QuestionEvaluator {
    /// Create an evaluator over the catalog and engine.
    #[must_use]
    pub fn new(catalog: Arc<Catalog>, engine: Arc<RulesEngine>, config: EvaluatorConfig) -> Self {
        Self { catalog, engine, config }
    }

    /// Produce the applicable queue items for a loan state, in catalog
    /// pre-sort order within each level. May return partial results when
    /// the budget fires; the `evaluate_budget_exceeded` counter records it.
    pub async fn evaluate(&self, state: &LoanState) -> Vec<QueueItem> {
        let start = Instant::now();
        let loan_ctx = normalize_keys(&state.fields);
        let mut items = Vec::new();

        for (index, level) in EntityLevel::ALL.iter().enumerate() {
            if index > 0 && start.elapsed() > self.config.budget {
                warn!(
                    proposal_pid = %state.proposal_pid,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    budget_ms = self.config.budget.as_millis() as u64,
                    "evaluation budget exceeded, returning partial queue"
                );
                global::counter("evaluate_budget_exceeded").inc();
                break;
            }
            self.evaluate_level(state, *level, &loan_ctx, &mut items).await;
        }

        debug!(
            proposal_pid = %state.proposal_pid,
            items = items.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "evaluation pass complete"
        );
        items
    }

    async fn evaluate_level(
        &self,
        state: &LoanState,
        level: EntityLevel,
        loan_ctx: &EvalContext,
        items: &mut Vec<QueueItem>,
    ) {
        let questions: Vec<&Arc<Question>> = self
            .catalog
            .questions_for_level(level)
            .iter()
            .filter(|q| !state.answered.contains(&q.id))
            .collect();
        if questions.is_empty() {
            return;
        }

        // Slot expansion: every entity of the level, or the single null
        // slot for the singleton contexts.
        let slots: Vec<Option<&EntityRef>> = match state.entities.for_level(level) {
            Some(entities) => entities.iter().map(Some).collect(),
            None => vec![None],
        };
        if slots.is_empty() {
            return;
        }

        let slot_contexts: Vec<Option<EvalContext>> = slots
            .iter()
            .map(|slot| slot.map(|e| normalize_keys(&e.fields)))
            .collect();

        // One job per (question, slot); always-applicable questions skip
        // the engine entirely.
        let mut jobs: Vec<EvalJob> = Vec::new();
        let mut pending: Vec<(usize, usize, Option<usize>)> = Vec::new();
        for (qi, question) in questions.iter().enumerate() {
            for (si, slot_ctx) in slot_contexts.iter().enumerate() {
                if question.always_applicable {
                    pending.push((qi, si, None));
                } else {
                    let mut ctx = loan_ctx.clone();
                    if let Some(entity_ctx) = slot_ctx {
                        // Entity wins on conflict.
                        ctx.extend(entity_ctx.iter().map(|(k, v)| (k.clone(), v.clone())));
                    }
                    pending.push((qi, si, Some(jobs.len())));
                    jobs.push((question.rule_id(), ctx));
                }
            }
        }

        let results = self.engine.evaluate_batch(jobs).await;

        for (qi, si, job_index) in pending {
            let applicable = job_index.map_or(true, |j| results.get(j).copied().unwrap_or(false));
            if applicable {
                items.push(build_item(
                    questions[qi],
                    slots[si],
                    slot_contexts[si].as_ref(),
                    loan_ctx,
                ));
            }
        }
    }
}

/// Build one queue item, interpolating merge fields and carrying a prefill
/// value when the primary form field asks for prepopulation.
fn build_item(
    question: &Question,
    slot: Option<&EntityRef>,
    entity_ctx: Option<&EvalContext>,
    loan_ctx: &EvalContext,
) -> QueueItem {
    let rendered_text = interpolate(&question.instructions, entity_ctx, loan_ctx);

    let prefill_value = question
        .form_fields
        .iter()
        .min_by_key(|f| f.order)
        .filter(|f| f.prepopulate)
        .and_then(|f| lookup(&normalize_field(&f.access_field), entity_ctx, loan_ctx))
        .cloned();

    QueueItem {
        question_id: question.id.clone(),
        entity_pid: slot.map(|e| e.pid.clone()),
        entity_display_name: slot.map(|e| e.display_name.clone()),
        rendered_text,
        input_kind: question.input,
        options: question.options.clone(),
        access_field: question.primary_access_field().unwrap_or_default().to_string(),
        flexibility: question.flexibility,
        prefill_value,
    }
}

/// Resolve `{{placeholder}}` tokens: placeholder normalized like a field
/// name, entity fields checked first, then loan fields; unresolved tokens
/// are left literal.
fn interpolate(
    template: &str,
    entity_ctx: Option<&EvalContext>,
    loan_ctx: &EvalContext,
) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        match after_open.find("}}") {
            Some(close) => {
                let raw = &after_open[..close];
                let key = normalize_field(raw);
                match lookup(&key, entity_ctx, loan_ctx) {
                    Some(value) => out.push_str(&value.render()),
                    None => {
                        out.push_str("{{");
                        out.push_str(raw);
                        out.push_str("}}");
                    }
                }
                rest = &after_open[close + 2..];
            }
            None => {
                out.push_str("{{");
                rest = after_open;
            }
        }
    }
    out.push_str(rest);
    out
}

fn lookup<'a>(
    key: &str,
    entity_ctx: Option<&'a EvalContext>,
    loan_ctx: &'a EvalContext,
) -> Option<&'a FieldValue> {
    entity_ctx
        .and_then(|ctx| ctx.get(key))
        .filter(|v| !v.is_null())
        .or_else(|| loan_ctx.get(key).filter(|v| !v.is_null()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::FieldMap;

    fn ctx(pairs: &[(&str, &str)]) -> EvalContext {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), FieldValue::Text(v.to_string())))
            .collect()
    }

    #[test]
    fn test_interpolate_entity_first() {
        let entity = ctx(&[("employer_name", "Acme Corp")]);
        let loan = ctx(&[("employer_name", "Wrong Corp"), ("loan_type", "Conventional")]);
        let text = interpolate(
            "How many hours at {{employer_name}}?",
            Some(&entity),
            &loan,
        );
        assert_eq!(text, "How many hours at Acme Corp?");
    }

    #[test]
    fn test_interpolate_falls_back_to_loan_fields() {
        let loan = ctx(&[("loan_type", "Conventional")]);
        let text = interpolate("Your {{Loan Type}} loan", None, &loan);
        assert_eq!(text, "Your Conventional loan");
    }

    #[test]
    fn test_interpolate_unresolved_left_literal() {
        let loan = FieldMap::new();
        let text = interpolate("Hello {{missing_field}}!", None, &loan);
        assert_eq!(text, "Hello {{missing_field}}!");
    }

    #[test]
    fn test_interpolate_unterminated_token() {
        let loan = ctx(&[("a", "x")]);
        assert_eq!(interpolate("broken {{a", None, &loan), "broken {{a");
    }

    #[test]
    fn test_interpolate_skips_null_values() {
        let mut entity = EvalContext::new();
        entity.insert("employer_name".into(), FieldValue::Null);
        let loan = ctx(&[("employer_name", "Acme Corp")]);
        let text = interpolate("At {{employer_name}}", Some(&entity), &loan);
        assert_eq!(text, "At Acme Corp");
    }
}
