//! Question service facade
//!
//! The narrow surface the transport layer calls: get the current question
//! queue, submit an answer, snapshot the loan state, and report readiness.
//! Everything behind it is wired once during warmup and immutable (or
//! internally synchronized) afterwards.

use crate::catalog::Catalog;
use crate::error::{Result, ServiceError};
use crate::evaluate::{
    AnswerHandler, AnswerRequest, EvaluatorConfig, QuestionEvaluator, QueueBuilder,
    QuestionQueueResponse,
};
use crate::metrics::{global, Timer};
use crate::rules::RulesEngine;
use crate::state::{LoanState, StateCache};
use crate::writeback::WritebackQueue;
use std::sync::Arc;
use tracing::info;

/// The assembled question-evaluation engine.
pub struct QuestionService {
    catalog: Arc<Catalog>,
    engine: Arc<RulesEngine>,
    cache: Arc<StateCache>,
    evaluator: QuestionEvaluator,
    builder: QueueBuilder,
    answers: AnswerHandler,
}

impl QuestionService {
    /// Assemble the service from its warmed-up components.
    #[must_use]
    pub fn new(
        catalog: Arc<Catalog>,
        engine: Arc<RulesEngine>,
        cache: Arc<StateCache>,
        queue: Arc<dyn WritebackQueue>,
        evaluator_config: EvaluatorConfig,
    ) -> Self {
        info!(
            questions = catalog.question_count(),
            rules = engine.rule_count(),
            budget_ms = evaluator_config.budget.as_millis() as u64,
            "question service assembled"
        );
        let evaluator =
            QuestionEvaluator::new(Arc::clone(&catalog), Arc::clone(&engine), evaluator_config);
        let builder = QueueBuilder::new(Arc::clone(&catalog));
        let answers = AnswerHandler::new(Arc::clone(&catalog), Arc::clone(&cache), queue);
        Self { catalog, engine, cache, evaluator, builder, answers }
    }

    /// Current applicable question queue for a proposal.
    ///
    /// # Errors
    ///
    /// Empty pid → invalid argument; unknown pid → not found; system of
    /// record unreachable on a cache miss → internal.
    pub async fn get_questions(&self, proposal_pid: &str) -> Result<QuestionQueueResponse> {
        if proposal_pid.trim().is_empty() {
            return Err(ServiceError::InvalidArgument("proposal_pid is required".into()));
        }
        let timer = Timer::start();
        let state = self.cache.get(proposal_pid).await.map_err(ServiceError::from)?;
        let response = self.respond(&state).await;
        timer.observe_duration(&global::histogram("get_questions_latency_ms"));
        Ok(response)
    }

    /// Apply an answer and return the recomputed queue.
    ///
    /// # Errors
    ///
    /// Invalid argument for empty identifiers or a malformed answer
    /// mapping; not found for an unknown question or proposal.
    pub async fn submit_answer(&self, request: &AnswerRequest) -> Result<QuestionQueueResponse> {
        let timer = Timer::start();
        let state = self.answers.submit(request).await?;
        let response = self.respond(&state).await;
        timer.observe_duration(&global::histogram("submit_answer_latency_ms"));
        Ok(response)
    }

    /// Debug snapshot of a proposal's cached state.
    ///
    /// # Errors
    ///
    /// Same policies as [`QuestionService::get_questions`].
    pub async fn loan_state(&self, proposal_pid: &str) -> Result<serde_json::Value> {
        if proposal_pid.trim().is_empty() {
            return Err(ServiceError::InvalidArgument("proposal_pid is required".into()));
        }
        let state = self.cache.get(proposal_pid).await.map_err(ServiceError::from)?;
        Ok(snapshot(&state))
    }

    /// Warmup-complete readiness: the catalog loaded and at least one rule
    /// is installed.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.catalog.question_count() > 0 && self.engine.rule_count() > 0
    }

    /// Installed rule count, exposed for the readiness probe.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.engine.rule_count()
    }

    /// Remote-cache liveness, exposed for health detail.
    ///
    /// # Errors
    ///
    /// Store failure.
    pub async fn cache_ping(&self) -> std::result::Result<(), crate::error::StateError> {
        self.cache.ping().await
    }

    async fn respond(&self, state: &LoanState) -> QuestionQueueResponse {
        let items = self.evaluator.evaluate(state).await;
        self.builder.build(state, items)
    }
}

/// JSON snapshot of a loan state for `GetLoanState`.
fn snapshot(state: &LoanState) -> serde_json::Value {
    let fields: serde_json::Map<String, serde_json::Value> = state
        .fields
        .iter()
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect();

    let entity_list = |entities: &[crate::state::EntityRef]| -> serde_json::Value {
        entities
            .iter()
            .map(|e| {
                serde_json::json!({
                    "pid": e.pid,
                    "displayName": e.display_name,
                    "fields": e
                        .fields
                        .iter()
                        .map(|(k, v)| (k.clone(), v.to_json()))
                        .collect::<serde_json::Map<_, _>>(),
                })
            })
            .collect()
    };

    let mut answered: Vec<&String> = state.answered.iter().collect();
    answered.sort();

    serde_json::json!({
        "proposalPid": state.proposal_pid,
        "version": state.version,
        "loadedAt": state.loaded_at.to_rfc3339(),
        "fields": fields,
        "entities": {
            "borrowers": entity_list(&state.entities.borrowers),
            "jobs": entity_list(&state.entities.jobs),
            "assets": entity_list(&state.entities.assets),
            "liabilities": entity_list(&state.entities.liabilities),
            "realEstateOwned": entity_list(&state.entities.real_estate_owned),
        },
        "answered": answered,
    })
}
