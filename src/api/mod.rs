//! HTTP surface
//!
//! Thin axum layer over the [`QuestionService`] facade; marshalling and
//! status mapping only, no business logic.

mod health;
mod questions;

use axum::Router;
use loanflow_core::QuestionService;
use std::sync::Arc;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// The assembled engine.
    pub service: Arc<QuestionService>,
}

/// Assemble the full router.
pub fn routes(service: Arc<QuestionService>) -> Router {
    let state = AppState { service };
    Router::new()
        .merge(questions::routes())
        .merge(health::routes())
        .with_state(state)
}
