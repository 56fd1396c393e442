//! Question queue endpoints
//!
//! GET  /api/v1/proposals/:pid/questions - Current applicable question queue
//! POST /api/v1/proposals/:pid/answers   - Submit an answer, get the recomputed queue
//! GET  /api/v1/proposals/:pid/state     - Loan-state snapshot (debugging)

use super::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use loanflow_core::evaluate::AnswerRequest;
use loanflow_core::{QuestionQueueResponse, ServiceError};
use serde::Deserialize;

/// Body of an answer submission.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswerBody {
    /// Question being answered.
    pub question_id: String,
    /// Entity the answer applies to, for entity-scoped questions.
    #[serde(default)]
    pub entity_pid: Option<String>,
    /// Opaque JSON answer value.
    pub answer: serde_json::Value,
    /// Verbatim transcription, when available.
    #[serde(default)]
    pub raw_input: Option<String>,
    /// Extraction confidence.
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// Service errors mapped onto HTTP statuses.
pub struct ApiError(ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ServiceError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

async fn get_questions(
    State(state): State<AppState>,
    Path(pid): Path<String>,
) -> Result<Json<QuestionQueueResponse>, ApiError> {
    let response = state.service.get_questions(&pid).await?;
    Ok(Json(response))
}

async fn submit_answer(
    State(state): State<AppState>,
    Path(pid): Path<String>,
    Json(body): Json<SubmitAnswerBody>,
) -> Result<Json<QuestionQueueResponse>, ApiError> {
    let request = AnswerRequest {
        proposal_pid: pid,
        question_id: body.question_id,
        entity_pid: body.entity_pid,
        answer: body.answer,
        raw_input: body.raw_input,
        confidence: body.confidence,
    };
    let response = state.service.submit_answer(&request).await?;
    Ok(Json(response))
}

async fn get_loan_state(
    State(state): State<AppState>,
    Path(pid): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let snapshot = state.service.loan_state(&pid).await?;
    Ok(Json(snapshot))
}

/// Create question routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/proposals/:pid/questions", get(get_questions))
        .route(
            "/api/v1/proposals/:pid/answers",
            axum::routing::post(submit_answer),
        )
        .route("/api/v1/proposals/:pid/state", get(get_loan_state))
}
