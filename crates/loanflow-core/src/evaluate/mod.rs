//! Evaluation pipeline: evaluator, queue builder and answer handler.

mod answer;
mod evaluator;
mod queue;

pub use answer::{AnswerHandler, AnswerRequest};
pub use evaluator::{EvaluatorConfig, QuestionEvaluator};
pub use queue::{
    QueueBuilder, QueueItem, QuestionQueueResponse, SectionProgress, SectionStatus,
};
