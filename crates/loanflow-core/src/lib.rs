//! Loanflow Core - Question-Evaluation Engine
//!
//! This crate provides the core engine behind a conversational
//! mortgage-origination agent:
//! - Criteria: compiling the human-readable rule DSL to decision tables
//! - Rules: evaluating compiled tables against loan contexts, in batches
//! - Catalog: section/question descriptors loaded once at startup
//! - State: loading, caching and mutating per-proposal working sets
//! - Evaluate: the question queue pipeline and answer handling
//! - Writeback: durable enqueue of answer mutations
//!
//! The transport layer, relational driver, key/value client and queue
//! client are consumed through narrow traits and are replaceable.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod catalog;
pub mod criteria;
pub mod error;
pub mod evaluate;
pub mod metrics;
pub mod record;
pub mod rules;
pub mod service;
pub mod state;
pub mod value;
pub mod writeback;

pub use catalog::{Catalog, EntityLevel, Flexibility, FormField, InputKind, Question, Section};
pub use error::{
    CatalogError, CriteriaError, QueueError, RecordError, Result, RulesError, ServiceError,
    StateError,
};
pub use evaluate::{
    AnswerHandler, AnswerRequest, EvaluatorConfig, QuestionEvaluator, QueueBuilder, QueueItem,
    QuestionQueueResponse, SectionProgress, SectionStatus,
};
pub use metrics::global as metrics_global;
pub use record::{
    MemoryRecordStore, PgRecordStore, RecordRow, RecordStoreConfig, SystemOfRecord,
};
pub use rules::{CompareOp, Comparison, DecisionTable, EvalContext, RuleRow, RulesEngine};
pub use service::QuestionService;
pub use state::{
    EntityGraph, EntityRef, LoanState, MemoryStateStore, RedisStateStore, StateCache, StateLoader,
    StateStore, STATE_TTL,
};
pub use value::{normalize_field, normalize_value, to_lower_camel, FieldMap, FieldValue};
pub use writeback::{AnswerRecord, MemoryWritebackQueue, RedisStreamQueue, WritebackQueue};
