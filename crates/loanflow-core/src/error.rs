//! Error types for loanflow-core
//!
//! One error enum per subsystem; startup-time errors (criteria, catalog) are
//! fatal to the caller, runtime errors carry the recovery policy of §7 of the
//! design notes in DESIGN.md.

use thiserror::Error;

/// Criteria DSL compilation error.
///
/// Compilation is fail-hard: any of these aborts catalog loading.
#[derive(Debug, Error)]
pub enum CriteriaError {
    /// Right-hand side of a numeric comparison is not a number.
    #[error("non-numeric comparison value in \"{line}\"")]
    NonNumericValue {
        /// Offending source line
        line: String,
    },

    /// Line does not match any recognized criteria form.
    #[error("unrecognized criteria line \"{line}\"")]
    Unrecognized {
        /// Offending source line
        line: String,
    },

    /// Multi-line criteria without a `Matches all/any` header.
    #[error("multi-line criteria requires a \"Matches all/any of the following rules:\" header")]
    MissingHeader,

    /// The same field appears twice in one AND block; the decision-table row
    /// is a field→comparison map and cannot represent that.
    #[error("duplicate field \"{field}\" in one rule row")]
    DuplicateField {
        /// Normalized field name
        field: String,
    },

    /// Comparison line with an empty field or value part.
    #[error("malformed comparison line \"{line}\"")]
    Malformed {
        /// Offending source line
        line: String,
    },
}

/// Configuration-tree loading error. Fatal at startup; partial startup is
/// forbidden, so every variant carries the offending path where one exists.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Filesystem error while scanning the configuration tree.
    #[error("io error reading {path}: {source}")]
    Io {
        /// Path being read
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// YAML deserialization failure.
    #[error("invalid descriptor {path}: {source}")]
    Parse {
        /// Offending file
        path: String,
        /// Underlying error
        #[source]
        source: serde_yaml::Error,
    },

    /// Criteria compile failure, tagged with the source file.
    #[error("criteria compile error in {path}: {source}")]
    Criteria {
        /// Offending file
        path: String,
        /// Underlying error
        #[source]
        source: CriteriaError,
    },

    /// Two sections share a `sequence` value.
    #[error("duplicate section sequence {sequence} ({first} and {second})")]
    DuplicateSequence {
        /// Shared sequence value
        sequence: u32,
        /// First section id
        first: String,
        /// Second section id
        second: String,
    },

    /// Two questions share an ordinal within one section.
    #[error("duplicate ordinal {ordinal} in section {section} ({first} and {second})")]
    DuplicateOrdinal {
        /// Shared ordinal
        ordinal: u32,
        /// Section id
        section: String,
        /// First question id
        first: String,
        /// Second question id
        second: String,
    },

    /// Question references a section that was never loaded.
    #[error("question {question} references unknown section {section} ({path})")]
    UnknownSection {
        /// Question id
        question: String,
        /// Missing section id
        section: String,
        /// Offending file
        path: String,
    },

    /// Two question files declare the same id.
    #[error("duplicate question id {id} ({path})")]
    DuplicateQuestion {
        /// Shared question id
        id: String,
        /// Second offending file
        path: String,
    },

    /// The configuration root or a required subdirectory is missing.
    #[error("configuration root invalid: {0}")]
    MissingRoot(String),
}

/// Rules-engine evaluation error. Evaluation is fail-soft: the batch layer
/// degrades these to `false` and counts them.
#[derive(Debug, Error)]
pub enum RulesError {
    /// No decision table installed under the requested id.
    #[error("unknown rule id {0}")]
    UnknownRule(String),
}

/// System-of-record access error.
#[derive(Debug, Error)]
pub enum RecordError {
    /// Database error from the relational driver.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Per-query timeout fired.
    #[error("query timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Backend-agnostic failure (used by non-SQL implementations).
    #[error("record store error: {0}")]
    Backend(String),
}

/// State loading / caching error.
#[derive(Debug, Error)]
pub enum StateError {
    /// Proposal does not exist in the system of record.
    #[error("proposal not found: {0}")]
    ProposalNotFound(String),

    /// System-of-record failure on a cache miss; unrecoverable for the
    /// request.
    #[error("record error: {0}")]
    Record(#[from] RecordError),

    /// Remote cache failure. Reads fall through to the loader; writes are
    /// logged and counted.
    #[error("cache store error: {0}")]
    Store(String),

    /// Binary codec failure on a cached value.
    #[error("codec error: {0}")]
    Codec(String),
}

/// Write-back queue publish error. Fire-and-forget: logged and counted, never
/// surfaced to the caller.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Queue backend rejected or never accepted the record.
    #[error("publish failed: {0}")]
    Publish(String),

    /// Record could not be serialized for the wire.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Service-surface error: the only kinds that cross the RPC boundary.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Caller passed an empty or malformed argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Requested proposal or question does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Unrecoverable internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StateError> for ServiceError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::ProposalNotFound(pid) => {
                ServiceError::NotFound(format!("proposal {pid}"))
            }
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

/// Result type alias for service-surface operations.
pub type Result<T> = std::result::Result<T, ServiceError>;
