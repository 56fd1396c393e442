//! Section and question descriptors
//!
//! Deserialized from the YAML configuration tree at startup and immutable
//! afterwards. The catalog owns the canonical [`Question`] instances; every
//! other component sees them through `Arc`.

use serde::{Deserialize, Serialize};

/// The scope a question applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityLevel {
    /// The proposal itself (singleton context).
    Proposal,
    /// One question instance per borrower.
    Borrower,
    /// One per employment record.
    Job,
    /// One per asset.
    Asset,
    /// One per liability.
    Liability,
    /// The subject property (singleton context).
    Property,
    /// One per owned real-estate record.
    RealEstateOwned,
}

impl EntityLevel {
    /// Fixed evaluation order.
    pub const ALL: [EntityLevel; 7] = [
        EntityLevel::Proposal,
        EntityLevel::Borrower,
        EntityLevel::Job,
        EntityLevel::Asset,
        EntityLevel::Liability,
        EntityLevel::Property,
        EntityLevel::RealEstateOwned,
    ];

    /// Singleton levels evaluate against a single null-entity slot.
    #[must_use]
    pub fn is_singleton(self) -> bool {
        matches!(self, EntityLevel::Proposal | EntityLevel::Property)
    }
}

/// How strictly the conversational layer must match answers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flexibility {
    /// Answer must match an option verbatim.
    Exact,
    /// Free conversational matching.
    #[default]
    Conversational,
    /// May be inferred from context without asking.
    Inferred,
    /// May be skipped entirely.
    Optional,
}

/// Input shape the conversational layer collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    /// Free text.
    Text,
    /// Numeric value.
    Number,
    /// Yes/no.
    Boolean,
    /// One of the question's options.
    Choice,
    /// Monetary amount.
    Currency,
    /// Calendar date.
    Date,
}

/// A logical grouping of questions, totally ordered by `sequence`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Stable identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Position in the interview; unique across sections.
    pub sequence: u32,
    /// Optional operator-facing description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Mapping from a question answer to a system-of-record column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    /// Position among the question's fields.
    pub order: u32,
    /// Label used as the mapping key for multi-field answers.
    pub label: String,
    /// System-of-record column the answer value is written to.
    pub access_field: String,
    /// Whether an existing value should be offered back for confirmation.
    #[serde(default)]
    pub prepopulate: bool,
}

/// A single conversational prompt bound to a compiled rule.
///
/// `always_applicable` is derived at load time from an empty criteria
/// string; the evaluator short-circuits those around the rules engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    /// Stable identifier; the compiled rule registers as `question:<id>`.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Owning section id.
    pub section: String,
    /// Owning section sequence, denormalized for ordering.
    pub section_sequence: u32,
    /// Position within the section; unique per section.
    pub ordinal: u32,
    /// Scope the question applies to.
    pub level: EntityLevel,
    /// Prompt template with `{{field}}` merge placeholders.
    pub instructions: String,
    /// Input shape.
    pub input: InputKind,
    /// Answer → column mappings.
    pub form_fields: Vec<FormField>,
    /// Original criteria source (compiled separately).
    pub criteria: String,
    /// Matching strictness.
    pub flexibility: Flexibility,
    /// Options for choice questions.
    pub options: Option<Vec<String>>,
    /// Question ids this one may be bundled with when adjacent.
    pub can_combine_with: Vec<String>,
    /// Hints for the answer-extraction layer.
    pub extraction_hints: Vec<String>,
    /// True when the criteria string is empty.
    pub always_applicable: bool,
}

impl Question {
    /// Rule id this question's decision table registers under.
    #[must_use]
    pub fn rule_id(&self) -> String {
        format!("question:{}", self.id)
    }

    /// The primary access field (first form field by `order`), if any.
    #[must_use]
    pub fn primary_access_field(&self) -> Option<&str> {
        self.form_fields
            .iter()
            .min_by_key(|f| f.order)
            .map(|f| f.access_field.as_str())
    }
}
