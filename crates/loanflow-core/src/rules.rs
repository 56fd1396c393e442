//! In-memory rules engine
//!
//! Holds compiled decision tables by id and evaluates them against context
//! maps. The table map is write-once at startup (the catalog installs every
//! question's table during warmup) and read-only afterwards; evaluation is
//! re-entrant and cheap enough to run inline, with batch fan-out across
//! tasks once a batch is large enough to pay for the spawns.
//!
//! Compilation is fail-hard; evaluation is fail-soft. An individual failure
//! inside a batch degrades to `false`, is logged and counted, and the rest
//! of the batch proceeds.

use crate::error::RulesError;
use crate::metrics::global;
use crate::value::{canonical_token, FieldValue};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use tracing::warn;

/// Batches below this size evaluate inline; larger ones fan out.
const PARALLEL_THRESHOLD: usize = 64;

/// Jobs per spawned chunk when a batch fans out.
const CHUNK_SIZE: usize = 64;

/// Hit policy of a decision table. Only `first` is used: the first matching
/// row wins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitPolicy {
    /// Return the output of the first matching row.
    #[default]
    First,
}

/// Comparison operator of a single condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    /// Equality (null-safe: `is not set` compiles to `== null`).
    Eq,
    /// Inequality.
    Ne,
    /// Numeric greater-than.
    Gt,
    /// Numeric greater-or-equal.
    Ge,
    /// Numeric less-than.
    Lt,
    /// Numeric less-or-equal.
    Le,
}

/// One condition: an operator and the expected value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    /// Operator.
    pub op: CompareOp,
    /// Expected value, already normalized by the compiler.
    pub value: FieldValue,
}

/// One decision-table row: every condition must hold for the row to match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleRow {
    /// Field name (normalized) → comparison.
    pub conditions: BTreeMap<String, Comparison>,
    /// Output when the row matches.
    pub output: bool,
}

impl RuleRow {
    /// Row that outputs `true` when its conditions hold.
    #[must_use]
    pub fn matching(conditions: BTreeMap<String, Comparison>) -> Self {
        Self { conditions, output: true }
    }
}

/// A compiled decision table.
///
/// An empty table evaluates to `false`; callers wanting "always applicable"
/// use the catalog's `always_applicable` flag instead of the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionTable {
    /// Hit policy (always `first`).
    pub hit_policy: HitPolicy,
    /// Ordered rule rows.
    pub rules: Vec<RuleRow>,
}

impl DecisionTable {
    /// Table from rows under the `first` hit policy.
    #[must_use]
    pub fn with_rows(rules: Vec<RuleRow>) -> Self {
        Self { hit_policy: HitPolicy::First, rules }
    }
}

/// Evaluation context: normalized field name → value.
pub type EvalContext = HashMap<String, FieldValue>;

/// One batch job: rule id plus the context to evaluate it against.
pub type EvalJob = (String, EvalContext);

/// Registry of compiled decision tables.
///
/// Shared via `Arc`; the inner lock is only ever write-held during warmup.
#[derive(Default)]
pub struct RulesEngine {
    tables: RwLock<HashMap<String, Arc<DecisionTable>>>,
}

impl RulesEngine {
    /// Create an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a compiled table under `rule_id`. A duplicate id replaces the
    /// previous table.
    pub fn install(&self, rule_id: &str, table: DecisionTable) {
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        tables.insert(rule_id.to_string(), Arc::new(table));
    }

    /// Whether a table is installed under `rule_id`.
    #[must_use]
    pub fn contains(&self, rule_id: &str) -> bool {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        tables.contains_key(rule_id)
    }

    /// Number of installed tables.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        tables.len()
    }

    /// Evaluate one rule against a context.
    ///
    /// `first` hit policy: rows are walked in order, a row matches when all
    /// of its conditions hold, and the first match returns its output. No
    /// match (or an empty table) returns `false`. A field missing from the
    /// context is treated as null, so `is not set` matches.
    ///
    /// # Errors
    ///
    /// [`RulesError::UnknownRule`] when no table is installed under the id.
    pub fn evaluate(&self, rule_id: &str, context: &EvalContext) -> Result<bool, RulesError> {
        let table = {
            let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
            tables
                .get(rule_id)
                .cloned()
                .ok_or_else(|| RulesError::UnknownRule(rule_id.to_string()))?
        };

        for row in &table.rules {
            let matched = row.conditions.iter().all(|(field, cmp)| {
                let actual = context.get(field).unwrap_or(&FieldValue::Null);
                satisfies(cmp, actual)
            });
            if matched {
                return Ok(row.output);
            }
        }
        Ok(false)
    }

    /// Evaluate a batch of jobs; the result order matches the input order.
    ///
    /// Small batches run inline; larger ones are chunked across tasks and
    /// joined. Individual failures degrade to `false` with a warning and a
    /// `rule_eval_failures` counter bump.
    pub async fn evaluate_batch(self: &Arc<Self>, jobs: Vec<EvalJob>) -> Vec<bool> {
        if jobs.len() < PARALLEL_THRESHOLD {
            return jobs
                .iter()
                .map(|(id, ctx)| self.evaluate_soft(id, ctx))
                .collect();
        }

        let chunks: Vec<Vec<EvalJob>> = jobs
            .chunks(CHUNK_SIZE)
            .map(|chunk| chunk.to_vec())
            .collect();

        let handles: Vec<_> = chunks
            .into_iter()
            .map(|chunk| {
                let engine = Arc::clone(self);
                let len = chunk.len();
                let handle = tokio::spawn(async move {
                    chunk
                        .iter()
                        .map(|(id, ctx)| engine.evaluate_soft(id, ctx))
                        .collect::<Vec<bool>>()
                });
                (handle, len)
            })
            .collect();

        let mut results = Vec::with_capacity(jobs.len());
        for (handle, len) in handles {
            match handle.await {
                Ok(chunk_results) => results.extend(chunk_results),
                Err(e) => {
                    // A panicked chunk degrades every job in it to false.
                    warn!(error = %e, "rule evaluation chunk failed");
                    global::counter("rule_eval_failures").inc();
                    results.extend(std::iter::repeat(false).take(len));
                }
            }
        }
        results
    }

    fn evaluate_soft(&self, rule_id: &str, context: &EvalContext) -> bool {
        match self.evaluate(rule_id, context) {
            Ok(result) => result,
            Err(e) => {
                warn!(rule_id = %rule_id, error = %e, "rule evaluation failed, treating as false");
                global::counter("rule_eval_failures").inc();
                false
            }
        }
    }
}

/// Whether `actual` satisfies the comparison.
///
/// Equality is loose across representations: text compares by canonical
/// token, numeric text coerces against numbers. Ordered operators require
/// both sides numeric and are false otherwise (null never orders).
fn satisfies(cmp: &Comparison, actual: &FieldValue) -> bool {
    match cmp.op {
        CompareOp::Eq => loose_eq(actual, &cmp.value),
        CompareOp::Ne => !loose_eq(actual, &cmp.value),
        CompareOp::Gt | CompareOp::Ge | CompareOp::Lt | CompareOp::Le => {
            let (Some(a), Some(b)) = (actual.as_number(), cmp.value.as_number()) else {
                return false;
            };
            match cmp.op {
                CompareOp::Gt => a > b,
                CompareOp::Ge => a >= b,
                CompareOp::Lt => a < b,
                CompareOp::Le => a <= b,
                _ => unreachable!(),
            }
        }
    }
}

fn loose_eq(a: &FieldValue, b: &FieldValue) -> bool {
    match (a, b) {
        (FieldValue::Null, FieldValue::Null) => true,
        (FieldValue::Null, _) | (_, FieldValue::Null) => false,
        (FieldValue::Bool(x), FieldValue::Bool(y)) => x == y,
        (FieldValue::Text(x), FieldValue::Text(y)) => canonical_token(x) == canonical_token(y),
        (FieldValue::Bool(x), FieldValue::Text(t)) | (FieldValue::Text(t), FieldValue::Bool(x)) => {
            t.trim().eq_ignore_ascii_case(if *x { "true" } else { "false" })
        }
        _ => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria;

    fn ctx(pairs: &[(&str, FieldValue)]) -> EvalContext {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_evaluate_first_hit() {
        let engine = RulesEngine::new();
        let table = criteria::compile("Loan Type is Conventional").unwrap();
        engine.install("question:Q1", table);

        let yes = ctx(&[("loan_type", FieldValue::Text("CONVENTIONAL".into()))]);
        let no = ctx(&[("loan_type", FieldValue::Text("FHA".into()))]);
        assert!(engine.evaluate("question:Q1", &yes).unwrap());
        assert!(!engine.evaluate("question:Q1", &no).unwrap());
    }

    #[test]
    fn test_evaluate_case_insensitive_text() {
        let engine = RulesEngine::new();
        engine.install(
            "r",
            criteria::compile("Loan Type is Conventional").unwrap(),
        );
        let mixed = ctx(&[("loan_type", FieldValue::Text("Conventional".into()))]);
        assert!(engine.evaluate("r", &mixed).unwrap());
    }

    #[test]
    fn test_missing_field_is_null() {
        let engine = RulesEngine::new();
        engine.install("r", criteria::compile("Visa Type is not set").unwrap());
        assert!(engine.evaluate("r", &ctx(&[])).unwrap());

        let set = ctx(&[("visa_type", FieldValue::Text("H_1B".into()))]);
        assert!(!engine.evaluate("r", &set).unwrap());
    }

    #[test]
    fn test_is_not_with_missing_field() {
        let engine = RulesEngine::new();
        engine.install("r", criteria::compile("Loan Purpose is not Refinance").unwrap());
        // null != REFINANCE holds
        assert!(engine.evaluate("r", &ctx(&[])).unwrap());
        let refi = ctx(&[("loan_purpose", FieldValue::Text("REFINANCE".into()))]);
        assert!(!engine.evaluate("r", &refi).unwrap());
    }

    #[test]
    fn test_numeric_comparison() {
        let engine = RulesEngine::new();
        engine.install("r", criteria::compile("Credit Score >= 620").unwrap());
        assert!(engine
            .evaluate("r", &ctx(&[("credit_score", FieldValue::Number(700.0))]))
            .unwrap());
        assert!(!engine
            .evaluate("r", &ctx(&[("credit_score", FieldValue::Number(580.0))]))
            .unwrap());
        // numeric text coerces
        assert!(engine
            .evaluate("r", &ctx(&[("credit_score", FieldValue::Text("640".into()))]))
            .unwrap());
        // null never orders
        assert!(!engine.evaluate("r", &ctx(&[])).unwrap());
    }

    #[test]
    fn test_and_or_semantics() {
        let engine = RulesEngine::new();
        engine.install(
            "and",
            criteria::compile(
                "Matches all of the following rules:\n  Citizenship Type is Non-Permanent Resident\n  Visa Type is H-1B",
            )
            .unwrap(),
        );
        engine.install(
            "or",
            criteria::compile(
                "Matches any of the following rules:\n  Loan Purpose is Purchase\n  Loan Purpose is Refinance",
            )
            .unwrap(),
        );

        let both = ctx(&[
            ("citizenship_type", FieldValue::Text("NON_PERMANENT_RESIDENT".into())),
            ("visa_type", FieldValue::Text("H_1B".into())),
        ]);
        let one = ctx(&[(
            "citizenship_type",
            FieldValue::Text("NON_PERMANENT_RESIDENT".into()),
        )]);
        assert!(engine.evaluate("and", &both).unwrap());
        assert!(!engine.evaluate("and", &one).unwrap());

        assert!(engine
            .evaluate("or", &ctx(&[("loan_purpose", FieldValue::Text("PURCHASE".into()))]))
            .unwrap());
        assert!(engine
            .evaluate("or", &ctx(&[("loan_purpose", FieldValue::Text("REFINANCE".into()))]))
            .unwrap());
        assert!(!engine
            .evaluate("or", &ctx(&[("loan_purpose", FieldValue::Text("HELOC".into()))]))
            .unwrap());
    }

    #[test]
    fn test_empty_table_is_false() {
        let engine = RulesEngine::new();
        engine.install("r", criteria::compile("").unwrap());
        assert!(!engine.evaluate("r", &ctx(&[])).unwrap());
    }

    #[test]
    fn test_unknown_rule_errors() {
        let engine = RulesEngine::new();
        assert!(matches!(
            engine.evaluate("nope", &ctx(&[])),
            Err(RulesError::UnknownRule(_))
        ));
    }

    #[test]
    fn test_install_replaces() {
        let engine = RulesEngine::new();
        engine.install("r", criteria::compile("Loan Type is FHA").unwrap());
        engine.install("r", criteria::compile("Loan Type is Conventional").unwrap());
        assert_eq!(engine.rule_count(), 1);
        let conventional = ctx(&[("loan_type", FieldValue::Text("CONVENTIONAL".into()))]);
        assert!(engine.evaluate("r", &conventional).unwrap());
    }

    #[tokio::test]
    async fn test_batch_order_matches_input() {
        let engine = Arc::new(RulesEngine::new());
        engine.install("r", criteria::compile("Flag is true").unwrap());

        let jobs: Vec<EvalJob> = (0..200)
            .map(|i| {
                let v = FieldValue::Bool(i % 3 == 0);
                ("r".to_string(), ctx(&[("flag", v)]))
            })
            .collect();
        let results = engine.evaluate_batch(jobs).await;
        assert_eq!(results.len(), 200);
        for (i, r) in results.iter().enumerate() {
            assert_eq!(*r, i % 3 == 0, "order mismatch at {i}");
        }
    }

    #[tokio::test]
    async fn test_batch_unknown_rule_degrades_to_false() {
        let engine = Arc::new(RulesEngine::new());
        engine.install("known", criteria::compile("Flag is true").unwrap());
        let jobs = vec![
            ("known".to_string(), ctx(&[("flag", FieldValue::Bool(true))])),
            ("missing".to_string(), ctx(&[])),
            ("known".to_string(), ctx(&[("flag", FieldValue::Bool(true))])),
        ];
        let results = engine.evaluate_batch(jobs).await;
        assert_eq!(results, vec![true, false, true]);
    }
}
