//! Criteria DSL compiler
//!
//! Translates the human-readable, line-oriented criteria language into a
//! normalized decision table (`first` hit policy). Compilation happens once
//! at startup and is fail-hard: a line the grammar does not recognize aborts
//! the load rather than degrading to a guess.
//!
//! Recognized forms:
//!
//! ```text
//! Citizenship Type is US Citizen
//! Visa Type is not set
//! Loan Purpose is not Refinance
//! Credit Score >= 620
//! Matches all of the following rules:
//!   Citizenship Type is Non-Permanent Resident
//!   Visa Type is H-1B
//! Matches any of the following rules:
//!   Loan Purpose is Purchase
//!   Loan Purpose is Refinance
//! ```
//!
//! An empty criteria string compiles to an empty table; the catalog marks
//! those questions always-applicable and the evaluator bypasses the engine.

use crate::error::CriteriaError;
use crate::rules::{CompareOp, Comparison, DecisionTable, RuleRow};
use crate::value::{is_numeric_literal, normalize_field, normalize_value, FieldValue};
use std::collections::BTreeMap;

const ALL_HEADER: &str = "Matches all of the following rules:";
const ANY_HEADER: &str = "Matches any of the following rules:";

/// Compile a criteria string into a decision table.
///
/// Deterministic and idempotent: the same source always yields the same
/// table.
///
/// # Errors
///
/// Any line outside the recognized grammar, a non-numeric right-hand side on
/// a numeric comparison, or a duplicate field within one AND block.
pub fn compile(source: &str) -> Result<DecisionTable, CriteriaError> {
    let lines: Vec<&str> = source
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let Some((&first, rest)) = lines.split_first() else {
        return Ok(DecisionTable::default());
    };

    if first == ALL_HEADER {
        let mut conditions = BTreeMap::new();
        for line in rest {
            let (field, cmp) = parse_condition(line)?;
            if conditions.insert(field.clone(), cmp).is_some() {
                return Err(CriteriaError::DuplicateField { field });
            }
        }
        return Ok(DecisionTable::with_rows(vec![RuleRow::matching(conditions)]));
    }

    if first == ANY_HEADER {
        let rows = rest
            .iter()
            .map(|line| {
                let (field, cmp) = parse_condition(line)?;
                Ok(RuleRow::matching(BTreeMap::from([(field, cmp)])))
            })
            .collect::<Result<Vec<_>, CriteriaError>>()?;
        return Ok(DecisionTable::with_rows(rows));
    }

    if !rest.is_empty() {
        return Err(CriteriaError::MissingHeader);
    }

    let (field, cmp) = parse_condition(first)?;
    Ok(DecisionTable::with_rows(vec![RuleRow::matching(
        BTreeMap::from([(field, cmp)]),
    )]))
}

/// Parse one comparison line into `(normalized field, comparison)`.
fn parse_condition(line: &str) -> Result<(String, Comparison), CriteriaError> {
    // Numeric operators first; `>=`/`<=` before their one-char prefixes.
    for (token, op) in [
        (">=", CompareOp::Ge),
        ("<=", CompareOp::Le),
        (">", CompareOp::Gt),
        ("<", CompareOp::Lt),
    ] {
        if let Some(idx) = line.find(token) {
            let field = line[..idx].trim();
            let rhs = line[idx + token.len()..].trim();
            if field.is_empty() || rhs.is_empty() {
                return Err(CriteriaError::Malformed { line: line.to_string() });
            }
            if !is_numeric_literal(rhs) {
                return Err(CriteriaError::NonNumericValue { line: line.to_string() });
            }
            let value = rhs
                .parse::<f64>()
                .map(FieldValue::Number)
                .map_err(|_| CriteriaError::NonNumericValue { line: line.to_string() })?;
            return Ok((normalize_field(field), Comparison { op, value }));
        }
    }

    if let Some(field) = line.strip_suffix("is not set") {
        let field = field.trim();
        if field.is_empty() {
            return Err(CriteriaError::Malformed { line: line.to_string() });
        }
        return Ok((
            normalize_field(field),
            Comparison { op: CompareOp::Eq, value: FieldValue::Null },
        ));
    }

    if let Some((field, rhs)) = line.split_once(" is not ") {
        return comparison(line, field, rhs, CompareOp::Ne);
    }

    if let Some((field, rhs)) = line.split_once(" is ") {
        return comparison(line, field, rhs, CompareOp::Eq);
    }

    Err(CriteriaError::Unrecognized { line: line.to_string() })
}

fn comparison(
    line: &str,
    field: &str,
    rhs: &str,
    op: CompareOp,
) -> Result<(String, Comparison), CriteriaError> {
    let field = field.trim();
    let rhs = rhs.trim();
    if field.is_empty() || rhs.is_empty() {
        return Err(CriteriaError::Malformed { line: line.to_string() });
    }
    Ok((normalize_field(field), Comparison { op, value: normalize_value(rhs) }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_condition(table: &DecisionTable) -> (&String, &Comparison) {
        assert_eq!(table.rules.len(), 1);
        let row = &table.rules[0];
        assert_eq!(row.conditions.len(), 1);
        row.conditions.iter().next().unwrap()
    }

    #[test]
    fn test_compile_is() {
        let table = compile("Citizenship Type is US Citizen").unwrap();
        let (field, cmp) = single_condition(&table);
        assert_eq!(field, "citizenship_type");
        assert_eq!(cmp.op, CompareOp::Eq);
        assert_eq!(cmp.value, FieldValue::Text("US_CITIZEN".into()));
    }

    #[test]
    fn test_compile_is_not_set() {
        let table = compile("Visa Type is not set").unwrap();
        let (field, cmp) = single_condition(&table);
        assert_eq!(field, "visa_type");
        assert_eq!(cmp.op, CompareOp::Eq);
        assert_eq!(cmp.value, FieldValue::Null);
    }

    #[test]
    fn test_compile_is_not() {
        let table = compile("Loan Purpose is not Refinance").unwrap();
        let (field, cmp) = single_condition(&table);
        assert_eq!(field, "loan_purpose");
        assert_eq!(cmp.op, CompareOp::Ne);
        assert_eq!(cmp.value, FieldValue::Text("REFINANCE".into()));
    }

    #[test]
    fn test_compile_numeric() {
        let table = compile("Credit Score >= 620").unwrap();
        let (field, cmp) = single_condition(&table);
        assert_eq!(field, "credit_score");
        assert_eq!(cmp.op, CompareOp::Ge);
        assert_eq!(cmp.value, FieldValue::Number(620.0));
    }

    #[test]
    fn test_compile_numeric_rejects_text() {
        let err = compile("Credit Score >= excellent").unwrap_err();
        assert!(matches!(err, CriteriaError::NonNumericValue { .. }));
    }

    #[test]
    fn test_compile_and_block() {
        let source = "Matches all of the following rules:\n  Citizenship Type is Non-Permanent Resident\n  Visa Type is H-1B";
        let table = compile(source).unwrap();
        assert_eq!(table.rules.len(), 1);
        let row = &table.rules[0];
        assert_eq!(row.conditions.len(), 2);
        assert_eq!(
            row.conditions["citizenship_type"].value,
            FieldValue::Text("NON_PERMANENT_RESIDENT".into())
        );
        assert_eq!(row.conditions["visa_type"].value, FieldValue::Text("H_1B".into()));
    }

    #[test]
    fn test_compile_or_block() {
        let source = "Matches any of the following rules:\n  Loan Purpose is Purchase\n  Loan Purpose is Refinance";
        let table = compile(source).unwrap();
        assert_eq!(table.rules.len(), 2);
        for row in &table.rules {
            assert_eq!(row.conditions.len(), 1);
            assert!(row.conditions.contains_key("loan_purpose"));
        }
    }

    #[test]
    fn test_compile_empty_is_zero_rules() {
        assert!(compile("").unwrap().rules.is_empty());
        assert!(compile("  \n \n").unwrap().rules.is_empty());
    }

    #[test]
    fn test_compile_rejects_unrecognized() {
        let err = compile("Borrower has a pulse").unwrap_err();
        assert!(matches!(err, CriteriaError::Unrecognized { .. }));
    }

    #[test]
    fn test_compile_rejects_headerless_multiline() {
        let err = compile("Loan Purpose is Purchase\nVisa Type is H-1B").unwrap_err();
        assert!(matches!(err, CriteriaError::MissingHeader));
    }

    #[test]
    fn test_compile_rejects_duplicate_field_in_and() {
        let source =
            "Matches all of the following rules:\n  Loan Amount > 100\n  Loan Amount < 500";
        let err = compile(source).unwrap_err();
        assert!(matches!(err, CriteriaError::DuplicateField { .. }));
    }

    #[test]
    fn test_compile_deterministic() {
        let source = "Matches all of the following rules:\n  Visa Type is H-1B\n  Citizenship Type is Non-Permanent Resident";
        assert_eq!(compile(source).unwrap(), compile(source).unwrap());
    }

    #[test]
    fn test_boolean_and_numeric_values() {
        let compiled1 = compile("Self Employed is true").unwrap();
        let (_, cmp) = single_condition(&compiled1);
        assert_eq!(cmp.value, FieldValue::Bool(true));
        let compiled2 = compile("Dependents is 2").unwrap();
        let (_, cmp2) = single_condition(&compiled2);
        assert_eq!(cmp2.value, FieldValue::Number(2.0));
    }
}
