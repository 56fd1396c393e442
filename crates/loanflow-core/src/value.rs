//! Loan field values and name normalization
//!
//! Loan fields and answer values are heterogeneous (string, number, boolean,
//! null). [`FieldValue`] is the tagged variant used throughout the core;
//! JSON and msgpack codecs sit at the boundary. The normalization functions
//! here are shared by the criteria compiler, the state loader and the
//! evaluator so that field names meet on the same token regardless of which
//! layer produced them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single loan field value.
///
/// Untagged so that JSON and msgpack both carry the natural scalar encoding;
/// both formats are self-describing, which is what untagged deserialization
/// requires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Absent / SQL NULL.
    Null,
    /// Boolean.
    Bool(bool),
    /// Numeric (integers and decimals share one representation).
    Number(f64),
    /// Free text or picklist token.
    Text(String),
}

/// Field map keyed by raw (un-normalized) field name.
pub type FieldMap = HashMap<String, FieldValue>;

impl FieldValue {
    /// True for [`FieldValue::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Numeric view: numbers directly, numeric text coerced.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(s) if is_numeric_literal(s.trim()) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Render for merge-field interpolation. Integral numbers print without
    /// a trailing `.0`.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                format!("{}", *n as i64)
            }
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Text(s) => s.clone(),
        }
    }

    /// Convert a scalar JSON value. Arrays and objects have no scalar
    /// representation and return `None`; the answer handler rejects them.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Option<FieldValue> {
        match value {
            serde_json::Value::Null => Some(FieldValue::Null),
            serde_json::Value::Bool(b) => Some(FieldValue::Bool(*b)),
            serde_json::Value::Number(n) => n.as_f64().map(FieldValue::Number),
            serde_json::Value::String(s) => Some(FieldValue::Text(s.clone())),
            _ => None,
        }
    }

    /// Convert to a JSON value for debug snapshots and queue records.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Null => serde_json::Value::Null,
            FieldValue::Bool(b) => serde_json::Value::Bool(*b),
            FieldValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            FieldValue::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

/// Normalize a field name to its canonical token: lowercase, whitespace and
/// hyphens to underscores, camelCase word boundaries split. Idempotent, so
/// loader-produced lower-camel keys (`loanType`) and DSL field phrases
/// (`Loan Type`) normalize to the same `loan_type`.
#[must_use]
pub fn normalize_field(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 4);
    let mut prev_lower_or_digit = false;
    for ch in raw.trim().chars() {
        if ch.is_whitespace() || ch == '-' {
            if !out.ends_with('_') && !out.is_empty() {
                out.push('_');
            }
            prev_lower_or_digit = false;
        } else if ch.is_ascii_uppercase() {
            if prev_lower_or_digit && !out.ends_with('_') {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
            prev_lower_or_digit = false;
        } else {
            out.push(ch);
            prev_lower_or_digit = ch.is_ascii_lowercase() || ch.is_ascii_digit();
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Normalize a criteria literal: `true`/`false` to booleans, numeric
/// literals to numbers, everything else to an uppercase token with the same
/// whitespace/hyphen folding as field names (`US Citizen` → `US_CITIZEN`).
#[must_use]
pub fn normalize_value(raw: &str) -> FieldValue {
    let trimmed = raw.trim();
    match trimmed {
        "true" => return FieldValue::Bool(true),
        "false" => return FieldValue::Bool(false),
        _ => {}
    }
    if is_numeric_literal(trimmed) {
        if let Ok(n) = trimmed.parse::<f64>() {
            return FieldValue::Number(n);
        }
    }
    FieldValue::Text(canonical_token(trimmed))
}

/// Uppercase token form used for text comparison: `Non-Permanent Resident`
/// and `NON_PERMANENT_RESIDENT` compare equal.
#[must_use]
pub fn canonical_token(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.trim().chars() {
        if ch.is_whitespace() || ch == '-' {
            if !out.ends_with('_') && !out.is_empty() {
                out.push('_');
            }
        } else {
            out.extend(ch.to_uppercase());
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Matches `^-?\d+(\.\d+)?$`.
#[must_use]
pub fn is_numeric_literal(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    if digits.is_empty() {
        return false;
    }
    match digits.split_once('.') {
        None => digits.bytes().all(|b| b.is_ascii_digit()),
        Some((int, frac)) => {
            !int.is_empty()
                && !frac.is_empty()
                && int.bytes().all(|b| b.is_ascii_digit())
                && frac.bytes().all(|b| b.is_ascii_digit())
        }
    }
}

/// Convert a snake_case column name to lower-camel (`loan_type` →
/// `loanType`), the form the state loader uses for flattened fields.
#[must_use]
pub fn to_lower_camel(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut upper_next = false;
    for ch in raw.trim().chars() {
        if ch == '_' || ch == '-' || ch.is_whitespace() {
            upper_next = !out.is_empty();
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.extend(ch.to_lowercase());
        }
    }
    out
}

/// Re-key a field map by normalized field name, the form evaluation
/// contexts use.
#[must_use]
pub fn normalize_keys(fields: &FieldMap) -> FieldMap {
    fields
        .iter()
        .map(|(k, v)| (normalize_field(k), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_field_forms() {
        assert_eq!(normalize_field("Citizenship Type"), "citizenship_type");
        assert_eq!(normalize_field("loanType"), "loan_type");
        assert_eq!(normalize_field("loan_type"), "loan_type");
        assert_eq!(normalize_field("Loan-to-Value"), "loan_to_value");
        assert_eq!(normalize_field("  Visa Type "), "visa_type");
    }

    #[test]
    fn test_normalize_field_idempotent() {
        for raw in ["Citizenship Type", "loanType", "property_yearBuilt", "US_CITIZEN"] {
            let once = normalize_field(raw);
            assert_eq!(normalize_field(&once), once, "not idempotent for {raw}");
        }
    }

    #[test]
    fn test_normalize_value_kinds() {
        assert_eq!(normalize_value("true"), FieldValue::Bool(true));
        assert_eq!(normalize_value("620"), FieldValue::Number(620.0));
        assert_eq!(normalize_value("-3.5"), FieldValue::Number(-3.5));
        assert_eq!(
            normalize_value("US Citizen"),
            FieldValue::Text("US_CITIZEN".to_string())
        );
        assert_eq!(
            normalize_value("Non-Permanent Resident"),
            FieldValue::Text("NON_PERMANENT_RESIDENT".to_string())
        );
    }

    #[test]
    fn test_numeric_literal() {
        assert!(is_numeric_literal("0"));
        assert!(is_numeric_literal("-12"));
        assert!(is_numeric_literal("3.25"));
        assert!(!is_numeric_literal("1."));
        assert!(!is_numeric_literal(".5"));
        assert!(!is_numeric_literal("1e5"));
        assert!(!is_numeric_literal("H-1B"));
    }

    #[test]
    fn test_lower_camel() {
        assert_eq!(to_lower_camel("loan_type"), "loanType");
        assert_eq!(to_lower_camel("first_name"), "firstName");
        assert_eq!(to_lower_camel("pid"), "pid");
    }

    #[test]
    fn test_render() {
        assert_eq!(FieldValue::Number(40.0).render(), "40");
        assert_eq!(FieldValue::Number(3.5).render(), "3.5");
        assert_eq!(FieldValue::Text("Acme Corp".into()).render(), "Acme Corp");
        assert_eq!(FieldValue::Null.render(), "");
    }

    #[test]
    fn test_from_json_scalars_only() {
        assert_eq!(
            FieldValue::from_json(&serde_json::json!("x")),
            Some(FieldValue::Text("x".into()))
        );
        assert_eq!(
            FieldValue::from_json(&serde_json::json!(1.5)),
            Some(FieldValue::Number(1.5))
        );
        assert_eq!(FieldValue::from_json(&serde_json::json!(null)), Some(FieldValue::Null));
        assert_eq!(FieldValue::from_json(&serde_json::json!([1, 2])), None);
        assert_eq!(FieldValue::from_json(&serde_json::json!({"a": 1})), None);
    }
}
