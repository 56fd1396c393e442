//! Split-key binary codec
//!
//! A loan state is stored under four keys (`:fields`, `:entities`,
//! `:answered`, `:meta`). The three binary parts use msgpack; `:answered`
//! rides the store's native set type, so it crosses this codec as a plain
//! string sequence and is rebuilt into a set on decode. `loaded_at` travels
//! as an ISO-8601 string (chrono's serde form), `version` as integer
//! milliseconds.

use super::model::{EntityGraph, LoanState};
use crate::error::StateError;
use crate::value::FieldMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Raw split-key read result. `answered` may legitimately be empty; any of
/// the binary parts being absent marks the entry incomplete.
#[derive(Debug, Default, Clone)]
pub struct StateParts {
    /// `loan:<pid>:fields` value, if present.
    pub fields: Option<Vec<u8>>,
    /// `loan:<pid>:entities` value, if present.
    pub entities: Option<Vec<u8>>,
    /// `loan:<pid>:meta` value, if present.
    pub meta: Option<Vec<u8>>,
    /// `loan:<pid>:answered` members.
    pub answered: Vec<String>,
}

/// Encoded split-key write payload.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedState {
    /// msgpack field map.
    pub fields: Vec<u8>,
    /// msgpack entity graph.
    pub entities: Vec<u8>,
    /// msgpack version/loaded-at document.
    pub meta: Vec<u8>,
    /// Answered ids as a sequence for the store's native set.
    pub answered: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MetaDoc {
    version: i64,
    loaded_at: DateTime<Utc>,
}

/// Encode a loan state into its four parts.
///
/// # Errors
///
/// msgpack serialization failure (should not happen for well-formed state).
pub fn encode(state: &LoanState) -> Result<EncodedState, StateError> {
    let fields = rmp_serde::to_vec_named(&state.fields)
        .map_err(|e| StateError::Codec(format!("encode fields: {e}")))?;
    let entities = rmp_serde::to_vec_named(&state.entities)
        .map_err(|e| StateError::Codec(format!("encode entities: {e}")))?;
    let meta = rmp_serde::to_vec_named(&MetaDoc {
        version: state.version,
        loaded_at: state.loaded_at,
    })
    .map_err(|e| StateError::Codec(format!("encode meta: {e}")))?;

    let mut answered: Vec<String> = state.answered.iter().cloned().collect();
    answered.sort();

    Ok(EncodedState { fields, entities, meta, answered })
}

/// Decode split-key parts back into a loan state.
///
/// Returns `Ok(None)` when the entry is incomplete (any binary part
/// missing), which callers treat as a miss.
///
/// # Errors
///
/// Corrupt msgpack in any present part.
pub fn decode(proposal_pid: &str, parts: StateParts) -> Result<Option<LoanState>, StateError> {
    let (Some(fields_buf), Some(entities_buf), Some(meta_buf)) =
        (parts.fields, parts.entities, parts.meta)
    else {
        return Ok(None);
    };

    let fields: FieldMap = rmp_serde::from_slice(&fields_buf)
        .map_err(|e| StateError::Codec(format!("decode fields: {e}")))?;
    let entities: EntityGraph = rmp_serde::from_slice(&entities_buf)
        .map_err(|e| StateError::Codec(format!("decode entities: {e}")))?;
    let meta: MetaDoc = rmp_serde::from_slice(&meta_buf)
        .map_err(|e| StateError::Codec(format!("decode meta: {e}")))?;

    let answered: HashSet<String> = parts.answered.into_iter().collect();

    Ok(Some(LoanState {
        proposal_pid: proposal_pid.to_string(),
        version: meta.version,
        loaded_at: meta.loaded_at,
        fields,
        entities,
        answered,
    }))
}
