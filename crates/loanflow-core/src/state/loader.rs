//! State loader
//!
//! Resolves a proposal pid into a normalized [`LoanState`] by walking the
//! system of record: proposal → deal → borrowers → (jobs, assets,
//! liabilities, owned real estate, property) → answered ids. The four child
//! collections and the property row are fetched in parallel once the
//! borrower pid set is known.

use super::model::{EntityGraph, EntityRef, LoanState};
use crate::error::StateError;
use crate::record::{RecordRow, SystemOfRecord};
use crate::value::{to_lower_camel, FieldMap, FieldValue};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

/// Builds [`LoanState`] from the system of record.
pub struct StateLoader {
    record: Arc<dyn SystemOfRecord>,
}

impl StateLoader {
    /// Create a loader over a system-of-record handle.
    #[must_use]
    pub fn new(record: Arc<dyn SystemOfRecord>) -> Self {
        Self { record }
    }

    /// Load the full working set for a proposal.
    ///
    /// # Errors
    ///
    /// [`StateError::ProposalNotFound`] when the pid is unknown; record
    /// errors propagate (the cache-miss branch has no fallback).
    pub async fn load(&self, proposal_pid: &str) -> Result<LoanState, StateError> {
        let proposal = self
            .record
            .proposal(proposal_pid)
            .await?
            .ok_or_else(|| StateError::ProposalNotFound(proposal_pid.to_string()))?;

        let deal_pid = match string_column(&proposal, "deal_pid") {
            Some(pid) => pid,
            None => {
                warn!(proposal_pid, "proposal has no deal_pid, using proposal pid");
                proposal_pid.to_string()
            }
        };

        let borrowers = self.record.borrowers(&deal_pid).await?;
        let borrower_pids: Vec<String> = borrowers
            .iter()
            .filter_map(|row| string_column(row, "pid"))
            .collect();

        let (jobs, assets, liabilities, reo, property) = tokio::try_join!(
            self.record.jobs(&borrower_pids),
            self.record.assets(&borrower_pids),
            self.record.liabilities(&borrower_pids),
            self.record.real_estate_owned(&borrower_pids),
            self.record.property(&deal_pid),
        )?;

        let answered = self.record.answered_question_ids(&deal_pid).await?;

        let mut fields = flatten(&proposal, None);
        if let Some(property_row) = &property {
            fields.extend(flatten(property_row, Some("property_")));
        }

        let entities = EntityGraph {
            borrowers: borrowers
                .iter()
                .enumerate()
                .map(|(i, row)| entity(row, borrower_display_name(row, i)))
                .collect(),
            jobs: named_entities(&jobs, &["employer_name"], "Job"),
            assets: named_entities(&assets, &["institution_name", "asset_type"], "Asset"),
            liabilities: named_entities(&liabilities, &["creditor_name", "liability_type"], "Liability"),
            real_estate_owned: named_entities(&reo, &["address", "property_type"], "Property"),
        };

        debug!(
            proposal_pid,
            deal_pid,
            borrowers = entities.borrowers.len(),
            jobs = entities.jobs.len(),
            answered = answered.len(),
            "loan state loaded"
        );

        Ok(LoanState {
            proposal_pid: proposal_pid.to_string(),
            version: Utc::now().timestamp_millis(),
            loaded_at: Utc::now(),
            fields,
            entities,
            answered: answered.into_iter().collect(),
        })
    }
}

/// Flatten a row into lower-camel keys, optionally prefixed (`property_`).
fn flatten(row: &RecordRow, prefix: Option<&str>) -> FieldMap {
    row.iter()
        .map(|(column, value)| {
            let key = match prefix {
                Some(p) => format!("{p}{}", to_lower_camel(column)),
                None => to_lower_camel(column),
            };
            (key, value.clone())
        })
        .collect()
}

fn entity(row: &RecordRow, display_name: String) -> EntityRef {
    EntityRef {
        pid: string_column(row, "pid").unwrap_or_default(),
        display_name,
        fields: flatten(row, None),
    }
}

fn named_entities(rows: &[RecordRow], name_columns: &[&str], placeholder: &str) -> Vec<EntityRef> {
    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            let name = name_columns
                .iter()
                .find_map(|col| string_column(row, col))
                .unwrap_or_else(|| format!("{placeholder} {}", i + 1));
            entity(row, name)
        })
        .collect()
}

fn borrower_display_name(row: &RecordRow, index: usize) -> String {
    let first = string_column(row, "first_name").unwrap_or_default();
    let last = string_column(row, "last_name").unwrap_or_default();
    let full = format!("{first} {last}").trim().to_string();
    if full.is_empty() {
        format!("Borrower {}", index + 1)
    } else {
        full
    }
}

fn string_column(row: &RecordRow, column: &str) -> Option<String> {
    match row.get(column) {
        Some(FieldValue::Text(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(FieldValue::Number(n)) => Some(FieldValue::Number(*n).render()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MemoryRecordStore;

    fn row(pairs: &[(&str, FieldValue)]) -> RecordRow {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    async fn seeded_store() -> MemoryRecordStore {
        let store = MemoryRecordStore::new();
        store
            .put_proposal(
                "P-1",
                row(&[
                    ("pid", FieldValue::Text("P-1".into())),
                    ("deal_pid", FieldValue::Text("D-1".into())),
                    ("loan_type", FieldValue::Text("Conventional".into())),
                    ("loan_amount", FieldValue::Number(425_000.0)),
                ]),
            )
            .await;
        store
            .put_borrower(
                "D-1",
                row(&[
                    ("pid", FieldValue::Text("B-1".into())),
                    ("first_name", FieldValue::Text("Ada".into())),
                    ("last_name", FieldValue::Text("Lovelace".into())),
                    ("citizenship_type", FieldValue::Text("US Citizen".into())),
                ]),
            )
            .await;
        store
            .put_job(
                "B-1",
                row(&[
                    ("pid", FieldValue::Text("J-1".into())),
                    ("employer_name", FieldValue::Text("Acme Corp".into())),
                ]),
            )
            .await;
        store
            .put_property(
                "D-1",
                row(&[
                    ("pid", FieldValue::Text("PR-1".into())),
                    ("year_built", FieldValue::Number(1987.0)),
                ]),
            )
            .await;
        store.put_answered("D-1", vec!["Q900".into()]).await;
        store
    }

    #[tokio::test]
    async fn test_load_normalizes_and_flattens() {
        let loader = StateLoader::new(Arc::new(seeded_store().await));
        let state = loader.load("P-1").await.unwrap();

        assert_eq!(state.proposal_pid, "P-1");
        assert_eq!(
            state.fields.get("loanType"),
            Some(&FieldValue::Text("Conventional".into()))
        );
        assert_eq!(
            state.fields.get("property_yearBuilt"),
            Some(&FieldValue::Number(1987.0))
        );
        assert_eq!(state.entities.borrowers.len(), 1);
        assert_eq!(state.entities.borrowers[0].display_name, "Ada Lovelace");
        assert_eq!(state.entities.jobs[0].display_name, "Acme Corp");
        assert!(state.answered.contains("Q900"));
        assert!(state.version > 0);
    }

    #[tokio::test]
    async fn test_unknown_proposal_is_not_found() {
        let loader = StateLoader::new(Arc::new(MemoryRecordStore::new()));
        assert!(matches!(
            loader.load("missing").await,
            Err(StateError::ProposalNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_children_are_empty_lists() {
        let store = MemoryRecordStore::new();
        store
            .put_proposal(
                "P-2",
                row(&[
                    ("pid", FieldValue::Text("P-2".into())),
                    ("deal_pid", FieldValue::Text("D-2".into())),
                ]),
            )
            .await;
        let loader = StateLoader::new(Arc::new(store));
        let state = loader.load("P-2").await.unwrap();
        assert!(state.entities.borrowers.is_empty());
        assert!(state.entities.jobs.is_empty());
        assert!(state.answered.is_empty());
    }

    #[tokio::test]
    async fn test_borrower_placeholder_name() {
        let store = MemoryRecordStore::new();
        store
            .put_proposal(
                "P-3",
                row(&[("deal_pid", FieldValue::Text("D-3".into()))]),
            )
            .await;
        store
            .put_borrower("D-3", row(&[("pid", FieldValue::Text("B-9".into()))]))
            .await;
        let loader = StateLoader::new(Arc::new(store));
        let state = loader.load("P-3").await.unwrap();
        assert_eq!(state.entities.borrowers[0].display_name, "Borrower 1");
    }
}
