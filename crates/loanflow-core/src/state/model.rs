//! Loan working-set model
//!
//! [`LoanState`] is the full per-proposal working set: flattened proposal +
//! property fields, the five entity lists and the answered-question set.
//! Materialized by the loader on the first request, mutated only through
//! cache-update operations, evicted by the remote store's TTL.

use crate::catalog::EntityLevel;
use crate::value::{FieldMap, FieldValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One borrower, job, asset, liability or owned-property instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRef {
    /// Stable identifier in the system of record.
    pub pid: String,
    /// Human-readable name used in merge fields and the queue.
    pub display_name: String,
    /// Flattened entity columns (lower-camel keys).
    pub fields: FieldMap,
}

/// The five entity lists of a loan application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityGraph {
    /// Borrowers on the deal.
    pub borrowers: Vec<EntityRef>,
    /// Employment records.
    pub jobs: Vec<EntityRef>,
    /// Assets.
    pub assets: Vec<EntityRef>,
    /// Liabilities.
    pub liabilities: Vec<EntityRef>,
    /// Owned real-estate records.
    pub real_estate_owned: Vec<EntityRef>,
}

impl EntityGraph {
    /// Entity list for a non-singleton level; `None` for the singleton
    /// levels, which evaluate against the null slot.
    #[must_use]
    pub fn for_level(&self, level: EntityLevel) -> Option<&[EntityRef]> {
        match level {
            EntityLevel::Borrower => Some(&self.borrowers),
            EntityLevel::Job => Some(&self.jobs),
            EntityLevel::Asset => Some(&self.assets),
            EntityLevel::Liability => Some(&self.liabilities),
            EntityLevel::RealEstateOwned => Some(&self.real_estate_owned),
            EntityLevel::Proposal | EntityLevel::Property => None,
        }
    }
}

/// Full per-proposal working set.
#[derive(Debug, Clone, PartialEq)]
pub struct LoanState {
    /// Proposal identifier.
    pub proposal_pid: String,
    /// Monotonic version token; strictly increases on every mutation.
    pub version: i64,
    /// Wall-clock load time.
    pub loaded_at: DateTime<Utc>,
    /// Flattened proposal + property fields (property columns prefixed
    /// `property_`).
    pub fields: FieldMap,
    /// The five entity lists.
    pub entities: EntityGraph,
    /// Ids of questions already answered for this deal.
    pub answered: HashSet<String>,
}

impl LoanState {
    /// Next version token: wall-clock milliseconds, forced past the current
    /// version so same-millisecond mutations stay strictly monotonic.
    #[must_use]
    pub fn next_version(&self) -> i64 {
        Utc::now().timestamp_millis().max(self.version + 1)
    }

    /// Read a flattened loan field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}
