//! Configuration registry
//!
//! Loads section and question descriptors from the filesystem tree once at
//! startup, compiles every criteria string through the criteria compiler and
//! registers the decision tables with the rules engine. The resulting
//! [`Catalog`] is immutable and freely shared; all lookups are O(1) or a
//! pre-sorted slice.

mod loader;
mod model;

pub use model::{EntityLevel, Flexibility, FormField, InputKind, Question, Section};

use crate::error::CatalogError;
use crate::rules::RulesEngine;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Immutable registry of sections and questions.
#[derive(Debug)]
pub struct Catalog {
    by_id: HashMap<String, Arc<Question>>,
    by_level: HashMap<EntityLevel, Vec<Arc<Question>>>,
    by_section: HashMap<String, Vec<Arc<Question>>>,
    sections: Vec<Section>,
}

impl Catalog {
    /// Load the configuration tree rooted at `root` and install every
    /// compiled rule in `engine`.
    ///
    /// # Errors
    ///
    /// Any missing directory, unreadable or malformed descriptor, criteria
    /// compile failure, or uniqueness violation aborts the load with the
    /// offending path. Partial startup is forbidden.
    pub fn load(root: &Path, engine: &RulesEngine) -> Result<Self, CatalogError> {
        let sections = loader::load_sections(root)?;
        let questions = loader::load_questions(root, &sections, engine)?;

        let mut by_id = HashMap::with_capacity(questions.len());
        let mut by_level: HashMap<EntityLevel, Vec<Arc<Question>>> = HashMap::new();
        let mut by_section: HashMap<String, Vec<Arc<Question>>> = HashMap::new();

        for question in questions {
            let question = Arc::new(question);
            by_level
                .entry(question.level)
                .or_default()
                .push(Arc::clone(&question));
            by_section
                .entry(question.section.clone())
                .or_default()
                .push(Arc::clone(&question));
            by_id.insert(question.id.clone(), question);
        }

        for list in by_level.values_mut().chain(by_section.values_mut()) {
            list.sort_by_key(|q| (q.section_sequence, q.ordinal));
        }

        info!(
            sections = sections.len(),
            questions = by_id.len(),
            "configuration catalog loaded"
        );

        Ok(Self { by_id, by_level, by_section, sections })
    }

    /// Look up a question by id.
    #[must_use]
    pub fn question(&self, id: &str) -> Option<&Arc<Question>> {
        self.by_id.get(id)
    }

    /// Questions at an entity level, pre-sorted by (section sequence,
    /// ordinal).
    #[must_use]
    pub fn questions_for_level(&self, level: EntityLevel) -> &[Arc<Question>] {
        self.by_level.get(&level).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Questions in a section, pre-sorted by ordinal.
    #[must_use]
    pub fn questions_in_section(&self, section_id: &str) -> &[Arc<Question>] {
        self.by_section
            .get(section_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Sections sorted by sequence.
    #[must_use]
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Total number of loaded questions.
    #[must_use]
    pub fn question_count(&self) -> usize {
        self.by_id.len()
    }
}
