//! Configuration-tree loader
//!
//! Scans `<root>/sections/*.yaml` and the recursive `<root>/questions/`
//! tree, compiles every criteria string and installs the resulting decision
//! tables in the rules engine. Any failure is fatal and carries the
//! offending file path; partial startup is forbidden.

use super::model::{EntityLevel, Flexibility, FormField, InputKind, Question, Section};
use crate::criteria;
use crate::error::CatalogError;
use crate::rules::RulesEngine;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Raw question descriptor as it appears on disk.
#[derive(Debug, Deserialize)]
struct QuestionFile {
    id: String,
    name: String,
    section: String,
    ordinal: u32,
    level: EntityLevel,
    instructions: String,
    #[serde(rename = "type")]
    input: InputKind,
    #[serde(default)]
    form_fields: Vec<FormField>,
    #[serde(default)]
    criteria: String,
    #[serde(default)]
    flexibility: Flexibility,
    #[serde(default)]
    options: Option<Vec<String>>,
    #[serde(default)]
    can_combine_with: Vec<String>,
    #[serde(default)]
    extraction_hints: Vec<String>,
}

/// Load every section descriptor under `<root>/sections/`.
pub(super) fn load_sections(root: &Path) -> Result<Vec<Section>, CatalogError> {
    let dir = root.join("sections");
    if !dir.is_dir() {
        return Err(CatalogError::MissingRoot(format!(
            "{} is not a directory",
            dir.display()
        )));
    }

    let mut sections = Vec::new();
    for path in yaml_files(&dir)? {
        let section: Section = read_yaml(&path)?;
        debug!(id = %section.id, sequence = section.sequence, "loaded section");
        sections.push(section);
    }

    sections.sort_by_key(|s| s.sequence);
    for pair in sections.windows(2) {
        if pair[0].sequence == pair[1].sequence {
            return Err(CatalogError::DuplicateSequence {
                sequence: pair[0].sequence,
                first: pair[0].id.clone(),
                second: pair[1].id.clone(),
            });
        }
    }
    Ok(sections)
}

/// Load every question descriptor under the recursive `<root>/questions/`
/// tree, compile its criteria and install the table in the engine.
pub(super) fn load_questions(
    root: &Path,
    sections: &[Section],
    engine: &RulesEngine,
) -> Result<Vec<Question>, CatalogError> {
    let dir = root.join("questions");
    if !dir.is_dir() {
        return Err(CatalogError::MissingRoot(format!(
            "{} is not a directory",
            dir.display()
        )));
    }

    let mut files = Vec::new();
    collect_yaml_recursive(&dir, &mut files)?;
    files.sort();

    let mut questions = Vec::new();
    for path in files {
        let raw: QuestionFile = read_yaml(&path)?;
        let path_str = path.display().to_string();

        let section = sections
            .iter()
            .find(|s| s.id == raw.section)
            .ok_or_else(|| CatalogError::UnknownSection {
                question: raw.id.clone(),
                section: raw.section.clone(),
                path: path_str.clone(),
            })?;

        let table = criteria::compile(&raw.criteria)
            .map_err(|source| CatalogError::Criteria { path: path_str.clone(), source })?;
        let always_applicable = table.rules.is_empty();

        let question = Question {
            id: raw.id,
            name: raw.name,
            section: raw.section,
            section_sequence: section.sequence,
            ordinal: raw.ordinal,
            level: raw.level,
            instructions: raw.instructions,
            input: raw.input,
            form_fields: raw.form_fields,
            criteria: raw.criteria,
            flexibility: raw.flexibility,
            options: raw.options,
            can_combine_with: raw.can_combine_with,
            extraction_hints: raw.extraction_hints,
            always_applicable,
        };

        if questions.iter().any(|q: &Question| q.id == question.id) {
            return Err(CatalogError::DuplicateQuestion { id: question.id, path: path_str });
        }

        engine.install(&question.rule_id(), table);
        debug!(id = %question.id, level = ?question.level, always_applicable, "loaded question");
        questions.push(question);
    }

    // Ordinal uniqueness within each section.
    let mut sorted: Vec<&Question> = questions.iter().collect();
    sorted.sort_by(|a, b| (a.section_sequence, a.ordinal).cmp(&(b.section_sequence, b.ordinal)));
    for pair in sorted.windows(2) {
        if pair[0].section == pair[1].section && pair[0].ordinal == pair[1].ordinal {
            return Err(CatalogError::DuplicateOrdinal {
                ordinal: pair[0].ordinal,
                section: pair[0].section.clone(),
                first: pair[0].id.clone(),
                second: pair[1].id.clone(),
            });
        }
    }

    Ok(questions)
}

fn yaml_files(dir: &Path) -> Result<Vec<PathBuf>, CatalogError> {
    let entries = std::fs::read_dir(dir).map_err(|source| CatalogError::Io {
        path: dir.display().to_string(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| CatalogError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        let path = entry.path();
        if is_yaml(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn collect_yaml_recursive(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), CatalogError> {
    let entries = std::fs::read_dir(dir).map_err(|source| CatalogError::Io {
        path: dir.display().to_string(),
        source,
    })?;

    for entry in entries {
        let entry = entry.map_err(|source| CatalogError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_yaml_recursive(&path, out)?;
        } else if is_yaml(&path) {
            out.push(path);
        }
    }
    Ok(())
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, CatalogError> {
    let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_yaml::from_str(&text).map_err(|source| CatalogError::Parse {
        path: path.display().to_string(),
        source,
    })
}
