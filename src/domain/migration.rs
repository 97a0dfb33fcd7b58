//! Migration driver
//!
//! Turns already-fetched legacy records into staged records for the
//! destination system. Rich-text values go through markup reconstruction as
//! each record is staged; once the whole batch is staged, references are
//! linearized per kind and the resulting edits are patched into the staged
//! records.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use super::graph::{Edge, GraphError, HasReferences, Record, ReferenceGraph, ReferenceSet};
use super::id::{IdError, RecordId, ReferenceKind};
use super::linearize::{
    linearize, LinearizeConfig, LinearizeError, Linearization, UnresolvedCycles,
    DEFAULT_MAX_DEPTH, DEFAULT_MAX_PASSES,
};
use super::markup::{AnnotatedText, MarkupError, TextAttributes, TieBreak};

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error(transparent)]
    Linearize(#[from] LinearizeError),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Why a single property value could not be staged
#[derive(Debug, Error)]
enum StageError {
    #[error(transparent)]
    Markup(#[from] MarkupError),

    #[error(transparent)]
    Id(#[from] IdError),
}

/// A record as exported from the legacy store
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyRecord {
    pub id: RecordId,
    #[serde(default)]
    pub restype: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub properties: Vec<LegacyProperty>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LegacyProperty {
    pub name: String,
    #[serde(default)]
    pub values: Vec<LegacyValue>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LegacyValue {
    Text {
        value: String,
    },
    Richtext {
        utf8str: String,
        #[serde(default)]
        textattr: Option<TextAttributes>,
        #[serde(default)]
        resource_reference: Vec<RecordId>,
    },
    /// Reference to another record; the property name is its kind
    Resptr {
        value: RecordId,
    },
    /// Nested list of values, flattened in order
    Group {
        values: Vec<LegacyValue>,
    },
    /// Anything else, carried over unchanged
    Plain {
        value: serde_json::Value,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    Utf8,
    Xml,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputValue {
    Text {
        text: String,
        encoding: Encoding,
        /// Records linked from within the text
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        resrefs: Vec<RecordId>,
    },
    Plain {
        value: serde_json::Value,
    },
}

/// A record ready for the destination import
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedRecord {
    pub id: RecordId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub properties: IndexMap<String, Vec<OutputValue>>,
    #[serde(default, skip_serializing_if = "ReferenceSet::is_empty")]
    pub references: ReferenceSet,
}

impl StagedRecord {
    pub fn new(id: RecordId) -> Self {
        Self {
            id,
            restype: None,
            label: None,
            properties: IndexMap::new(),
            references: ReferenceSet::new(),
        }
    }

    fn push_value(&mut self, property: &str, value: OutputValue) {
        self.properties
            .entry(property.to_string())
            .or_default()
            .push(value);
    }
}

impl HasReferences for StagedRecord {
    fn references(&self) -> &ReferenceSet {
        &self.references
    }

    fn references_mut(&mut self) -> &mut ReferenceSet {
        &mut self.references
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationConfig {
    /// Kinds to linearize, in order; empty means every kind in the batch
    pub kinds: Vec<ReferenceKind>,
    pub max_depth: usize,
    pub max_passes: usize,
    pub tie_break: TieBreak,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            kinds: Vec::new(),
            max_depth: DEFAULT_MAX_DEPTH,
            max_passes: DEFAULT_MAX_PASSES,
            tie_break: TieBreak::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Staged,
    /// Same id seen before in this batch; skipped
    Duplicate,
    /// A value was malformed; the record is listed in the report
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRecord {
    pub id: RecordId,
    pub property: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub generated_at: DateTime<Utc>,
    pub staged: usize,
    pub rejected: Vec<RejectedRecord>,
    pub duplicates: Vec<RecordId>,
    pub linearizations: Vec<Linearization>,
    /// References to records that are not part of the batch
    pub dangling: Vec<Edge>,
    /// Set when the staged records could not be put in creation order
    pub cycle_through: Option<RecordId>,
}

impl MigrationReport {
    pub fn unresolved(&self) -> impl Iterator<Item = &UnresolvedCycles> {
        self.linearizations
            .iter()
            .filter_map(|l| l.unresolved.as_ref())
    }

    /// Number of references reversed across all kinds
    pub fn reversals(&self) -> usize {
        self.linearizations
            .iter()
            .map(|l| l.edits.removals.len())
            .sum()
    }
}

/// Staged records, in creation order when one exists
#[derive(Debug, Clone)]
pub struct MigrationOutput {
    pub records: Vec<StagedRecord>,
    pub report: MigrationReport,
}

/// Stages legacy records one by one, then linearizes the batch once
#[derive(Debug)]
pub struct Migration {
    config: MigrationConfig,
    seen: HashSet<RecordId>,
    staged: IndexMap<RecordId, StagedRecord>,
    rejected: Vec<RejectedRecord>,
    duplicates: Vec<RecordId>,
}

impl Migration {
    pub fn new(config: MigrationConfig) -> Self {
        Self {
            config,
            seen: HashSet::new(),
            staged: IndexMap::new(),
            rejected: Vec::new(),
            duplicates: Vec::new(),
        }
    }

    /// Transforms one legacy record
    pub fn stage(&mut self, legacy: LegacyRecord) -> StageOutcome {
        if !self.seen.insert(legacy.id.clone()) {
            tracing::warn!(id = %legacy.id, "skipping duplicate record");
            self.duplicates.push(legacy.id);
            return StageOutcome::Duplicate;
        }

        match stage_record(legacy, self.config.tie_break) {
            Ok(record) => {
                self.staged.insert(record.id.clone(), record);
                StageOutcome::Staged
            }
            Err(rejected) => {
                tracing::warn!(
                    id = %rejected.id,
                    property = %rejected.property,
                    reason = %rejected.reason,
                    "rejecting record"
                );
                self.rejected.push(rejected);
                StageOutcome::Rejected
            }
        }
    }

    pub fn staged(&self) -> impl Iterator<Item = &StagedRecord> {
        self.staged.values()
    }

    /// Linearizes references and returns the patched records with a report
    pub fn finish(self) -> Result<MigrationOutput, MigrationError> {
        let Migration {
            config,
            mut staged,
            rejected,
            duplicates,
            ..
        } = self;

        let mut graph: ReferenceGraph = staged
            .values()
            .map(|s| Record {
                id: s.id.clone(),
                references: s.references.clone(),
            })
            .collect();

        let kinds = if config.kinds.is_empty() {
            graph.kinds()
        } else {
            config.kinds.clone()
        };

        let mut linearizations = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let linearize_config = LinearizeConfig::new(kind)
                .with_max_depth(config.max_depth)
                .with_max_passes(config.max_passes);
            let linearization = linearize(&graph, &linearize_config)?;

            graph.apply(&linearization.edits)?;
            linearization.edits.apply(&mut staged)?;
            linearizations.push(linearization);
        }

        let dangling = graph.dangling();
        for edge in &dangling {
            tracing::warn!(%edge, "reference target is not part of the batch");
        }

        let (records, cycle_through) = match graph.creation_order() {
            Ok(order) => {
                let records = order
                    .iter()
                    .filter_map(|id| staged.shift_remove(id))
                    .collect();
                (records, None)
            }
            Err(GraphError::CycleDetected(id)) => {
                tracing::warn!(%id, "no creation order; keeping input order");
                (staged.into_values().collect::<Vec<_>>(), Some(id))
            }
            Err(e) => return Err(e.into()),
        };

        let report = MigrationReport {
            generated_at: Utc::now(),
            staged: records.len(),
            rejected,
            duplicates,
            linearizations,
            dangling,
            cycle_through,
        };

        Ok(MigrationOutput { records, report })
    }
}

fn stage_record(legacy: LegacyRecord, tie_break: TieBreak) -> Result<StagedRecord, RejectedRecord> {
    let mut record = StagedRecord::new(legacy.id.clone());
    record.restype = legacy.restype;
    record.label = legacy.label;

    for property in legacy.properties {
        stage_property(&mut record, &property.name, property.values, tie_break).map_err(|e| {
            RejectedRecord {
                id: legacy.id.clone(),
                property: property.name.clone(),
                reason: e.to_string(),
            }
        })?;
    }

    Ok(record)
}

fn stage_property(
    record: &mut StagedRecord,
    name: &str,
    values: Vec<LegacyValue>,
    tie_break: TieBreak,
) -> Result<(), StageError> {
    // Explicit worklist instead of recursing into groups; reversed so that
    // popping yields values in their original order
    let mut worklist: Vec<LegacyValue> = values.into_iter().rev().collect();

    while let Some(value) = worklist.pop() {
        match value {
            LegacyValue::Group { values } => worklist.extend(values.into_iter().rev()),
            LegacyValue::Resptr { value } => {
                record.references.add(name.parse()?, value);
            }
            LegacyValue::Text { value } => {
                if !value.is_empty() {
                    record.push_value(
                        name,
                        OutputValue::Text {
                            text: value,
                            encoding: Encoding::Utf8,
                            resrefs: Vec::new(),
                        },
                    );
                }
            }
            LegacyValue::Richtext {
                utf8str,
                textattr,
                resource_reference,
            } => {
                if !utf8str.trim().is_empty() {
                    let value = rich_text(utf8str, textattr, resource_reference, tie_break)?;
                    record.push_value(name, value);
                }
            }
            LegacyValue::Plain { value } => record.push_value(name, OutputValue::Plain { value }),
        }
    }

    Ok(())
}

fn rich_text(
    utf8str: String,
    textattr: Option<TextAttributes>,
    mut resrefs: Vec<RecordId>,
    tie_break: TieBreak,
) -> Result<OutputValue, MarkupError> {
    let attributes = match textattr {
        Some(attributes) => attributes.decode()?,
        None => IndexMap::new(),
    };

    if attributes.values().all(Vec::is_empty) {
        return Ok(OutputValue::Text {
            text: utf8str,
            encoding: Encoding::Utf8,
            resrefs,
        });
    }

    let result = AnnotatedText::from_legacy(utf8str, &attributes)?.reconstruct(tie_break)?;
    for link in result.links {
        if !resrefs.contains(&link) {
            resrefs.push(link);
        }
    }

    Ok(OutputValue::Text {
        text: result.markup,
        encoding: Encoding::Xml,
        resrefs,
    })
}
