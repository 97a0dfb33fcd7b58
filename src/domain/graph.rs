//! Reference graph between migrated records
//!
//! Records point at other records through typed references. The destination
//! system can only create a record once every record it references exists,
//! so the graph must admit a creation order. Uses petgraph for the final
//! topological ordering; cycle breaking lives in [`super::linearize`].

use indexmap::IndexMap;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use super::id::{RecordId, ReferenceKind};

#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("Reference cycle through record {0}")]
    CycleDetected(RecordId),

    #[error("Record not found: {0}")]
    RecordNotFound(RecordId),
}

/// A directed reference `source --kind--> target`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
    pub source: RecordId,
    pub kind: ReferenceKind,
    pub target: RecordId,
}

impl Edge {
    pub fn new(source: RecordId, kind: ReferenceKind, target: RecordId) -> Self {
        Self {
            source,
            kind,
            target,
        }
    }

    /// The same reference pointing the other way
    pub fn reversed(&self) -> Self {
        Self {
            source: self.target.clone(),
            kind: self.kind.clone(),
            target: self.source.clone(),
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -{}-> {}", self.source, self.kind, self.target)
    }
}

/// Outgoing references of one record, grouped by kind
///
/// A kind with no targets left is removed rather than kept empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceSet(IndexMap<ReferenceKind, Vec<RecordId>>);

impl ReferenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Targets of the given kind, in insertion order
    pub fn targets(&self, kind: &ReferenceKind) -> &[RecordId] {
        self.0.get(kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, kind: &ReferenceKind, target: &RecordId) -> bool {
        self.targets(kind).contains(target)
    }

    /// Adds a reference; returns false if it was already present
    pub fn add(&mut self, kind: ReferenceKind, target: RecordId) -> bool {
        let targets = self.0.entry(kind).or_default();
        if targets.contains(&target) {
            return false;
        }
        targets.push(target);
        true
    }

    /// Removes a reference; drops the kind when nothing is left
    pub fn remove(&mut self, kind: &ReferenceKind, target: &RecordId) -> bool {
        let Some(targets) = self.0.get_mut(kind) else {
            return false;
        };
        let before = targets.len();
        targets.retain(|t| t != target);
        let removed = targets.len() != before;
        if targets.is_empty() {
            self.0.shift_remove(kind);
        }
        removed
    }

    pub fn kinds(&self) -> impl Iterator<Item = &ReferenceKind> {
        self.0.keys()
    }

    /// All `(kind, target)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&ReferenceKind, &RecordId)> {
        self.0
            .iter()
            .flat_map(|(kind, targets)| targets.iter().map(move |t| (kind, t)))
    }

    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Implemented by anything an [`EditList`] can be applied to
pub trait HasReferences {
    fn references(&self) -> &ReferenceSet;
    fn references_mut(&mut self) -> &mut ReferenceSet;
}

/// A record and its outgoing references
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    #[serde(default)]
    pub references: ReferenceSet,
}

impl Record {
    pub fn new(id: RecordId) -> Self {
        Self {
            id,
            references: ReferenceSet::new(),
        }
    }

    /// Outgoing references as edges
    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.references
            .iter()
            .map(|(kind, target)| Edge::new(self.id.clone(), kind.clone(), target.clone()))
    }
}

impl HasReferences for Record {
    fn references(&self) -> &ReferenceSet {
        &self.references
    }

    fn references_mut(&mut self) -> &mut ReferenceSet {
        &mut self.references
    }
}

/// References to remove and add, as computed by the linearizer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditList {
    pub removals: Vec<Edge>,
    pub additions: Vec<Edge>,
}

impl EditList {
    pub fn is_empty(&self) -> bool {
        self.removals.is_empty() && self.additions.is_empty()
    }

    pub fn extend(&mut self, other: EditList) {
        self.removals.extend(other.removals);
        self.additions.extend(other.additions);
    }

    /// Applies removals, then additions, to the given records
    ///
    /// Additions already present are skipped. A record left without targets
    /// for a kind loses that kind entirely.
    pub fn apply<R: HasReferences>(
        &self,
        records: &mut IndexMap<RecordId, R>,
    ) -> Result<(), GraphError> {
        for edge in &self.removals {
            let record = records
                .get_mut(&edge.source)
                .ok_or_else(|| GraphError::RecordNotFound(edge.source.clone()))?;
            record.references_mut().remove(&edge.kind, &edge.target);
        }

        for edge in &self.additions {
            let record = records
                .get_mut(&edge.source)
                .ok_or_else(|| GraphError::RecordNotFound(edge.source.clone()))?;
            record
                .references_mut()
                .add(edge.kind.clone(), edge.target.clone());
        }

        Ok(())
    }
}

/// All records of a migration batch and their references
///
/// Serialized as `{ "<record-id>": { "<kind>": ["<target-id>", ...] } }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "IndexMap<RecordId, ReferenceSet>",
    into = "IndexMap<RecordId, ReferenceSet>"
)]
pub struct ReferenceGraph {
    records: IndexMap<RecordId, Record>,
}

impl ReferenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record, merging references if it already exists
    pub fn insert(&mut self, record: Record) {
        match self.records.get_mut(&record.id) {
            Some(existing) => {
                for (kind, target) in record.references.iter() {
                    existing.references.add(kind.clone(), target.clone());
                }
            }
            None => {
                self.records.insert(record.id.clone(), record);
            }
        }
    }

    /// Adds a reference, creating the source record if needed
    pub fn add_reference(&mut self, source: &RecordId, kind: ReferenceKind, target: RecordId) {
        self.records
            .entry(source.clone())
            .or_insert_with(|| Record::new(source.clone()))
            .references
            .add(kind, target);
    }

    pub fn get(&self, id: &RecordId) -> Option<&Record> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.records.contains_key(id)
    }

    /// Records in insertion order
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Reference kinds in order of first appearance
    pub fn kinds(&self) -> Vec<ReferenceKind> {
        let mut kinds: Vec<ReferenceKind> = Vec::new();
        for record in self.records.values() {
            for kind in record.references.kinds() {
                if !kinds.contains(kind) {
                    kinds.push(kind.clone());
                }
            }
        }
        kinds
    }

    /// All edges, or only those of one kind
    pub fn edges<'a>(&'a self, kind: Option<&'a ReferenceKind>) -> impl Iterator<Item = Edge> + 'a {
        self.records
            .values()
            .flat_map(Record::edges)
            .filter(move |edge| kind.map_or(true, |k| &edge.kind == k))
    }

    /// Edges whose target is not part of the graph
    pub fn dangling(&self) -> Vec<Edge> {
        self.edges(None)
            .filter(|edge| !self.contains(&edge.target))
            .collect()
    }

    /// Applies an edit list in place
    pub fn apply(&mut self, edits: &EditList) -> Result<(), GraphError> {
        edits.apply(&mut self.records)
    }

    /// Returns record ids so that every record follows the records it references
    ///
    /// Considers all kinds. Targets outside the graph impose no constraint.
    pub fn creation_order(&self) -> Result<Vec<RecordId>, GraphError> {
        let mut graph: DiGraph<RecordId, ()> = DiGraph::with_capacity(self.len(), 0);
        let mut node_map: HashMap<&RecordId, NodeIndex> = HashMap::with_capacity(self.len());

        for id in self.records.keys() {
            node_map.insert(id, graph.add_node(id.clone()));
        }

        // Edge direction: target -> source, i.e. "target must exist first"
        for record in self.records.values() {
            let source_idx = node_map[&record.id];
            for (_, target) in record.references.iter() {
                if let Some(&target_idx) = node_map.get(target) {
                    graph.update_edge(target_idx, source_idx, ());
                }
            }
        }

        match toposort(&graph, None) {
            Ok(order) => Ok(order
                .into_iter()
                .filter_map(|idx| graph.node_weight(idx).cloned())
                .collect()),
            Err(cycle) => Err(GraphError::CycleDetected(graph[cycle.node_id()].clone())),
        }
    }
}

impl From<IndexMap<RecordId, ReferenceSet>> for ReferenceGraph {
    fn from(map: IndexMap<RecordId, ReferenceSet>) -> Self {
        let records = map
            .into_iter()
            .map(|(id, references)| (id.clone(), Record { id, references }))
            .collect();
        Self { records }
    }
}

impl From<ReferenceGraph> for IndexMap<RecordId, ReferenceSet> {
    fn from(graph: ReferenceGraph) -> Self {
        graph
            .records
            .into_iter()
            .map(|(id, record)| (id, record.references))
            .collect()
    }
}

impl FromIterator<Record> for ReferenceGraph {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        let mut graph = Self::new();
        for record in iter {
            graph.insert(record);
        }
        graph
    }
}
