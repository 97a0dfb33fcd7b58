//! Reference linearization and bounded cycle breaking
//!
//! Works on one reference kind at a time. Phase A computes which records can
//! be created once their targets exist, pass by pass, until nothing new
//! resolves. Records left over form the circular set. Phase B walks each
//! circular record's references up to `max_depth + 1` hops and reverses the
//! reference that closes a cycle. The result is an [`EditList`] plus, when
//! cycles longer than the search depth survive, an [`UnresolvedCycles`]
//! warning listing the records a human has to look at.

use indexmap::IndexMap;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use super::graph::{Edge, EditList, ReferenceGraph};
use super::id::{RecordId, ReferenceKind};

/// Hops followed past the first reference when searching for a cycle
pub const DEFAULT_MAX_DEPTH: usize = 3;

/// Feasibility passes allowed before giving up
pub const DEFAULT_MAX_PASSES: usize = 10_000;

#[derive(Debug, Error, PartialEq)]
pub enum LinearizeError {
    #[error(
        "References of kind '{kind}' did not settle within {max_passes} passes \
         ({pending} records still pending)"
    )]
    UnboundedCycle {
        kind: ReferenceKind,
        max_passes: usize,
        pending: usize,
    },
}

/// Cycles the bounded search could not break
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error(
    "{} records remain circular through '{kind}' ({edges} references); \
     cycles longer than {max_cycle} hops need manual review",
    .records.len()
)]
pub struct UnresolvedCycles {
    pub kind: ReferenceKind,
    pub records: Vec<RecordId>,
    pub edges: usize,
    pub max_cycle: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearizeConfig {
    pub kind: ReferenceKind,
    pub max_depth: usize,
    pub max_passes: usize,
}

impl LinearizeConfig {
    pub fn new(kind: ReferenceKind) -> Self {
        Self {
            kind,
            max_depth: DEFAULT_MAX_DEPTH,
            max_passes: DEFAULT_MAX_PASSES,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes;
        self
    }

    /// Longest cycle the search is guaranteed to break
    pub fn max_cycle(&self) -> usize {
        self.max_depth.saturating_add(1)
    }
}

/// Outcome of linearizing one reference kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Linearization {
    pub kind: ReferenceKind,
    pub edits: EditList,
    /// Feasibility passes that resolved at least one record
    pub passes: usize,
    /// Records that could not be resolved before cycle breaking
    pub circular: Vec<RecordId>,
    pub unresolved: Option<UnresolvedCycles>,
}

/// Targets of one kind per record, restricted to records in the graph
type Adjacency = IndexMap<RecordId, Vec<RecordId>>;

/// Computes the edits that make `config.kind` references creatable in order
pub fn linearize(
    graph: &ReferenceGraph,
    config: &LinearizeConfig,
) -> Result<Linearization, LinearizeError> {
    let adjacency = adjacency(graph, &config.kind);
    let feasibility = resolve(&adjacency, config)?;

    tracing::debug!(
        kind = %config.kind,
        passes = feasibility.passes,
        resolved = feasibility.resolved.len(),
        "feasibility fixpoint reached"
    );

    let original = problem_edges(&adjacency, &feasibility.resolved);
    let circular: Vec<RecordId> = original.keys().cloned().collect();

    if circular.is_empty() {
        return Ok(Linearization {
            kind: config.kind.clone(),
            edits: EditList::default(),
            passes: feasibility.passes,
            circular,
            unresolved: None,
        });
    }

    let mut working = original.clone();
    break_cycles(&mut working, config.max_cycle());

    let edits = diff(&original, &working, &config.kind);

    // Re-check with the reversals in place
    let mut patched = adjacency.clone();
    for (source, targets) in patched.iter_mut() {
        if let Some(remaining) = working.get(source) {
            targets.retain(|t| feasibility.resolved.contains(t));
            targets.extend(remaining.iter().cloned());
        }
    }
    let recheck = resolve(&patched, config)?;
    let residual = problem_edges(&patched, &recheck.resolved);

    let unresolved = if residual.is_empty() {
        None
    } else {
        let warning = UnresolvedCycles {
            kind: config.kind.clone(),
            records: residual.keys().cloned().collect(),
            edges: residual.values().map(Vec::len).sum(),
            max_cycle: config.max_cycle(),
        };
        tracing::warn!("{}", warning);
        Some(warning)
    };

    Ok(Linearization {
        kind: config.kind.clone(),
        edits,
        passes: feasibility.passes,
        circular,
        unresolved,
    })
}

fn adjacency(graph: &ReferenceGraph, kind: &ReferenceKind) -> Adjacency {
    graph
        .records()
        .map(|record| {
            let mut targets: Vec<RecordId> = Vec::new();
            for target in record.references.targets(kind) {
                if !graph.contains(target) {
                    tracing::debug!(source = %record.id, %target, "target outside the batch");
                    continue;
                }
                if !targets.contains(target) {
                    targets.push(target.clone());
                }
            }
            (record.id.clone(), targets)
        })
        .collect()
}

struct Feasibility {
    resolved: HashSet<RecordId>,
    passes: usize,
}

/// Phase A: grows the resolved set pass by pass
///
/// A pass resolves every record whose targets were all resolved before the
/// pass started. Counting down pending targets makes each pass touch only
/// the dependents of the previous pass.
fn resolve(adjacency: &Adjacency, config: &LinearizeConfig) -> Result<Feasibility, LinearizeError> {
    let mut pending: HashMap<&RecordId, usize> = HashMap::with_capacity(adjacency.len());
    let mut dependents: HashMap<&RecordId, Vec<&RecordId>> = HashMap::new();
    let mut frontier: Vec<&RecordId> = Vec::new();

    for (source, targets) in adjacency {
        pending.insert(source, targets.len());
        for target in targets {
            dependents.entry(target).or_default().push(source);
        }
        if targets.is_empty() {
            frontier.push(source);
        }
    }

    let mut resolved: HashSet<&RecordId> = frontier.iter().copied().collect();
    let mut passes = 0;

    loop {
        let mut next: Vec<&RecordId> = Vec::new();
        for id in &frontier {
            for &dependent in dependents.get(id).into_iter().flatten() {
                if let Some(count) = pending.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        next.push(dependent);
                    }
                }
            }
        }

        if next.is_empty() {
            break;
        }

        passes += 1;
        if passes > config.max_passes {
            return Err(LinearizeError::UnboundedCycle {
                kind: config.kind.clone(),
                max_passes: config.max_passes,
                pending: adjacency.len() - resolved.len(),
            });
        }

        resolved.extend(next.iter().copied());
        frontier = next;
    }

    Ok(Feasibility {
        resolved: resolved.into_iter().cloned().collect(),
        passes,
    })
}

/// Unresolved records and their references to other unresolved records
fn problem_edges(adjacency: &Adjacency, resolved: &HashSet<RecordId>) -> Adjacency {
    adjacency
        .iter()
        .filter(|(id, _)| !resolved.contains(*id))
        .map(|(id, targets)| {
            let open = targets
                .iter()
                .filter(|t| !resolved.contains(*t))
                .cloned()
                .collect();
            (id.clone(), open)
        })
        .collect()
}

struct Frame {
    node: RecordId,
    targets: Vec<RecordId>,
    next: usize,
}

/// Phase B: bounded depth-first search from every circular record
///
/// A reference whose target is already on the current path closes a cycle
/// and is reversed. Reversals apply to `problem` immediately, so later
/// searches see them.
fn break_cycles(problem: &mut Adjacency, max_hops: usize) {
    let starts: Vec<RecordId> = problem.keys().cloned().collect();

    for start in starts {
        let targets = problem.get(&start).cloned().unwrap_or_default();
        let mut path: Vec<RecordId> = vec![start.clone()];
        let mut stack = vec![Frame {
            node: start,
            targets,
            next: 0,
        }];

        while let Some(frame) = stack.last_mut() {
            let Some(target) = frame.targets.get(frame.next).cloned() else {
                stack.pop();
                path.pop();
                continue;
            };
            frame.next += 1;
            let node = frame.node.clone();

            // Reversed earlier in this search
            if !problem.get(&node).is_some_and(|t| t.contains(&target)) {
                continue;
            }

            if path.contains(&target) {
                reverse(problem, &node, &target);
                continue;
            }

            if path.len() < max_hops {
                let targets = problem.get(&target).cloned().unwrap_or_default();
                path.push(target.clone());
                stack.push(Frame {
                    node: target,
                    targets,
                    next: 0,
                });
            }
        }
    }
}

fn reverse(problem: &mut Adjacency, source: &RecordId, target: &RecordId) {
    tracing::debug!(%source, %target, "reversing reference that closes a cycle");

    if let Some(targets) = problem.get_mut(source) {
        targets.retain(|t| t != target);
    }
    // A self-reference has no meaningful reverse; it is only dropped
    if source == target {
        return;
    }
    if let Some(back) = problem.get_mut(target) {
        if !back.contains(source) {
            back.push(source.clone());
        }
    }
}

/// Edits turning `before` into `after`
fn diff(before: &Adjacency, after: &Adjacency, kind: &ReferenceKind) -> EditList {
    let mut edits = EditList::default();

    for (source, targets) in before {
        let kept = after.get(source);
        for target in targets {
            if !kept.is_some_and(|k| k.contains(target)) {
                edits
                    .removals
                    .push(Edge::new(source.clone(), kind.clone(), target.clone()));
            }
        }
    }

    for (source, targets) in after {
        let existed = before.get(source);
        for target in targets {
            if !existed.is_some_and(|e| e.contains(target)) {
                edits
                    .additions
                    .push(Edge::new(source.clone(), kind.clone(), target.clone()));
            }
        }
    }

    edits
}
