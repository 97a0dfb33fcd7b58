//! Linearize command
//!
//! Runs the linearizer over a JSON reference graph and shows the edits, any
//! residual cycles and the creation order that results.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use super::output::Output;
use crate::domain::{linearize, LinearizeConfig, ReferenceGraph};

pub fn run(output: &Output, path: &Path, config: &LinearizeConfig) -> Result<()> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read reference graph: {}", path.display()))?;
    let mut graph: ReferenceGraph = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse reference graph: {}", path.display()))?;

    output.verbose_ctx(
        "linearize",
        &format!(
            "{} records, kind={}, max_depth={}, max_passes={}",
            graph.len(),
            config.kind,
            config.max_depth,
            config.max_passes
        ),
    );

    let result = linearize(&graph, config)?;
    output.verbose_ctx(
        "linearize",
        &format!(
            "{} passes, {} circular record(s)",
            result.passes,
            result.circular.len()
        ),
    );

    graph.apply(&result.edits)?;
    let order = graph.creation_order();

    if output.is_json() {
        output.data(&serde_json::json!({
            "linearization": result,
            "creation_order": order.as_ref().ok(),
            "cycle": order.as_ref().err().map(|e| e.to_string()),
        }));
        return Ok(());
    }

    if result.edits.is_empty() {
        println!("No '{}' references need to change.", config.kind);
    } else {
        println!("Remove:");
        for edge in &result.edits.removals {
            println!("  {}", edge);
        }
        println!("Add:");
        for edge in &result.edits.additions {
            println!("  {}", edge);
        }
    }

    if let Some(unresolved) = &result.unresolved {
        output.warn(&unresolved.to_string());
        output.data(unresolved);
    }

    match order {
        Ok(order) => {
            output.blank();
            println!("Creation order:");
            for id in order {
                println!("  {}", id);
            }
        }
        Err(e) => output.warn(&format!("No creation order: {}", e)),
    }

    Ok(())
}
