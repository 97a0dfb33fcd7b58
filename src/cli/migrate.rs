//! Migrate command
//!
//! Streams a legacy JSONL export through [`Migration`], writes staged records
//! in creation order and prints a summary.

use std::path::Path;

use anyhow::{Context, Result};

use super::output::Output;
use crate::domain::{LegacyRecord, Migration, MigrationConfig, MigrationOutput, StageOutcome};
use crate::storage::{write_json_file, RecordStore};

pub fn run(
    output: &Output,
    input: &Path,
    out_path: &Path,
    report_path: Option<&Path>,
    config: MigrationConfig,
) -> Result<()> {
    output.verbose_ctx(
        "migrate",
        &format!(
            "kinds={:?}, max_depth={}, max_passes={}, tie_break={:?}",
            config.kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>(),
            config.max_depth,
            config.max_passes,
            config.tie_break
        ),
    );

    let mut migration = Migration::new(config);
    let read = RecordStore::new(input).for_each(|record: LegacyRecord| {
        let id = record.id.clone();
        if migration.stage(record) == StageOutcome::Rejected {
            output.verbose_ctx("migrate", &format!("Rejected {}", id));
        }
        Ok(())
    })?;
    output.verbose_ctx("migrate", &format!("Read {} legacy records", read));

    let MigrationOutput { records, report } = migration
        .finish()
        .context("Failed to linearize references")?;

    RecordStore::new(out_path).write_all(&records)?;
    output.verbose_ctx(
        "migrate",
        &format!("Wrote {} records to {}", records.len(), out_path.display()),
    );

    if let Some(path) = report_path {
        write_json_file(path, &report)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
        output.verbose_ctx("migrate", &format!("Wrote report to {}", path.display()));
    }

    let unresolved: Vec<_> = report.unresolved().collect();

    if output.is_json() {
        output.data(&serde_json::json!({
            "read": read,
            "staged": report.staged,
            "rejected": report.rejected,
            "duplicates": report.duplicates,
            "reversals": report.reversals(),
            "dangling": report.dangling.len(),
            "unresolved": unresolved,
            "ordered": report.cycle_through.is_none(),
            "output": out_path.display().to_string(),
        }));
        return Ok(());
    }

    println!("Read {} legacy records", read);
    println!("Staged {} records -> {}", report.staged, out_path.display());
    if !report.duplicates.is_empty() {
        println!("Skipped {} duplicate(s)", report.duplicates.len());
    }
    if !report.rejected.is_empty() {
        println!("Rejected {} record(s):", report.rejected.len());
        for rejected in &report.rejected {
            println!("  {:<16} {}: {}", rejected.id, rejected.property, rejected.reason);
        }
    }

    for linearization in &report.linearizations {
        if !linearization.edits.is_empty() {
            println!(
                "Reversed {} '{}' reference(s)",
                linearization.edits.removals.len(),
                linearization.kind
            );
        }
    }

    if !report.dangling.is_empty() {
        println!("{} reference(s) point outside the batch", report.dangling.len());
    }
    for warning in unresolved {
        output.warn(&warning.to_string());
    }
    if let Some(id) = &report.cycle_through {
        output.warn(&format!(
            "No creation order: a reference cycle remains through {}; records kept in input order",
            id
        ));
    }

    Ok(())
}
