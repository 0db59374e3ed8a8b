use crate::error::CliError;
use engine_core::migration::{coordinator::SyncOutcome, tester::MigrationTestReport};
use model::migration::version::{SchemaVersion, VersionRecord};
use planner::migration::plan::MigrationPlan;
use serde::Serialize;

/// Pretty JSON to `output`, or stdout when no path is given.
pub async fn write_json<T: Serialize>(value: &T, output: Option<&str>) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => tokio::fs::write(path, json).await?,
        None => println!("{json}"),
    }
    Ok(())
}

pub fn print_outcome(schema: &str, target: SchemaVersion, outcome: SyncOutcome) {
    match outcome {
        SyncOutcome::Created => println!("Created schema '{schema}' at version {target}"),
        SyncOutcome::Migrated { from } => {
            println!("Migrated schema '{schema}' from {from} to {target}")
        }
        SyncOutcome::UpToDate => println!("Schema '{schema}' is already at version {target}"),
        SyncOutcome::Deferred => {
            println!("Schema '{schema}' was migrated to {target} by another process")
        }
    }
}

pub fn print_plan(plan: &MigrationPlan) {
    let from = plan
        .from
        .map(|v| v.to_string())
        .unwrap_or_else(|| "new schema".to_string());
    println!("Plan {from} -> {} ({})", plan.to, plan.hash());
    if plan.is_noop() {
        println!("  nothing to apply");
        return;
    }
    for step in &plan.steps {
        println!("  {}", step.version);
        for file in step.files() {
            println!("    {:<5} {}", file.kind.to_string(), file.filename);
        }
    }
}

pub fn print_status(schema: &str, current: Option<SchemaVersion>, in_progress: &[VersionRecord]) {
    println!("{:<16} {}", "Schema", schema);
    let current = current
        .map(|v| v.to_string())
        .unwrap_or_else(|| "n/a".to_string());
    println!("{:<16} {}", "Deployed", current);
    for record in in_progress {
        println!(
            "{:<16} {} (started {})",
            "In progress",
            record.version,
            record.deploy_start.to_rfc3339()
        );
    }
}

pub fn print_report(report: &MigrationTestReport) {
    println!("Migration {} -> {} against fresh setup at {}", report.from, report.to, report.to);
    if report.is_consistent() {
        println!("  schemas match ({} tables)", report.created.tables.len());
        return;
    }
    for mismatch in &report.mismatches {
        println!("  {}", mismatch.object);
        for line in &mismatch.migrated_only {
            println!("    - {line}");
        }
        for line in &mismatch.created_only {
            println!("    + {line}");
        }
    }
}
