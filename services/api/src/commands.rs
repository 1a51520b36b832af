use crate::infra::{
    apply_overrides, open_store, render_assignments, render_stats, require_database,
    scoring_engine,
};
use clap::Args;
use lab_managers::config::AppConfig;
use lab_managers::error::AppError;
use lab_managers::telemetry;
use lab_managers::workflows::lab_managers::{
    AssignmentStore, JobCodes, LabDirectory, LabId, LabManagerAssignment, LabManagerService,
    MemoryAssignmentStore, RecomputeScope, RecomputeStats, Uniqname,
};
use lab_managers::workflows::snapshot::CsvLabDirectory;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

#[derive(Args, Debug)]
pub(crate) struct RecomputeArgs {
    /// Recompute a single lab instead of every lab
    #[arg(long)]
    pub(crate) lab: Option<String>,
    /// Directory holding labs.csv, members.csv, people.csv and departments.csv
    #[arg(long)]
    pub(crate) snapshot: Option<PathBuf>,
    /// SQLite database holding the assignment table
    #[arg(long)]
    pub(crate) database: Option<PathBuf>,
    /// Print statistics and assignments as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct ScoreArgs {
    /// Role text exactly as it appears on the membership
    #[arg(long)]
    pub(crate) role: String,
    /// HR job code held by the person; repeat for several codes
    #[arg(long = "job-code")]
    pub(crate) job_codes: Vec<String>,
}

#[derive(Args, Debug)]
pub(crate) struct VerifyArgs {
    /// Lab identifier
    #[arg(long)]
    pub(crate) lab: String,
    /// Uniqname of the assigned manager
    #[arg(long)]
    pub(crate) manager: String,
    /// Free-form note stored with the verification
    #[arg(long)]
    pub(crate) notes: Option<String>,
    /// Clear an existing verification instead of setting one
    #[arg(long)]
    pub(crate) unverify: bool,
    /// SQLite database holding the assignment table
    #[arg(long)]
    pub(crate) database: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RecomputeReport {
    pub(crate) scope: RecomputeScope,
    pub(crate) stats: RecomputeStats,
    pub(crate) managers: Vec<LabManagerAssignment>,
}

pub(crate) fn run_recompute(args: RecomputeArgs) -> Result<(), AppError> {
    let RecomputeArgs {
        lab,
        snapshot,
        database,
        json,
    } = args;

    let mut config = AppConfig::load()?;
    apply_overrides(&mut config, snapshot, database);
    telemetry::init(&config.telemetry)?;

    let scope = recompute_scope(lab);
    let directory = Arc::new(CsvLabDirectory::new(
        config.lab_managers.snapshot_dir.clone(),
    ));
    let engine = scoring_engine(&config.lab_managers);

    match config.lab_managers.database_path.clone() {
        Some(path) => {
            let store = Arc::new(open_store(&path)?);
            recompute_and_report(&LabManagerService::new(directory, store, engine), scope, json)?;
        }
        None => {
            warn!("no database configured; recomputed assignments will not be persisted");
            let store = Arc::new(MemoryAssignmentStore::new());
            recompute_and_report(&LabManagerService::new(directory, store, engine), scope, json)?;
        }
    }
    Ok(())
}

pub(crate) fn recompute_scope(lab: Option<String>) -> RecomputeScope {
    match lab {
        Some(lab_id) if !lab_id.trim().is_empty() => {
            RecomputeScope::Lab(LabId(lab_id.trim().to_string()))
        }
        _ => RecomputeScope::AllLabs,
    }
}

pub(crate) fn recompute_and_report<D, S>(
    service: &LabManagerService<D, S>,
    scope: RecomputeScope,
    json: bool,
) -> Result<RecomputeReport, AppError>
where
    D: LabDirectory + 'static,
    S: AssignmentStore + 'static,
{
    let stats = service.recompute(scope.clone())?;
    let managers = match &scope {
        RecomputeScope::AllLabs => service.all_managers()?,
        RecomputeScope::Lab(lab_id) => service.managers_for_lab(lab_id)?,
    };
    let report = RecomputeReport {
        scope,
        stats,
        managers,
    };

    if json {
        let rendered = serde_json::to_string_pretty(&report)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))?;
        println!("{rendered}");
    } else {
        println!("Recompute of {}", report.scope.label());
        render_stats(&report.stats);
        let mut by_lab: BTreeMap<&LabId, Vec<LabManagerAssignment>> = BTreeMap::new();
        for row in &report.managers {
            by_lab.entry(&row.lab_id).or_default().push(row.clone());
        }
        for (lab_id, rows) in by_lab {
            println!("\n{lab_id}");
            render_assignments(&rows);
        }
    }

    Ok(report)
}

pub(crate) fn run_score(args: ScoreArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let engine = scoring_engine(&config.lab_managers);
    let job_codes: JobCodes = args.job_codes.iter().collect();

    match engine.score(&args.role, &job_codes) {
        Some(matched) => println!(
            "score {} | rule #{} | {}",
            matched.score,
            matched.rule_index + 1,
            matched.reason
        ),
        None => println!(
            "no rule matched '{}'; the member would not be a scored candidate",
            args.role
        ),
    }
    Ok(())
}

pub(crate) fn run_verify(args: VerifyArgs) -> Result<(), AppError> {
    let VerifyArgs {
        lab,
        manager,
        notes,
        unverify,
        database,
    } = args;

    let mut config = AppConfig::load()?;
    apply_overrides(&mut config, None, database);
    telemetry::init(&config.telemetry)?;

    let path = require_database(&config)?.to_path_buf();
    let store = Arc::new(open_store(&path)?);
    let directory = Arc::new(CsvLabDirectory::new(
        config.lab_managers.snapshot_dir.clone(),
    ));
    let service = LabManagerService::new(directory, store, scoring_engine(&config.lab_managers));

    let updated = service.verify_manager(&LabId(lab), &Uniqname(manager), !unverify, notes)?;
    println!(
        "{} in {}: {}",
        updated.manager_uniqname,
        updated.lab_id,
        if updated.is_verified {
            "verified"
        } else {
            "verification cleared"
        }
    );
    render_assignments(std::slice::from_ref(&updated));
    Ok(())
}
