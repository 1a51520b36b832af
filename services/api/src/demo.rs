use crate::infra::{apply_overrides, render_assignments, render_stats, scoring_engine};
use clap::Args;
use lab_managers::config::AppConfig;
use lab_managers::error::AppError;
use lab_managers::workflows::lab_managers::{
    LabDecision, LabManagerService, LabSnapshot, MemoryAssignmentStore, RecomputeStats,
    ScoringEngine, SelectionPath,
};
use lab_managers::workflows::snapshot::LabSnapshotImporter;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Directory holding the CSV snapshot. Defaults to LABMGR_SNAPSHOT_DIR.
    #[arg(long)]
    pub(crate) snapshot: Option<PathBuf>,
    /// Hide labs that were skipped by the legitimacy check.
    #[arg(long)]
    pub(crate) assigned_only: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        snapshot,
        assigned_only,
    } = args;

    let mut config = AppConfig::load()?;
    apply_overrides(&mut config, snapshot, None);

    let snapshot = LabSnapshotImporter::from_dir(&config.lab_managers.snapshot_dir)?;
    println!("Lab manager identification demo");
    println!(
        "Snapshot {}: {} labs | {} memberships | {} people | {} departments",
        config.lab_managers.snapshot_dir.display(),
        snapshot.labs.len(),
        snapshot.members.len(),
        snapshot.people.len(),
        snapshot.departments.len()
    );

    render_demo(snapshot, scoring_engine(&config.lab_managers), assigned_only)?;
    Ok(())
}

/// Recompute every lab into a throwaway store and print each lab's outcome.
pub(crate) fn render_demo(
    snapshot: LabSnapshot,
    engine: ScoringEngine,
    assigned_only: bool,
) -> Result<RecomputeStats, AppError> {
    let lab_ids: Vec<_> = snapshot
        .ordered_labs()
        .into_iter()
        .map(|lab| lab.lab_id.clone())
        .collect();
    let store = Arc::new(MemoryAssignmentStore::new());
    let service = LabManagerService::new(Arc::new(snapshot), store, engine);

    let stats = service.recompute_all()?;

    for lab_id in &lab_ids {
        match service.preview_lab(lab_id)? {
            LabDecision::Assigned(outcome) => {
                let path = match outcome.path {
                    SelectionPath::SmallLab => "small lab",
                    SelectionPath::Scored => "scored",
                };
                println!(
                    "\n{} [{} path, threshold {}]",
                    lab_id, path, outcome.threshold
                );
                render_assignments(&service.managers_for_lab(lab_id)?);
            }
            LabDecision::Skipped { reason, .. } => {
                if !assigned_only {
                    println!("\n{} skipped: {}", lab_id, reason.label());
                }
            }
        }
    }

    println!("\nTotals");
    render_stats(&stats);
    Ok(stats)
}
