use lab_managers::config::{AppConfig, ConfigError, LabManagerConfig};
use lab_managers::error::AppError;
use lab_managers::workflows::lab_managers::{
    LabManagerAssignment, RecomputeStats, ScoringEngine, SqliteAssignmentStore,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) fn scoring_engine(config: &LabManagerConfig) -> ScoringEngine {
    ScoringEngine::new(config.rules.clone(), config.policy())
}

/// Command-line overrides win over the environment.
pub(crate) fn apply_overrides(
    config: &mut AppConfig,
    snapshot: Option<PathBuf>,
    database: Option<PathBuf>,
) {
    if let Some(snapshot) = snapshot {
        config.lab_managers.snapshot_dir = snapshot;
    }
    if let Some(database) = database {
        config.lab_managers.database_path = Some(database);
    }
}

pub(crate) fn require_database(config: &AppConfig) -> Result<&Path, AppError> {
    config
        .lab_managers
        .database_path
        .as_deref()
        .ok_or_else(|| AppError::Config(ConfigError::MissingDatabasePath))
}

pub(crate) fn open_store(path: &Path) -> Result<SqliteAssignmentStore, AppError> {
    Ok(SqliteAssignmentStore::open(path)?)
}

pub(crate) fn render_assignments(rows: &[LabManagerAssignment]) {
    if rows.is_empty() {
        println!("  (no managers assigned)");
        return;
    }
    for row in rows {
        let verified = match row.verified_at {
            Some(at) => format!(" | verified {}", at.format("%Y-%m-%d")),
            None => String::new(),
        };
        println!(
            "  {}. {:<12} score {:>2} | {} | {}{}",
            row.rank,
            row.manager_uniqname,
            row.confidence_score,
            row.role,
            row.detection_reason,
            verified
        );
    }
}

pub(crate) fn render_stats(stats: &RecomputeStats) {
    println!(
        "- {} labs processed | {} skipped",
        stats.labs_processed, stats.labs_skipped
    );
    println!(
        "- {} managers identified | {} added | {} removed",
        stats.managers_identified, stats.managers_added, stats.managers_removed
    );
    if stats.verified_preserved > 0 || stats.verified_released > 0 {
        println!(
            "- {} verifications kept | {} released",
            stats.verified_preserved, stats.verified_released
        );
    }
}
