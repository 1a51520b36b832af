use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::directory::{LabDirectory, LabSnapshot};
use super::domain::{
    JobCodes, LabId, LabManagerAssignment, LabOutcome, RecomputeScope, RecomputeStats,
    SkipReason, Uniqname,
};
use super::locks::RecomputeLocks;
use super::repository::{
    AssignmentStore, AssignmentTransaction, RepositoryError, VerificationUpdate,
};
use super::scoring::{ScoreMatch, ScoringEngine};

/// Outcome of the decision pipeline for one targeted lab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum LabDecision {
    Assigned(LabOutcome),
    Skipped { lab_id: LabId, reason: SkipReason },
}

/// Orchestrates load, scoring, and the transactional rewrite of assignments.
pub struct LabManagerService<D, S> {
    directory: Arc<D>,
    store: Arc<S>,
    engine: Arc<ScoringEngine>,
    locks: RecomputeLocks,
}

impl<D, S> LabManagerService<D, S>
where
    D: LabDirectory + 'static,
    S: AssignmentStore + 'static,
{
    pub fn new(directory: Arc<D>, store: Arc<S>, engine: ScoringEngine) -> Self {
        Self {
            directory,
            store,
            engine: Arc::new(engine),
            locks: RecomputeLocks::new(),
        }
    }

    pub fn engine(&self) -> &ScoringEngine {
        &self.engine
    }

    pub fn recompute_all(&self) -> Result<RecomputeStats, LabManagerServiceError> {
        self.recompute(RecomputeScope::AllLabs)
    }

    pub fn recompute_lab(&self, lab_id: &LabId) -> Result<RecomputeStats, LabManagerServiceError> {
        self.recompute(RecomputeScope::Lab(lab_id.clone()))
    }

    /// Delete and regenerate every assignment in `scope` inside one store transaction.
    pub fn recompute(
        &self,
        scope: RecomputeScope,
    ) -> Result<RecomputeStats, LabManagerServiceError> {
        let _guard = self.locks.acquire(&scope)?;
        info!(scope = %scope.label(), "recomputing lab managers");

        match self.rewrite_scope(&scope) {
            Ok(stats) => {
                info!(
                    scope = %scope.label(),
                    labs_processed = stats.labs_processed,
                    labs_skipped = stats.labs_skipped,
                    managers_identified = stats.managers_identified,
                    managers_added = stats.managers_added,
                    managers_removed = stats.managers_removed,
                    verified_preserved = stats.verified_preserved,
                    verified_released = stats.verified_released,
                    "lab manager recompute finished"
                );
                Ok(stats)
            }
            Err(err) => {
                error!(scope = %scope.label(), error = %err, "lab manager recompute rolled back");
                Err(err.into())
            }
        }
    }

    /// Run the decision pipeline for one lab without touching the store.
    pub fn preview_lab(&self, lab_id: &LabId) -> Result<LabDecision, LabManagerServiceError> {
        let scope = RecomputeScope::Lab(lab_id.clone());
        let snapshot = self.directory.load(&scope)?;
        let mut decisions = self.decide(&scope, &snapshot);
        Ok(decisions.pop().unwrap_or_else(|| LabDecision::Skipped {
            lab_id: lab_id.clone(),
            reason: SkipReason::UnknownLab,
        }))
    }

    pub fn managers_for_lab(
        &self,
        lab_id: &LabId,
    ) -> Result<Vec<LabManagerAssignment>, LabManagerServiceError> {
        Ok(self.store.for_lab(lab_id)?)
    }

    pub fn all_managers(&self) -> Result<Vec<LabManagerAssignment>, LabManagerServiceError> {
        Ok(self.store.all()?)
    }

    /// Record a human verification. Holds the lab's recompute lock so it cannot interleave
    /// with a rewrite of the same lab.
    pub fn verify_manager(
        &self,
        lab_id: &LabId,
        manager: &Uniqname,
        is_verified: bool,
        notes: Option<String>,
    ) -> Result<LabManagerAssignment, LabManagerServiceError> {
        let _guard = self.locks.acquire(&RecomputeScope::Lab(lab_id.clone()))?;
        let update = VerificationUpdate {
            is_verified,
            notes,
            at: Utc::now(),
        };
        let updated = self.store.set_verification(lab_id, manager, update)?;
        info!(lab_id = %lab_id, manager = %manager, is_verified, "lab manager verification updated");
        Ok(updated)
    }

    pub fn score_role(&self, role: &str, job_codes: &JobCodes) -> Option<ScoreMatch> {
        self.engine.score(role, job_codes)
    }

    fn decide(&self, scope: &RecomputeScope, snapshot: &LabSnapshot) -> Vec<LabDecision> {
        let mut decisions = Vec::new();

        if let RecomputeScope::Lab(lab_id) = scope {
            if snapshot.lab(lab_id).is_none() {
                decisions.push(LabDecision::Skipped {
                    lab_id: lab_id.clone(),
                    reason: SkipReason::UnknownLab,
                });
                return decisions;
            }
        }

        for lab in snapshot.ordered_labs() {
            if !scope.covers(&lab.lab_id) {
                continue;
            }
            match snapshot.legitimacy(lab) {
                Ok(()) => {
                    let members = snapshot.members_of(&lab.lab_id);
                    let outcome = self.engine.decide(lab, &members, &snapshot.people);
                    debug!(
                        lab_id = %lab.lab_id,
                        path = ?outcome.path,
                        threshold = outcome.threshold,
                        managers = outcome.managers.len(),
                        "lab scored"
                    );
                    decisions.push(LabDecision::Assigned(outcome));
                }
                Err(reason) => {
                    debug!(lab_id = %lab.lab_id, reason = reason.label(), "lab skipped");
                    decisions.push(LabDecision::Skipped {
                        lab_id: lab.lab_id.clone(),
                        reason,
                    });
                }
            }
        }

        decisions
    }

    fn rewrite_scope(&self, scope: &RecomputeScope) -> Result<RecomputeStats, RepositoryError> {
        let snapshot = self.directory.load(scope)?;
        let decisions = self.decide(scope, &snapshot);
        let now = Utc::now();

        let mut tx = self.store.begin()?;
        let previous = tx.existing(scope)?;
        let managers_removed = tx.delete_scope(scope)?;

        let mut stats = RecomputeStats {
            managers_removed,
            ..RecomputeStats::default()
        };
        let rows = carry_forward(&decisions, &previous, now, &mut stats);

        for row in &rows {
            tx.insert(row)?;
        }
        tx.commit()?;

        Ok(stats)
    }
}

/// Build the rows to insert. Pairs that existed before keep their creation time; pairs a
/// human verified keep the verification. Verified pairs that were not re-selected are
/// reported as released.
fn carry_forward(
    decisions: &[LabDecision],
    previous: &[LabManagerAssignment],
    now: DateTime<Utc>,
    stats: &mut RecomputeStats,
) -> Vec<LabManagerAssignment> {
    let prior: HashMap<(LabId, Uniqname), &LabManagerAssignment> =
        previous.iter().map(|row| (row.key(), row)).collect();
    let mut rows = Vec::new();

    for decision in decisions {
        let outcome = match decision {
            LabDecision::Assigned(outcome) => outcome,
            LabDecision::Skipped { .. } => {
                stats.labs_skipped += 1;
                continue;
            }
        };
        stats.labs_processed += 1;

        for ranked in &outcome.managers {
            let mut row = LabManagerAssignment::from_ranked(&outcome.lab_id, ranked.clone(), now);
            match prior.get(&row.key()) {
                Some(old) => {
                    row.created_at = old.created_at;
                    if old.is_verified {
                        row.is_verified = true;
                        row.verification_notes = old.verification_notes.clone();
                        row.verified_at = old.verified_at;
                        stats.verified_preserved += 1;
                    }
                }
                None => stats.managers_added += 1,
            }
            rows.push(row);
        }
    }

    let kept: HashSet<(LabId, Uniqname)> = rows.iter().map(LabManagerAssignment::key).collect();
    for old in previous.iter().filter(|row| row.is_verified) {
        if !kept.contains(&old.key()) {
            stats.verified_released += 1;
            warn!(
                lab_id = %old.lab_id,
                manager = %old.manager_uniqname,
                notes = old.verification_notes.as_deref().unwrap_or(""),
                "verified lab manager no longer selected; verification released"
            );
        }
    }

    stats.managers_identified = rows.len();
    rows
}

/// Error raised by the lab manager service.
#[derive(Debug, thiserror::Error)]
pub enum LabManagerServiceError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
