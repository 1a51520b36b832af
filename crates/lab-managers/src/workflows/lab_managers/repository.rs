use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    LabId, LabManagerAssignment, RecomputeScope, Uniqname, MAX_CONFIDENCE_SCORE,
    MAX_MANAGERS_PER_LAB, MIN_CONFIDENCE_SCORE,
};

/// Storage for persisted assignments. Recomputes go through [`AssignmentStore::begin`] so
/// the delete and the repopulation of a scope land together or not at all.
pub trait AssignmentStore: Send + Sync {
    type Transaction<'a>: AssignmentTransaction
    where
        Self: 'a;

    fn begin(&self) -> Result<Self::Transaction<'_>, RepositoryError>;
    fn for_lab(&self, lab_id: &LabId) -> Result<Vec<LabManagerAssignment>, RepositoryError>;
    fn all(&self) -> Result<Vec<LabManagerAssignment>, RepositoryError>;
    fn set_verification(
        &self,
        lab_id: &LabId,
        manager: &Uniqname,
        update: VerificationUpdate,
    ) -> Result<LabManagerAssignment, RepositoryError>;
}

/// Unit of work over the assignment table. Dropping without [`commit`] rolls back.
///
/// [`commit`]: AssignmentTransaction::commit
pub trait AssignmentTransaction {
    fn existing(
        &mut self,
        scope: &RecomputeScope,
    ) -> Result<Vec<LabManagerAssignment>, RepositoryError>;
    fn delete_scope(&mut self, scope: &RecomputeScope) -> Result<usize, RepositoryError>;
    fn insert(&mut self, assignment: &LabManagerAssignment) -> Result<(), RepositoryError>;
    fn commit(self) -> Result<(), RepositoryError>;
}

/// Human override applied out-of-band to one assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationUpdate {
    pub is_verified: bool,
    pub notes: Option<String>,
    pub at: DateTime<Utc>,
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("conflicting assignment: {0}")]
    Conflict(String),
    #[error("assignment violates constraint: {0}")]
    Constraint(String),
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
    #[error("storage failure: {0}")]
    Storage(#[source] rusqlite::Error),
    #[error("input data unreadable: {0}")]
    Input(String),
}

/// Range checks shared by every store before a row is written.
pub(crate) fn check_assignment(assignment: &LabManagerAssignment) -> Result<(), RepositoryError> {
    if !(1..=MAX_MANAGERS_PER_LAB).contains(&assignment.rank) {
        return Err(RepositoryError::Constraint(format!(
            "rank {} for {} in lab {} outside 1..={}",
            assignment.rank, assignment.manager_uniqname, assignment.lab_id, MAX_MANAGERS_PER_LAB
        )));
    }
    if !(MIN_CONFIDENCE_SCORE..=MAX_CONFIDENCE_SCORE).contains(&assignment.confidence_score) {
        return Err(RepositoryError::Constraint(format!(
            "confidence score {} for {} in lab {} outside {}..={}",
            assignment.confidence_score,
            assignment.manager_uniqname,
            assignment.lab_id,
            MIN_CONFIDENCE_SCORE,
            MAX_CONFIDENCE_SCORE
        )));
    }
    Ok(())
}
