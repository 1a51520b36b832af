use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::domain::{LabId, LabManagerAssignment, RecomputeScope, Uniqname};
use super::repository::{
    check_assignment, AssignmentStore, AssignmentTransaction, RepositoryError,
    VerificationUpdate,
};

type AssignmentKey = (LabId, Uniqname);
type AssignmentRows = BTreeMap<AssignmentKey, LabManagerAssignment>;

/// Process-local assignment store. A transaction holds the lock for its whole lifetime and
/// works on a staged copy that replaces the live rows only on commit.
#[derive(Debug, Default, Clone)]
pub struct MemoryAssignmentStore {
    rows: Arc<Mutex<AssignmentRows>>,
}

impl MemoryAssignmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, AssignmentRows>, RepositoryError> {
        self.rows
            .lock()
            .map_err(|_| RepositoryError::Unavailable("assignment store mutex poisoned".to_string()))
    }
}

impl AssignmentStore for MemoryAssignmentStore {
    type Transaction<'a> = MemoryTransaction<'a>;

    fn begin(&self) -> Result<Self::Transaction<'_>, RepositoryError> {
        let guard = self.lock()?;
        let staged = guard.clone();
        Ok(MemoryTransaction { guard, staged })
    }

    fn for_lab(&self, lab_id: &LabId) -> Result<Vec<LabManagerAssignment>, RepositoryError> {
        let guard = self.lock()?;
        let mut rows: Vec<LabManagerAssignment> = guard
            .values()
            .filter(|row| &row.lab_id == lab_id)
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.rank);
        Ok(rows)
    }

    fn all(&self) -> Result<Vec<LabManagerAssignment>, RepositoryError> {
        let guard = self.lock()?;
        let mut rows: Vec<LabManagerAssignment> = guard.values().cloned().collect();
        rows.sort_by(|left, right| {
            left.lab_id
                .cmp(&right.lab_id)
                .then_with(|| left.rank.cmp(&right.rank))
        });
        Ok(rows)
    }

    fn set_verification(
        &self,
        lab_id: &LabId,
        manager: &Uniqname,
        update: VerificationUpdate,
    ) -> Result<LabManagerAssignment, RepositoryError> {
        let mut guard = self.lock()?;
        let row = guard
            .get_mut(&(lab_id.clone(), manager.clone()))
            .ok_or(RepositoryError::NotFound)?;
        row.is_verified = update.is_verified;
        row.verification_notes = update.notes;
        row.verified_at = update.is_verified.then_some(update.at);
        row.updated_at = update.at;
        Ok(row.clone())
    }
}

pub struct MemoryTransaction<'a> {
    guard: MutexGuard<'a, AssignmentRows>,
    staged: AssignmentRows,
}

impl AssignmentTransaction for MemoryTransaction<'_> {
    fn existing(
        &mut self,
        scope: &RecomputeScope,
    ) -> Result<Vec<LabManagerAssignment>, RepositoryError> {
        Ok(self
            .staged
            .values()
            .filter(|row| scope.covers(&row.lab_id))
            .cloned()
            .collect())
    }

    fn delete_scope(&mut self, scope: &RecomputeScope) -> Result<usize, RepositoryError> {
        let before = self.staged.len();
        self.staged.retain(|(lab_id, _), _| !scope.covers(lab_id));
        Ok(before - self.staged.len())
    }

    fn insert(&mut self, assignment: &LabManagerAssignment) -> Result<(), RepositoryError> {
        check_assignment(assignment)?;

        let key = assignment.key();
        if self.staged.contains_key(&key) {
            return Err(RepositoryError::Conflict(format!(
                "{} already assigned to lab {}",
                assignment.manager_uniqname, assignment.lab_id
            )));
        }
        if self
            .staged
            .values()
            .any(|row| row.lab_id == assignment.lab_id && row.rank == assignment.rank)
        {
            return Err(RepositoryError::Conflict(format!(
                "rank {} already taken in lab {}",
                assignment.rank, assignment.lab_id
            )));
        }

        self.staged.insert(key, assignment.clone());
        Ok(())
    }

    fn commit(mut self) -> Result<(), RepositoryError> {
        *self.guard = std::mem::take(&mut self.staged);
        Ok(())
    }
}
