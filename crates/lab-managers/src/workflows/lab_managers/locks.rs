use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard};

use super::domain::{LabId, RecomputeScope};
use super::repository::RepositoryError;

#[derive(Debug, Default)]
struct LockState {
    full_run: bool,
    full_pending: usize,
    labs: HashSet<LabId>,
}

impl LockState {
    fn is_free_for(&self, scope: &RecomputeScope) -> bool {
        match scope {
            RecomputeScope::AllLabs => !self.full_run && self.labs.is_empty(),
            RecomputeScope::Lab(lab_id) => {
                !self.full_run && self.full_pending == 0 && !self.labs.contains(lab_id)
            }
        }
    }

    fn claim(&mut self, scope: &RecomputeScope) {
        match scope {
            RecomputeScope::AllLabs => self.full_run = true,
            RecomputeScope::Lab(lab_id) => {
                self.labs.insert(lab_id.clone());
            }
        }
    }

    fn release(&mut self, scope: &RecomputeScope) {
        match scope {
            RecomputeScope::AllLabs => self.full_run = false,
            RecomputeScope::Lab(lab_id) => {
                self.labs.remove(lab_id);
            }
        }
    }
}

/// Serializes recompute runs by scope: a full run excludes everything, single-lab runs
/// exclude full runs and other runs of the same lab. A full run waiting in `acquire` holds
/// back new single-lab claims until it has run.
#[derive(Debug, Default)]
pub struct RecomputeLocks {
    state: Mutex<LockState>,
    released: Condvar,
}

impl RecomputeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `scope` is free, then hold it until the guard drops.
    pub fn acquire(&self, scope: &RecomputeScope) -> Result<ScopeGuard<'_>, RepositoryError> {
        let mut state = self.lock_state()?;
        let queues_full_run = matches!(scope, RecomputeScope::AllLabs);
        if queues_full_run {
            state.full_pending += 1;
        }
        while !state.is_free_for(scope) {
            state = match self.released.wait(state) {
                Ok(state) => state,
                Err(poisoned_state) => {
                    let mut state = poisoned_state.into_inner();
                    if queues_full_run {
                        state.full_pending -= 1;
                    }
                    self.released.notify_all();
                    return Err(poisoned());
                }
            };
        }
        if queues_full_run {
            state.full_pending -= 1;
        }
        state.claim(scope);
        Ok(ScopeGuard {
            locks: self,
            scope: scope.clone(),
        })
    }

    /// Non-blocking variant; `None` when another run holds an overlapping scope.
    pub fn try_acquire(
        &self,
        scope: &RecomputeScope,
    ) -> Result<Option<ScopeGuard<'_>>, RepositoryError> {
        let mut state = self.lock_state()?;
        if !state.is_free_for(scope) {
            return Ok(None);
        }
        state.claim(scope);
        Ok(Some(ScopeGuard {
            locks: self,
            scope: scope.clone(),
        }))
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, LockState>, RepositoryError> {
        self.state.lock().map_err(|_| poisoned())
    }
}

fn poisoned() -> RepositoryError {
    RepositoryError::Unavailable("recompute lock poisoned".to_string())
}

/// Held for the duration of one recompute.
#[derive(Debug)]
pub struct ScopeGuard<'a> {
    locks: &'a RecomputeLocks,
    scope: RecomputeScope,
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        let mut state = match self.locks.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.release(&self.scope);
        self.locks.released.notify_all();
    }
}
