use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::super::domain::{DepartmentId, MAX_MANAGERS_PER_LAB};

/// Selection policy. The exclusion set comes from configuration; the numeric limits are
/// fixed defaults carried here so callers and tests can refer to them by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerPolicy {
    pub excluded_departments: BTreeSet<DepartmentId>,
    /// Labs with `member_count - pi_count` at or below this use the small-lab fallback.
    pub small_lab_threshold: i64,
    pub max_managers: u8,
    /// Scores at or below this suppress every weaker candidate in the lab.
    pub high_confidence_cutoff: u8,
    pub small_lab_score: u8,
}

impl ManagerPolicy {
    pub fn with_exclusions<I>(excluded_departments: I) -> Self
    where
        I: IntoIterator<Item = DepartmentId>,
    {
        Self {
            excluded_departments: excluded_departments.into_iter().collect(),
            small_lab_threshold: 3,
            max_managers: MAX_MANAGERS_PER_LAB,
            high_confidence_cutoff: 4,
            small_lab_score: 9,
        }
    }

    pub fn is_excluded(&self, department_id: &DepartmentId) -> bool {
        self.excluded_departments.contains(department_id)
    }
}

impl Default for ManagerPolicy {
    fn default() -> Self {
        Self::with_exclusions(Vec::new())
    }
}
