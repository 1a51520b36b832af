use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::domain::{
    Department, DepartmentId, Lab, LabId, LabMember, Person, RecomputeScope, SkipReason, Uniqname,
};
use super::repository::RepositoryError;

/// Materialized inputs for one scoring pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabSnapshot {
    pub labs: Vec<Lab>,
    pub members: Vec<LabMember>,
    pub people: BTreeMap<Uniqname, Person>,
    pub departments: BTreeMap<DepartmentId, Department>,
}

impl LabSnapshot {
    pub fn lab(&self, lab_id: &LabId) -> Option<&Lab> {
        self.labs.iter().find(|lab| &lab.lab_id == lab_id)
    }

    pub fn members_of(&self, lab_id: &LabId) -> Vec<&LabMember> {
        self.members
            .iter()
            .filter(|member| &member.lab_id == lab_id)
            .collect()
    }

    /// Catalog labs in id order, first occurrence wins on duplicate ids.
    pub fn ordered_labs(&self) -> Vec<&Lab> {
        let mut seen = BTreeSet::new();
        let mut labs: Vec<&Lab> = self
            .labs
            .iter()
            .filter(|lab| seen.insert(lab.lab_id.clone()))
            .collect();
        labs.sort_by(|left, right| left.lab_id.cmp(&right.lab_id));
        labs
    }

    /// Legitimate labs are active, own a monitored computer, and sit in a department that
    /// the ticketing system knows about.
    pub fn legitimacy(&self, lab: &Lab) -> Result<(), SkipReason> {
        if !lab.is_active {
            return Err(SkipReason::Inactive);
        }
        if lab.computer_count == 0 {
            return Err(SkipReason::NoComputers);
        }
        let registered = lab
            .primary_department_id
            .as_ref()
            .and_then(|department_id| self.departments.get(department_id))
            .map(Department::is_registered)
            .unwrap_or(false);
        if !registered {
            return Err(SkipReason::UnregisteredDepartment);
        }
        Ok(())
    }

    /// Copy restricted to the labs in `scope`; people and departments are kept whole.
    pub fn scoped(&self, scope: &RecomputeScope) -> LabSnapshot {
        LabSnapshot {
            labs: self
                .labs
                .iter()
                .filter(|lab| scope.covers(&lab.lab_id))
                .cloned()
                .collect(),
            members: self
                .members
                .iter()
                .filter(|member| scope.covers(&member.lab_id))
                .cloned()
                .collect(),
            people: self.people.clone(),
            departments: self.departments.clone(),
        }
    }
}

/// Read-only source of lab, membership, person, and department data.
pub trait LabDirectory: Send + Sync {
    fn load(&self, scope: &RecomputeScope) -> Result<LabSnapshot, RepositoryError>;
}

impl LabDirectory for LabSnapshot {
    fn load(&self, scope: &RecomputeScope) -> Result<LabSnapshot, RepositoryError> {
        Ok(self.scoped(scope))
    }
}
