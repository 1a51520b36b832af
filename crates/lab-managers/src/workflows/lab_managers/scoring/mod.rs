mod config;
mod policy;
mod rules;

pub use config::ManagerPolicy;
pub use policy::SMALL_LAB_REASON;
pub use rules::{RolePattern, RuleTable, RuleTableError, ScoreMatch, ScoringRule};

use std::collections::BTreeMap;

use super::domain::{JobCodes, Lab, LabMember, LabOutcome, Person, Uniqname};
use super::eligibility::eligible_candidates;

/// Stateless decision pipeline: eligibility, rule scoring, then selection for one lab.
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    table: RuleTable,
    policy: ManagerPolicy,
}

impl ScoringEngine {
    pub fn new(table: RuleTable, policy: ManagerPolicy) -> Self {
        Self { table, policy }
    }

    pub fn table(&self) -> &RuleTable {
        &self.table
    }

    pub fn policy(&self) -> &ManagerPolicy {
        &self.policy
    }

    pub fn score(&self, role: &str, job_codes: &JobCodes) -> Option<ScoreMatch> {
        self.table.evaluate(role, job_codes)
    }

    /// Decide the managers of `lab`. `members` may include other labs' rows; they are ignored.
    pub fn decide(
        &self,
        lab: &Lab,
        members: &[&LabMember],
        people: &BTreeMap<Uniqname, Person>,
    ) -> LabOutcome {
        let own: Vec<&LabMember> = members
            .iter()
            .copied()
            .filter(|member| member.lab_id == lab.lab_id)
            .collect();
        let candidates = eligible_candidates(own.iter().copied(), people, &self.policy);
        policy::decide_lab(lab, &own, candidates, &self.table, &self.policy)
    }
}
