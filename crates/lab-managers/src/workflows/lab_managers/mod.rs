//! Lab manager identification: eligibility, ordered rule scoring, selection, and the
//! transactional recompute that persists up to three ranked managers per lab.

pub mod directory;
pub mod domain;
pub mod eligibility;
mod locks;
pub mod memory;
pub mod repository;
pub mod router;
pub mod scoring;
pub mod service;
pub mod sqlite;

#[cfg(test)]
mod tests;

pub use directory::{LabDirectory, LabSnapshot};
pub use domain::{
    Candidate, Department, DepartmentId, JobCodes, Lab, LabId, LabManagerAssignment, LabMember,
    LabOutcome, Person, RankedManager, RecomputeScope, RecomputeStats, ScoredCandidate,
    SelectionPath, SkipReason, Uniqname,
};
pub use eligibility::{eligible_candidates, exclusion_for, Exclusion};
pub use locks::{RecomputeLocks, ScopeGuard};
pub use memory::MemoryAssignmentStore;
pub use repository::{
    AssignmentStore, AssignmentTransaction, RepositoryError, VerificationUpdate,
};
pub use router::{lab_manager_router, ManagerListQuery, ScoreRequest, VerificationRequest};
pub use scoring::{
    ManagerPolicy, RolePattern, RuleTable, RuleTableError, ScoreMatch, ScoringEngine,
    ScoringRule, SMALL_LAB_REASON,
};
pub use service::{LabDecision, LabManagerService, LabManagerServiceError};
pub use sqlite::SqliteAssignmentStore;
