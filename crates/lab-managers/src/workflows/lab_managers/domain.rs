use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lowest (most confident) score a rule may assign.
pub const MIN_CONFIDENCE_SCORE: u8 = 1;
/// Highest (least confident) score a rule may assign.
pub const MAX_CONFIDENCE_SCORE: u8 = 10;
/// Upper bound on persisted assignments per lab.
pub const MAX_MANAGERS_PER_LAB: u8 = 3;

/// Identifier of a research group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabId(pub String);

/// Campus login name identifying a person.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uniqname(pub String);

/// Department identifier shared by the lab catalog, memberships, and the registry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DepartmentId(pub String);

impl fmt::Display for LabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for Uniqname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for DepartmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LabId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for Uniqname {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for DepartmentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Structured set of HR job codes attached to a person.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobCodes(BTreeSet<String>);

impl JobCodes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, code: &str) -> bool {
        self.0.contains(code.trim())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Joined representation used by flat storage columns and CSV cells.
    pub fn to_delimited(&self) -> String {
        self.0.iter().cloned().collect::<Vec<_>>().join(";")
    }

    pub fn from_delimited(raw: &str) -> Self {
        raw.split(|c| c == ';' || c == ',').collect()
    }
}

impl<S: AsRef<str>> FromIterator<S> for JobCodes {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|code| code.as_ref().trim().to_string())
                .filter(|code| !code.is_empty())
                .collect(),
        )
    }
}

/// Research group as materialized by upstream consolidation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lab {
    pub lab_id: LabId,
    pub pi_uniqname: Option<Uniqname>,
    pub member_count: u32,
    pub primary_department_id: Option<DepartmentId>,
    #[serde(default)]
    pub department_ids: Vec<DepartmentId>,
    pub computer_count: u32,
    pub is_active: bool,
}

/// Department registry entry; only departments known to ticketing can host managed labs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub department_id: DepartmentId,
    pub name: String,
    pub ticketing_id: Option<String>,
}

impl Department {
    pub fn is_registered(&self) -> bool {
        self.ticketing_id
            .as_deref()
            .map(|id| !id.trim().is_empty())
            .unwrap_or(false)
    }
}

/// Membership of a person in a lab. Role text is free-form and unnormalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabMember {
    pub lab_id: LabId,
    pub uniqname: Uniqname,
    pub role: Option<String>,
    pub department_id: Option<DepartmentId>,
    pub is_pi: bool,
    pub is_investigator: bool,
}

/// Person record joined onto memberships for job codes and the external identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub uniqname: Uniqname,
    pub job_codes: JobCodes,
    pub external_uid: Option<String>,
}

/// Membership that passed the eligibility filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub lab_id: LabId,
    pub uniqname: Uniqname,
    pub role: String,
    pub job_codes: JobCodes,
    pub external_uid: Option<String>,
}

/// Candidate with the confidence score and detection reason from one scoring pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub confidence_score: u8,
    pub detection_reason: String,
    /// Index of the rule that fired; `None` for the small-lab fallback.
    pub rule_index: Option<usize>,
}

/// Scored candidate that survived selection, with its rank inside the lab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedManager {
    pub rank: u8,
    pub scored: ScoredCandidate,
}

/// Which selection path produced the managers of a lab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPath {
    SmallLab,
    Scored,
}

/// Decision for one lab before it is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabOutcome {
    pub lab_id: LabId,
    pub path: SelectionPath,
    pub threshold: i64,
    pub managers: Vec<RankedManager>,
}

/// Persisted lab manager assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabManagerAssignment {
    pub lab_id: LabId,
    pub manager_uniqname: Uniqname,
    pub external_uid: Option<String>,
    pub role: String,
    pub job_codes: JobCodes,
    pub confidence_score: u8,
    pub rank: u8,
    pub detection_reason: String,
    pub is_verified: bool,
    pub verification_notes: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LabManagerAssignment {
    pub fn from_ranked(lab_id: &LabId, ranked: RankedManager, now: DateTime<Utc>) -> Self {
        let RankedManager { rank, scored } = ranked;
        Self {
            lab_id: lab_id.clone(),
            manager_uniqname: scored.candidate.uniqname,
            external_uid: scored.candidate.external_uid,
            role: scored.candidate.role,
            job_codes: scored.candidate.job_codes,
            confidence_score: scored.confidence_score,
            rank,
            detection_reason: scored.detection_reason,
            is_verified: false,
            verification_notes: None,
            verified_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> (LabId, Uniqname) {
        (self.lab_id.clone(), self.manager_uniqname.clone())
    }
}

/// Target of a recompute run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "scope", content = "lab_id")]
pub enum RecomputeScope {
    AllLabs,
    Lab(LabId),
}

impl RecomputeScope {
    pub fn covers(&self, lab_id: &LabId) -> bool {
        match self {
            RecomputeScope::AllLabs => true,
            RecomputeScope::Lab(target) => target == lab_id,
        }
    }

    pub fn label(&self) -> String {
        match self {
            RecomputeScope::AllLabs => "all labs".to_string(),
            RecomputeScope::Lab(lab_id) => format!("lab {lab_id}"),
        }
    }
}

/// Why a targeted lab received no assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    UnknownLab,
    Inactive,
    NoComputers,
    UnregisteredDepartment,
}

impl SkipReason {
    pub const fn label(self) -> &'static str {
        match self {
            SkipReason::UnknownLab => "lab not present in catalog",
            SkipReason::Inactive => "lab is inactive",
            SkipReason::NoComputers => "lab has no monitored computers",
            SkipReason::UnregisteredDepartment => {
                "primary department has no ticketing identifier"
            }
        }
    }
}

/// Processing statistics returned by every recompute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecomputeStats {
    pub labs_processed: usize,
    pub labs_skipped: usize,
    pub managers_identified: usize,
    pub managers_added: usize,
    pub managers_removed: usize,
    pub verified_preserved: usize,
    pub verified_released: usize,
}
