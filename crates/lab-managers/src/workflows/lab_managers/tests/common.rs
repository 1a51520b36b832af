use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::response::Response;
use chrono::{TimeZone, Utc};
use serde_json::Value;

use crate::workflows::lab_managers::memory::MemoryTransaction;
use crate::workflows::lab_managers::{
    AssignmentStore, AssignmentTransaction, Department, DepartmentId, JobCodes, Lab, LabDirectory,
    LabId, LabManagerAssignment, LabManagerService, LabMember, LabSnapshot, ManagerPolicy,
    MemoryAssignmentStore, Person, RecomputeScope, RepositoryError, RuleTable, ScoringEngine,
    Uniqname, VerificationUpdate,
};

pub(super) const CHEMISTRY: &str = "171240";
pub(super) const UNREGISTERED: &str = "171999";
pub(super) const EXCLUDED: &str = "309980";

pub(super) fn policy() -> ManagerPolicy {
    ManagerPolicy::with_exclusions([DepartmentId::from(EXCLUDED)])
}

pub(super) fn engine() -> ScoringEngine {
    ScoringEngine::new(RuleTable::standard(), policy())
}

pub(super) fn lab(id: &str, member_count: u32) -> Lab {
    Lab {
        lab_id: LabId::from(id),
        pi_uniqname: Some(Uniqname::from(format!("{id}-pi").as_str())),
        member_count,
        primary_department_id: Some(DepartmentId::from(CHEMISTRY)),
        department_ids: vec![DepartmentId::from(CHEMISTRY)],
        computer_count: 2,
        is_active: true,
    }
}

pub(super) fn member(lab_id: &str, uniqname: &str, role: &str) -> LabMember {
    LabMember {
        lab_id: LabId::from(lab_id),
        uniqname: Uniqname::from(uniqname),
        role: Some(role.to_string()),
        department_id: Some(DepartmentId::from(CHEMISTRY)),
        is_pi: false,
        is_investigator: false,
    }
}

pub(super) fn pi(lab_id: &str, uniqname: &str) -> LabMember {
    LabMember {
        is_pi: true,
        is_investigator: true,
        ..member(lab_id, uniqname, "Associate Professor")
    }
}

pub(super) fn person(uniqname: &str, codes: &[&str]) -> Person {
    Person {
        uniqname: Uniqname::from(uniqname),
        job_codes: codes.iter().collect(),
        external_uid: Some(format!("UID-{uniqname}")),
    }
}

pub(super) fn departments() -> BTreeMap<DepartmentId, Department> {
    [
        Department {
            department_id: DepartmentId::from(CHEMISTRY),
            name: "Chemistry".to_string(),
            ticketing_id: Some("TDX-CHEM".to_string()),
        },
        Department {
            department_id: DepartmentId::from(UNREGISTERED),
            name: "Unlisted Annex".to_string(),
            ticketing_id: None,
        },
    ]
    .into_iter()
    .map(|department| (department.department_id.clone(), department))
    .collect()
}

pub(super) fn snapshot(labs: Vec<Lab>, members: Vec<LabMember>, people: Vec<Person>) -> LabSnapshot {
    LabSnapshot {
        labs,
        members,
        people: people
            .into_iter()
            .map(|person| (person.uniqname.clone(), person))
            .collect(),
        departments: departments(),
    }
}

/// Lab large enough for scoring: 8 members, 1 PI, three scored candidates and one
/// unmatched member.
pub(super) fn chemistry_lab() -> LabSnapshot {
    snapshot(
        vec![lab("chem-a", 8)],
        vec![
            pi("chem-a", "drpi"),
            member("chem-a", "lmgr", "Lab Manager"),
            member("chem-a", "coord", "Administrative Coordinator"),
            member("chem-a", "rls", "Research Lab Specialist Lead"),
            member("chem-a", "fellow", "Research Fellow II"),
            member("chem-a", "ugrad", "Undergraduate Assistant"),
        ],
        vec![person("lmgr", &["102945"]), person("coord", &[])],
    )
}

pub(super) fn scored_pair(snapshot: &LabSnapshot, lab_id: &str) -> Vec<(String, u8, u8)> {
    let lab = snapshot.lab(&LabId::from(lab_id)).expect("lab in snapshot");
    let members = snapshot.members_of(&lab.lab_id);
    engine()
        .decide(lab, &members, &snapshot.people)
        .managers
        .into_iter()
        .map(|ranked| {
            (
                ranked.scored.candidate.uniqname.0,
                ranked.rank,
                ranked.scored.confidence_score,
            )
        })
        .collect()
}

pub(super) fn build_service(
    snapshot: LabSnapshot,
) -> (
    LabManagerService<LabSnapshot, MemoryAssignmentStore>,
    Arc<MemoryAssignmentStore>,
) {
    let store = Arc::new(MemoryAssignmentStore::new());
    let service = LabManagerService::new(Arc::new(snapshot), store.clone(), engine());
    (service, store)
}

pub(super) fn timestamp(day: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, day, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn assignment(lab_id: &str, uniqname: &str, rank: u8, score: u8) -> LabManagerAssignment {
    LabManagerAssignment {
        lab_id: LabId::from(lab_id),
        manager_uniqname: Uniqname::from(uniqname),
        external_uid: None,
        role: "Lab Manager".to_string(),
        job_codes: JobCodes::from_delimited("102945"),
        confidence_score: score,
        rank,
        detection_reason: "Explicit Lab Manager".to_string(),
        is_verified: false,
        verification_notes: None,
        verified_at: None,
        created_at: timestamp(1),
        updated_at: timestamp(1),
    }
}

/// Memory store whose transactions fail after a fixed number of inserts.
#[derive(Default, Clone)]
pub(super) struct FailingStore {
    pub(super) inner: MemoryAssignmentStore,
    pub(super) inserts_before_failure: Arc<AtomicUsize>,
}

impl FailingStore {
    pub(super) fn failing_after(inserts: usize) -> Self {
        Self {
            inner: MemoryAssignmentStore::new(),
            inserts_before_failure: Arc::new(AtomicUsize::new(inserts)),
        }
    }
}

pub(super) struct FailingTransaction<'a> {
    inner: MemoryTransaction<'a>,
    remaining: &'a AtomicUsize,
}

impl AssignmentTransaction for FailingTransaction<'_> {
    fn existing(
        &mut self,
        scope: &RecomputeScope,
    ) -> Result<Vec<LabManagerAssignment>, RepositoryError> {
        self.inner.existing(scope)
    }

    fn delete_scope(&mut self, scope: &RecomputeScope) -> Result<usize, RepositoryError> {
        self.inner.delete_scope(scope)
    }

    fn insert(&mut self, assignment: &LabManagerAssignment) -> Result<(), RepositoryError> {
        let remaining = self.remaining.load(Ordering::SeqCst);
        if remaining == 0 {
            return Err(RepositoryError::Unavailable("disk full".to_string()));
        }
        self.remaining.store(remaining - 1, Ordering::SeqCst);
        self.inner.insert(assignment)
    }

    fn commit(self) -> Result<(), RepositoryError> {
        self.inner.commit()
    }
}

impl AssignmentStore for FailingStore {
    type Transaction<'a> = FailingTransaction<'a>;

    fn begin(&self) -> Result<Self::Transaction<'_>, RepositoryError> {
        Ok(FailingTransaction {
            inner: self.inner.begin()?,
            remaining: &self.inserts_before_failure,
        })
    }

    fn for_lab(&self, lab_id: &LabId) -> Result<Vec<LabManagerAssignment>, RepositoryError> {
        self.inner.for_lab(lab_id)
    }

    fn all(&self) -> Result<Vec<LabManagerAssignment>, RepositoryError> {
        self.inner.all()
    }

    fn set_verification(
        &self,
        lab_id: &LabId,
        manager: &Uniqname,
        update: VerificationUpdate,
    ) -> Result<LabManagerAssignment, RepositoryError> {
        self.inner.set_verification(lab_id, manager, update)
    }
}

pub(super) struct UnavailableDirectory;

impl LabDirectory for UnavailableDirectory {
    fn load(&self, _scope: &RecomputeScope) -> Result<LabSnapshot, RepositoryError> {
        Err(RepositoryError::Input("labs.csv missing".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
