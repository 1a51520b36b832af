use std::sync::{Arc, Mutex};
use std::thread;

use super::common::*;

use crate::workflows::lab_managers::{
    AssignmentStore, AssignmentTransaction, LabDecision, LabDirectory, LabId, LabManagerService,
    LabManagerServiceError, LabSnapshot, MemoryAssignmentStore, RecomputeScope, RepositoryError,
    SelectionPath, SkipReason, Uniqname,
};

/// Directory whose snapshot can be swapped between runs.
struct ChangingDirectory {
    current: Mutex<LabSnapshot>,
}

impl ChangingDirectory {
    fn new(snapshot: LabSnapshot) -> Self {
        Self {
            current: Mutex::new(snapshot),
        }
    }

    fn replace(&self, snapshot: LabSnapshot) {
        *self.current.lock().expect("directory mutex poisoned") = snapshot;
    }
}

impl LabDirectory for ChangingDirectory {
    fn load(&self, scope: &RecomputeScope) -> Result<LabSnapshot, RepositoryError> {
        Ok(self
            .current
            .lock()
            .expect("directory mutex poisoned")
            .scoped(scope))
    }
}

fn seed<S: AssignmentStore>(store: &S, rows: &[(&str, &str, u8, u8)]) {
    let mut tx = store.begin().expect("begin");
    for (lab_id, uniqname, rank, score) in rows {
        tx.insert(&assignment(lab_id, uniqname, *rank, *score))
            .expect("seed row");
    }
    tx.commit().expect("commit seed");
}

fn managers(store: &MemoryAssignmentStore, lab_id: &str) -> Vec<(String, u8)> {
    store
        .for_lab(&LabId::from(lab_id))
        .expect("read lab")
        .into_iter()
        .map(|row| (row.manager_uniqname.0, row.rank))
        .collect()
}

fn two_labs() -> LabSnapshot {
    let mut combined = chemistry_lab();
    combined.labs.push(lab("bio-b", 9));
    combined
        .members
        .push(member("bio-b", "bsci", "Research Scientist"));
    combined.members.push(member("bio-b", "blead", "Team Lead"));
    combined
}

#[test]
fn full_recompute_writes_ranked_managers() {
    let (service, store) = build_service(chemistry_lab());

    let stats = service.recompute_all().expect("recompute succeeds");
    assert_eq!(stats.labs_processed, 1);
    assert_eq!(stats.labs_skipped, 0);
    assert_eq!(stats.managers_identified, 3);
    assert_eq!(stats.managers_added, 3);
    assert_eq!(stats.managers_removed, 0);

    assert_eq!(
        managers(&store, "chem-a"),
        vec![
            ("lmgr".to_string(), 1),
            ("coord".to_string(), 2),
            ("rls".to_string(), 3)
        ]
    );

    let rows = store.for_lab(&LabId::from("chem-a")).expect("read lab");
    assert_eq!(rows[0].detection_reason, "Explicit Lab Manager");
    assert_eq!(rows[0].external_uid.as_deref(), Some("UID-lmgr"));
    assert!(rows[0].job_codes.contains("102945"));
    assert!(rows.iter().all(|row| !row.is_verified));
}

#[test]
fn recompute_is_idempotent() {
    let (service, store) = build_service(two_labs());

    service.recompute_all().expect("first run");
    let first = store.all().expect("read all");

    let stats = service.recompute_all().expect("second run");
    let second = store.all().expect("read all");

    assert_eq!(stats.managers_added, 0);
    assert_eq!(stats.managers_removed, first.len());
    assert_eq!(stats.managers_identified, first.len());
    assert_eq!(first.len(), second.len());
    for (before, after) in first.iter().zip(second.iter()) {
        assert_eq!(before.key(), after.key());
        assert_eq!(before.rank, after.rank);
        assert_eq!(before.confidence_score, after.confidence_score);
        assert_eq!(before.detection_reason, after.detection_reason);
        assert_eq!(before.created_at, after.created_at);
    }
}

#[test]
fn illegitimate_labs_are_skipped_and_cleared() {
    let mut snapshot = chemistry_lab();
    let mut inactive = lab("inactive", 9);
    inactive.is_active = false;
    let mut no_computers = lab("bare", 9);
    no_computers.computer_count = 0;
    let mut unregistered = lab("annex", 9);
    unregistered.primary_department_id = Some(UNREGISTERED.into());
    let mut homeless = lab("homeless", 9);
    homeless.primary_department_id = None;
    snapshot
        .labs
        .extend([inactive, no_computers, unregistered, homeless]);
    for lab_id in ["inactive", "bare", "annex", "homeless"] {
        snapshot.members.push(member(lab_id, "mgr", "Lab Manager"));
    }

    let (service, store) = build_service(snapshot);
    seed(store.as_ref(), &[("inactive", "stale", 1, 1), ("gone", "ghost", 1, 2)]);

    let stats = service.recompute_all().expect("recompute succeeds");
    assert_eq!(stats.labs_processed, 1);
    assert_eq!(stats.labs_skipped, 4);
    assert_eq!(stats.managers_removed, 2);

    let all = store.all().expect("read all");
    assert!(all.iter().all(|row| row.lab_id == LabId::from("chem-a")));

    for (lab_id, reason) in [
        ("inactive", SkipReason::Inactive),
        ("bare", SkipReason::NoComputers),
        ("annex", SkipReason::UnregisteredDepartment),
        ("homeless", SkipReason::UnregisteredDepartment),
    ] {
        match service.preview_lab(&LabId::from(lab_id)).expect("preview") {
            LabDecision::Skipped { reason: actual, .. } => assert_eq!(actual, reason),
            other => panic!("expected {lab_id} to be skipped, got {other:?}"),
        }
    }
}

#[test]
fn lab_recompute_leaves_other_labs_untouched() {
    let (service, store) = build_service(two_labs());
    seed(store.as_ref(), &[("bio-b", "previous", 1, 4)]);

    let stats = service
        .recompute_lab(&LabId::from("chem-a"))
        .expect("lab recompute");
    assert_eq!(stats.labs_processed, 1);
    assert_eq!(stats.managers_removed, 0);
    assert_eq!(managers(&store, "bio-b"), vec![("previous".to_string(), 1)]);
    assert_eq!(managers(&store, "chem-a").len(), 3);

    let stats = service
        .recompute_lab(&LabId::from("bio-b"))
        .expect("lab recompute");
    assert_eq!(stats.managers_removed, 1);
    assert_eq!(
        managers(&store, "bio-b"),
        vec![("blead".to_string(), 1), ("bsci".to_string(), 2)]
    );
}

#[test]
fn unknown_lab_is_skipped_and_stale_rows_cleared() {
    let (service, store) = build_service(chemistry_lab());
    seed(store.as_ref(), &[("retired", "old", 1, 1)]);

    let stats = service
        .recompute_lab(&LabId::from("retired"))
        .expect("recompute succeeds");
    assert_eq!(stats.labs_processed, 0);
    assert_eq!(stats.labs_skipped, 1);
    assert_eq!(stats.managers_removed, 1);
    assert!(managers(&store, "retired").is_empty());

    match service.preview_lab(&LabId::from("retired")).expect("preview") {
        LabDecision::Skipped { reason, .. } => assert_eq!(reason, SkipReason::UnknownLab),
        other => panic!("expected unknown lab, got {other:?}"),
    }
}

#[test]
fn failed_write_rolls_back_the_whole_scope() {
    let store = FailingStore::failing_after(10);
    seed(&store, &[("chem-a", "old-1", 1, 1), ("chem-a", "old-2", 2, 5)]);
    store
        .inserts_before_failure
        .store(1, std::sync::atomic::Ordering::SeqCst);

    let service = LabManagerService::new(
        Arc::new(chemistry_lab()),
        Arc::new(store.clone()),
        engine(),
    );

    match service.recompute_all() {
        Err(LabManagerServiceError::Repository(RepositoryError::Unavailable(_))) => {}
        other => panic!("expected unavailable store, got {other:?}"),
    }

    let rows: Vec<String> = store
        .all()
        .expect("read all")
        .into_iter()
        .map(|row| row.manager_uniqname.0)
        .collect();
    assert_eq!(rows, vec!["old-1".to_string(), "old-2".to_string()]);
}

#[test]
fn directory_failure_leaves_store_unchanged() {
    let store = Arc::new(MemoryAssignmentStore::new());
    seed(store.as_ref(), &[("chem-a", "kept", 1, 1)]);
    let service = LabManagerService::new(Arc::new(UnavailableDirectory), store.clone(), engine());

    assert!(matches!(
        service.recompute_all(),
        Err(LabManagerServiceError::Repository(RepositoryError::Input(_)))
    ));
    assert_eq!(managers(&store, "chem-a"), vec![("kept".to_string(), 1)]);
}

#[test]
fn verification_survives_recompute() {
    let (service, store) = build_service(chemistry_lab());
    service.recompute_all().expect("initial run");

    let verified = service
        .verify_manager(
            &LabId::from("chem-a"),
            &Uniqname::from("coord"),
            true,
            Some("confirmed by department admin".to_string()),
        )
        .expect("verify");
    assert!(verified.is_verified);
    assert!(verified.verified_at.is_some());

    let stats = service
        .recompute_lab(&LabId::from("chem-a"))
        .expect("incremental run");
    assert_eq!(stats.verified_preserved, 1);
    assert_eq!(stats.verified_released, 0);

    let rows = store.for_lab(&LabId::from("chem-a")).expect("read lab");
    let coord = rows
        .iter()
        .find(|row| row.manager_uniqname == Uniqname::from("coord"))
        .expect("coord still selected");
    assert!(coord.is_verified);
    assert_eq!(
        coord.verification_notes.as_deref(),
        Some("confirmed by department admin")
    );
    assert_eq!(coord.verified_at, verified.verified_at);
    assert_eq!(coord.rank, 2);
}

#[test]
fn verification_is_released_when_manager_drops_out() {
    let directory = Arc::new(ChangingDirectory::new(chemistry_lab()));
    let store = Arc::new(MemoryAssignmentStore::new());
    let service = LabManagerService::new(directory.clone(), store.clone(), engine());

    service.recompute_all().expect("initial run");
    service
        .verify_manager(
            &LabId::from("chem-a"),
            &Uniqname::from("rls"),
            true,
            Some("checked".to_string()),
        )
        .expect("verify");

    let mut changed = chemistry_lab();
    for member in changed.members.iter_mut() {
        if member.uniqname == Uniqname::from("rls") {
            member.role = Some("Undergraduate Assistant".to_string());
        }
    }
    directory.replace(changed);

    let stats = service.recompute_all().expect("second run");
    assert_eq!(stats.verified_released, 1);
    assert_eq!(stats.verified_preserved, 0);
    assert_eq!(
        managers(&store, "chem-a"),
        vec![("lmgr".to_string(), 1), ("coord".to_string(), 2)]
    );
}

#[test]
fn unverify_clears_timestamp_and_missing_rows_are_not_found() {
    let (service, _store) = build_service(chemistry_lab());
    service.recompute_all().expect("initial run");

    service
        .verify_manager(&LabId::from("chem-a"), &Uniqname::from("lmgr"), true, None)
        .expect("verify");
    let cleared = service
        .verify_manager(&LabId::from("chem-a"), &Uniqname::from("lmgr"), false, None)
        .expect("unverify");
    assert!(!cleared.is_verified);
    assert!(cleared.verified_at.is_none());

    assert!(matches!(
        service.verify_manager(&LabId::from("chem-a"), &Uniqname::from("nobody"), true, None),
        Err(LabManagerServiceError::Repository(RepositoryError::NotFound))
    ));
}

#[test]
fn preview_does_not_write() {
    let (service, store) = build_service(chemistry_lab());

    match service.preview_lab(&LabId::from("chem-a")).expect("preview") {
        LabDecision::Assigned(outcome) => {
            assert_eq!(outcome.path, SelectionPath::Scored);
            assert_eq!(outcome.managers.len(), 3);
        }
        other => panic!("expected assignment, got {other:?}"),
    }
    assert!(store.all().expect("read all").is_empty());
}

#[test]
fn concurrent_runs_keep_invariants() {
    let (service, store) = build_service(two_labs());
    let service = Arc::new(service);

    let handles: Vec<_> = (0..8)
        .map(|index| {
            let service = service.clone();
            thread::spawn(move || match index % 3 {
                0 => service.recompute_all(),
                1 => service.recompute_lab(&LabId::from("chem-a")),
                _ => service.recompute_lab(&LabId::from("bio-b")),
            })
        })
        .collect();

    for handle in handles {
        handle
            .join()
            .expect("worker panicked")
            .expect("recompute succeeds");
    }

    assert_eq!(managers(&store, "chem-a").len(), 3);
    assert_eq!(managers(&store, "bio-b").len(), 2);
    for row in store.all().expect("read all") {
        assert!((1..=3).contains(&row.rank));
        assert!((1..=10).contains(&row.confidence_score));
    }
}
