use std::collections::HashSet;

use super::super::domain::{
    Candidate, Lab, LabMember, LabOutcome, RankedManager, ScoredCandidate, SelectionPath,
};
use super::config::ManagerPolicy;
use super::rules::RuleTable;

pub const SMALL_LAB_REASON: &str = "Small lab: all eligible members assigned";

/// `member_count - pi_count`, signed so inconsistent upstream counts cannot underflow.
pub(crate) fn small_lab_threshold(lab: &Lab, members: &[&LabMember]) -> i64 {
    let pi_count = members
        .iter()
        .filter(|member| member.lab_id == lab.lab_id && member.is_pi)
        .count() as i64;
    i64::from(lab.member_count) - pi_count
}

pub(crate) fn decide_lab(
    lab: &Lab,
    members: &[&LabMember],
    candidates: Vec<Candidate>,
    table: &RuleTable,
    policy: &ManagerPolicy,
) -> LabOutcome {
    let threshold = small_lab_threshold(lab, members);

    let (path, managers) = if threshold <= policy.small_lab_threshold {
        (SelectionPath::SmallLab, small_lab_managers(candidates, policy))
    } else {
        (
            SelectionPath::Scored,
            scored_managers(candidates, table, policy),
        )
    };

    LabOutcome {
        lab_id: lab.lab_id.clone(),
        path,
        threshold,
        managers,
    }
}

/// Every eligible member is a manager, ordered by role then uniqname, at the fixed score.
fn small_lab_managers(mut candidates: Vec<Candidate>, policy: &ManagerPolicy) -> Vec<RankedManager> {
    candidates.sort_by(|left, right| {
        left.role
            .cmp(&right.role)
            .then_with(|| left.uniqname.cmp(&right.uniqname))
    });

    let scored = candidates.into_iter().map(|candidate| ScoredCandidate {
        candidate,
        confidence_score: policy.small_lab_score,
        detection_reason: SMALL_LAB_REASON.to_string(),
        rule_index: None,
    });

    rank(distinct_people(scored), policy.max_managers)
}

fn scored_managers(
    candidates: Vec<Candidate>,
    table: &RuleTable,
    policy: &ManagerPolicy,
) -> Vec<RankedManager> {
    let mut scored: Vec<ScoredCandidate> = candidates
        .into_iter()
        .filter_map(|candidate| {
            table
                .evaluate(&candidate.role, &candidate.job_codes)
                .map(|matched| ScoredCandidate {
                    candidate,
                    confidence_score: matched.score,
                    detection_reason: matched.reason,
                    rule_index: Some(matched.rule_index),
                })
        })
        .collect();

    scored.sort_by(|left, right| {
        left.confidence_score
            .cmp(&right.confidence_score)
            .then_with(|| left.candidate.role.cmp(&right.candidate.role))
            .then_with(|| left.candidate.uniqname.cmp(&right.candidate.uniqname))
    });

    let scored = distinct_people(scored);
    let has_high_priority = scored
        .iter()
        .any(|entry| entry.confidence_score <= policy.high_confidence_cutoff);

    let pool = scored.into_iter().filter(|entry| {
        entry.confidence_score <= policy.high_confidence_cutoff || !has_high_priority
    });

    rank(pool.collect(), policy.max_managers)
}

/// Keep each person's first (best-ranked) entry so (lab, manager) stays unique.
fn distinct_people<I>(ordered: I) -> Vec<ScoredCandidate>
where
    I: IntoIterator<Item = ScoredCandidate>,
{
    let mut seen = HashSet::new();
    ordered
        .into_iter()
        .filter(|entry| seen.insert(entry.candidate.uniqname.clone()))
        .collect()
}

fn rank(ordered: Vec<ScoredCandidate>, cap: u8) -> Vec<RankedManager> {
    ordered
        .into_iter()
        .take(usize::from(cap))
        .zip(1u8..)
        .map(|(scored, rank)| RankedManager { rank, scored })
        .collect()
}
