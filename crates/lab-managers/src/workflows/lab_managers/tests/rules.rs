use super::common::*;

use crate::workflows::lab_managers::{
    JobCodes, RolePattern, RuleTable, RuleTableError, ScoringRule,
};

fn score(role: &str, codes: &[&str]) -> Option<(u8, String, usize)> {
    let codes: JobCodes = codes.iter().collect();
    engine()
        .score(role, &codes)
        .map(|matched| (matched.score, matched.reason, matched.rule_index))
}

fn expect(role: &str, codes: &[&str], expected_score: u8, expected_reason: &str) {
    match score(role, codes) {
        Some((score, reason, _)) => {
            assert_eq!(score, expected_score, "score for role '{role}'");
            assert_eq!(reason, expected_reason, "reason for role '{role}'");
        }
        None => panic!("expected role '{role}' to match '{expected_reason}'"),
    }
}

#[test]
fn explicit_lab_manager_by_role_or_job_code() {
    expect("Lab Manager", &[], 1, "Explicit Lab Manager");
    expect("Senior Lab Manager", &[], 1, "Explicit Lab Manager");
    expect("Administrative Assistant", &["102945"], 1, "Explicit Lab Manager");
}

#[test]
fn lab_coordinator_and_laboratory_manager_rows() {
    expect("Lab Coordinator", &[], 1, "Lab Coordinator");
    expect("Office Staff", &["102946"], 1, "Lab Coordinator");
    expect("Laboratory Manager", &[], 1, "Laboratory Manager");
    expect("Office Staff", &["102929"], 1, "Laboratory Manager");
}

#[test]
fn coordinator_rows_score_two() {
    expect("Admin Coord/Project Coord", &[], 2, "Admin/Project Coordinator");
    expect("admin coord/project coord", &[], 2, "Admin/Project Coordinator");
    expect("Senior Project Coordinator", &[], 2, "Project Coordinator (variant)");
    expect("Administrative Coordinator", &[], 2, "Administrative Coordinator");
}

#[test]
fn research_lab_specialist_lead_exact_versus_variant() {
    expect(
        "Research Lab Specialist Lead",
        &[],
        3,
        "Research Lab Specialist Lead",
    );
    expect("Office Staff", &["102909"], 3, "Research Lab Specialist Lead");
    expect(
        "Research Lab Specialist Lead II",
        &[],
        4,
        "Research Lab Specialist Lead (variant)",
    );
}

#[test]
fn mid_table_rows() {
    expect("Research Fellow II", &[], 5, "Research Fellow");
    expect("Research Tech Sr", &[], 6, "Senior Technician");
    expect("Office Staff", &["102944"], 6, "Senior Technician");
    expect("Team Lead", &[], 7, "Leadership role");
    expect("Research Scientist", &[], 8, "Research Scientist");
}

#[test]
fn graduate_student_rows() {
    expect(
        "Graduate Student Instructor and Graduate Student Research Assistant",
        &[],
        9,
        "Dual GSI/GSRA",
    );
    expect(
        "Graduate Student Research Assistant and Graduate Student Instructor",
        &[],
        9,
        "Dual GSI/GSRA",
    );
    expect(
        "Research Lab Specialist Senior",
        &[],
        9,
        "Research Lab Specialist Senior",
    );
    expect(
        "Graduate Student Research Assistant",
        &[],
        10,
        "Grad student (GSI or GSRA)",
    );
    expect(
        "Graduate Student Instructor",
        &[],
        10,
        "Grad student (GSI or GSRA)",
    );
}

#[test]
fn unmatched_roles_are_not_candidates() {
    assert!(score("Undergraduate Assistant", &[]).is_none());
    assert!(score("Research Fellow", &["999999"]).is_some());
    assert!(score("Visiting Scholar", &["999999"]).is_none());
}

#[test]
fn first_matching_rule_wins() {
    let (score_value, reason, index) =
        score("Lab Manager Lead", &["102944"]).expect("role matches");
    assert_eq!((score_value, reason.as_str(), index), (1, "Explicit Lab Manager", 0));

    // The exact dual role also contains the single-role fragments of the last row.
    let (score_value, _, index) = score(
        "Graduate Student Instructor and Graduate Student Research Assistant",
        &[],
    )
    .expect("dual role matches");
    assert_eq!((score_value, index), (9, 12));

    let (score_value, _, index) =
        score("Research Lab Specialist Senior", &[]).expect("senior specialist matches");
    assert_eq!((score_value, index), (9, 13));
}

#[test]
fn job_codes_match_by_membership_not_substring() {
    assert!(score("Office Staff", &["1029450"]).is_none());
    assert!(score("Office Staff", &["10294"]).is_none());
    expect("Office Staff", &[" 102945 "], 1, "Explicit Lab Manager");
}

#[test]
fn role_padding_and_case_are_ignored() {
    expect("   LAB MANAGER  ", &[], 1, "Explicit Lab Manager");
    expect("research fellow", &[], 5, "Research Fellow");
}

#[test]
fn standard_table_declares_rules_in_priority_order() {
    let table = RuleTable::standard();
    let scores: Vec<u8> = table.rules().iter().map(|rule| rule.score).collect();
    assert_eq!(scores, vec![1, 1, 1, 2, 2, 2, 3, 4, 5, 6, 7, 8, 9, 9, 10]);
    assert!(scores.windows(2).all(|pair| pair[0] <= pair[1]));
}

#[test]
fn custom_tables_are_validated() {
    assert!(matches!(
        RuleTable::from_rules(Vec::new()),
        Err(RuleTableError::Empty)
    ));

    let no_predicate = ScoringRule {
        score: 3,
        reason: "Orphan".to_string(),
        role_patterns: Vec::new(),
        job_code: None,
    };
    assert!(matches!(
        RuleTable::from_rules(vec![no_predicate]),
        Err(RuleTableError::NoPredicate { index: 0 })
    ));

    let zero_score = ScoringRule {
        score: 0,
        reason: "Zero".to_string(),
        role_patterns: vec![RolePattern::contains("Manager")],
        job_code: None,
    };
    assert!(matches!(
        RuleTable::from_rules(vec![zero_score]),
        Err(RuleTableError::ScoreOutOfRange { index: 0, score: 0 })
    ));

    let blank_fragment = ScoringRule {
        score: 4,
        reason: "Blank".to_string(),
        role_patterns: vec![RolePattern::in_order(&["Tech", " "])],
        job_code: None,
    };
    assert!(matches!(
        RuleTable::from_rules(vec![blank_fragment]),
        Err(RuleTableError::EmptyPattern { index: 0 })
    ));
}

#[test]
fn json_rule_table_round_trips_through_reader() {
    let json = r#"[
        {"score": 1, "reason": "Operations Manager", "role_patterns": [{"kind": "starts_with", "value": "Operations Manager"}]},
        {"score": 5, "reason": "Coded", "job_code": "555001"}
    ]"#;
    let table = RuleTable::from_json_reader(json.as_bytes()).expect("table parses");
    assert_eq!(table.len(), 2);

    let codes: JobCodes = ["555001"].iter().collect();
    let matched = table.evaluate("Analyst", &codes).expect("job code rule fires");
    assert_eq!((matched.score, matched.rule_index), (5, 1));
    assert!(table.evaluate("Lab Manager", &JobCodes::new()).is_none());
}
