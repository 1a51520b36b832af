use std::io::Read;

use serde::{Deserialize, Serialize};

use super::super::domain::{JobCodes, MAX_CONFIDENCE_SCORE, MIN_CONFIDENCE_SCORE};

/// Case-insensitive predicate over trimmed role text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum RolePattern {
    Contains(String),
    Equals(String),
    StartsWith(String),
    /// Every fragment appears, in order, with anything in between.
    InOrder(Vec<String>),
}

impl RolePattern {
    pub fn contains(fragment: &str) -> Self {
        Self::Contains(fragment.to_string())
    }

    pub fn equals(value: &str) -> Self {
        Self::Equals(value.to_string())
    }

    pub fn starts_with(prefix: &str) -> Self {
        Self::StartsWith(prefix.to_string())
    }

    pub fn in_order(fragments: &[&str]) -> Self {
        Self::InOrder(fragments.iter().map(|value| value.to_string()).collect())
    }

    /// `folded_role` must already be trimmed and lowercased.
    fn matches(&self, folded_role: &str) -> bool {
        match self {
            RolePattern::Contains(fragment) => folded_role.contains(&fold(fragment)),
            RolePattern::Equals(value) => folded_role == fold(value),
            RolePattern::StartsWith(prefix) => folded_role.starts_with(&fold(prefix)),
            RolePattern::InOrder(fragments) => {
                let mut remainder = folded_role;
                for fragment in fragments {
                    let fragment = fold(fragment);
                    match remainder.find(&fragment) {
                        Some(position) => remainder = &remainder[position + fragment.len()..],
                        None => return false,
                    }
                }
                true
            }
        }
    }

    fn fragments(&self) -> Vec<&str> {
        match self {
            RolePattern::Contains(value)
            | RolePattern::Equals(value)
            | RolePattern::StartsWith(value) => vec![value.as_str()],
            RolePattern::InOrder(values) => values.iter().map(String::as_str).collect(),
        }
    }
}

fn fold(value: &str) -> String {
    value.trim().to_lowercase()
}

/// One row of the rule table: fires when any role pattern matches or the job code is held.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringRule {
    pub score: u8,
    pub reason: String,
    #[serde(default)]
    pub role_patterns: Vec<RolePattern>,
    #[serde(default)]
    pub job_code: Option<String>,
}

impl ScoringRule {
    fn new(score: u8, reason: &str, role_patterns: Vec<RolePattern>, job_code: Option<&str>) -> Self {
        Self {
            score,
            reason: reason.to_string(),
            role_patterns,
            job_code: job_code.map(str::to_string),
        }
    }

    fn fires(&self, folded_role: &str, job_codes: &JobCodes) -> bool {
        self.role_patterns
            .iter()
            .any(|pattern| pattern.matches(folded_role))
            || self
                .job_code
                .as_deref()
                .map(|code| job_codes.contains(code))
                .unwrap_or(false)
    }
}

/// Result of evaluating a role against the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreMatch {
    pub score: u8,
    pub reason: String,
    pub rule_index: usize,
}

/// Ordered, validated rule list. Evaluation is first-match-wins in declared order, so two
/// rules sharing a score are still distinguished by position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleTable {
    rules: Vec<ScoringRule>,
}

impl RuleTable {
    /// Built-in table used when no override file is configured.
    pub fn standard() -> Self {
        let rules = vec![
            ScoringRule::new(
                1,
                "Explicit Lab Manager",
                vec![RolePattern::contains("Lab Manager")],
                Some("102945"),
            ),
            ScoringRule::new(
                1,
                "Lab Coordinator",
                vec![RolePattern::contains("Lab Coordinator")],
                Some("102946"),
            ),
            ScoringRule::new(
                1,
                "Laboratory Manager",
                vec![RolePattern::contains("Laboratory Manager")],
                Some("102929"),
            ),
            ScoringRule::new(
                2,
                "Admin/Project Coordinator",
                vec![RolePattern::equals("Admin Coord/Project Coord")],
                None,
            ),
            ScoringRule::new(
                2,
                "Project Coordinator (variant)",
                vec![RolePattern::contains("Project Coordinator")],
                None,
            ),
            ScoringRule::new(
                2,
                "Administrative Coordinator",
                vec![RolePattern::contains("Administrative Coordinator")],
                None,
            ),
            ScoringRule::new(
                3,
                "Research Lab Specialist Lead",
                vec![RolePattern::equals("Research Lab Specialist Lead")],
                Some("102909"),
            ),
            ScoringRule::new(
                4,
                "Research Lab Specialist Lead (variant)",
                vec![RolePattern::contains("Research Lab Specialist Lead")],
                None,
            ),
            ScoringRule::new(
                5,
                "Research Fellow",
                vec![RolePattern::starts_with("Research Fellow")],
                None,
            ),
            ScoringRule::new(
                6,
                "Senior Technician",
                vec![RolePattern::in_order(&["Tech", "Sr"])],
                Some("102944"),
            ),
            ScoringRule::new(7, "Leadership role", vec![RolePattern::contains("Lead")], None),
            ScoringRule::new(
                8,
                "Research Scientist",
                vec![RolePattern::contains("Research Scientist")],
                None,
            ),
            ScoringRule::new(
                9,
                "Dual GSI/GSRA",
                vec![
                    RolePattern::equals(
                        "Graduate Student Instructor and Graduate Student Research Assistant",
                    ),
                    RolePattern::equals(
                        "Graduate Student Research Assistant and Graduate Student Instructor",
                    ),
                ],
                None,
            ),
            ScoringRule::new(
                9,
                "Research Lab Specialist Senior",
                vec![RolePattern::contains("Research Lab Specialist Senior")],
                None,
            ),
            ScoringRule::new(
                10,
                "Grad student (GSI or GSRA)",
                vec![
                    RolePattern::contains("Graduate Student Instructor"),
                    RolePattern::contains("Graduate Student Research Assistant"),
                ],
                None,
            ),
        ];

        Self { rules }
    }

    pub fn from_rules(rules: Vec<ScoringRule>) -> Result<Self, RuleTableError> {
        if rules.is_empty() {
            return Err(RuleTableError::Empty);
        }

        for (index, rule) in rules.iter().enumerate() {
            if !(MIN_CONFIDENCE_SCORE..=MAX_CONFIDENCE_SCORE).contains(&rule.score) {
                return Err(RuleTableError::ScoreOutOfRange {
                    index,
                    score: rule.score,
                });
            }
            if rule.reason.trim().is_empty() {
                return Err(RuleTableError::MissingReason { index });
            }
            let has_job_code = rule
                .job_code
                .as_deref()
                .map(|code| !code.trim().is_empty())
                .unwrap_or(false);
            if rule.role_patterns.is_empty() && !has_job_code {
                return Err(RuleTableError::NoPredicate { index });
            }
            let empty_fragment = rule.role_patterns.iter().any(|pattern| {
                let fragments = pattern.fragments();
                fragments.is_empty() || fragments.iter().any(|value| value.trim().is_empty())
            });
            if empty_fragment {
                return Err(RuleTableError::EmptyPattern { index });
            }
        }

        Ok(Self { rules })
    }

    /// Parse a JSON array of rules and validate it.
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self, RuleTableError> {
        let rules: Vec<ScoringRule> =
            serde_json::from_reader(reader).map_err(RuleTableError::Malformed)?;
        Self::from_rules(rules)
    }

    pub fn rules(&self) -> &[ScoringRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Score a role. `None` means no rule fired and the member is not a candidate.
    pub fn evaluate(&self, role: &str, job_codes: &JobCodes) -> Option<ScoreMatch> {
        let folded_role = fold(role);
        self.rules
            .iter()
            .enumerate()
            .find(|(_, rule)| rule.fires(&folded_role, job_codes))
            .map(|(rule_index, rule)| ScoreMatch {
                score: rule.score,
                reason: rule.reason.clone(),
                rule_index,
            })
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// Validation failures for configured rule tables.
#[derive(Debug, thiserror::Error)]
pub enum RuleTableError {
    #[error("rule table is empty")]
    Empty,
    #[error("rule {index} has score {score}, expected 1..=10")]
    ScoreOutOfRange { index: usize, score: u8 },
    #[error("rule {index} has no detection reason")]
    MissingReason { index: usize },
    #[error("rule {index} has neither a role pattern nor a job code")]
    NoPredicate { index: usize },
    #[error("rule {index} contains an empty role pattern")]
    EmptyPattern { index: usize },
    #[error("rule table is not valid JSON: {0}")]
    Malformed(#[source] serde_json::Error),
}
