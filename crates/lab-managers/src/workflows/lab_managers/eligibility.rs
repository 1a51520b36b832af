use std::collections::BTreeMap;

use serde::Serialize;

use super::domain::{Candidate, JobCodes, LabMember, Person, Uniqname};
use super::scoring::ManagerPolicy;

/// Role fragments that rule a member out regardless of job codes.
const RESTRICTED_TITLES: [&str; 2] = ["chief administrator", "professor"];

/// Why a membership cannot be considered for a management role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Exclusion {
    MissingRole,
    ExcludedDepartment,
    RestrictedTitle,
    PrincipalInvestigator,
}

pub fn exclusion_for(member: &LabMember, policy: &ManagerPolicy) -> Option<Exclusion> {
    let role = match member.role.as_deref().map(str::trim) {
        Some(role) if !role.is_empty() => role,
        _ => return Some(Exclusion::MissingRole),
    };

    if member
        .department_id
        .as_ref()
        .map(|department| policy.is_excluded(department))
        .unwrap_or(false)
    {
        return Some(Exclusion::ExcludedDepartment);
    }

    let folded = role.to_lowercase();
    if RESTRICTED_TITLES.iter().any(|title| folded.contains(title)) {
        return Some(Exclusion::RestrictedTitle);
    }

    if member.is_pi {
        return Some(Exclusion::PrincipalInvestigator);
    }

    None
}

/// Filter memberships down to candidates, joining job codes and external identifiers.
/// Members without a person record are kept with an empty job-code set.
pub fn eligible_candidates<'a, I>(
    members: I,
    people: &BTreeMap<Uniqname, Person>,
    policy: &ManagerPolicy,
) -> Vec<Candidate>
where
    I: IntoIterator<Item = &'a LabMember>,
{
    members
        .into_iter()
        .filter(|member| exclusion_for(member, policy).is_none())
        .map(|member| {
            let person = people.get(&member.uniqname);
            Candidate {
                lab_id: member.lab_id.clone(),
                uniqname: member.uniqname.clone(),
                role: member.role.as_deref().unwrap_or_default().trim().to_string(),
                job_codes: person
                    .map(|person| person.job_codes.clone())
                    .unwrap_or_else(JobCodes::new),
                external_uid: person.and_then(|person| person.external_uid.clone()),
            }
        })
        .collect()
}
