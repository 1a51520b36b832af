use std::io::Read;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

use super::normalizer::{clean_cell, parse_flag};
use crate::workflows::lab_managers::domain::{
    Department, DepartmentId, JobCodes, Lab, LabId, LabMember, Person, Uniqname,
};

fn read_rows<R: Read, T: DeserializeOwned>(reader: R) -> Result<Vec<T>, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    // Spreadsheet exports sometimes prefix the first header with a BOM.
    let headers: csv::StringRecord = csv_reader
        .headers()?
        .iter()
        .map(clean_cell)
        .collect();
    csv_reader.set_headers(headers);

    csv_reader.deserialize::<T>().collect()
}

pub(crate) fn parse_labs<R: Read>(reader: R) -> Result<Vec<Lab>, csv::Error> {
    Ok(read_rows::<_, LabRow>(reader)?
        .into_iter()
        .map(LabRow::into_lab)
        .collect())
}

pub(crate) fn parse_members<R: Read>(reader: R) -> Result<Vec<LabMember>, csv::Error> {
    Ok(read_rows::<_, MemberRow>(reader)?
        .into_iter()
        .map(MemberRow::into_member)
        .collect())
}

pub(crate) fn parse_people<R: Read>(reader: R) -> Result<Vec<Person>, csv::Error> {
    Ok(read_rows::<_, PersonRow>(reader)?
        .into_iter()
        .map(PersonRow::into_person)
        .collect())
}

pub(crate) fn parse_departments<R: Read>(reader: R) -> Result<Vec<Department>, csv::Error> {
    Ok(read_rows::<_, DepartmentRow>(reader)?
        .into_iter()
        .map(DepartmentRow::into_department)
        .collect())
}

#[derive(Debug, Deserialize)]
struct LabRow {
    lab_id: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pi_uniqname: Option<String>,
    #[serde(default, deserialize_with = "count")]
    member_count: u32,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    primary_department_id: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    department_ids: Option<String>,
    #[serde(default, deserialize_with = "count")]
    computer_count: u32,
    #[serde(deserialize_with = "flag")]
    is_active: bool,
}

impl LabRow {
    fn into_lab(self) -> Lab {
        let department_ids = self
            .department_ids
            .as_deref()
            .map(|raw| {
                raw.split(';')
                    .map(clean_cell)
                    .filter(|value| !value.is_empty())
                    .map(DepartmentId)
                    .collect()
            })
            .unwrap_or_default();

        Lab {
            lab_id: LabId(clean_cell(&self.lab_id)),
            pi_uniqname: self.pi_uniqname.map(Uniqname),
            member_count: self.member_count,
            primary_department_id: self.primary_department_id.map(DepartmentId),
            department_ids,
            computer_count: self.computer_count,
            is_active: self.is_active,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MemberRow {
    lab_id: String,
    member_uniqname: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    member_role: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    member_department_id: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    is_pi: bool,
    #[serde(default, deserialize_with = "flag")]
    is_investigator: bool,
}

impl MemberRow {
    fn into_member(self) -> LabMember {
        LabMember {
            lab_id: LabId(clean_cell(&self.lab_id)),
            uniqname: Uniqname(clean_cell(&self.member_uniqname)),
            role: self.member_role,
            department_id: self.member_department_id.map(DepartmentId),
            is_pi: self.is_pi,
            is_investigator: self.is_investigator,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PersonRow {
    uniqname: String,
    #[serde(default)]
    job_codes: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    external_uid: Option<String>,
}

impl PersonRow {
    fn into_person(self) -> Person {
        Person {
            uniqname: Uniqname(clean_cell(&self.uniqname)),
            job_codes: JobCodes::from_delimited(&self.job_codes),
            external_uid: self.external_uid,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DepartmentRow {
    department_id: String,
    #[serde(default)]
    name: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    ticketing_id: Option<String>,
}

impl DepartmentRow {
    fn into_department(self) -> Department {
        Department {
            department_id: DepartmentId(clean_cell(&self.department_id)),
            name: clean_cell(&self.name),
            ticketing_id: self.ticketing_id,
        }
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt
        .map(|value| clean_cell(&value))
        .filter(|value| !value.is_empty()))
}

fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_flag(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("'{raw}' is not a recognised flag")))
}

fn count<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let cleaned = clean_cell(&raw);
    if cleaned.is_empty() {
        return Ok(0);
    }
    cleaned
        .parse::<u32>()
        .map_err(|err| serde::de::Error::custom(format!("'{raw}' is not a count ({err})")))
}
