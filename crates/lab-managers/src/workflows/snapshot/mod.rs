//! CSV import of the lab catalog, memberships, person job codes, and department registry.

mod normalizer;
mod parser;

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::workflows::lab_managers::directory::{LabDirectory, LabSnapshot};
use crate::workflows::lab_managers::domain::{Person, RecomputeScope, Uniqname};
use crate::workflows::lab_managers::repository::RepositoryError;

pub const LABS_FILE: &str = "labs.csv";
pub const MEMBERS_FILE: &str = "members.csv";
pub const PEOPLE_FILE: &str = "people.csv";
pub const DEPARTMENTS_FILE: &str = "departments.csv";

#[derive(Debug)]
pub enum SnapshotError {
    Io {
        file: String,
        source: std::io::Error,
    },
    Csv {
        file: String,
        source: csv::Error,
    },
}

impl std::fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotError::Io { file, source } => {
                write!(f, "failed to read snapshot file {}: {}", file, source)
            }
            SnapshotError::Csv { file, source } => {
                write!(f, "invalid CSV data in {}: {}", file, source)
            }
        }
    }
}

impl std::error::Error for SnapshotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SnapshotError::Io { source, .. } => Some(source),
            SnapshotError::Csv { source, .. } => Some(source),
        }
    }
}

/// Readers for the four input tables, in import order.
pub struct SnapshotReaders<L, M, P, D> {
    pub labs: L,
    pub members: M,
    pub people: P,
    pub departments: D,
}

pub struct LabSnapshotImporter;

impl LabSnapshotImporter {
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<LabSnapshot, SnapshotError> {
        let dir = dir.as_ref();
        Self::from_readers(SnapshotReaders {
            labs: open(dir, LABS_FILE)?,
            members: open(dir, MEMBERS_FILE)?,
            people: open(dir, PEOPLE_FILE)?,
            departments: open(dir, DEPARTMENTS_FILE)?,
        })
    }

    pub fn from_readers<L, M, P, D>(
        readers: SnapshotReaders<L, M, P, D>,
    ) -> Result<LabSnapshot, SnapshotError>
    where
        L: Read,
        M: Read,
        P: Read,
        D: Read,
    {
        let labs = parser::parse_labs(readers.labs).map_err(csv_error(LABS_FILE))?;
        let members = parser::parse_members(readers.members).map_err(csv_error(MEMBERS_FILE))?;
        let people = parser::parse_people(readers.people).map_err(csv_error(PEOPLE_FILE))?;
        let departments = parser::parse_departments(readers.departments)
            .map_err(csv_error(DEPARTMENTS_FILE))?;

        debug!(
            labs = labs.len(),
            members = members.len(),
            people = people.len(),
            departments = departments.len(),
            "lab snapshot imported"
        );

        Ok(LabSnapshot {
            labs,
            members,
            people: merge_people(people),
            departments: departments
                .into_iter()
                .map(|department| (department.department_id.clone(), department))
                .collect(),
        })
    }
}

/// People exports carry one row per appointment; union the job codes per person and keep
/// the first external identifier seen.
fn merge_people(rows: Vec<Person>) -> BTreeMap<Uniqname, Person> {
    let mut people: BTreeMap<Uniqname, Person> = BTreeMap::new();
    for row in rows {
        match people.get_mut(&row.uniqname) {
            Some(existing) => {
                existing.job_codes = existing
                    .job_codes
                    .iter()
                    .chain(row.job_codes.iter())
                    .collect();
                if existing.external_uid.is_none() {
                    existing.external_uid = row.external_uid;
                }
            }
            None => {
                people.insert(row.uniqname.clone(), row);
            }
        }
    }
    people
}

fn open(dir: &Path, file: &str) -> Result<std::fs::File, SnapshotError> {
    std::fs::File::open(dir.join(file)).map_err(|source| SnapshotError::Io {
        file: file.to_string(),
        source,
    })
}

fn csv_error(file: &'static str) -> impl Fn(csv::Error) -> SnapshotError {
    move |source| SnapshotError::Csv {
        file: file.to_string(),
        source,
    }
}

/// Directory of CSV exports, re-read on every load so each recompute sees fresh data.
#[derive(Debug, Clone)]
pub struct CsvLabDirectory {
    root: PathBuf,
}

impl CsvLabDirectory {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl LabDirectory for CsvLabDirectory {
    fn load(&self, scope: &RecomputeScope) -> Result<LabSnapshot, RepositoryError> {
        let snapshot = LabSnapshotImporter::from_dir(&self.root)
            .map_err(|err| RepositoryError::Input(err.to_string()))?;
        Ok(snapshot.scoped(scope))
    }
}
