use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{ffi, params, Connection, ErrorCode, OptionalExtension, Params, Row};
use tracing::warn;

use super::domain::{JobCodes, LabId, LabManagerAssignment, RecomputeScope, Uniqname};
use super::repository::{
    check_assignment, AssignmentStore, AssignmentTransaction, RepositoryError,
    VerificationUpdate,
};

const SCHEMA_VERSION: &str = "1";

const CREATE_SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS lab_managers (
    lab_id TEXT NOT NULL,
    manager_uniqname TEXT NOT NULL,
    external_uid TEXT,
    role TEXT NOT NULL,
    job_codes TEXT NOT NULL DEFAULT '',
    confidence_score INTEGER NOT NULL CHECK (confidence_score BETWEEN 1 AND 10),
    rank INTEGER NOT NULL CHECK (rank BETWEEN 1 AND 3),
    detection_reason TEXT NOT NULL,
    is_verified INTEGER NOT NULL DEFAULT 0,
    verification_notes TEXT,
    verified_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (lab_id, manager_uniqname),
    UNIQUE (lab_id, rank)
);

CREATE INDEX IF NOT EXISTS idx_lab_managers_manager ON lab_managers (manager_uniqname);
CREATE INDEX IF NOT EXISTS idx_lab_managers_verified ON lab_managers (is_verified);

INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', '1');
";

const SELECT_COLUMNS: &str = "SELECT lab_id, manager_uniqname, external_uid, role, job_codes, \
    confidence_score, rank, detection_reason, is_verified, verification_notes, verified_at, \
    created_at, updated_at FROM lab_managers";

/// SQLite-backed assignment table. A single connection is shared behind a mutex; each
/// recompute runs inside `BEGIN IMMEDIATE` so concurrent writers from other processes wait.
pub struct SqliteAssignmentStore {
    conn: Mutex<Connection>,
}

impl SqliteAssignmentStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let conn = Connection::open(path).map_err(map_sqlite_error)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, RepositoryError> {
        let conn = Connection::open_in_memory().map_err(map_sqlite_error)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, RepositoryError> {
        ensure_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, RepositoryError> {
        self.conn
            .lock()
            .map_err(|_| RepositoryError::Unavailable("sqlite connection mutex poisoned".to_string()))
    }
}

fn ensure_schema(conn: &Connection) -> Result<(), RepositoryError> {
    conn.execute_batch(CREATE_SCHEMA_SQL)
        .map_err(map_sqlite_error)?;

    let stored_version: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(map_sqlite_error)?;

    match stored_version.as_deref() {
        Some(SCHEMA_VERSION) => Ok(()),
        Some(other) => Err(RepositoryError::Unavailable(format!(
            "schema version mismatch: found {other}, expected {SCHEMA_VERSION}"
        ))),
        None => Err(RepositoryError::Unavailable(
            "schema version missing".to_string(),
        )),
    }
}

/// Range and NOT NULL violations are `Constraint`; key and uniqueness violations are `Conflict`.
fn map_sqlite_error(err: rusqlite::Error) -> RepositoryError {
    let extended_code = err
        .sqlite_error()
        .filter(|failure| failure.code == ErrorCode::ConstraintViolation)
        .map(|failure| failure.extended_code);

    match extended_code {
        None => RepositoryError::Storage(err),
        Some(ffi::SQLITE_CONSTRAINT_CHECK) | Some(ffi::SQLITE_CONSTRAINT_NOTNULL) => {
            RepositoryError::Constraint(err.to_string())
        }
        Some(_) => RepositoryError::Conflict(err.to_string()),
    }
}

fn scope_filter(scope: &RecomputeScope) -> Option<&str> {
    match scope {
        RecomputeScope::AllLabs => None,
        RecomputeScope::Lab(lab_id) => Some(lab_id.0.as_str()),
    }
}

fn parse_timestamp(index: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err)))
}

fn row_to_assignment(row: &Row<'_>) -> rusqlite::Result<LabManagerAssignment> {
    let job_codes: String = row.get(4)?;
    let verified_at: Option<String> = row.get(10)?;

    Ok(LabManagerAssignment {
        lab_id: LabId(row.get(0)?),
        manager_uniqname: Uniqname(row.get(1)?),
        external_uid: row.get(2)?,
        role: row.get(3)?,
        job_codes: JobCodes::from_delimited(&job_codes),
        confidence_score: row.get(5)?,
        rank: row.get(6)?,
        detection_reason: row.get(7)?,
        is_verified: row.get(8)?,
        verification_notes: row.get(9)?,
        verified_at: verified_at
            .map(|raw| parse_timestamp(10, raw))
            .transpose()?,
        created_at: parse_timestamp(11, row.get(11)?)?,
        updated_at: parse_timestamp(12, row.get(12)?)?,
    })
}

fn query_assignments<P: Params>(
    conn: &Connection,
    sql: &str,
    query_params: P,
) -> Result<Vec<LabManagerAssignment>, RepositoryError> {
    let mut stmt = conn.prepare(sql).map_err(map_sqlite_error)?;
    let rows = stmt
        .query_map(query_params, row_to_assignment)
        .map_err(map_sqlite_error)?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(map_sqlite_error)
}

impl AssignmentStore for SqliteAssignmentStore {
    type Transaction<'a> = SqliteTransaction<'a>;

    fn begin(&self) -> Result<Self::Transaction<'_>, RepositoryError> {
        let conn = self.lock()?;
        conn.execute_batch("BEGIN IMMEDIATE")
            .map_err(map_sqlite_error)?;
        Ok(SqliteTransaction {
            conn,
            finished: false,
        })
    }

    fn for_lab(&self, lab_id: &LabId) -> Result<Vec<LabManagerAssignment>, RepositoryError> {
        let conn = self.lock()?;
        let sql = format!("{SELECT_COLUMNS} WHERE lab_id = ?1 ORDER BY rank");
        query_assignments(&conn, &sql, params![lab_id.0])
    }

    fn all(&self) -> Result<Vec<LabManagerAssignment>, RepositoryError> {
        let conn = self.lock()?;
        let sql = format!("{SELECT_COLUMNS} ORDER BY lab_id, rank");
        query_assignments(&conn, &sql, [])
    }

    fn set_verification(
        &self,
        lab_id: &LabId,
        manager: &Uniqname,
        update: VerificationUpdate,
    ) -> Result<LabManagerAssignment, RepositoryError> {
        let conn = self.lock()?;
        let verified_at = update.is_verified.then(|| update.at.to_rfc3339());
        let changed = conn
            .execute(
                "UPDATE lab_managers
                 SET is_verified = ?1, verification_notes = ?2, verified_at = ?3, updated_at = ?4
                 WHERE lab_id = ?5 AND manager_uniqname = ?6",
                params![
                    update.is_verified,
                    update.notes,
                    verified_at,
                    update.at.to_rfc3339(),
                    lab_id.0,
                    manager.0
                ],
            )
            .map_err(map_sqlite_error)?;

        if changed == 0 {
            return Err(RepositoryError::NotFound);
        }

        let sql = format!("{SELECT_COLUMNS} WHERE lab_id = ?1 AND manager_uniqname = ?2");
        conn.query_row(&sql, params![lab_id.0, manager.0], row_to_assignment)
            .map_err(map_sqlite_error)
    }
}

pub struct SqliteTransaction<'a> {
    conn: MutexGuard<'a, Connection>,
    finished: bool,
}

impl AssignmentTransaction for SqliteTransaction<'_> {
    fn existing(
        &mut self,
        scope: &RecomputeScope,
    ) -> Result<Vec<LabManagerAssignment>, RepositoryError> {
        let sql = format!("{SELECT_COLUMNS} WHERE ?1 IS NULL OR lab_id = ?1 ORDER BY lab_id, rank");
        query_assignments(&self.conn, &sql, params![scope_filter(scope)])
    }

    fn delete_scope(&mut self, scope: &RecomputeScope) -> Result<usize, RepositoryError> {
        self.conn
            .execute(
                "DELETE FROM lab_managers WHERE ?1 IS NULL OR lab_id = ?1",
                params![scope_filter(scope)],
            )
            .map_err(map_sqlite_error)
    }

    fn insert(&mut self, assignment: &LabManagerAssignment) -> Result<(), RepositoryError> {
        check_assignment(assignment)?;

        self.conn
            .execute(
                "INSERT INTO lab_managers (lab_id, manager_uniqname, external_uid, role, job_codes,
                    confidence_score, rank, detection_reason, is_verified, verification_notes,
                    verified_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    assignment.lab_id.0,
                    assignment.manager_uniqname.0,
                    assignment.external_uid,
                    assignment.role,
                    assignment.job_codes.to_delimited(),
                    assignment.confidence_score,
                    assignment.rank,
                    assignment.detection_reason,
                    assignment.is_verified,
                    assignment.verification_notes,
                    assignment.verified_at.map(|at| at.to_rfc3339()),
                    assignment.created_at.to_rfc3339(),
                    assignment.updated_at.to_rfc3339(),
                ],
            )
            .map_err(map_sqlite_error)?;
        Ok(())
    }

    fn commit(mut self) -> Result<(), RepositoryError> {
        self.conn
            .execute_batch("COMMIT")
            .map_err(map_sqlite_error)?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(err) = self.conn.execute_batch("ROLLBACK") {
                warn!(error = %err, "failed to roll back lab manager transaction");
            }
        }
    }
}
