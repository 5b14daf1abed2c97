//! Job repository: CRUD and guarded status updates for `triage_jobs`.
//!
//! Status-changing functions return `false` when the guard in their `WHERE`
//! clause rejected the update (unknown id or wrong current status); callers
//! decide which of the two it was.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Database, DatabaseError};
use crate::job::JobStatus;

/// A raw job row from the database.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub user_id: String,
    pub status: String,
    pub phase: String,
    pub target: String,
    pub criteria: String,
    pub passes: u8,
    pub total_input: u64,
    pub pass1_survivors: u64,
    pub final_selected: u64,
    pub current_step: u64,
    pub total_steps: u64,
    pub credits_reserved: u64,
    pub api_calls: u64,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            status: row.get("status")?,
            phase: row.get("phase")?,
            target: row.get("target")?,
            criteria: row.get("criteria")?,
            passes: row.get("passes")?,
            total_input: row.get("total_input")?,
            pass1_survivors: row.get("pass1_survivors")?,
            final_selected: row.get("final_selected")?,
            current_step: row.get("current_step")?,
            total_steps: row.get("total_steps")?,
            credits_reserved: row.get("credits_reserved")?,
            api_calls: row.get("api_calls")?,
            error_message: row.get("error_message")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

pub fn insert(db: &Database, job: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO triage_jobs (id, user_id, status, phase, target, criteria, passes,
             total_input, pass1_survivors, final_selected, current_step, total_steps,
             credits_reserved, api_calls, error_message, created_at, updated_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            params![
                job.id,
                job.user_id,
                job.status,
                job.phase,
                job.target,
                job.criteria,
                job.passes,
                job.total_input,
                job.pass1_survivors,
                job.final_selected,
                job.current_step,
                job.total_steps,
                job.credits_reserved,
                job.api_calls,
                job.error_message,
                job.created_at,
                job.updated_at,
                job.completed_at,
            ],
        )?;
        Ok(())
    })
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM triage_jobs WHERE id = ?1",
                params![id],
                JobRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Jobs in `pending` or `processing` for a user, newest first.
pub fn list_active_for_user(db: &Database, user_id: &str) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM triage_jobs
             WHERE user_id = ?1 AND status IN ('pending', 'processing')
             ORDER BY created_at DESC, id",
        )?;
        let rows = stmt
            .query_map(params![user_id], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Current status string, if the job exists.
pub fn status_of(db: &Database, id: &str) -> Result<Option<String>, DatabaseError> {
    db.with_conn(|conn| status_with_conn(conn, id))
}

/// Same as [`status_of`] on an already locked connection or transaction.
pub fn status_with_conn(conn: &Connection, id: &str) -> Result<Option<String>, DatabaseError> {
    let status = conn
        .query_row(
            "SELECT status FROM triage_jobs WHERE id = ?1",
            params![id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(status)
}

/// `status IN (...)` over every status allowed to move to `to`.
fn source_guard(to: JobStatus) -> String {
    let sources: Vec<String> = JobStatus::sources_of(to)
        .map(|s| format!("'{}'", s.as_str()))
        .collect();
    format!("status IN ({})", sources.join(", "))
}

/// pending -> processing.
pub fn claim(db: &Database, id: &str, now: &str) -> Result<bool, DatabaseError> {
    let sql = format!(
        "UPDATE triage_jobs SET status = 'processing', updated_at = ?2
         WHERE id = ?1 AND {}",
        source_guard(JobStatus::Processing)
    );
    db.with_conn(|conn| {
        let n = conn.execute(&sql, params![id, now])?;
        Ok(n == 1)
    })
}

pub fn set_phase(db: &Database, id: &str, phase: &str, now: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let n = conn.execute(
            "UPDATE triage_jobs SET phase = ?2, updated_at = ?3
             WHERE id = ?1 AND status = 'processing'",
            params![id, phase, now],
        )?;
        Ok(n == 1)
    })
}

pub fn set_progress(
    db: &Database,
    id: &str,
    current_step: u64,
    total_steps: u64,
    api_calls: u64,
    now: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let n = conn.execute(
            "UPDATE triage_jobs SET current_step = ?2, total_steps = ?3, api_calls = ?4,
             updated_at = ?5
             WHERE id = ?1 AND status = 'processing'",
            params![id, current_step, total_steps, api_calls, now],
        )?;
        Ok(n == 1)
    })
}

pub fn set_pass1_survivors(
    db: &Database,
    id: &str,
    survivors: u64,
    now: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let n = conn.execute(
            "UPDATE triage_jobs SET pass1_survivors = ?2, updated_at = ?3
             WHERE id = ?1 AND status = 'processing'",
            params![id, survivors, now],
        )?;
        Ok(n == 1)
    })
}

/// processing -> completed. Takes a connection so it can share a transaction
/// with the final selection flags.
pub fn complete(
    conn: &Connection,
    id: &str,
    pass1_survivors: u64,
    final_selected: u64,
    api_calls: u64,
    now: &str,
) -> Result<bool, DatabaseError> {
    let sql = format!(
        "UPDATE triage_jobs SET status = 'completed', phase = 'complete',
         pass1_survivors = ?2, final_selected = ?3, api_calls = ?4,
         current_step = total_steps, updated_at = ?5, completed_at = ?5
         WHERE id = ?1 AND {}",
        source_guard(JobStatus::Completed)
    );
    let n = conn.execute(
        &sql,
        params![id, pass1_survivors, final_selected, api_calls, now],
    )?;
    Ok(n == 1)
}

/// pending | processing -> failed.
pub fn fail(db: &Database, id: &str, message: &str, now: &str) -> Result<bool, DatabaseError> {
    let sql = format!(
        "UPDATE triage_jobs SET status = 'failed', error_message = ?2, updated_at = ?3,
         completed_at = ?3
         WHERE id = ?1 AND {}",
        source_guard(JobStatus::Failed)
    );
    db.with_conn(|conn| {
        let n = conn.execute(&sql, params![id, message, now])?;
        Ok(n == 1)
    })
}

/// pending | processing -> cancelled.
pub fn cancel(db: &Database, id: &str, now: &str) -> Result<bool, DatabaseError> {
    let sql = format!(
        "UPDATE triage_jobs SET status = 'cancelled', updated_at = ?2, completed_at = ?2
         WHERE id = ?1 AND {}",
        source_guard(JobStatus::Cancelled)
    );
    db.with_conn(|conn| {
        let n = conn.execute(&sql, params![id, now])?;
        Ok(n == 1)
    })
}
