//! Photo repository for `triage_photos`.

use rusqlite::{params, Connection, Row};

use super::{Database, DatabaseError};

/// Columns holding per-photo selection flags.
const FLAG_COLUMNS: &[&str] = &["selected_coarse", "selected_fine", "final_selected"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoRow {
    pub job_id: String,
    pub photo_id: String,
    pub position: u64,
    pub storage_ref: String,
    pub content_hash: Option<String>,
    pub selected_coarse: bool,
    pub selected_fine: bool,
    pub final_selected: bool,
}

impl PhotoRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            job_id: row.get("job_id")?,
            photo_id: row.get("photo_id")?,
            position: row.get("position")?,
            storage_ref: row.get("storage_ref")?,
            content_hash: row.get("content_hash")?,
            selected_coarse: row.get("selected_coarse")?,
            selected_fine: row.get("selected_fine")?,
            final_selected: row.get("final_selected")?,
        })
    }
}

fn checked_flag(flag: &str) -> Result<&str, DatabaseError> {
    if FLAG_COLUMNS.contains(&flag) {
        Ok(flag)
    } else {
        Err(rusqlite::Error::InvalidColumnName(flag.to_string()).into())
    }
}

/// Inserts all rows in one transaction.
pub fn insert_many(db: &Database, rows: &[PhotoRow]) -> Result<(), DatabaseError> {
    db.with_transaction(|conn| {
        let mut stmt = conn.prepare(
            "INSERT INTO triage_photos (job_id, photo_id, position, storage_ref, content_hash,
             selected_coarse, selected_fine, final_selected)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for row in rows {
            stmt.execute(params![
                row.job_id,
                row.photo_id,
                row.position,
                row.storage_ref,
                row.content_hash,
                row.selected_coarse,
                row.selected_fine,
                row.final_selected,
            ])?;
        }
        Ok(())
    })
}

/// Photos of a job in submission order, optionally only final selections.
pub fn list_for_job(
    db: &Database,
    job_id: &str,
    final_only: bool,
) -> Result<Vec<PhotoRow>, DatabaseError> {
    db.with_conn(|conn| {
        let sql = if final_only {
            "SELECT * FROM triage_photos WHERE job_id = ?1 AND final_selected = 1 ORDER BY position"
        } else {
            "SELECT * FROM triage_photos WHERE job_id = ?1 ORDER BY position"
        };
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params![job_id], PhotoRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Sets `flag` on the given photos. Returns how many rows changed.
pub fn set_flag(
    conn: &Connection,
    job_id: &str,
    flag: &str,
    photo_ids: &[String],
) -> Result<usize, DatabaseError> {
    let column = checked_flag(flag)?;
    let mut stmt = conn.prepare(&format!(
        "UPDATE triage_photos SET {} = 1 WHERE job_id = ?1 AND photo_id = ?2",
        column
    ))?;
    let mut changed = 0;
    for id in photo_ids {
        changed += stmt.execute(params![job_id, id])?;
    }
    Ok(changed)
}

pub fn count_flag(db: &Database, job_id: &str, flag: &str) -> Result<u64, DatabaseError> {
    let column = checked_flag(flag)?;
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM triage_photos WHERE job_id = ?1 AND {} = 1",
                column
            ),
            params![job_id],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Removes every photo record of a job. Returns the number removed.
pub fn delete_for_job(db: &Database, job_id: &str) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let n = conn.execute(
            "DELETE FROM triage_photos WHERE job_id = ?1",
            params![job_id],
        )?;
        Ok(n)
    })
}
