//! Versioned schema migrations.
//!
//! Applied versions are recorded in `_migrations`; each migration runs at
//! most once and inside its own transaction.

use rusqlite::Connection;

use super::error::DatabaseError;

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_triage_jobs_table",
        sql: include_str!("sql/001_create_triage_jobs.sql"),
    },
    Migration {
        version: 2,
        description: "create_triage_photos_table",
        sql: include_str!("sql/002_create_triage_photos.sql"),
    },
    Migration {
        version: 3,
        description: "create_credit_accounts_table",
        sql: include_str!("sql/003_create_credit_accounts.sql"),
    },
    Migration {
        version: 4,
        description: "create_credit_refunds_table",
        sql: include_str!("sql/004_create_credit_refunds.sql"),
    },
];

/// Latest schema version this build knows about.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

/// Runs all pending migrations on the given connection.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    if current_version > latest_version() {
        return Err(DatabaseError::Migration {
            version: current_version,
            reason: format!(
                "database schema is newer than this build (latest known v{})",
                latest_version()
            ),
        });
    }

    for migration in MIGRATIONS.iter().filter(|m| m.version > current_version) {
        log::info!(
            "Running migration v{}: {}",
            migration.version,
            migration.description
        );

        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.sql)
            .map_err(|e| DatabaseError::Migration {
                version: migration.version,
                reason: e.to_string(),
            })?;
        tx.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.description],
        )?;
        tx.commit()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        conn
    }

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |r| r.get::<_, u32>(0),
        )
        .unwrap()
            == 1
    }

    #[test]
    fn test_migrations_run_on_fresh_db() {
        let conn = fresh();
        run_all(&conn).unwrap();

        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);
        for table in [
            "triage_jobs",
            "triage_photos",
            "credit_accounts",
            "credit_refunds",
        ] {
            assert!(table_exists(&conn, table), "missing {}", table);
        }
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = fresh();
        run_all(&conn).unwrap();
        run_all(&conn).unwrap();

        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let conn = fresh();
        run_all(&conn).unwrap();
        conn.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, 'future')",
            [latest_version() + 1],
        )
        .unwrap();

        assert!(matches!(
            run_all(&conn),
            Err(DatabaseError::Migration { .. })
        ));
    }

    #[test]
    fn test_photos_cascade_with_job() {
        let conn = fresh();
        run_all(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO triage_jobs (id, user_id, target, created_at, updated_at)
             VALUES ('j1', 'u1', '10%', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z');
             INSERT INTO triage_photos (job_id, photo_id, position, storage_ref)
             VALUES ('j1', 'p1', 0, 'a.jpg');
             DELETE FROM triage_jobs WHERE id = 'j1';",
        )
        .unwrap();

        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM triage_photos", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
