//! Credit balances in `credit_accounts`.

use rusqlite::{params, OptionalExtension};

use super::{Database, DatabaseError};

/// Balance for a user; users without an account have zero.
pub fn balance(db: &Database, user_id: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let balance = conn
            .query_row(
                "SELECT balance FROM credit_accounts WHERE user_id = ?1",
                params![user_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(balance.unwrap_or(0))
    })
}

/// Adds `amount` to a user's balance, creating the account if needed.
pub fn deposit(db: &Database, user_id: &str, amount: u64, now: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO credit_accounts (user_id, balance, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT (user_id) DO UPDATE SET
                balance = balance + excluded.balance,
                updated_at = excluded.updated_at",
            params![user_id, amount, now],
        )?;
        Ok(())
    })
}

/// Subtracts `amount` only if the balance covers it. A single conditional
/// `UPDATE`, so concurrent reservations can never overdraw.
pub fn try_reserve(
    db: &Database,
    user_id: &str,
    amount: u64,
    now: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let n = conn.execute(
            "UPDATE credit_accounts SET balance = balance - ?2, updated_at = ?3
             WHERE user_id = ?1 AND balance >= ?2",
            params![user_id, amount, now],
        )?;
        Ok(n == 1)
    })
}

/// Returns a job's reserved credits at most once. The `credit_refunds` row
/// and the deposit share one transaction. Returns `false` when the job was
/// already refunded.
pub fn refund_job(
    db: &Database,
    job_id: &str,
    user_id: &str,
    amount: u64,
    now: &str,
) -> Result<bool, DatabaseError> {
    db.with_transaction(|conn| {
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO credit_refunds (job_id, user_id, amount, refunded_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![job_id, user_id, amount, now],
        )?;
        if inserted == 0 {
            return Ok(false);
        }
        conn.execute(
            "INSERT INTO credit_accounts (user_id, balance, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT (user_id) DO UPDATE SET
                balance = balance + excluded.balance,
                updated_at = excluded.updated_at",
            params![user_id, amount, now],
        )?;
        Ok(true)
    })
}
