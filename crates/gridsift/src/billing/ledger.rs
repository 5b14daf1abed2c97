//! Credit reservations and refunds.

use super::BillingError;
use crate::db::{credit_repo, now_timestamp, Database};

/// Per-user credit balances.
///
/// `reserve` must be atomic: two concurrent reservations may never both
/// succeed when the balance only covers one.
pub trait CreditLedger: Send + Sync {
    fn reserve(&self, user_id: &str, amount: u64) -> Result<(), BillingError>;

    fn refund(&self, user_id: &str, amount: u64) -> Result<(), BillingError>;

    /// Returns a job's reservation. Repeated calls for the same job refund
    /// nothing; the result tells whether this call paid out.
    fn refund_job(&self, job_id: &str, user_id: &str, amount: u64) -> Result<bool, BillingError>;

    fn balance(&self, user_id: &str) -> Result<u64, BillingError>;
}

/// `CreditLedger` backed by the `credit_accounts` table.
#[derive(Clone)]
pub struct SqliteCreditLedger {
    db: Database,
}

impl SqliteCreditLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Adds credits to an account, creating it when missing.
    pub fn deposit(&self, user_id: &str, amount: u64) -> Result<(), BillingError> {
        credit_repo::deposit(&self.db, user_id, amount, &now_timestamp())?;
        Ok(())
    }
}

impl CreditLedger for SqliteCreditLedger {
    fn reserve(&self, user_id: &str, amount: u64) -> Result<(), BillingError> {
        if amount == 0 {
            return Ok(());
        }
        if credit_repo::try_reserve(&self.db, user_id, amount, &now_timestamp())? {
            log::debug!("Reserved {} credits for {}", amount, user_id);
            return Ok(());
        }
        Err(BillingError::Insufficient {
            needed: amount,
            available: credit_repo::balance(&self.db, user_id)?,
        })
    }

    fn refund(&self, user_id: &str, amount: u64) -> Result<(), BillingError> {
        credit_repo::deposit(&self.db, user_id, amount, &now_timestamp())?;
        log::info!("Refunded {} credits to {}", amount, user_id);
        Ok(())
    }

    fn refund_job(&self, job_id: &str, user_id: &str, amount: u64) -> Result<bool, BillingError> {
        let paid = credit_repo::refund_job(&self.db, job_id, user_id, amount, &now_timestamp())?;
        if paid {
            log::info!("Refunded {} credits to {} for job {}", amount, user_id, job_id);
        } else {
            log::debug!("Job {} was already refunded", job_id);
        }
        Ok(paid)
    }

    fn balance(&self, user_id: &str) -> Result<u64, BillingError> {
        Ok(credit_repo::balance(&self.db, user_id)?)
    }
}
