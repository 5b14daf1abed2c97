//! Credit accounting for triage jobs.

pub mod ledger;
pub mod pricing;

use thiserror::Error;

use crate::db::DatabaseError;

pub use ledger::{CreditLedger, SqliteCreditLedger};
pub use pricing::credit_cost;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Insufficient credits: {needed} needed, {available} available")]
    Insufficient { needed: u64, available: u64 },

    #[error("Credit ledger error: {0}")]
    Database(#[from] DatabaseError),
}
