use thiserror::Error;
use uuid::Uuid;

use crate::models::CommissionStatus;

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("commission not found")]
    NotFound,

    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        from: CommissionStatus,
        to: CommissionStatus,
    },

    #[error("commission already exists for partner {partner_id} in {month}/{year}")]
    DuplicatePeriod {
        partner_id: Uuid,
        year: i32,
        month: u32,
    },

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

impl SettlementError {
    /// State and existence errors are recoverable per item in batch
    /// operations; storage failures are not, but still only fail their item.
    pub fn is_duplicate_period(&self) -> bool {
        matches!(self, SettlementError::DuplicatePeriod { .. })
    }
}
