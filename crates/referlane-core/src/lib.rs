pub mod error;
pub mod models;
pub mod period;

pub use error::SettlementError;
pub use models::{
    AuditLogEntry, Commission, CommissionEntry, CommissionStatus, Partner, PartnerAggregate,
    PartnerSnapshot, PartnerTier, Referral, ReferralConversion, ReferralStatus,
};
pub use period::SettlementPeriod;
