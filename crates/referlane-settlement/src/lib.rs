pub mod aggregate;
pub mod batch;
pub mod calculator;
pub mod ledger;
pub mod postgres;
pub mod report;
pub mod store;
pub mod threshold;

pub use aggregate::aggregate_period;
pub use batch::{PartnerFailure, SettlementOrchestrator, SettlementRun};
pub use calculator::{commission_amount, tier_rate_pct};
pub use ledger::{ApprovalOutcome, CommissionLedger};
pub use postgres::PgSettlementStore;
pub use report::{CommissionReport, ReportBucket, generate_report};
pub use store::{
    CommissionFilter, NewCommission, Page, ReportRow, SettlementStore, StatusChange,
    StatusSummaryRow,
};
pub use threshold::{DEFAULT_MINIMUM_PAYOUT, minimum_payout, should_payout};
