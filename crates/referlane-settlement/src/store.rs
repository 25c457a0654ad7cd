use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use referlane_core::{
    AuditLogEntry, Commission, CommissionStatus, PartnerTier, ReferralConversion,
    SettlementError, SettlementPeriod,
};

#[derive(Debug, Clone)]
pub struct NewCommission {
    pub partner_id: Uuid,
    pub reference_year: i32,
    pub reference_month: u32,
    pub amount: Decimal,
    pub conversion_count: i64,
    pub referral_ids: Vec<Uuid>,
    pub calculated_at: DateTime<Utc>,
}

/// Field sets applied alongside a status transition. The store must apply
/// these only when the row still holds the expected prior status.
#[derive(Debug, Clone)]
pub enum StatusChange {
    Approve {
        approved_by: String,
        approved_at: DateTime<Utc>,
    },
    Pay {
        paid_by: String,
        payment_method: String,
        payment_reference: String,
        net_amount: Option<Decimal>,
        paid_at: DateTime<Utc>,
    },
}

impl StatusChange {
    pub fn target_status(&self) -> CommissionStatus {
        match self {
            StatusChange::Approve { .. } => CommissionStatus::Approved,
            StatusChange::Pay { .. } => CommissionStatus::Paid,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CommissionFilter {
    pub status: Option<CommissionStatus>,
    pub partner_id: Option<Uuid>,
    pub reference_year: Option<i32>,
    pub reference_month: Option<u32>,
}

#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatusSummaryRow {
    pub status: CommissionStatus,
    pub count: i64,
    pub amount: Decimal,
}

/// One commission row joined with its partner's tier, as the report
/// generator consumes it. Tier is absent when the partner row is gone.
#[derive(Debug, Clone)]
pub struct ReportRow {
    pub partner_id: Uuid,
    pub status: CommissionStatus,
    pub tier: Option<PartnerTier>,
    pub amount: Decimal,
}

/// Narrow persistence seam for the settlement pipeline. The production
/// implementation is Postgres; tests drive the pipeline through an
/// in-memory fake.
#[async_trait]
pub trait SettlementStore: Send + Sync {
    /// Converted referrals inside the period's half-open bounds, with
    /// partner and subscription legs joined where they exist.
    async fn find_converted_referrals(
        &self,
        period: &SettlementPeriod,
    ) -> Result<Vec<ReferralConversion>, SettlementError>;

    /// `payment_schedules.minimum_amount`, when configured.
    async fn minimum_payout(&self) -> Result<Option<Decimal>, SettlementError>;

    /// Inserts a pending commission. Must fail with `DuplicatePeriod` when a
    /// row already exists for the same partner and reference period.
    async fn insert_commission(
        &self,
        new: NewCommission,
    ) -> Result<Commission, SettlementError>;

    async fn fetch_commission(&self, id: Uuid) -> Result<Option<Commission>, SettlementError>;

    /// Applies `change` only where the row currently holds `expected`.
    /// Returns `None` when the predicate did not match, so two concurrent
    /// payment attempts resolve to one success.
    async fn transition_status(
        &self,
        id: Uuid,
        expected: CommissionStatus,
        change: StatusChange,
    ) -> Result<Option<Commission>, SettlementError>;

    /// Filtered listing, newest first by creation time.
    async fn list_commissions(
        &self,
        filter: &CommissionFilter,
        page: Page,
    ) -> Result<Vec<Commission>, SettlementError>;

    async fn count_commissions(&self, filter: &CommissionFilter)
    -> Result<i64, SettlementError>;

    /// Per-status count/amount totals across the whole ledger.
    async fn status_summary(&self) -> Result<Vec<StatusSummaryRow>, SettlementError>;

    /// Commission rows for a reference year (and month, when given), with
    /// partner tier joined.
    async fn report_rows(
        &self,
        year: i32,
        month: Option<u32>,
    ) -> Result<Vec<ReportRow>, SettlementError>;

    async fn insert_audit_entry(&self, entry: AuditLogEntry) -> Result<(), SettlementError>;
}
