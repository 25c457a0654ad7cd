use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use uuid::Uuid;

use referlane_core::{
    AuditLogEntry, Commission, CommissionStatus, PartnerSnapshot, PartnerTier,
    ReferralConversion, SettlementError, SettlementPeriod,
};
use referlane_platform::{
    NotificationSender, PaymentProcessedNotice, PendingPayoutNotice,
};
use referlane_settlement::{
    CommissionFilter, NewCommission, Page, ReportRow, SettlementStore, StatusChange,
    StatusSummaryRow,
};

#[derive(Default)]
struct Inner {
    conversions: Vec<ReferralConversion>,
    partner_tiers: HashMap<Uuid, PartnerTier>,
    commissions: Vec<Commission>,
    audit: Vec<AuditLogEntry>,
    minimum: Option<Decimal>,
    fail_audit_writes: bool,
    fail_creation_for: Option<Uuid>,
}

/// In-memory stand-in for the Postgres store, honoring the same contracts:
/// period-bounded referral queries, the duplicate-period guard, and
/// predicate-checked status transitions.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_minimum(&self, minimum: Decimal) {
        self.inner.lock().unwrap().minimum = Some(minimum);
    }

    pub fn seed_partner(&self, partner_id: Uuid, tier: PartnerTier) {
        self.inner
            .lock()
            .unwrap()
            .partner_tiers
            .insert(partner_id, tier);
    }

    pub fn seed_conversion(&self, conversion: ReferralConversion) {
        self.inner.lock().unwrap().conversions.push(conversion);
    }

    pub fn commissions(&self) -> Vec<Commission> {
        self.inner.lock().unwrap().commissions.clone()
    }

    pub fn audit_entries(&self) -> Vec<AuditLogEntry> {
        self.inner.lock().unwrap().audit.clone()
    }

    /// Makes every audit insert error, as when the audit table is down.
    pub fn fail_audit_writes(&self) {
        self.inner.lock().unwrap().fail_audit_writes = true;
    }

    /// Makes commission creation error for one partner only.
    pub fn fail_creation_for(&self, partner_id: Uuid) {
        self.inner.lock().unwrap().fail_creation_for = Some(partner_id);
    }
}

fn matches_filter(commission: &Commission, filter: &CommissionFilter) -> bool {
    filter.status.is_none_or(|status| commission.status == status)
        && filter
            .partner_id
            .is_none_or(|partner_id| commission.partner_id == partner_id)
        && filter
            .reference_year
            .is_none_or(|year| commission.reference_year == year)
        && filter
            .reference_month
            .is_none_or(|month| commission.reference_month == month)
}

#[async_trait]
impl SettlementStore for InMemoryStore {
    async fn find_converted_referrals(
        &self,
        period: &SettlementPeriod,
    ) -> Result<Vec<ReferralConversion>, SettlementError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .conversions
            .iter()
            .filter(|conversion| period.contains(conversion.converted_at))
            .cloned()
            .collect())
    }

    async fn minimum_payout(&self) -> Result<Option<Decimal>, SettlementError> {
        Ok(self.inner.lock().unwrap().minimum)
    }

    async fn insert_commission(
        &self,
        new: NewCommission,
    ) -> Result<Commission, SettlementError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_creation_for == Some(new.partner_id) {
            return Err(SettlementError::Storage(anyhow!(
                "connection reset during insert"
            )));
        }
        let duplicate = inner.commissions.iter().any(|commission| {
            commission.partner_id == new.partner_id
                && commission.reference_year == new.reference_year
                && commission.reference_month == new.reference_month
        });
        if duplicate {
            return Err(SettlementError::DuplicatePeriod {
                partner_id: new.partner_id,
                year: new.reference_year,
                month: new.reference_month,
            });
        }

        let commission = Commission {
            id: Uuid::new_v4(),
            partner_id: new.partner_id,
            reference_year: new.reference_year,
            reference_month: new.reference_month,
            amount: new.amount,
            status: CommissionStatus::Pending,
            conversion_count: new.conversion_count,
            referral_ids: new.referral_ids,
            calculated_at: new.calculated_at,
            approved_by: None,
            approved_at: None,
            paid_by: None,
            payment_method: None,
            payment_reference: None,
            net_amount: None,
            paid_at: None,
            created_at: Utc::now(),
        };
        inner.commissions.push(commission.clone());
        Ok(commission)
    }

    async fn fetch_commission(&self, id: Uuid) -> Result<Option<Commission>, SettlementError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .commissions
            .iter()
            .find(|commission| commission.id == id)
            .cloned())
    }

    async fn transition_status(
        &self,
        id: Uuid,
        expected: CommissionStatus,
        change: StatusChange,
    ) -> Result<Option<Commission>, SettlementError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(commission) = inner
            .commissions
            .iter_mut()
            .find(|commission| commission.id == id && commission.status == expected)
        else {
            return Ok(None);
        };

        match change {
            StatusChange::Approve {
                approved_by,
                approved_at,
            } => {
                commission.status = CommissionStatus::Approved;
                commission.approved_by = Some(approved_by);
                commission.approved_at = Some(approved_at);
            }
            StatusChange::Pay {
                paid_by,
                payment_method,
                payment_reference,
                net_amount,
                paid_at,
            } => {
                commission.status = CommissionStatus::Paid;
                commission.paid_by = Some(paid_by);
                commission.payment_method = Some(payment_method);
                commission.payment_reference = Some(payment_reference);
                commission.net_amount = net_amount;
                commission.paid_at = Some(paid_at);
            }
        }

        Ok(Some(commission.clone()))
    }

    async fn list_commissions(
        &self,
        filter: &CommissionFilter,
        page: Page,
    ) -> Result<Vec<Commission>, SettlementError> {
        let inner = self.inner.lock().unwrap();
        let mut matched: Vec<Commission> = inner
            .commissions
            .iter()
            .filter(|commission| matches_filter(commission, filter))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matched
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .collect())
    }

    async fn count_commissions(
        &self,
        filter: &CommissionFilter,
    ) -> Result<i64, SettlementError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .commissions
            .iter()
            .filter(|commission| matches_filter(commission, filter))
            .count() as i64)
    }

    async fn status_summary(&self) -> Result<Vec<StatusSummaryRow>, SettlementError> {
        let inner = self.inner.lock().unwrap();
        let mut buckets: HashMap<CommissionStatus, (i64, Decimal)> = HashMap::new();
        for commission in &inner.commissions {
            let bucket = buckets
                .entry(commission.status)
                .or_insert((0, Decimal::ZERO));
            bucket.0 += 1;
            bucket.1 += commission.amount;
        }
        Ok(buckets
            .into_iter()
            .map(|(status, (count, amount))| StatusSummaryRow {
                status,
                count,
                amount,
            })
            .collect())
    }

    async fn report_rows(
        &self,
        year: i32,
        month: Option<u32>,
    ) -> Result<Vec<ReportRow>, SettlementError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .commissions
            .iter()
            .filter(|commission| {
                commission.reference_year == year
                    && month.is_none_or(|month| commission.reference_month == month)
            })
            .map(|commission| ReportRow {
                partner_id: commission.partner_id,
                status: commission.status,
                tier: inner.partner_tiers.get(&commission.partner_id).copied(),
                amount: commission.amount,
            })
            .collect())
    }

    async fn insert_audit_entry(&self, entry: AuditLogEntry) -> Result<(), SettlementError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_audit_writes {
            return Err(SettlementError::Storage(anyhow!("audit store unavailable")));
        }
        inner.audit.push(entry);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum NoticeEvent {
    Pending(PendingPayoutNotice),
    Paid(PaymentProcessedNotice),
}

/// Captures dispatched notices and forwards them on a channel so tests can
/// await delivery from the fire-and-forget task.
pub struct RecordingNotifier {
    tx: UnboundedSender<NoticeEvent>,
}

impl RecordingNotifier {
    pub fn new() -> (Arc<Self>, UnboundedReceiver<NoticeEvent>) {
        let (tx, rx) = unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl NotificationSender for RecordingNotifier {
    async fn notify_pending_payout(&self, notice: &PendingPayoutNotice) -> anyhow::Result<()> {
        let _ = self.tx.send(NoticeEvent::Pending(notice.clone()));
        Ok(())
    }

    async fn notify_payment_processed(
        &self,
        notice: &PaymentProcessedNotice,
    ) -> anyhow::Result<()> {
        let _ = self.tx.send(NoticeEvent::Paid(notice.clone()));
        Ok(())
    }
}

/// Always errors; the pipeline must log and move on.
pub struct FailingNotifier;

#[async_trait]
impl NotificationSender for FailingNotifier {
    async fn notify_pending_payout(&self, _notice: &PendingPayoutNotice) -> anyhow::Result<()> {
        Err(anyhow!("notification channel down"))
    }

    async fn notify_payment_processed(
        &self,
        _notice: &PaymentProcessedNotice,
    ) -> anyhow::Result<()> {
        Err(anyhow!("notification channel down"))
    }
}

pub fn converted_referral(
    partner_id: Uuid,
    plan_value: Decimal,
    tier: PartnerTier,
    custom_rate_pct: Option<Decimal>,
    year: i32,
    month: u32,
    day: u32,
) -> ReferralConversion {
    ReferralConversion {
        referral_id: Uuid::new_v4(),
        partner_id,
        converted_at: Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap(),
        plan_value: Some(plan_value),
        partner: Some(PartnerSnapshot {
            tier,
            custom_rate_pct,
            active: true,
        }),
    }
}
