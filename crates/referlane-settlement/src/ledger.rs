use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{error, warn};
use uuid::Uuid;

use referlane_core::{
    AuditLogEntry, Commission, CommissionStatus, SettlementError, SettlementPeriod,
};
use referlane_platform::{NotificationSender, PaymentProcessedNotice};

use crate::store::{CommissionFilter, NewCommission, Page, SettlementStore, StatusChange};

/// Per-item result of a bulk approval. Failures carry the error text so the
/// caller can report partial success without aborting the batch.
#[derive(Debug)]
pub struct ApprovalOutcome {
    pub commission_id: Uuid,
    pub result: Result<Commission, SettlementError>,
}

/// Owns the commission lifecycle. Every state change writes one audit entry;
/// an audit write failure is logged loudly but never rolls back the
/// already-committed transition.
pub struct CommissionLedger<S> {
    store: Arc<S>,
    notifier: Arc<dyn NotificationSender>,
}

impl<S> Clone for CommissionLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            notifier: self.notifier.clone(),
        }
    }
}

impl<S: SettlementStore + 'static> CommissionLedger<S> {
    pub fn new(store: Arc<S>, notifier: Arc<dyn NotificationSender>) -> Self {
        Self { store, notifier }
    }

    /// Creates a pending commission for one partner and period. The store
    /// enforces `(partner, year, month)` uniqueness, so re-running a batch
    /// surfaces `DuplicatePeriod` here instead of double-paying.
    pub async fn create(
        &self,
        partner_id: Uuid,
        period: SettlementPeriod,
        amount: Decimal,
        referral_ids: Vec<Uuid>,
    ) -> Result<Commission, SettlementError> {
        let new = NewCommission {
            partner_id,
            reference_year: period.year(),
            reference_month: period.month(),
            amount,
            conversion_count: referral_ids.len() as i64,
            referral_ids,
            calculated_at: Utc::now(),
        };
        self.store.insert_commission(new).await
    }

    pub async fn approve(
        &self,
        commission_id: Uuid,
        approver_id: &str,
    ) -> Result<Commission, SettlementError> {
        let current = self
            .store
            .fetch_commission(commission_id)
            .await?
            .ok_or(SettlementError::NotFound)?;
        if current.status != CommissionStatus::Pending {
            return Err(SettlementError::InvalidStateTransition {
                from: current.status,
                to: CommissionStatus::Approved,
            });
        }

        let change = StatusChange::Approve {
            approved_by: approver_id.to_string(),
            approved_at: Utc::now(),
        };
        let approved = self
            .store
            .transition_status(commission_id, CommissionStatus::Pending, change)
            .await?
            // Predicate miss after the fetch means another operator won the race.
            .ok_or(SettlementError::InvalidStateTransition {
                from: current.status,
                to: CommissionStatus::Approved,
            })?;

        self.record_audit(
            AuditLogEntry {
                commission_id: Some(approved.id),
                partner_id: Some(approved.partner_id),
                amount: Some(approved.amount),
                metadata: json!({
                    "commission_id": approved.id,
                    "partner_id": approved.partner_id,
                    "amount": approved.amount,
                    "reference_year": approved.reference_year,
                    "reference_month": approved.reference_month,
                }),
                ..AuditLogEntry::financial(
                    "approve_commission",
                    approver_id,
                    format!(
                        "approved commission {} for partner {} ({})",
                        approved.id, approved.partner_id, approved.amount
                    ),
                )
            },
        )
        .await;

        Ok(approved)
    }

    /// Applies `approve` independently per id. One failure never aborts the
    /// rest; the summary audit entry records both counts.
    pub async fn bulk_approve(
        &self,
        commission_ids: &[Uuid],
        approver_id: &str,
    ) -> Vec<ApprovalOutcome> {
        let mut outcomes = Vec::with_capacity(commission_ids.len());
        for &commission_id in commission_ids {
            let result = self.approve(commission_id, approver_id).await;
            if let Err(err) = &result {
                warn!(%commission_id, %err, "bulk approval item failed");
            }
            outcomes.push(ApprovalOutcome {
                commission_id,
                result,
            });
        }

        let approved: Vec<Uuid> = outcomes
            .iter()
            .filter(|outcome| outcome.result.is_ok())
            .map(|outcome| outcome.commission_id)
            .collect();
        let failed = outcomes.len() - approved.len();

        self.record_audit(
            AuditLogEntry {
                metadata: json!({
                    "requested_ids": commission_ids,
                    "approved_ids": &approved,
                    "approved_count": approved.len(),
                    "failed_count": failed,
                }),
                ..AuditLogEntry::financial(
                    "bulk_approve_commissions",
                    approver_id,
                    format!(
                        "bulk approval: {} approved, {} failed of {}",
                        approved.len(),
                        failed,
                        commission_ids.len()
                    ),
                )
            },
        )
        .await;

        outcomes
    }

    /// Marks an approved commission paid. The store applies the transition
    /// behind a `status = approved` predicate, so concurrent payment attempts
    /// resolve to exactly one success. The partner notification is dispatched
    /// fire-and-forget after the transition commits.
    pub async fn mark_paid(
        &self,
        commission_id: Uuid,
        payment_method: &str,
        payment_reference: &str,
        net_amount: Option<Decimal>,
        payer_id: &str,
    ) -> Result<Commission, SettlementError> {
        if payment_method.trim().is_empty() {
            return Err(SettlementError::MissingField("payment_method"));
        }
        if payment_reference.trim().is_empty() {
            return Err(SettlementError::MissingField("payment_reference"));
        }

        let current = self
            .store
            .fetch_commission(commission_id)
            .await?
            .ok_or(SettlementError::NotFound)?;
        if current.status != CommissionStatus::Approved {
            return Err(SettlementError::InvalidStateTransition {
                from: current.status,
                to: CommissionStatus::Paid,
            });
        }

        let paid_at = Utc::now();
        let change = StatusChange::Pay {
            paid_by: payer_id.to_string(),
            payment_method: payment_method.trim().to_string(),
            payment_reference: payment_reference.trim().to_string(),
            net_amount,
            paid_at,
        };
        let paid = self
            .store
            .transition_status(commission_id, CommissionStatus::Approved, change)
            .await?
            .ok_or(SettlementError::InvalidStateTransition {
                from: current.status,
                to: CommissionStatus::Paid,
            })?;

        self.record_audit(
            AuditLogEntry {
                commission_id: Some(paid.id),
                partner_id: Some(paid.partner_id),
                amount: Some(paid.amount),
                metadata: json!({
                    "commission_id": paid.id,
                    "partner_id": paid.partner_id,
                    "amount": paid.amount,
                    "net_amount": paid.net_amount,
                    "payment_method": &paid.payment_method,
                    "payment_reference": &paid.payment_reference,
                    "paid_at": paid.paid_at,
                }),
                ..AuditLogEntry::financial(
                    "pay_commission",
                    payer_id,
                    format!(
                        "paid commission {} for partner {} ({}) via {}",
                        paid.id, paid.partner_id, paid.amount, payment_method
                    ),
                )
            },
        )
        .await;

        let notice = PaymentProcessedNotice {
            partner_id: paid.partner_id,
            commission_id: paid.id,
            amount: paid.amount,
            net_amount: paid.net_amount,
            payment_method: payment_method.trim().to_string(),
            payment_reference: payment_reference.trim().to_string(),
            paid_at,
        };
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            if let Err(err) = notifier.notify_payment_processed(&notice).await {
                warn!(
                    commission_id = %notice.commission_id,
                    partner_id = %notice.partner_id,
                    %err,
                    "payment notification failed"
                );
            }
        });

        Ok(paid)
    }

    pub async fn list_pending(&self, page: Page) -> Result<Vec<Commission>, SettlementError> {
        let filter = CommissionFilter {
            status: Some(CommissionStatus::Pending),
            ..CommissionFilter::default()
        };
        self.store.list_commissions(&filter, page).await
    }

    pub async fn list_by_filter(
        &self,
        filter: &CommissionFilter,
        page: Page,
    ) -> Result<Vec<Commission>, SettlementError> {
        self.store.list_commissions(filter, page).await
    }

    pub(crate) async fn record_audit(&self, entry: AuditLogEntry) {
        // State wins over audit: the transition is already committed, so a
        // failed audit write only gets operational follow-up, not a rollback.
        if let Err(err) = self.store.insert_audit_entry(entry).await {
            error!(%err, "audit log write failed after committed state change");
        }
    }
}
