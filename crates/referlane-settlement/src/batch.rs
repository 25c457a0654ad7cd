use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use referlane_core::{Commission, SettlementError, SettlementPeriod};
use referlane_platform::{NotificationSender, PendingPayoutNotice};

use crate::aggregate::aggregate_period;
use crate::ledger::CommissionLedger;
use crate::store::SettlementStore;
use crate::threshold::{minimum_payout, should_payout};

#[derive(Debug, Clone, Serialize)]
pub struct PartnerFailure {
    pub partner_id: Uuid,
    pub reason: String,
}

/// Outcome of one monthly run. Duplicate skips are expected on re-runs;
/// failures are partners whose creation errored for any other reason.
#[derive(Debug, Default, Serialize)]
pub struct SettlementRun {
    pub created: Vec<Commission>,
    pub duplicate_partner_ids: Vec<Uuid>,
    pub below_threshold: usize,
    pub failures: Vec<PartnerFailure>,
}

/// Drives one monthly settlement: aggregate, threshold-filter, create ledger
/// records, notify. Partners are processed sequentially so one partner's
/// failure stays isolated to that partner.
pub struct SettlementOrchestrator<S> {
    store: Arc<S>,
    ledger: CommissionLedger<S>,
    notifier: Arc<dyn NotificationSender>,
}

impl<S: SettlementStore + 'static> SettlementOrchestrator<S> {
    pub fn new(
        store: Arc<S>,
        ledger: CommissionLedger<S>,
        notifier: Arc<dyn NotificationSender>,
    ) -> Self {
        Self {
            store,
            ledger,
            notifier,
        }
    }

    pub async fn run_monthly(
        &self,
        period: SettlementPeriod,
    ) -> Result<SettlementRun, SettlementError> {
        let minimum = minimum_payout(self.store.as_ref()).await?;
        let aggregates = aggregate_period(self.store.as_ref(), &period).await?;
        info!(
            %period,
            partners = aggregates.len(),
            %minimum,
            "starting monthly settlement run"
        );

        let mut run = SettlementRun::default();
        for (partner_id, aggregate) in aggregates {
            if !should_payout(aggregate.total, minimum) {
                run.below_threshold += 1;
                continue;
            }

            let created = self
                .ledger
                .create(partner_id, period, aggregate.total, aggregate.referral_ids())
                .await;
            let commission = match created {
                Ok(commission) => commission,
                Err(err) if err.is_duplicate_period() => {
                    warn!(%partner_id, %period, "partner already settled for period, skipping");
                    run.duplicate_partner_ids.push(partner_id);
                    continue;
                }
                Err(err) => {
                    warn!(%partner_id, %period, %err, "commission creation failed, continuing");
                    run.failures.push(PartnerFailure {
                        partner_id,
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            let notice = PendingPayoutNotice {
                partner_id,
                commission_id: commission.id,
                amount: commission.amount,
                reference_year: period.year(),
                reference_month: period.month(),
                estimated_payment_date: period.estimated_payment_date(),
            };
            if let Err(err) = self.notifier.notify_pending_payout(&notice).await {
                warn!(%partner_id, %err, "pending payout notification failed");
            }

            run.created.push(commission);
        }

        info!(
            %period,
            created = run.created.len(),
            duplicates = run.duplicate_partner_ids.len(),
            below_threshold = run.below_threshold,
            failures = run.failures.len(),
            "monthly settlement run finished"
        );
        Ok(run)
    }
}
