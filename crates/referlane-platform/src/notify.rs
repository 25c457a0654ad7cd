use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::redis_bus::RedisBus;

pub const PARTNER_PAYOUT_CHANNEL: &str = "notifications.partner-payouts";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingPayoutNotice {
    pub partner_id: Uuid,
    pub commission_id: Uuid,
    pub amount: Decimal,
    pub reference_year: i32,
    pub reference_month: u32,
    pub estimated_payment_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentProcessedNotice {
    pub partner_id: Uuid,
    pub commission_id: Uuid,
    pub amount: Decimal,
    pub net_amount: Option<Decimal>,
    pub payment_method: String,
    pub payment_reference: String,
    pub paid_at: DateTime<Utc>,
}

/// Delivery seam for the out-of-scope notification service. Callers treat
/// every method as best-effort: failures are logged, never propagated into
/// the state transition that triggered them.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn notify_pending_payout(&self, notice: &PendingPayoutNotice) -> Result<()>;
    async fn notify_payment_processed(&self, notice: &PaymentProcessedNotice) -> Result<()>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum PayoutEnvelope<'a> {
    PendingPayout(&'a PendingPayoutNotice),
    PaymentProcessed(&'a PaymentProcessedNotice),
}

/// Publishes payout notices on the Redis bus; the notification service owns
/// the actual email/Slack delivery.
#[derive(Clone)]
pub struct RedisNotifier {
    bus: RedisBus,
}

impl RedisNotifier {
    pub fn new(bus: RedisBus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl NotificationSender for RedisNotifier {
    async fn notify_pending_payout(&self, notice: &PendingPayoutNotice) -> Result<()> {
        self.bus
            .publish_json(PARTNER_PAYOUT_CHANNEL, &PayoutEnvelope::PendingPayout(notice))
            .await
    }

    async fn notify_payment_processed(&self, notice: &PaymentProcessedNotice) -> Result<()> {
        self.bus
            .publish_json(
                PARTNER_PAYOUT_CHANNEL,
                &PayoutEnvelope::PaymentProcessed(notice),
            )
            .await
    }
}
