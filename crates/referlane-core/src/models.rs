use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartnerTier {
    Bronze,
    Silver,
    Gold,
}

impl PartnerTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartnerTier::Bronze => "bronze",
            PartnerTier::Silver => "silver",
            PartnerTier::Gold => "gold",
        }
    }

    /// Unknown tier labels resolve to bronze. That is commission policy:
    /// a partner with an unrecognized tier earns the base rate, not an error.
    pub fn parse_or_default(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "silver" => PartnerTier::Silver,
            "gold" => PartnerTier::Gold,
            _ => PartnerTier::Bronze,
        }
    }
}

impl std::fmt::Display for PartnerTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommissionStatus {
    Pending,
    Approved,
    Paid,
}

impl CommissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionStatus::Pending => "pending",
            CommissionStatus::Approved => "approved",
            CommissionStatus::Paid => "paid",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(CommissionStatus::Pending),
            "approved" => Some(CommissionStatus::Approved),
            "paid" => Some(CommissionStatus::Paid),
            _ => None,
        }
    }
}

impl std::fmt::Display for CommissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferralStatus {
    Pending,
    Converted,
    Expired,
}

impl ReferralStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferralStatus::Pending => "pending",
            ReferralStatus::Converted => "converted",
            ReferralStatus::Expired => "expired",
        }
    }
}

/// Partner record as this subsystem sees it. Owned by the tenant account and
/// read-only during a settlement run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Partner {
    pub id: Uuid,
    pub tier: PartnerTier,
    pub custom_rate_pct: Option<Decimal>,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Referral {
    pub id: Uuid,
    pub partner_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub status: ReferralStatus,
    pub converted_at: Option<DateTime<Utc>>,
}

/// One converted referral joined with its partner and subscription, as the
/// aggregation query returns it. Either join leg may be missing when the
/// linked row was deleted upstream; the aggregator skips those with a warning.
#[derive(Debug, Clone)]
pub struct ReferralConversion {
    pub referral_id: Uuid,
    pub partner_id: Uuid,
    pub converted_at: DateTime<Utc>,
    pub plan_value: Option<Decimal>,
    pub partner: Option<PartnerSnapshot>,
}

#[derive(Debug, Clone)]
pub struct PartnerSnapshot {
    pub tier: PartnerTier,
    pub custom_rate_pct: Option<Decimal>,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommissionEntry {
    pub referral_id: Uuid,
    pub amount: Decimal,
}

/// Per-partner accumulation for one settlement period. Lives only inside a
/// batch run; the ledger record it feeds is `Commission`.
#[derive(Debug, Clone)]
pub struct PartnerAggregate {
    pub partner_id: Uuid,
    pub entries: Vec<CommissionEntry>,
    pub total: Decimal,
}

impl PartnerAggregate {
    pub fn new(partner_id: Uuid) -> Self {
        Self {
            partner_id,
            entries: Vec::new(),
            total: Decimal::ZERO,
        }
    }

    pub fn push(&mut self, referral_id: Uuid, amount: Decimal) {
        self.entries.push(CommissionEntry {
            referral_id,
            amount,
        });
        self.total += amount;
    }

    pub fn conversion_count(&self) -> i64 {
        self.entries.len() as i64
    }

    pub fn referral_ids(&self) -> Vec<Uuid> {
        self.entries.iter().map(|entry| entry.referral_id).collect()
    }
}

/// The ledger record. Created pending by the batch run, then moved through
/// approve and pay by operator actions. Never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commission {
    pub id: Uuid,
    pub partner_id: Uuid,
    pub reference_year: i32,
    pub reference_month: u32,
    pub amount: Decimal,
    pub status: CommissionStatus,
    pub conversion_count: i64,
    pub referral_ids: Vec<Uuid>,
    pub calculated_at: DateTime<Utc>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub paid_by: Option<String>,
    pub payment_method: Option<String>,
    pub payment_reference: Option<String>,
    pub net_amount: Option<Decimal>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub category: String,
    pub action: String,
    pub actor_id: String,
    pub description: String,
    pub commission_id: Option<Uuid>,
    pub partner_id: Option<Uuid>,
    pub amount: Option<Decimal>,
    pub metadata: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn financial(action: &str, actor_id: &str, description: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            category: "financial".to_string(),
            action: action.to_string(),
            actor_id: actor_id.to_string(),
            description,
            commission_id: None,
            partner_id: None,
            amount: None,
            metadata: serde_json::Value::Null,
            recorded_at: Utc::now(),
        }
    }
}
