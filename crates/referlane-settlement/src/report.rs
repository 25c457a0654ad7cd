use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use referlane_core::SettlementError;

use crate::store::{ReportRow, SettlementStore};

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReportBucket {
    pub count: i64,
    pub amount: Decimal,
}

impl ReportBucket {
    fn add(&mut self, amount: Decimal) {
        self.count += 1;
        self.amount += amount;
    }
}

#[derive(Debug, Serialize)]
pub struct CommissionReport {
    pub reference_year: i32,
    pub reference_month: Option<u32>,
    pub total_count: i64,
    pub total_amount: Decimal,
    pub by_status: BTreeMap<String, ReportBucket>,
    pub by_tier: BTreeMap<String, ReportBucket>,
    pub distinct_partners: i64,
    pub generated_at: DateTime<Utc>,
}

/// Status and tier breakdowns over committed commission records. All sums
/// stay in Decimal so per-status amounts reconcile exactly with the total.
pub async fn generate_report<S: SettlementStore>(
    store: &S,
    year: i32,
    month: Option<u32>,
) -> Result<CommissionReport, SettlementError> {
    let rows = store.report_rows(year, month).await?;
    Ok(fold_report(year, month, rows))
}

fn fold_report(year: i32, month: Option<u32>, rows: Vec<ReportRow>) -> CommissionReport {
    let mut by_status: BTreeMap<String, ReportBucket> = BTreeMap::new();
    let mut by_tier: BTreeMap<String, ReportBucket> = BTreeMap::new();
    let mut partners = BTreeSet::new();
    let mut total_amount = Decimal::ZERO;
    let total_count = rows.len() as i64;

    for row in &rows {
        total_amount += row.amount;
        partners.insert(row.partner_id);
        by_status
            .entry(row.status.as_str().to_string())
            .or_default()
            .add(row.amount);
        let tier_key = row
            .tier
            .map(|tier| tier.as_str().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        by_tier.entry(tier_key).or_default().add(row.amount);
    }

    CommissionReport {
        reference_year: year,
        reference_month: month,
        total_count,
        total_amount,
        by_status,
        by_tier,
        distinct_partners: partners.len() as i64,
        generated_at: Utc::now(),
    }
}
