use std::collections::BTreeMap;

use tracing::warn;
use uuid::Uuid;

use referlane_core::{PartnerAggregate, ReferralConversion, SettlementError, SettlementPeriod};

use crate::calculator::commission_amount;
use crate::store::SettlementStore;

/// Groups a period's converted referrals by partner, pricing each referral
/// through the calculator. Rows with a broken partner or subscription join
/// are skipped with a warning; a failed lookup excludes that referral from
/// this period's payout permanently, which is deliberate policy.
pub async fn aggregate_period<S: SettlementStore>(
    store: &S,
    period: &SettlementPeriod,
) -> Result<BTreeMap<Uuid, PartnerAggregate>, SettlementError> {
    let conversions = store.find_converted_referrals(period).await?;
    Ok(build_aggregates(conversions))
}

pub fn build_aggregates(
    conversions: Vec<ReferralConversion>,
) -> BTreeMap<Uuid, PartnerAggregate> {
    let mut aggregates: BTreeMap<Uuid, PartnerAggregate> = BTreeMap::new();

    for conversion in conversions {
        let Some(partner) = conversion.partner else {
            warn!(
                referral_id = %conversion.referral_id,
                partner_id = %conversion.partner_id,
                "skipping referral with missing partner"
            );
            continue;
        };
        let Some(plan_value) = conversion.plan_value else {
            warn!(
                referral_id = %conversion.referral_id,
                partner_id = %conversion.partner_id,
                "skipping referral with missing subscription"
            );
            continue;
        };
        if !partner.active {
            warn!(
                referral_id = %conversion.referral_id,
                partner_id = %conversion.partner_id,
                "skipping referral for inactive partner"
            );
            continue;
        }

        let amount = commission_amount(plan_value, partner.tier, partner.custom_rate_pct);
        aggregates
            .entry(conversion.partner_id)
            .or_insert_with(|| PartnerAggregate::new(conversion.partner_id))
            .push(conversion.referral_id, amount);
    }

    aggregates
}
