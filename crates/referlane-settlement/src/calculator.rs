use rust_decimal::{Decimal, RoundingStrategy};

use referlane_core::PartnerTier;

/// Default commission percentages per tier.
pub fn tier_rate_pct(tier: PartnerTier) -> Decimal {
    match tier {
        PartnerTier::Bronze => Decimal::new(10, 0),
        PartnerTier::Silver => Decimal::new(15, 0),
        PartnerTier::Gold => Decimal::new(20, 0),
    }
}

/// Commission for one converted referral. A custom rate always wins over the
/// tier rate, including an explicit zero. Rounds half-up to the currency's
/// minor unit.
pub fn commission_amount(
    plan_value: Decimal,
    tier: PartnerTier,
    custom_rate_pct: Option<Decimal>,
) -> Decimal {
    let rate = custom_rate_pct.unwrap_or_else(|| tier_rate_pct(tier));
    (plan_value * rate / Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
