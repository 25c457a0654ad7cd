use rust_decimal::Decimal;

use referlane_core::SettlementError;

use crate::store::SettlementStore;

/// Applied when no `payment_schedules` row configures a minimum, in the
/// tenant's base currency unit.
pub const DEFAULT_MINIMUM_PAYOUT: Decimal = Decimal::ONE_HUNDRED;

/// A partner aggregate becomes a commission record only at or above the
/// minimum. Sub-threshold aggregates are dropped for the period, not
/// re-queued; the period filter is disjoint so their referrals never return.
pub fn should_payout(total: Decimal, minimum: Decimal) -> bool {
    total >= minimum
}

pub async fn minimum_payout<S: SettlementStore>(store: &S) -> Result<Decimal, SettlementError> {
    Ok(store
        .minimum_payout()
        .await?
        .unwrap_or(DEFAULT_MINIMUM_PAYOUT))
}
