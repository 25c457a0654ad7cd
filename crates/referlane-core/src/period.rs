use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A calendar month over which conversions settle. Bounds are half-open
/// `[start, end_exclusive)` so adjacent periods never share a referral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementPeriod {
    year: i32,
    month: u32,
}

impl SettlementPeriod {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1)?;
        Some(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn start(&self) -> DateTime<Utc> {
        let date = NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .unwrap_or_else(|| unreachable!("validated in new"));
        Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
    }

    pub fn end_exclusive(&self) -> DateTime<Utc> {
        self.next().start()
    }

    pub fn next(&self) -> SettlementPeriod {
        if self.month == 12 {
            SettlementPeriod {
                year: self.year + 1,
                month: 1,
            }
        } else {
            SettlementPeriod {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Payouts are scheduled for the 15th of the month after the period
    /// closes; the batch run advertises this date in the pending notice.
    pub fn estimated_payment_date(&self) -> NaiveDate {
        let next = self.next();
        NaiveDate::from_ymd_opt(next.year, next.month, 15)
            .unwrap_or_else(|| unreachable!("day 15 exists in every month"))
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start() && at < self.end_exclusive()
    }
}

impl std::fmt::Display for SettlementPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}
