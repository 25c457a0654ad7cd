use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use referlane_core::{
    AuditLogEntry, Commission, CommissionStatus, PartnerSnapshot, PartnerTier,
    ReferralConversion, ReferralStatus, SettlementError, SettlementPeriod,
};

use crate::store::{
    CommissionFilter, NewCommission, Page, ReportRow, SettlementStore, StatusChange,
    StatusSummaryRow,
};

const COMMISSION_COLUMNS: &str = r#"
    id,
    partner_id,
    reference_year,
    reference_month,
    amount,
    status,
    conversion_count,
    referral_ids,
    calculated_at,
    approved_by,
    approved_at,
    paid_by,
    payment_method,
    payment_reference,
    net_amount,
    paid_at,
    created_at
"#;

#[derive(Clone)]
pub struct PgSettlementStore {
    pool: PgPool,
}

impl PgSettlementStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn storage(err: sqlx::Error) -> SettlementError {
    SettlementError::Storage(err.into())
}

fn commission_from_row(row: &PgRow) -> Result<Commission, SettlementError> {
    let status_text: String = row.try_get("status").map_err(storage)?;
    let status = CommissionStatus::parse(&status_text)
        .ok_or_else(|| SettlementError::Storage(anyhow!("unknown commission status {status_text}")))?;
    let reference_month: i32 = row.try_get("reference_month").map_err(storage)?;

    Ok(Commission {
        id: row.try_get("id").map_err(storage)?,
        partner_id: row.try_get("partner_id").map_err(storage)?,
        reference_year: row.try_get("reference_year").map_err(storage)?,
        reference_month: reference_month as u32,
        amount: row.try_get("amount").map_err(storage)?,
        status,
        conversion_count: row.try_get("conversion_count").map_err(storage)?,
        referral_ids: row.try_get("referral_ids").map_err(storage)?,
        calculated_at: row.try_get("calculated_at").map_err(storage)?,
        approved_by: row.try_get("approved_by").map_err(storage)?,
        approved_at: row.try_get("approved_at").map_err(storage)?,
        paid_by: row.try_get("paid_by").map_err(storage)?,
        payment_method: row.try_get("payment_method").map_err(storage)?,
        payment_reference: row.try_get("payment_reference").map_err(storage)?,
        net_amount: row.try_get("net_amount").map_err(storage)?,
        paid_at: row.try_get("paid_at").map_err(storage)?,
        created_at: row.try_get("created_at").map_err(storage)?,
    })
}

#[async_trait]
impl SettlementStore for PgSettlementStore {
    async fn find_converted_referrals(
        &self,
        period: &SettlementPeriod,
    ) -> Result<Vec<ReferralConversion>, SettlementError> {
        let rows = sqlx::query(
            r#"
            SELECT
                r.id AS referral_id,
                r.partner_id,
                r.converted_at,
                s.plan_value,
                p.id AS partner_pk,
                p.tier,
                p.custom_rate_pct,
                p.active
            FROM referrals r
            LEFT JOIN subscriptions s ON s.id = r.subscription_id
            LEFT JOIN partners p ON p.id = r.partner_id
            WHERE r.status = $1
              AND r.converted_at >= $2
              AND r.converted_at < $3
            ORDER BY r.converted_at ASC
            "#,
        )
        .bind(ReferralStatus::Converted.as_str())
        .bind(period.start())
        .bind(period.end_exclusive())
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        let mut conversions = Vec::with_capacity(rows.len());
        for row in rows {
            let partner_pk: Option<Uuid> = row.try_get("partner_pk").map_err(storage)?;
            let partner = match partner_pk {
                Some(_) => {
                    let tier_text: String = row.try_get("tier").map_err(storage)?;
                    Some(PartnerSnapshot {
                        tier: PartnerTier::parse_or_default(&tier_text),
                        custom_rate_pct: row.try_get("custom_rate_pct").map_err(storage)?,
                        active: row.try_get("active").map_err(storage)?,
                    })
                }
                None => None,
            };
            conversions.push(ReferralConversion {
                referral_id: row.try_get("referral_id").map_err(storage)?,
                partner_id: row.try_get("partner_id").map_err(storage)?,
                converted_at: row.try_get("converted_at").map_err(storage)?,
                plan_value: row.try_get("plan_value").map_err(storage)?,
                partner,
            });
        }

        Ok(conversions)
    }

    async fn minimum_payout(&self) -> Result<Option<Decimal>, SettlementError> {
        sqlx::query_scalar::<_, Decimal>(
            r#"
            SELECT minimum_amount
            FROM payment_schedules
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)
    }

    async fn insert_commission(
        &self,
        new: NewCommission,
    ) -> Result<Commission, SettlementError> {
        let result = sqlx::query(&format!(
            r#"
            INSERT INTO commissions (
                id,
                partner_id,
                reference_year,
                reference_month,
                amount,
                status,
                conversion_count,
                referral_ids,
                calculated_at,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7, $8, $9)
            RETURNING {COMMISSION_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(new.partner_id)
        .bind(new.reference_year)
        .bind(new.reference_month as i32)
        .bind(new.amount)
        .bind(new.conversion_count)
        .bind(&new.referral_ids)
        .bind(new.calculated_at)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => commission_from_row(&row),
            // The unique index on (partner_id, reference_year, reference_month)
            // is what keeps batch re-runs idempotent under races.
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(SettlementError::DuplicatePeriod {
                    partner_id: new.partner_id,
                    year: new.reference_year,
                    month: new.reference_month,
                })
            }
            Err(err) => Err(storage(err)),
        }
    }

    async fn fetch_commission(&self, id: Uuid) -> Result<Option<Commission>, SettlementError> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {COMMISSION_COLUMNS}
            FROM commissions
            WHERE id = $1
            "#
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        row.as_ref().map(commission_from_row).transpose()
    }

    async fn transition_status(
        &self,
        id: Uuid,
        expected: CommissionStatus,
        change: StatusChange,
    ) -> Result<Option<Commission>, SettlementError> {
        let row = match change {
            StatusChange::Approve {
                approved_by,
                approved_at,
            } => {
                sqlx::query(&format!(
                    r#"
                    UPDATE commissions
                    SET status = 'approved',
                        approved_by = $3,
                        approved_at = $4
                    WHERE id = $1 AND status = $2
                    RETURNING {COMMISSION_COLUMNS}
                    "#
                ))
                .bind(id)
                .bind(expected.as_str())
                .bind(approved_by)
                .bind(approved_at)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage)?
            }
            StatusChange::Pay {
                paid_by,
                payment_method,
                payment_reference,
                net_amount,
                paid_at,
            } => {
                sqlx::query(&format!(
                    r#"
                    UPDATE commissions
                    SET status = 'paid',
                        paid_by = $3,
                        payment_method = $4,
                        payment_reference = $5,
                        net_amount = $6,
                        paid_at = $7
                    WHERE id = $1 AND status = $2
                    RETURNING {COMMISSION_COLUMNS}
                    "#
                ))
                .bind(id)
                .bind(expected.as_str())
                .bind(paid_by)
                .bind(payment_method)
                .bind(payment_reference)
                .bind(net_amount)
                .bind(paid_at)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage)?
            }
        };

        row.as_ref().map(commission_from_row).transpose()
    }

    async fn list_commissions(
        &self,
        filter: &CommissionFilter,
        page: Page,
    ) -> Result<Vec<Commission>, SettlementError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {COMMISSION_COLUMNS}
            FROM commissions
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR partner_id = $2)
              AND ($3::int IS NULL OR reference_year = $3)
              AND ($4::int IS NULL OR reference_month = $4)
            ORDER BY created_at DESC
            LIMIT $5 OFFSET $6
            "#
        ))
        .bind(filter.status.map(|status| status.as_str()))
        .bind(filter.partner_id)
        .bind(filter.reference_year)
        .bind(filter.reference_month.map(|month| month as i32))
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.iter().map(commission_from_row).collect()
    }

    async fn count_commissions(
        &self,
        filter: &CommissionFilter,
    ) -> Result<i64, SettlementError> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM commissions
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR partner_id = $2)
              AND ($3::int IS NULL OR reference_year = $3)
              AND ($4::int IS NULL OR reference_month = $4)
            "#,
        )
        .bind(filter.status.map(|status| status.as_str()))
        .bind(filter.partner_id)
        .bind(filter.reference_year)
        .bind(filter.reference_month.map(|month| month as i32))
        .fetch_one(&self.pool)
        .await
        .map_err(storage)
    }

    async fn status_summary(&self) -> Result<Vec<StatusSummaryRow>, SettlementError> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS count, COALESCE(SUM(amount), 0) AS amount
            FROM commissions
            GROUP BY status
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        let mut summary = Vec::with_capacity(rows.len());
        for row in rows {
            let status_text: String = row.try_get("status").map_err(storage)?;
            let status = CommissionStatus::parse(&status_text).ok_or_else(|| {
                SettlementError::Storage(anyhow!("unknown commission status {status_text}"))
            })?;
            summary.push(StatusSummaryRow {
                status,
                count: row.try_get("count").map_err(storage)?,
                amount: row.try_get("amount").map_err(storage)?,
            });
        }

        Ok(summary)
    }

    async fn report_rows(
        &self,
        year: i32,
        month: Option<u32>,
    ) -> Result<Vec<ReportRow>, SettlementError> {
        let rows = sqlx::query(
            r#"
            SELECT c.partner_id, c.status, c.amount, p.tier
            FROM commissions c
            LEFT JOIN partners p ON p.id = c.partner_id
            WHERE c.reference_year = $1
              AND ($2::int IS NULL OR c.reference_month = $2)
            "#,
        )
        .bind(year)
        .bind(month.map(|month| month as i32))
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        let mut report_rows = Vec::with_capacity(rows.len());
        for row in rows {
            let status_text: String = row.try_get("status").map_err(storage)?;
            let status = CommissionStatus::parse(&status_text).ok_or_else(|| {
                SettlementError::Storage(anyhow!("unknown commission status {status_text}"))
            })?;
            let tier_text: Option<String> = row.try_get("tier").map_err(storage)?;
            report_rows.push(ReportRow {
                partner_id: row.try_get("partner_id").map_err(storage)?,
                status,
                tier: tier_text.as_deref().map(PartnerTier::parse_or_default),
                amount: row.try_get("amount").map_err(storage)?,
            });
        }

        Ok(report_rows)
    }

    async fn insert_audit_entry(&self, entry: AuditLogEntry) -> Result<(), SettlementError> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (
                id,
                category,
                action,
                actor_id,
                description,
                commission_id,
                partner_id,
                amount,
                metadata,
                recorded_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.category)
        .bind(&entry.action)
        .bind(&entry.actor_id)
        .bind(&entry.description)
        .bind(entry.commission_id)
        .bind(entry.partner_id)
        .bind(entry.amount)
        .bind(&entry.metadata)
        .bind(entry.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(())
    }
}
