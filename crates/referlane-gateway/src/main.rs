use std::{collections::BTreeMap, net::SocketAddr, sync::Arc};

use anyhow::Result as AnyResult;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use referlane_core::{
    AuditLogEntry, Commission, CommissionStatus, SettlementError, SettlementPeriod,
};
use referlane_platform::{RedisBus, RedisNotifier, ServiceConfig, connect_database};
use referlane_settlement::{
    CommissionFilter, CommissionLedger, CommissionReport, Page, PgSettlementStore,
    SettlementOrchestrator, SettlementStore, generate_report,
};

#[derive(Clone)]
struct AppState {
    store: Arc<PgSettlementStore>,
    ledger: CommissionLedger<PgSettlementStore>,
    orchestrator: Arc<SettlementOrchestrator<PgSettlementStore>>,
}

#[derive(Debug, Clone, Serialize)]
struct CommissionView {
    id: Uuid,
    partner_id: Uuid,
    reference_year: i32,
    reference_month: u32,
    amount: Decimal,
    status: CommissionStatus,
    conversion_count: i64,
    referral_ids: Vec<Uuid>,
    calculated_at: DateTime<Utc>,
    approved_by: Option<String>,
    approved_at: Option<DateTime<Utc>>,
    paid_by: Option<String>,
    payment_method: Option<String>,
    payment_reference: Option<String>,
    net_amount: Option<Decimal>,
    paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<Commission> for CommissionView {
    fn from(commission: Commission) -> Self {
        Self {
            id: commission.id,
            partner_id: commission.partner_id,
            reference_year: commission.reference_year,
            reference_month: commission.reference_month,
            amount: commission.amount,
            status: commission.status,
            conversion_count: commission.conversion_count,
            referral_ids: commission.referral_ids,
            calculated_at: commission.calculated_at,
            approved_by: commission.approved_by,
            approved_at: commission.approved_at,
            paid_by: commission.paid_by,
            payment_method: commission.payment_method,
            payment_reference: commission.payment_reference,
            net_amount: commission.net_amount,
            paid_at: commission.paid_at,
            created_at: commission.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ListCommissionsQuery {
    status: Option<String>,
    partner_id: Option<Uuid>,
    month: Option<u32>,
    year: Option<i32>,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
struct SummaryBucket {
    count: i64,
    amount: Decimal,
}

#[derive(Debug, Serialize)]
struct ListCommissionsResponse {
    items: Vec<CommissionView>,
    total: i64,
    summary: BTreeMap<String, SummaryBucket>,
}

#[derive(Debug, Clone, Deserialize)]
struct ProcessMonthlyRequest {
    year: i32,
    month: u32,
}

#[derive(Debug, Serialize)]
struct ProcessMonthlyResponse {
    created: Vec<CommissionView>,
    created_count: usize,
    duplicate_partner_ids: Vec<Uuid>,
    below_threshold: usize,
    failures: Vec<ProcessFailureView>,
}

#[derive(Debug, Serialize)]
struct ProcessFailureView {
    partner_id: Uuid,
    reason: String,
}

#[derive(Debug, Clone, Deserialize)]
struct PayCommissionRequest {
    payment_method: Option<String>,
    payment_reference: Option<String>,
    net_amount: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
struct BulkApproveRequest {
    commission_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
struct BulkApproveItem {
    commission_id: Uuid,
    approved: bool,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct BulkApproveResponse {
    results: Vec<BulkApproveItem>,
    approved_count: usize,
    failed_count: usize,
}

#[derive(Debug, Clone, Deserialize)]
struct ReportQuery {
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
struct PendingQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "referlane_gateway=info,referlane_settlement=info".to_string()),
        )
        .init();

    let config = ServiceConfig::from_env("0.0.0.0:8080")?;
    let pool = connect_database(&config.database_url, config.database_max_connections).await?;
    let redis = RedisBus::connect(&config.redis_url)?;
    let notifier = Arc::new(RedisNotifier::new(redis));

    let store = Arc::new(PgSettlementStore::new(pool));
    let ledger = CommissionLedger::new(store.clone(), notifier.clone());
    let orchestrator = Arc::new(SettlementOrchestrator::new(
        store.clone(),
        ledger.clone(),
        notifier,
    ));

    let state = AppState {
        store,
        ledger,
        orchestrator,
    };
    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/commissions", get(list_commissions))
        .route("/commissions/process-monthly", post(process_monthly))
        .route("/commissions/pending", get(list_pending))
        .route("/commissions/report", get(commission_report))
        .route("/commissions/bulk-approve", post(bulk_approve))
        .route("/commissions/{commission_id}/approve", put(approve_commission))
        .route("/commissions/{commission_id}/pay", put(pay_commission))
        .with_state(state);

    let addr: SocketAddr = config.http_addr.parse()?;
    info!("gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn list_commissions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListCommissionsQuery>,
) -> Result<Json<ListCommissionsResponse>, (StatusCode, String)> {
    require_actor(&headers)?;
    let status = query
        .status
        .as_deref()
        .map(parse_status)
        .transpose()
        .map_err(|err| (StatusCode::BAD_REQUEST, err))?;
    if let Some(month) = query.month
        && !(1..=12).contains(&month)
    {
        return Err((StatusCode::BAD_REQUEST, "month must be 1-12".to_string()));
    }

    let filter = CommissionFilter {
        status,
        partner_id: query.partner_id,
        reference_year: query.year,
        reference_month: query.month,
    };
    let page = Page {
        limit: query.limit.unwrap_or(50).clamp(1, 200),
        offset: query.offset.unwrap_or(0).max(0),
    };

    let items = state
        .ledger
        .list_by_filter(&filter, page)
        .await
        .map_err(error_response)?;
    let total = state
        .store
        .count_commissions(&filter)
        .await
        .map_err(error_response)?;
    let summary_rows = state.store.status_summary().await.map_err(error_response)?;

    let mut summary = BTreeMap::new();
    for row in summary_rows {
        summary.insert(
            row.status.as_str().to_string(),
            SummaryBucket {
                count: row.count,
                amount: row.amount,
            },
        );
    }

    Ok(Json(ListCommissionsResponse {
        items: items.into_iter().map(CommissionView::from).collect(),
        total,
        summary,
    }))
}

async fn process_monthly(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ProcessMonthlyRequest>,
) -> Result<Json<ProcessMonthlyResponse>, (StatusCode, String)> {
    let actor_id = require_actor(&headers)?;
    let period = SettlementPeriod::new(payload.year, payload.month).ok_or((
        StatusCode::BAD_REQUEST,
        "year/month does not name a valid settlement period".to_string(),
    ))?;

    let run = state
        .orchestrator
        .run_monthly(period)
        .await
        .map_err(error_response)?;

    let entry = AuditLogEntry {
        metadata: json!({
            "reference_year": period.year(),
            "reference_month": period.month(),
            "created_count": run.created.len(),
            "duplicate_partner_ids": &run.duplicate_partner_ids,
            "below_threshold": run.below_threshold,
            "failures": &run.failures,
        }),
        ..AuditLogEntry::financial(
            "process_monthly_commissions",
            &actor_id,
            format!(
                "monthly settlement for {}: {} created, {} duplicates, {} failed",
                period,
                run.created.len(),
                run.duplicate_partner_ids.len(),
                run.failures.len()
            ),
        )
    };
    if let Err(err) = state.store.insert_audit_entry(entry).await {
        error!(%err, "audit log write failed after settlement run");
    }

    Ok(Json(ProcessMonthlyResponse {
        created_count: run.created.len(),
        created: run.created.into_iter().map(CommissionView::from).collect(),
        duplicate_partner_ids: run.duplicate_partner_ids,
        below_threshold: run.below_threshold,
        failures: run
            .failures
            .into_iter()
            .map(|failure| ProcessFailureView {
                partner_id: failure.partner_id,
                reason: failure.reason,
            })
            .collect(),
    }))
}

async fn approve_commission(
    State(state): State<AppState>,
    Path(commission_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<CommissionView>, (StatusCode, String)> {
    let actor_id = require_actor(&headers)?;
    let approved = state
        .ledger
        .approve(commission_id, &actor_id)
        .await
        .map_err(error_response)?;
    Ok(Json(approved.into()))
}

async fn pay_commission(
    State(state): State<AppState>,
    Path(commission_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<PayCommissionRequest>,
) -> Result<Json<CommissionView>, (StatusCode, String)> {
    let actor_id = require_actor(&headers)?;
    let method = payload.payment_method.unwrap_or_default();
    let reference = payload.payment_reference.unwrap_or_default();

    let paid = state
        .ledger
        .mark_paid(
            commission_id,
            &method,
            &reference,
            payload.net_amount,
            &actor_id,
        )
        .await
        .map_err(error_response)?;
    Ok(Json(paid.into()))
}

async fn bulk_approve(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<BulkApproveRequest>,
) -> Result<Json<BulkApproveResponse>, (StatusCode, String)> {
    let actor_id = require_actor(&headers)?;
    if payload.commission_ids.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "commission_ids must be a non-empty list".to_string(),
        ));
    }

    let outcomes = state
        .ledger
        .bulk_approve(&payload.commission_ids, &actor_id)
        .await;

    let results: Vec<BulkApproveItem> = outcomes
        .into_iter()
        .map(|outcome| BulkApproveItem {
            commission_id: outcome.commission_id,
            approved: outcome.result.is_ok(),
            error: outcome.result.err().map(|err| err.to_string()),
        })
        .collect();
    let approved_count = results.iter().filter(|item| item.approved).count();

    Ok(Json(BulkApproveResponse {
        failed_count: results.len() - approved_count,
        approved_count,
        results,
    }))
}

async fn commission_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ReportQuery>,
) -> Result<Json<CommissionReport>, (StatusCode, String)> {
    require_actor(&headers)?;
    let start_date = query.start_date.ok_or((
        StatusCode::BAD_REQUEST,
        "start_date is required".to_string(),
    ))?;
    let end_date = query
        .end_date
        .ok_or((StatusCode::BAD_REQUEST, "end_date is required".to_string()))?;
    let (year, month) = report_period_from_range(start_date, end_date)
        .map_err(|err| (StatusCode::BAD_REQUEST, err))?;

    let report = generate_report(state.store.as_ref(), year, month)
        .await
        .map_err(error_response)?;
    Ok(Json(report))
}

/// Commissions are keyed by reference year/month, so the dashboard's date
/// range is mapped onto reference periods: a range inside one month reports
/// that month, a range inside one year reports the whole year.
fn report_period_from_range(
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<(i32, Option<u32>), String> {
    if end_date < start_date {
        return Err("end_date must not precede start_date".to_string());
    }
    if start_date.year() != end_date.year() {
        return Err("date range must fall within one calendar year".to_string());
    }
    let month = (start_date.month() == end_date.month()).then_some(start_date.month());
    Ok((start_date.year(), month))
}

async fn list_pending(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PendingQuery>,
) -> Result<Json<Vec<CommissionView>>, (StatusCode, String)> {
    require_actor(&headers)?;
    let page = Page {
        limit: query.limit.unwrap_or(50).clamp(1, 200),
        offset: query.offset.unwrap_or(0).max(0),
    };
    let pending = state
        .ledger
        .list_pending(page)
        .await
        .map_err(error_response)?;
    Ok(Json(pending.into_iter().map(CommissionView::from).collect()))
}

/// The auth middleware in front of this service resolves the session and
/// forwards the verified actor in `x-admin-id`.
fn require_actor(headers: &HeaderMap) -> Result<String, (StatusCode, String)> {
    headers
        .get("x-admin-id")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or((
            StatusCode::UNAUTHORIZED,
            "x-admin-id header is required".to_string(),
        ))
}

fn parse_status(value: &str) -> Result<CommissionStatus, String> {
    CommissionStatus::parse(value).ok_or_else(|| format!("unknown status {value}"))
}

fn error_response(err: SettlementError) -> (StatusCode, String) {
    match &err {
        SettlementError::NotFound => (StatusCode::NOT_FOUND, err.to_string()),
        SettlementError::MissingField(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        SettlementError::InvalidStateTransition { .. }
        | SettlementError::DuplicatePeriod { .. } => (StatusCode::CONFLICT, err.to_string()),
        SettlementError::Storage(_) => {
            error!(%err, "storage failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            )
        }
    }
}
