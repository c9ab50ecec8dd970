//! Billing endpoints: usage snapshot, invoices, prepaid packages.

use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::api::types::run_blocking;
use crate::api::{ApiContext, ApiError, TenantContext};
use crate::billing::{
    add_prepaid_units, end_of_month, get_usage_report, get_usage_stats, mark_invoice_paid,
    should_send_usage_alert, start_of_month,
};
use crate::db::repository::billing as billing_repo;
use crate::models::InvoiceStatus;

/// GET /api/billing/usage
pub async fn usage(
    State(ctx): State<ApiContext>,
    Extension(tenant): Extension<TenantContext>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let response = run_blocking(move || {
        let conn = ctx.open_db()?;
        let stats = get_usage_stats(&conn, tenant.tenant_id, Utc::now())?;
        let alert = should_send_usage_alert(&stats);
        Ok(json!({ "stats": stats, "alert": alert }))
    })
    .await?;
    Ok(Json(response))
}

#[derive(Deserialize)]
pub struct InvoiceQuery {
    status: Option<String>,
}

/// GET /api/billing/invoices
pub async fn invoices(
    State(ctx): State<ApiContext>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<InvoiceQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let status = match query.status.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(
            InvoiceStatus::from_str(raw)
                .map_err(|_| ApiError::BadRequest(format!("unknown invoice status: {raw}")))?,
        ),
    };

    let response = run_blocking(move || {
        let conn = ctx.open_db()?;
        let invoices = billing_repo::list_invoices(&conn, tenant.tenant_id, status)?;
        Ok(json!({ "invoices": invoices }))
    })
    .await?;
    Ok(Json(response))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRequest {
    units: i64,
    /// Price paid for the package, in cents.
    amount: i64,
}

/// POST /api/billing/packages
pub async fn buy_package(
    State(ctx): State<ApiContext>,
    Extension(tenant): Extension<TenantContext>,
    Json(request): Json<PackageRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if request.units <= 0 {
        return Err(ApiError::BadRequest("units must be positive".into()));
    }
    if request.amount < 0 {
        return Err(ApiError::BadRequest("amount must not be negative".into()));
    }

    let response = run_blocking(move || {
        let conn = ctx.open_db()?;
        let invoice =
            add_prepaid_units(&conn, tenant.tenant_id, request.units, request.amount, Utc::now())?;
        let stats = get_usage_stats(&conn, tenant.tenant_id, Utc::now())?;
        Ok(json!({ "invoice": invoice, "stats": stats }))
    })
    .await?;
    Ok(Json(response))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayRequest {
    payment_method: String,
}

/// POST /api/billing/invoices/:id/pay
pub async fn pay_invoice(
    State(ctx): State<ApiContext>,
    Extension(tenant): Extension<TenantContext>,
    Path(invoice_id): Path<i64>,
    Json(request): Json<PayRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if request.payment_method.trim().is_empty() {
        return Err(ApiError::BadRequest("paymentMethod is required".into()));
    }

    let response = run_blocking(move || {
        let conn = ctx.open_db()?;
        let invoice = mark_invoice_paid(
            &conn,
            tenant.tenant_id,
            invoice_id,
            request.payment_method.trim(),
            Utc::now(),
        )?;
        Ok(json!({ "invoice": invoice }))
    })
    .await?;
    Ok(Json(response))
}

#[derive(Deserialize)]
pub struct ReportQuery {
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

/// GET /api/billing/report
///
/// Usage log roll-up; defaults to the current calendar month.
pub async fn report(
    State(ctx): State<ApiContext>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let now = Utc::now();
    let start = query.start.unwrap_or_else(|| start_of_month(now));
    let end = query.end.unwrap_or_else(|| end_of_month(now));
    if end < start {
        return Err(ApiError::BadRequest("end must not precede start".into()));
    }

    let response = run_blocking(move || {
        let conn = ctx.open_db()?;
        let report = get_usage_report(&conn, tenant.tenant_id, start, end)?;
        Ok(json!({ "report": report }))
    })
    .await?;
    Ok(Json(response))
}
