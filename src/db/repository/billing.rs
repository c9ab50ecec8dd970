//! Persistence for usage cycles, usage logs and invoices.
//!
//! The prepaid deduction is a single conditional UPDATE so that two
//! concurrent imports for the same tenant cannot overdraw the balance:
//! zero rows affected means the check failed and the caller must reject.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::DatabaseError;
use crate::models::{BillingMode, ImportType, Invoice, InvoiceStatus, UsageCycle, UsageLogEntry};

// ──────────────────────────────────────────────
// Usage cycles
// ──────────────────────────────────────────────

pub fn get_usage_cycle(
    conn: &Connection,
    tenant_id: i64,
) -> Result<Option<UsageCycle>, DatabaseError> {
    conn.query_row(
        "SELECT tenant_id, usage_count, current_cycle_start, current_cycle_end,
         current_cycle_count, paid_units, remaining_units, price_per_thousand,
         total_spent, is_active, billing_mode, last_used_at, updated_at
         FROM usage_cycles WHERE tenant_id = ?1",
        params![tenant_id],
        map_cycle,
    )
    .optional()?
    .transpose()
}

pub fn insert_usage_cycle(conn: &Connection, cycle: &UsageCycle) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO usage_cycles (tenant_id, usage_count, current_cycle_start,
         current_cycle_end, current_cycle_count, paid_units, remaining_units,
         price_per_thousand, total_spent, is_active, billing_mode, last_used_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            cycle.tenant_id,
            cycle.usage_count,
            cycle.current_cycle_start,
            cycle.current_cycle_end,
            cycle.current_cycle_count,
            cycle.paid_units,
            cycle.remaining_units,
            cycle.price_per_thousand,
            cycle.total_spent,
            cycle.is_active as i32,
            cycle.billing_mode.as_str(),
            cycle.last_used_at,
            cycle.updated_at,
        ],
    )?;
    Ok(())
}

/// Open a fresh cycle: new boundaries, cycle counter zeroed. Lifetime
/// counters are left untouched.
pub fn reset_cycle(
    conn: &Connection,
    tenant_id: i64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE usage_cycles SET current_cycle_start = ?1, current_cycle_end = ?2,
         current_cycle_count = 0, updated_at = ?3 WHERE tenant_id = ?4",
        params![start, end, now, tenant_id],
    )?;
    Ok(())
}

/// Apply a chargeable operation to a monthly-mode tenant.
pub fn apply_usage(
    conn: &Connection,
    tenant_id: i64,
    units: i64,
    cost: i64,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE usage_cycles SET usage_count = usage_count + ?1,
         current_cycle_count = current_cycle_count + ?1,
         total_spent = total_spent + ?2, last_used_at = ?3, updated_at = ?3
         WHERE tenant_id = ?4",
        params![units, cost, now, tenant_id],
    )?;
    Ok(())
}

/// Apply a chargeable operation to a prepaid tenant, deducting from the
/// remaining balance atomically. Returns false when the balance was
/// insufficient (nothing is modified in that case).
pub fn apply_usage_prepaid(
    conn: &Connection,
    tenant_id: i64,
    units: i64,
    cost: i64,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE usage_cycles SET usage_count = usage_count + ?1,
         current_cycle_count = current_cycle_count + ?1,
         total_spent = total_spent + ?2,
         remaining_units = remaining_units - ?1, last_used_at = ?3, updated_at = ?3
         WHERE tenant_id = ?4 AND remaining_units >= ?1",
        params![units, cost, now, tenant_id],
    )?;
    Ok(changed == 1)
}

/// Credit a prepaid package and flip the tenant to prepaid mode.
pub fn add_prepaid(
    conn: &Connection,
    tenant_id: i64,
    units: i64,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE usage_cycles SET paid_units = paid_units + ?1,
         remaining_units = remaining_units + ?1, billing_mode = 'prepaid', updated_at = ?2
         WHERE tenant_id = ?3",
        params![units, now, tenant_id],
    )?;
    Ok(())
}

fn map_cycle(row: &Row<'_>) -> rusqlite::Result<Result<UsageCycle, DatabaseError>> {
    let is_active: i32 = row.get(9)?;
    let mode: String = row.get(10)?;
    let tenant_id = row.get(0)?;
    let usage_count = row.get(1)?;
    let current_cycle_start = row.get(2)?;
    let current_cycle_end = row.get(3)?;
    let current_cycle_count = row.get(4)?;
    let paid_units = row.get(5)?;
    let remaining_units = row.get(6)?;
    let price_per_thousand = row.get(7)?;
    let total_spent = row.get(8)?;
    let last_used_at = row.get(11)?;
    let updated_at = row.get(12)?;
    Ok(BillingMode::from_str(&mode).map(|billing_mode| UsageCycle {
        tenant_id,
        usage_count,
        current_cycle_start,
        current_cycle_end,
        current_cycle_count,
        paid_units,
        remaining_units,
        price_per_thousand,
        total_spent,
        is_active: is_active != 0,
        billing_mode,
        last_used_at,
        updated_at,
    }))
}

// ──────────────────────────────────────────────
// Usage logs
// ──────────────────────────────────────────────

/// Append a usage log row. The entry's `id` is ignored; the generated
/// rowid is returned.
pub fn insert_usage_log(conn: &Connection, entry: &UsageLogEntry) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO usage_logs (tenant_id, user_id, image_count, success_count,
         failed_count, ocr_confidence, ai_model, processing_time_ms, cost,
         import_type, metadata, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            entry.tenant_id,
            entry.user_id,
            entry.image_count,
            entry.success_count,
            entry.failed_count,
            entry.ocr_confidence,
            entry.ai_model,
            entry.processing_time_ms,
            entry.cost,
            entry.import_type.as_str(),
            entry.metadata.as_ref().map(|m| m.to_string()),
            entry.created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Usage logs for a tenant within [start, end], oldest first.
pub fn list_usage_logs(
    conn: &Connection,
    tenant_id: i64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<UsageLogEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, tenant_id, user_id, image_count, success_count, failed_count,
         ocr_confidence, ai_model, processing_time_ms, cost, import_type, metadata, created_at
         FROM usage_logs
         WHERE tenant_id = ?1 AND created_at >= ?2 AND created_at <= ?3
         ORDER BY created_at ASC",
    )?;

    let rows = stmt.query_map(params![tenant_id, start, end], map_log)?;
    collect_fallible(rows)
}

fn map_log(row: &Row<'_>) -> rusqlite::Result<Result<UsageLogEntry, DatabaseError>> {
    let import_type: String = row.get(10)?;
    let metadata: Option<String> = row.get(11)?;
    let id = row.get(0)?;
    let tenant_id = row.get(1)?;
    let user_id = row.get(2)?;
    let image_count = row.get(3)?;
    let success_count = row.get(4)?;
    let failed_count = row.get(5)?;
    let ocr_confidence = row.get(6)?;
    let ai_model = row.get(7)?;
    let processing_time_ms = row.get(8)?;
    let cost = row.get(9)?;
    let created_at = row.get(12)?;
    Ok(ImportType::from_str(&import_type).map(|import_type| UsageLogEntry {
        id,
        tenant_id,
        user_id,
        image_count,
        success_count,
        failed_count,
        ocr_confidence,
        ai_model,
        processing_time_ms,
        cost,
        import_type,
        metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
        created_at,
    }))
}

// ──────────────────────────────────────────────
// Invoices
// ──────────────────────────────────────────────

/// Insert an invoice. The invoice's `id` is ignored; the generated rowid
/// is returned.
pub fn insert_invoice(conn: &Connection, invoice: &Invoice) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO invoices (tenant_id, period_start, period_end, units_used,
         amount, status, paid_at, payment_method, metadata, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            invoice.tenant_id,
            invoice.period_start,
            invoice.period_end,
            invoice.units_used,
            invoice.amount,
            invoice.status.as_str(),
            invoice.paid_at,
            invoice.payment_method,
            invoice.metadata.as_ref().map(|m| m.to_string()),
            invoice.created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Invoices for a tenant, optionally filtered by status, oldest first.
pub fn list_invoices(
    conn: &Connection,
    tenant_id: i64,
    status: Option<InvoiceStatus>,
) -> Result<Vec<Invoice>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, tenant_id, period_start, period_end, units_used, amount, status,
         paid_at, payment_method, metadata, created_at
         FROM invoices
         WHERE tenant_id = ?1 AND (?2 IS NULL OR status = ?2)
         ORDER BY created_at ASC",
    )?;

    let rows = stmt.query_map(
        params![tenant_id, status.map(|s| s.as_str())],
        map_invoice,
    )?;
    collect_fallible(rows)
}

pub fn get_invoice(
    conn: &Connection,
    tenant_id: i64,
    invoice_id: i64,
) -> Result<Option<Invoice>, DatabaseError> {
    conn.query_row(
        "SELECT id, tenant_id, period_start, period_end, units_used, amount, status,
         paid_at, payment_method, metadata, created_at
         FROM invoices WHERE id = ?1 AND tenant_id = ?2",
        params![invoice_id, tenant_id],
        map_invoice,
    )
    .optional()?
    .transpose()
}

/// Transition a pending invoice to paid.
pub fn mark_invoice_paid(
    conn: &Connection,
    tenant_id: i64,
    invoice_id: i64,
    payment_method: &str,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE invoices SET status = 'paid', paid_at = ?1, payment_method = ?2
         WHERE id = ?3 AND tenant_id = ?4",
        params![now, payment_method, invoice_id, tenant_id],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "invoice".into(),
            id: invoice_id.to_string(),
        });
    }
    Ok(())
}

fn map_invoice(row: &Row<'_>) -> rusqlite::Result<Result<Invoice, DatabaseError>> {
    let status: String = row.get(6)?;
    let metadata: Option<String> = row.get(9)?;
    let id = row.get(0)?;
    let tenant_id = row.get(1)?;
    let period_start = row.get(2)?;
    let period_end = row.get(3)?;
    let units_used = row.get(4)?;
    let amount = row.get(5)?;
    let paid_at = row.get(7)?;
    let payment_method = row.get(8)?;
    let created_at = row.get(10)?;
    Ok(InvoiceStatus::from_str(&status).map(|status| Invoice {
        id,
        tenant_id,
        period_start,
        period_end,
        units_used,
        amount,
        status,
        paid_at,
        payment_method,
        metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
        created_at,
    }))
}

fn collect_fallible<T>(
    rows: impl Iterator<Item = rusqlite::Result<Result<T, DatabaseError>>>,
) -> Result<Vec<T>, DatabaseError> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row??);
    }
    Ok(out)
}
