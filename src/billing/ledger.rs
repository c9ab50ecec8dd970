//! Metered-billing ledger: admission, charging, cycle rollover, invoices.
//!
//! Charging happens in two steps around an import. `check_admission` runs
//! before any pipeline work and rejects the whole batch when the tenant is
//! disabled or short on prepaid balance. `record_usage` runs after the
//! pipeline and charges what was actually produced.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use rusqlite::Connection;
use serde::Serialize;

use super::{cost_for_units, BillingError, PRICE_PER_THOUSAND};
use crate::db::repository::billing as billing_repo;
use crate::models::{BillingMode, ImportType, Invoice, InvoiceStatus, UsageCycle, UsageLogEntry};

/// Prepaid packages stay redeemable for a year.
const PREPAID_VALIDITY_MONTHS: u32 = 12;

/// First instant of the month containing `now`.
pub fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Last second of the month containing `now`.
pub fn end_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    next_month_start(now) - Duration::seconds(1)
}

fn next_month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

fn add_months(now: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    let total = now.month0() + months;
    let year = now.year() + (total / 12) as i32;
    let month = total % 12 + 1;
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Fetch the tenant's usage cycle, creating it on first contact.
pub fn initialize_usage_tracking(
    conn: &Connection,
    tenant_id: i64,
    now: DateTime<Utc>,
) -> Result<UsageCycle, BillingError> {
    if let Some(cycle) = billing_repo::get_usage_cycle(conn, tenant_id)? {
        return Ok(cycle);
    }

    let cycle = UsageCycle {
        tenant_id,
        usage_count: 0,
        current_cycle_start: start_of_month(now),
        current_cycle_end: end_of_month(now),
        current_cycle_count: 0,
        paid_units: 0,
        remaining_units: 0,
        price_per_thousand: PRICE_PER_THOUSAND,
        total_spent: 0,
        is_active: true,
        billing_mode: BillingMode::Monthly,
        last_used_at: None,
        updated_at: now,
    };
    billing_repo::insert_usage_cycle(conn, &cycle)?;
    tracing::info!(tenant_id, "initialized usage tracking");
    Ok(cycle)
}

/// Gate an import before any pipeline work happens.
///
/// Rejects when the tenant is disabled, or when a prepaid tenant's balance
/// cannot cover the whole requested batch. Admission reserves nothing; the
/// actual deduction in `record_usage` re-checks the balance atomically.
pub fn check_admission(
    conn: &Connection,
    tenant_id: i64,
    requested_units: i64,
    now: DateTime<Utc>,
) -> Result<(), BillingError> {
    let cycle = initialize_usage_tracking(conn, tenant_id, now)?;

    if !cycle.is_active {
        return Err(BillingError::ServiceDisabled);
    }

    if cycle.billing_mode == BillingMode::Prepaid && cycle.remaining_units < requested_units {
        return Err(BillingError::InsufficientPrepaidUnits {
            remaining: cycle.remaining_units,
            requested: requested_units,
        });
    }

    Ok(())
}

/// What one finished import run charges and logs.
#[derive(Debug, Clone)]
pub struct UsageParams {
    /// Chargeable units for this run.
    pub units: i64,
    pub image_count: i64,
    pub success_count: i64,
    pub failed_count: i64,
    pub ocr_confidence: Option<f64>,
    pub ai_model: Option<String>,
    pub processing_time_ms: Option<i64>,
    pub import_type: ImportType,
    pub metadata: Option<serde_json::Value>,
    pub user_id: Option<i64>,
}

/// Charge a finished import run and append its usage log entry.
///
/// Rolls the cycle over first when the current period has lapsed: a
/// monthly cycle that closes with nonzero usage emits a pending invoice
/// for the closed period before the counters reset.
pub fn record_usage(
    conn: &Connection,
    tenant_id: i64,
    params: UsageParams,
    now: DateTime<Utc>,
) -> Result<UsageStats, BillingError> {
    let mut cycle = initialize_usage_tracking(conn, tenant_id, now)?;

    if now > cycle.current_cycle_end {
        rollover_cycle(conn, &cycle, now)?;
        cycle = initialize_usage_tracking(conn, tenant_id, now)?;
    }

    let cost = match cycle.billing_mode {
        BillingMode::Monthly => {
            let cost = cost_for_units(params.units, cycle.price_per_thousand);
            billing_repo::apply_usage(conn, tenant_id, params.units, cost, now)?;
            cost
        }
        BillingMode::Prepaid => {
            // Units were paid for with the package; the conditional UPDATE
            // is the authoritative balance check.
            if !billing_repo::apply_usage_prepaid(conn, tenant_id, params.units, 0, now)? {
                let current = billing_repo::get_usage_cycle(conn, tenant_id)?;
                return Err(BillingError::InsufficientPrepaidUnits {
                    remaining: current.map(|c| c.remaining_units).unwrap_or(0),
                    requested: params.units,
                });
            }
            0
        }
    };

    let entry = UsageLogEntry {
        id: 0,
        tenant_id,
        user_id: params.user_id,
        image_count: params.image_count,
        success_count: params.success_count,
        failed_count: params.failed_count,
        ocr_confidence: params.ocr_confidence,
        ai_model: params.ai_model,
        processing_time_ms: params.processing_time_ms,
        cost,
        import_type: params.import_type,
        metadata: params.metadata,
        created_at: now,
    };
    billing_repo::insert_usage_log(conn, &entry)?;

    tracing::info!(
        tenant_id,
        units = params.units,
        cost,
        import_type = entry.import_type.as_str(),
        "recorded usage"
    );

    get_usage_stats(conn, tenant_id, now)
}

fn rollover_cycle(
    conn: &Connection,
    cycle: &UsageCycle,
    now: DateTime<Utc>,
) -> Result<(), BillingError> {
    if cycle.billing_mode == BillingMode::Monthly && cycle.current_cycle_count > 0 {
        let invoice = Invoice {
            id: 0,
            tenant_id: cycle.tenant_id,
            period_start: cycle.current_cycle_start,
            period_end: cycle.current_cycle_end,
            units_used: cycle.current_cycle_count,
            amount: cost_for_units(cycle.current_cycle_count, cycle.price_per_thousand),
            status: InvoiceStatus::Pending,
            paid_at: None,
            payment_method: None,
            metadata: None,
            created_at: now,
        };
        let invoice_id = billing_repo::insert_invoice(conn, &invoice)?;
        tracing::info!(
            tenant_id = cycle.tenant_id,
            invoice_id,
            units = cycle.current_cycle_count,
            "closed billing cycle with pending invoice"
        );
    }

    billing_repo::reset_cycle(
        conn,
        cycle.tenant_id,
        start_of_month(now),
        end_of_month(now),
        now,
    )?;
    Ok(())
}

/// Sell a prepaid package: units are credited immediately and the invoice
/// is created already paid.
pub fn add_prepaid_units(
    conn: &Connection,
    tenant_id: i64,
    units: i64,
    amount: i64,
    now: DateTime<Utc>,
) -> Result<Invoice, BillingError> {
    initialize_usage_tracking(conn, tenant_id, now)?;

    let mut invoice = Invoice {
        id: 0,
        tenant_id,
        period_start: now,
        period_end: add_months(now, PREPAID_VALIDITY_MONTHS),
        units_used: units,
        amount,
        status: InvoiceStatus::Paid,
        paid_at: Some(now),
        payment_method: None,
        metadata: Some(serde_json::json!({
            "type": "prepaid_package",
            "units": units,
        })),
        created_at: now,
    };
    invoice.id = billing_repo::insert_invoice(conn, &invoice)?;
    billing_repo::add_prepaid(conn, tenant_id, units, now)?;

    tracing::info!(tenant_id, units, amount, "credited prepaid package");
    Ok(invoice)
}

/// Live usage snapshot surfaced to the dashboard and to alerting.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub current_cycle_count: i64,
    pub total_count: i64,
    pub billing_mode: BillingMode,
    /// Present only for prepaid tenants.
    pub remaining_prepaid: Option<i64>,
    /// Cents accrued in the open cycle. Zero for prepaid tenants.
    pub estimated_cost: i64,
    pub cycle_start: DateTime<Utc>,
    pub cycle_end: DateTime<Utc>,
    pub is_active: bool,
}

pub fn get_usage_stats(
    conn: &Connection,
    tenant_id: i64,
    now: DateTime<Utc>,
) -> Result<UsageStats, BillingError> {
    let cycle = initialize_usage_tracking(conn, tenant_id, now)?;

    let estimated_cost = match cycle.billing_mode {
        BillingMode::Monthly => cost_for_units(cycle.current_cycle_count, cycle.price_per_thousand),
        BillingMode::Prepaid => 0,
    };

    Ok(UsageStats {
        current_cycle_count: cycle.current_cycle_count,
        total_count: cycle.usage_count,
        billing_mode: cycle.billing_mode,
        remaining_prepaid: match cycle.billing_mode {
            BillingMode::Prepaid => Some(cycle.remaining_units),
            BillingMode::Monthly => None,
        },
        estimated_cost,
        cycle_start: cycle.current_cycle_start,
        cycle_end: cycle.current_cycle_end,
        is_active: cycle.is_active,
    })
}

pub fn get_pending_invoices(
    conn: &Connection,
    tenant_id: i64,
) -> Result<Vec<Invoice>, BillingError> {
    Ok(billing_repo::list_invoices(
        conn,
        tenant_id,
        Some(InvoiceStatus::Pending),
    )?)
}

pub fn mark_invoice_paid(
    conn: &Connection,
    tenant_id: i64,
    invoice_id: i64,
    payment_method: &str,
    now: DateTime<Utc>,
) -> Result<Invoice, BillingError> {
    billing_repo::mark_invoice_paid(conn, tenant_id, invoice_id, payment_method, now)?;
    billing_repo::get_invoice(conn, tenant_id, invoice_id)?.ok_or_else(|| {
        BillingError::Database(crate::db::DatabaseError::NotFound {
            entity_type: "invoice".into(),
            id: invoice_id.to_string(),
        })
    })
}

/// Usage log roll-up for a reporting period.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageReport {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub total_units: i64,
    pub total_cost: i64,
    pub entries: Vec<UsageLogEntry>,
}

pub fn get_usage_report(
    conn: &Connection,
    tenant_id: i64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<UsageReport, BillingError> {
    let entries = billing_repo::list_usage_logs(conn, tenant_id, start, end)?;
    let total_units = entries.iter().map(|e| e.success_count).sum();
    let total_cost = entries.iter().map(|e| e.cost).sum();
    Ok(UsageReport {
        period_start: start,
        period_end: end,
        total_units,
        total_cost,
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use rusqlite::params;

    fn usage(units: i64) -> UsageParams {
        UsageParams {
            units,
            image_count: units,
            success_count: units,
            failed_count: 0,
            ocr_confidence: Some(90.0),
            ai_model: Some("deepseek-chat".into()),
            processing_time_ms: Some(5_000),
            import_type: ImportType::Images,
            metadata: None,
            user_id: None,
        }
    }

    #[test]
    fn first_contact_creates_month_aligned_cycle() {
        let conn = open_memory_database().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 8, 15, 12, 0, 0).unwrap();
        let cycle = initialize_usage_tracking(&conn, 1, now).unwrap();

        assert_eq!(
            cycle.current_cycle_start,
            Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            cycle.current_cycle_end,
            Utc.with_ymd_and_hms(2026, 8, 31, 23, 59, 59).unwrap()
        );
        assert_eq!(cycle.price_per_thousand, PRICE_PER_THOUSAND);
        assert_eq!(cycle.billing_mode, BillingMode::Monthly);

        // Second call returns the same row
        let again = initialize_usage_tracking(&conn, 1, now).unwrap();
        assert_eq!(again.current_cycle_start, cycle.current_cycle_start);
    }

    #[test]
    fn december_cycle_ends_at_year_boundary() {
        let conn = open_memory_database().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 12, 10, 0, 0, 0).unwrap();
        let cycle = initialize_usage_tracking(&conn, 1, now).unwrap();
        assert_eq!(
            cycle.current_cycle_end,
            Utc.with_ymd_and_hms(2026, 12, 31, 23, 59, 59).unwrap()
        );
    }

    #[test]
    fn disabled_tenant_is_refused_admission() {
        let conn = open_memory_database().unwrap();
        let now = Utc::now();
        initialize_usage_tracking(&conn, 1, now).unwrap();
        conn.execute(
            "UPDATE usage_cycles SET is_active = 0 WHERE tenant_id = ?1",
            params![1],
        )
        .unwrap();

        let err = check_admission(&conn, 1, 5, now).unwrap_err();
        assert!(matches!(err, BillingError::ServiceDisabled));
    }

    #[test]
    fn prepaid_admission_requires_full_batch_coverage() {
        let conn = open_memory_database().unwrap();
        let now = Utc::now();
        add_prepaid_units(&conn, 1, 10, 3000, now).unwrap();

        let err = check_admission(&conn, 1, 15, now).unwrap_err();
        match &err {
            BillingError::InsufficientPrepaidUnits {
                remaining,
                requested,
            } => {
                assert_eq!(*remaining, 10);
                assert_eq!(*requested, 15);
            }
            other => panic!("expected insufficient units, got {other}"),
        }
        // The rejection says the whole batch must be covered up front
        let message = err.to_string();
        assert!(message.contains("whole batch"), "got: {message}");
        assert!(message.contains("15"));
        assert!(message.contains("10"));

        // A batch that fits passes
        assert!(check_admission(&conn, 1, 10, now).is_ok());
    }

    #[test]
    fn monthly_usage_accrues_cost() {
        let conn = open_memory_database().unwrap();
        let now = Utc::now();
        let stats = record_usage(&conn, 1, usage(10), now).unwrap();

        assert_eq!(stats.current_cycle_count, 10);
        assert_eq!(stats.total_count, 10);
        assert_eq!(stats.estimated_cost, cost_for_units(10, PRICE_PER_THOUSAND));
        assert!(stats.remaining_prepaid.is_none());

        let report = get_usage_report(&conn, 1, now - Duration::hours(1), now).unwrap();
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.total_units, 10);
    }

    #[test]
    fn lapsed_cycle_emits_pending_invoice_and_resets() {
        let conn = open_memory_database().unwrap();
        let now = Utc::now();
        record_usage(&conn, 1, usage(500), now).unwrap();

        // Backdate the open cycle so the next charge lands after its end
        let old_start = now - Duration::days(60);
        let old_end = now - Duration::days(31);
        conn.execute(
            "UPDATE usage_cycles SET current_cycle_start = ?1, current_cycle_end = ?2
             WHERE tenant_id = ?3",
            params![old_start, old_end, 1],
        )
        .unwrap();

        let stats = record_usage(&conn, 1, usage(3), now).unwrap();

        // The closed period became a pending invoice for its 500 units
        let pending = get_pending_invoices(&conn, 1).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].units_used, 500);
        assert_eq!(pending[0].amount, cost_for_units(500, PRICE_PER_THOUSAND));
        assert_eq!(pending[0].period_end, old_end);

        // New cycle carries only the new charge; lifetime total keeps both
        assert_eq!(stats.current_cycle_count, 3);
        assert_eq!(stats.total_count, 503);
    }

    #[test]
    fn lapsed_empty_cycle_emits_no_invoice() {
        let conn = open_memory_database().unwrap();
        let now = Utc::now();
        initialize_usage_tracking(&conn, 1, now).unwrap();
        conn.execute(
            "UPDATE usage_cycles SET current_cycle_end = ?1 WHERE tenant_id = ?2",
            params![now - Duration::days(31), 1],
        )
        .unwrap();

        record_usage(&conn, 1, usage(2), now).unwrap();
        assert!(get_pending_invoices(&conn, 1).unwrap().is_empty());
    }

    #[test]
    fn prepaid_package_is_invoiced_paid_and_credited() {
        let conn = open_memory_database().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 8, 15, 12, 0, 0).unwrap();
        let invoice = add_prepaid_units(&conn, 1, 1000, 30000, now).unwrap();

        assert_eq!(invoice.status, InvoiceStatus::Paid);
        assert_eq!(invoice.paid_at, Some(now));
        let metadata = invoice.metadata.unwrap();
        assert_eq!(metadata["type"], "prepaid_package");
        assert_eq!(metadata["units"], 1000);
        assert_eq!(
            invoice.period_end,
            Utc.with_ymd_and_hms(2027, 8, 1, 0, 0, 0).unwrap()
        );

        let stats = get_usage_stats(&conn, 1, now).unwrap();
        assert_eq!(stats.billing_mode, BillingMode::Prepaid);
        assert_eq!(stats.remaining_prepaid, Some(1000));
        assert_eq!(stats.estimated_cost, 0);
    }

    #[test]
    fn prepaid_usage_deducts_without_cost() {
        let conn = open_memory_database().unwrap();
        let now = Utc::now();
        add_prepaid_units(&conn, 1, 100, 3000, now).unwrap();

        let stats = record_usage(&conn, 1, usage(30), now).unwrap();
        assert_eq!(stats.remaining_prepaid, Some(70));

        let report = get_usage_report(&conn, 1, now - Duration::hours(1), now).unwrap();
        // Package purchase already paid; per-run cost stays zero
        assert_eq!(report.entries.last().unwrap().cost, 0);
    }

    #[test]
    fn prepaid_overdraw_at_record_time_is_refused() {
        let conn = open_memory_database().unwrap();
        let now = Utc::now();
        add_prepaid_units(&conn, 1, 5, 150, now).unwrap();

        let err = record_usage(&conn, 1, usage(6), now).unwrap_err();
        assert!(matches!(
            err,
            BillingError::InsufficientPrepaidUnits { remaining: 5, .. }
        ));

        // Balance untouched
        let stats = get_usage_stats(&conn, 1, now).unwrap();
        assert_eq!(stats.remaining_prepaid, Some(5));
    }

    #[test]
    fn paying_an_invoice_returns_the_updated_row() {
        let conn = open_memory_database().unwrap();
        let now = Utc::now();
        record_usage(&conn, 1, usage(100), now).unwrap();
        conn.execute(
            "UPDATE usage_cycles SET current_cycle_end = ?1 WHERE tenant_id = ?2",
            params![now - Duration::days(31), 1],
        )
        .unwrap();
        record_usage(&conn, 1, usage(1), now).unwrap();

        let pending = get_pending_invoices(&conn, 1).unwrap();
        let paid = mark_invoice_paid(&conn, 1, pending[0].id, "pix", now).unwrap();
        assert_eq!(paid.status, InvoiceStatus::Paid);
        assert_eq!(paid.payment_method.as_deref(), Some("pix"));
    }
}
