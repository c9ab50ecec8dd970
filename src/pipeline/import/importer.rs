//! Import orchestration: admission, OCR, extraction, resolution, billing.
//!
//! Billing brackets every run. Admission happens before any OCR or model
//! call so a batch the tenant cannot pay for does no work and persists
//! nothing. The charge after the run reflects what actually happened:
//! image imports bill successfully extracted documents, spreadsheet
//! imports bill every data row.

use std::path::Path;
use std::time::Instant;

use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;

use super::xlsx;
use super::ImportError;
use crate::billing::{
    check_admission, record_usage, should_send_usage_alert, UsageAlert, UsageParams, UsageStats,
};
use crate::models::{ImportType, Patient, PatientDraft};
use crate::pipeline::dedup::{
    find_existing_patient, insert_or_update_patient, DuplicateQueue, MergeOptions,
    PendingDuplicate, Resolution,
};
use crate::pipeline::extraction::format::draft_from_record;
use crate::pipeline::extraction::{extract_multiple_patients, ChatClient};
use crate::pipeline::ocr::{extract_text_batch, OcrEngine};

/// Outcome of one import run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub success: i64,
    pub failed: i64,
    pub skipped: i64,
    pub errors: Vec<String>,
    pub patients: Vec<Patient>,
    pub billing: Option<BillingSummary>,
}

/// The charge attached to a finished run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingSummary {
    pub units_charged: i64,
    pub stats: UsageStats,
    pub alert: Option<UsageAlert>,
}

/// Import patient records from scanned intake form images.
pub fn import_patients_from_images(
    ocr: &dyn OcrEngine,
    llm: &dyn ChatClient,
    conn: &Connection,
    tenant_id: i64,
    images: &[Vec<u8>],
    options: MergeOptions,
) -> Result<ImportResult, ImportError> {
    let _span = tracing::info_span!("import_images", tenant_id, count = images.len()).entered();
    let start = Instant::now();

    check_admission(conn, tenant_id, images.len() as i64, Utc::now())?;

    let outcomes = extract_text_batch(ocr, images);
    let texts: Vec<String> = outcomes.iter().map(|o| o.text.clone()).collect();
    let records = extract_multiple_patients(llm, &texts);

    let mut result = ImportResult {
        success: 0,
        failed: 0,
        skipped: 0,
        errors: Vec::new(),
        patients: Vec::new(),
        billing: None,
    };

    for (i, record) in records.iter().enumerate() {
        if !record.is_usable() {
            result.failed += 1;
            result.errors.push(format!(
                "Image {}: insufficient data (OCR confidence: {:.2}%)",
                i + 1,
                outcomes[i].confidence
            ));
            continue;
        }

        let draft = draft_from_record(record);
        match insert_or_update_patient(conn, tenant_id, &draft, options) {
            Ok(Resolution::Created { patient }) | Ok(Resolution::Updated { patient }) => {
                result.success += 1;
                result.patients.push(patient);
            }
            Ok(Resolution::Skipped) => result.skipped += 1,
            Err(e) => {
                result.failed += 1;
                result.errors.push(format!("Image {}: {e}", i + 1));
            }
        }
    }

    let avg_confidence = if outcomes.is_empty() {
        None
    } else {
        Some(outcomes.iter().map(|o| o.confidence).sum::<f64>() / outcomes.len() as f64)
    };

    let stats = record_usage(
        conn,
        tenant_id,
        UsageParams {
            units: result.success,
            image_count: images.len() as i64,
            success_count: result.success,
            failed_count: result.failed,
            ocr_confidence: avg_confidence,
            ai_model: Some(llm.model_name().to_string()),
            processing_time_ms: Some(start.elapsed().as_millis() as i64),
            import_type: ImportType::Images,
            metadata: Some(serde_json::json!({ "totalImages": images.len() })),
            user_id: None,
        },
        Utc::now(),
    )?;

    result.billing = Some(BillingSummary {
        units_charged: result.success,
        alert: should_send_usage_alert(&stats),
        stats,
    });

    tracing::info!(
        tenant_id,
        success = result.success,
        failed = result.failed,
        skipped = result.skipped,
        elapsed_ms = %start.elapsed().as_millis(),
        "image import finished"
    );
    Ok(result)
}

/// Import patient records from an XLSX/XLS spreadsheet on disk.
pub fn import_patients_from_xlsx(
    conn: &Connection,
    tenant_id: i64,
    path: &Path,
    options: MergeOptions,
) -> Result<ImportResult, ImportError> {
    let rows = xlsx::read_records(path)?;
    let drafts = xlsx::rows_to_drafts(&rows);
    import_patients_from_rows(conn, tenant_id, &drafts, options)
}

/// Resolve pre-parsed spreadsheet rows. Every data row is a chargeable
/// unit, valid or not: the work of reading the sheet was done either way.
pub fn import_patients_from_rows(
    conn: &Connection,
    tenant_id: i64,
    drafts: &[PatientDraft],
    options: MergeOptions,
) -> Result<ImportResult, ImportError> {
    let _span = tracing::info_span!("import_xlsx", tenant_id, rows = drafts.len()).entered();
    let start = Instant::now();

    check_admission(conn, tenant_id, drafts.len() as i64, Utc::now())?;

    let mut result = ImportResult {
        success: 0,
        failed: 0,
        skipped: 0,
        errors: Vec::new(),
        patients: Vec::new(),
        billing: None,
    };

    for (i, draft) in drafts.iter().enumerate() {
        // Data rows start after the header, so sheet row numbers are i + 2
        let row = i + 2;
        if !draft.is_usable() {
            result.failed += 1;
            result
                .errors
                .push(format!("Row {row}: invalid or missing name"));
            continue;
        }

        match insert_or_update_patient(conn, tenant_id, draft, options) {
            Ok(Resolution::Created { patient }) | Ok(Resolution::Updated { patient }) => {
                result.success += 1;
                result.patients.push(patient);
            }
            Ok(Resolution::Skipped) => result.skipped += 1,
            Err(e) => {
                result.failed += 1;
                result.errors.push(format!("Row {row}: {e}"));
            }
        }
    }

    let units = drafts.len() as i64;
    let stats = record_usage(
        conn,
        tenant_id,
        UsageParams {
            units,
            image_count: units,
            success_count: result.success,
            failed_count: result.failed,
            ocr_confidence: None,
            ai_model: None,
            processing_time_ms: Some(start.elapsed().as_millis() as i64),
            import_type: ImportType::Xlsx,
            metadata: Some(serde_json::json!({ "totalRows": drafts.len() })),
            user_id: None,
        },
        Utc::now(),
    )?;

    result.billing = Some(BillingSummary {
        units_charged: units,
        alert: should_send_usage_alert(&stats),
        stats,
    });

    tracing::info!(
        tenant_id,
        success = result.success,
        failed = result.failed,
        skipped = result.skipped,
        "spreadsheet import finished"
    );
    Ok(result)
}

/// Dry-run classification of a batch of drafts.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportPreview {
    pub total: i64,
    pub new: i64,
    pub existing: i64,
    pub duplicates: i64,
    pub invalid: i64,
}

/// Classify drafts without persisting or charging anything. Flagged
/// duplicates come back as a review queue in draft order.
pub fn preview_import(
    conn: &Connection,
    tenant_id: i64,
    drafts: &[PatientDraft],
) -> Result<(ImportPreview, DuplicateQueue), ImportError> {
    let mut preview = ImportPreview {
        total: drafts.len() as i64,
        new: 0,
        existing: 0,
        duplicates: 0,
        invalid: 0,
    };
    let mut pending = Vec::new();

    for draft in drafts {
        if !draft.is_usable() {
            preview.invalid += 1;
            continue;
        }
        match find_existing_patient(conn, tenant_id, draft)? {
            Some(found) => {
                preview.existing += 1;
                preview.duplicates += 1;
                pending.push(PendingDuplicate {
                    draft: draft.clone(),
                    duplicate: found,
                });
            }
            None => preview.new += 1,
        }
    }

    Ok((preview, DuplicateQueue::new(pending)))
}
