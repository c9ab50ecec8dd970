//! Import endpoints: image batches, spreadsheets, dry-run preview, OCR
//! probe.
//!
//! Uploads arrive as multipart forms. File parts are validated here
//! (count, size, content type) before anything touches the pipeline; the
//! pipeline itself runs on the blocking pool since both SQLite and the
//! upstream HTTP clients are synchronous.

use std::io::Write as _;

use axum::extract::{Multipart, State};
use axum::{Extension, Json};
use serde_json::json;

use crate::api::types::run_blocking;
use crate::api::{ApiContext, ApiError, TenantContext};
use crate::models::PatientDraft;
use crate::pipeline::dedup::MergeOptions;
use crate::pipeline::extraction::format::draft_from_record;
use crate::pipeline::extraction::{extract_multiple_patients, extract_patient_data};
use crate::pipeline::import::{
    import_patients_from_images, import_patients_from_xlsx, preview_import, xlsx, ImportResult,
};
use crate::pipeline::ocr::{extract_text_batch, MAX_IMAGE_BYTES};

/// Upload cap per image batch.
pub const MAX_FILES: usize = 50;

const IMAGE_CONTENT_TYPES: &[&str] = &["image/png", "image/jpeg", "image/jpg", "image/tiff"];

const SHEET_CONTENT_TYPES: &[&str] = &[
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-excel",
];

/// Parsed multipart upload: file parts plus merge flags.
#[derive(Default)]
struct Upload {
    images: Vec<Vec<u8>>,
    sheet: Option<(String, Vec<u8>)>,
    options: MergeOptions,
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, ApiError> {
    let mut upload = Upload::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "images" | "image" => {
                let content_type = field.content_type().unwrap_or_default().to_string();
                if !IMAGE_CONTENT_TYPES.contains(&content_type.as_str()) {
                    return Err(ApiError::BadRequest(format!(
                        "unsupported image type: {content_type}"
                    )));
                }
                let bytes = read_file_bytes(field).await?;
                push_image(&mut upload, bytes)?;
            }
            "file" => {
                let content_type = field.content_type().unwrap_or_default().to_string();
                if !SHEET_CONTENT_TYPES.contains(&content_type.as_str()) {
                    return Err(ApiError::BadRequest(format!(
                        "unsupported spreadsheet type: {content_type}"
                    )));
                }
                let filename = field.file_name().unwrap_or("upload.xlsx").to_string();
                let bytes = read_file_bytes(field).await?;
                upload.sheet = Some((filename, bytes));
            }
            // A mixed batch under one field name; parts are dispatched by
            // content type.
            "files" => {
                let content_type = field.content_type().unwrap_or_default().to_string();
                let filename = field.file_name().unwrap_or("upload.xlsx").to_string();
                let bytes = read_file_bytes(field).await?;
                if IMAGE_CONTENT_TYPES.contains(&content_type.as_str()) {
                    push_image(&mut upload, bytes)?;
                } else if SHEET_CONTENT_TYPES.contains(&content_type.as_str()) {
                    upload.sheet = Some((filename, bytes));
                } else {
                    return Err(ApiError::BadRequest(format!(
                        "unsupported file type: {content_type}"
                    )));
                }
            }
            "prioritizeExisting" => {
                upload.options.prioritize_existing = read_flag(field, &name).await?;
            }
            "overwriteEmpty" => upload.options.overwrite_empty = read_flag(field, &name).await?,
            "skipDuplicates" => upload.options.skip_duplicates = read_flag(field, &name).await?,
            _ => {}
        }
    }

    Ok(upload)
}

async fn read_file_bytes(
    field: axum::extract::multipart::Field<'_>,
) -> Result<Vec<u8>, ApiError> {
    let bytes = field
        .bytes()
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {e}")))?;
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(ApiError::PayloadTooLarge(format!(
            "file exceeds {} MB limit",
            MAX_IMAGE_BYTES / (1024 * 1024)
        )));
    }
    Ok(bytes.to_vec())
}

fn push_image(upload: &mut Upload, bytes: Vec<u8>) -> Result<(), ApiError> {
    if upload.images.len() >= MAX_FILES {
        return Err(ApiError::BadRequest(format!(
            "at most {MAX_FILES} images per batch"
        )));
    }
    upload.images.push(bytes);
    Ok(())
}

async fn read_flag(field: axum::extract::multipart::Field<'_>, name: &str) -> Result<bool, ApiError> {
    let text = field
        .text()
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read field {name}: {e}")))?;
    match text.trim() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(ApiError::BadRequest(format!(
            "field {name} must be true or false, got {other:?}"
        ))),
    }
}

/// The sheet bytes go through a temp file because the XLSX reader wants a
/// path; the suffix keeps format detection working.
fn spill_sheet(filename: &str, bytes: &[u8]) -> Result<tempfile::NamedTempFile, ApiError> {
    let suffix = if filename.to_lowercase().ends_with(".xls") {
        ".xls"
    } else {
        ".xlsx"
    };
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .map_err(|e| ApiError::Internal(format!("failed to create temp file: {e}")))?;
    file.write_all(bytes)
        .map_err(|e| ApiError::Internal(format!("failed to write temp file: {e}")))?;
    Ok(file)
}

/// POST /api/import/images
pub async fn import_images(
    State(ctx): State<ApiContext>,
    Extension(tenant): Extension<TenantContext>,
    multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    let upload = read_upload(multipart).await?;
    if upload.images.is_empty() {
        return Err(ApiError::BadRequest("no images uploaded".into()));
    }

    let result = run_blocking(move || {
        let conn = ctx.open_db()?;
        Ok(import_patients_from_images(
            ctx.ocr.as_ref(),
            ctx.llm.as_ref(),
            &conn,
            tenant.tenant_id,
            &upload.images,
            upload.options,
        )?)
    })
    .await?;

    Ok(Json(json!({
        "message": import_message(&result),
        "result": result,
    })))
}

/// POST /api/import/xlsx
pub async fn import_xlsx(
    State(ctx): State<ApiContext>,
    Extension(tenant): Extension<TenantContext>,
    multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    let upload = read_upload(multipart).await?;
    let (filename, bytes) = upload
        .sheet
        .ok_or_else(|| ApiError::BadRequest("no spreadsheet uploaded".into()))?;

    let result = run_blocking(move || {
        // The temp file lives inside the closure so it is removed as soon
        // as the import finishes
        let file = spill_sheet(&filename, &bytes)?;
        let conn = ctx.open_db()?;
        Ok(import_patients_from_xlsx(
            &conn,
            tenant.tenant_id,
            file.path(),
            upload.options,
        )?)
    })
    .await?;

    Ok(Json(json!({
        "message": import_message(&result),
        "result": result,
    })))
}

fn import_message(result: &ImportResult) -> String {
    format!(
        "Imported {} patient(s), {} failed, {} skipped",
        result.success, result.failed, result.skipped
    )
}

/// POST /api/import/preview
///
/// Dry run over images and/or a spreadsheet: classifies the batch without
/// persisting or charging, and replaces the tenant's duplicate review
/// queue with the flagged items.
pub async fn preview(
    State(ctx): State<ApiContext>,
    Extension(tenant): Extension<TenantContext>,
    multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    let upload = read_upload(multipart).await?;
    if upload.images.is_empty() && upload.sheet.is_none() {
        return Err(ApiError::BadRequest("nothing to preview".into()));
    }

    let queues = ctx.duplicate_queues.clone();
    let response = run_blocking(move || {
        let mut drafts: Vec<PatientDraft> = Vec::new();

        if !upload.images.is_empty() {
            let outcomes = extract_text_batch(ctx.ocr.as_ref(), &upload.images);
            let texts: Vec<String> = outcomes.into_iter().map(|o| o.text).collect();
            let records = extract_multiple_patients(ctx.llm.as_ref(), &texts);
            drafts.extend(records.iter().map(draft_from_record));
        }

        if let Some((filename, bytes)) = upload.sheet {
            let file = spill_sheet(&filename, &bytes)?;
            let rows = xlsx::read_records(file.path()).map_err(ApiError::from)?;
            drafts.extend(xlsx::rows_to_drafts(&rows));
        }

        let conn = ctx.open_db()?;
        let (preview, queue) = preview_import(&conn, tenant.tenant_id, &drafts)?;

        let next = queue.current().cloned();
        let remaining = queue.len();
        queues
            .lock()
            .map_err(|_| ApiError::Internal("duplicate queue lock poisoned".into()))?
            .insert(tenant.tenant_id, queue);

        Ok(json!({
            "message": format!(
                "Preview: {} new, {} existing, {} invalid",
                preview.new, preview.existing, preview.invalid
            ),
            "preview": preview,
            "extractedData": drafts,
            "pendingDuplicates": remaining,
            "next": next,
        }))
    })
    .await?;

    Ok(Json(response))
}

/// POST /api/import/test-ocr
///
/// Run OCR and extraction on a single image without touching the
/// database or billing. Diagnostic aid for tuning scan quality.
pub async fn test_ocr(
    State(ctx): State<ApiContext>,
    Extension(_tenant): Extension<TenantContext>,
    multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    let upload = read_upload(multipart).await?;
    let image = upload
        .images
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::BadRequest("no image uploaded".into()))?;

    let response = run_blocking(move || {
        let outcome = ctx.ocr.extract_text(&image)?;
        let extracted = extract_patient_data(ctx.llm.as_ref(), &outcome.text)?;
        Ok(json!({
            "message": format!("OCR completed with {:.2}% confidence", outcome.confidence),
            "ocr": {
                "text": outcome.text,
                "confidence": outcome.confidence,
            },
            "extractedData": extracted,
        }))
    })
    .await?;

    Ok(Json(response))
}
