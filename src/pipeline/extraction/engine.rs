//! Extraction engine: OCR text in, one `ExtractedPatientRecord` out.
//!
//! The model is asked for strict JSON but the parsing here is deliberately
//! lenient about value shapes (numbers become strings, blanks become None)
//! and deliberately strict about junk: placeholder text and degenerate CPFs
//! are dropped rather than persisted.

use serde_json::Value;

use super::llm::ChatClient;
use super::prompt::{build_extraction_prompt, SYSTEM_PROMPT};
use super::ExtractionError;
use crate::models::ExtractedPatientRecord;

/// Extract one patient record from one document's OCR text.
pub fn extract_patient_data(
    llm: &dyn ChatClient,
    ocr_text: &str,
) -> Result<ExtractedPatientRecord, ExtractionError> {
    if ocr_text.trim().is_empty() {
        return Err(ExtractionError::EmptyInput);
    }

    let raw = llm.chat_json(SYSTEM_PROMPT, &build_extraction_prompt(ocr_text))?;
    let value: Value = serde_json::from_str(strip_code_fence(&raw))
        .map_err(|e| ExtractionError::JsonParsing(e.to_string()))?;

    Ok(record_from_value(&value))
}

/// Extract records for a batch of OCR texts, one per input, in order.
///
/// Never fails as a whole: a text that cannot be extracted (empty OCR,
/// model error, bad JSON) yields an empty record in its slot so positional
/// alignment with the source images is preserved.
pub fn extract_multiple_patients(
    llm: &dyn ChatClient,
    ocr_texts: &[String],
) -> Vec<ExtractedPatientRecord> {
    ocr_texts
        .iter()
        .enumerate()
        .map(|(i, text)| match extract_patient_data(llm, text) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(document_index = i, error = %e, "extraction failed for document");
                ExtractedPatientRecord::empty()
            }
        })
        .collect()
}

fn record_from_value(value: &Value) -> ExtractedPatientRecord {
    ExtractedPatientRecord {
        full_name: clean_field(value.get("fullName")).unwrap_or_default(),
        phone: clean_field(value.get("phone")),
        cellphone: clean_field(value.get("cellphone")),
        email: clean_field(value.get("email")),
        cpf: clean_field(value.get("cpf")).filter(|cpf| !is_degenerate_cpf(cpf)),
        birth_date: clean_field(value.get("birthDate")),
        address: clean_field(value.get("address")),
        city: clean_field(value.get("city")),
        state: clean_field(value.get("state")),
        cep: clean_field(value.get("cep")),
        neighborhood: clean_field(value.get("neighborhood")),
    }
}

/// Coerce a JSON value to a trimmed, non-placeholder string.
fn clean_field(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if text.is_empty() || is_placeholder(&text) {
        return None;
    }
    Some(text)
}

/// Placeholder detection: the model occasionally echoes instruction
/// examples or masks unknown values with runs of X.
fn is_placeholder(text: &str) -> bool {
    let lower = text.to_lowercase();
    if lower.contains("exemplo") || lower.contains("example") || lower.contains("see above") {
        return true;
    }
    let mut run = 0usize;
    for c in lower.chars() {
        if c == 'x' {
            run += 1;
            if run >= 3 {
                return true;
            }
        } else {
            run = 0;
        }
    }
    false
}

/// A CPF whose 11 digits are all identical is syntactically valid-looking
/// but never a real document number.
fn is_degenerate_cpf(cpf: &str) -> bool {
    let digits: Vec<char> = cpf.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.len() == 11 && digits.iter().all(|&d| d == digits[0])
}

/// Tolerate models that wrap the JSON object in a Markdown code fence
/// despite the json_object response format.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open.strip_suffix("```").unwrap_or(without_open).trim()
}
