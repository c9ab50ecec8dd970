//! Brazilian field formatters and the record-to-draft normalization step.
//!
//! Formatters are total functions: a value whose digit count does not match
//! the expected document shape is returned unchanged, never rejected. The
//! resolver compares stored and extracted values after formatting, so both
//! sides see the same canonical shape.

use chrono::NaiveDate;

use crate::models::{ExtractedPatientRecord, PatientDraft};

/// Format an 11-digit CPF as XXX.XXX.XXX-XX. Any other digit count is
/// returned as-is.
pub fn format_cpf(value: &str) -> String {
    let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != 11 {
        return value.to_string();
    }
    format!(
        "{}.{}.{}-{}",
        &digits[0..3],
        &digits[3..6],
        &digits[6..9],
        &digits[9..11]
    )
}

/// Format an 8-digit CEP as XXXXX-XXX. Any other digit count is returned
/// as-is.
pub fn format_cep(value: &str) -> String {
    let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != 8 {
        return value.to_string();
    }
    format!("{}-{}", &digits[0..5], &digits[5..8])
}

/// Format a phone number: 11 digits as (XX) XXXXX-XXXX (mobile), 10 digits
/// as (XX) XXXX-XXXX (landline). Any other digit count is returned as-is.
pub fn format_phone(value: &str) -> String {
    let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.len() {
        11 => format!("({}) {}-{}", &digits[0..2], &digits[2..7], &digits[7..11]),
        10 => format!("({}) {}-{}", &digits[0..2], &digits[2..6], &digits[6..10]),
        _ => value.to_string(),
    }
}

/// Parse a birth date in the formats intake forms actually carry:
/// dd/mm/yyyy, dd-mm-yyyy, dd.mm.yyyy and ISO yyyy-mm-dd.
pub fn parse_birth_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    for fmt in ["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y-%m-%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some(date);
        }
    }
    None
}

/// Normalize an extracted record into an insert/update candidate: apply
/// the formatters, parse the birth date, collapse absent fields to empty
/// strings.
pub fn draft_from_record(record: &ExtractedPatientRecord) -> PatientDraft {
    let opt = |field: &Option<String>| field.as_deref().unwrap_or("").trim().to_string();

    PatientDraft {
        full_name: record.full_name.trim().to_string(),
        phone: format_if_present(&record.phone, format_phone),
        cellphone: format_if_present(&record.cellphone, format_phone),
        email: opt(&record.email),
        cpf: format_if_present(&record.cpf, format_cpf),
        birth_date: record.birth_date.as_deref().and_then(parse_birth_date),
        address: opt(&record.address),
        city: opt(&record.city),
        state: opt(&record.state).to_uppercase(),
        cep: format_if_present(&record.cep, format_cep),
        neighborhood: opt(&record.neighborhood),
    }
}

fn format_if_present(field: &Option<String>, formatter: fn(&str) -> String) -> String {
    match field.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => formatter(value),
        _ => String::new(),
    }
}
