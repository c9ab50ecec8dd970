//! Duplicate detection and merge resolution.
//!
//! Matching is deterministic and ordered: CPF beats email beats name+phone,
//! and the first hit wins. A blank probe field is skipped entirely, so two
//! records that are both missing a CPF never match on it.

pub mod queue;

pub use queue::*;

use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::repository::patient as patients;
use crate::db::DatabaseError;
use crate::models::{Patient, PatientDraft};

/// Why an incoming draft matched an existing patient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    Cpf,
    Email,
    NameAndPhone,
}

impl MatchReason {
    /// Confidence score surfaced to the resolution UI.
    pub fn score(&self) -> f64 {
        match self {
            Self::Cpf => 1.0,
            Self::Email => 0.9,
            Self::NameAndPhone => 0.75,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Self::Cpf => "same CPF",
            Self::Email => "same e-mail address",
            Self::NameAndPhone => "same name and phone number",
        }
    }
}

/// An existing patient the resolver considers the same person as a draft.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateMatch {
    pub patient: Patient,
    pub reason: MatchReason,
    pub score: f64,
    pub description: String,
}

impl DuplicateMatch {
    pub fn new(patient: Patient, reason: MatchReason) -> Self {
        Self {
            patient,
            score: reason.score(),
            description: reason.describe().to_string(),
            reason,
        }
    }
}

/// Probe the tenant's patients for a duplicate of the draft.
///
/// Identifiers are checked in priority order and the search short-circuits
/// on the first hit. The name+phone probe tries the draft's cellphone first
/// and falls back to the landline.
pub fn find_existing_patient(
    conn: &Connection,
    tenant_id: i64,
    draft: &PatientDraft,
) -> Result<Option<DuplicateMatch>, DatabaseError> {
    if !draft.cpf.is_empty() {
        if let Some(patient) = patients::find_by_cpf(conn, tenant_id, &draft.cpf)? {
            return Ok(Some(DuplicateMatch::new(patient, MatchReason::Cpf)));
        }
    }

    if !draft.email.is_empty() {
        if let Some(patient) = patients::find_by_email(conn, tenant_id, &draft.email)? {
            return Ok(Some(DuplicateMatch::new(patient, MatchReason::Email)));
        }
    }

    if !draft.full_name.is_empty() {
        let probe_phone = if !draft.cellphone.is_empty() {
            &draft.cellphone
        } else {
            &draft.phone
        };
        if !probe_phone.is_empty() {
            if let Some(patient) =
                patients::find_by_name_and_phone(conn, tenant_id, &draft.full_name, probe_phone)?
            {
                return Ok(Some(DuplicateMatch::new(patient, MatchReason::NameAndPhone)));
            }
        }
    }

    Ok(None)
}

/// How an import run treats drafts that match existing patients.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MergeOptions {
    /// Keep existing non-empty values over incoming ones.
    pub prioritize_existing: bool,
    /// Fill existing empty fields from the incoming draft.
    pub overwrite_empty: bool,
    /// Leave matched records untouched instead of merging.
    pub skip_duplicates: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            prioritize_existing: true,
            overwrite_empty: true,
            skip_duplicates: false,
        }
    }
}

/// Merge a draft into an existing patient according to the options.
///
/// With `prioritize_existing`, stored non-empty values win and the draft
/// only fills blanks (when `overwrite_empty` allows). Without it, every
/// non-empty draft field replaces the stored value.
pub fn merge_patient_data(existing: &Patient, draft: &PatientDraft, options: MergeOptions) -> Patient {
    let mut merged = existing.clone();

    let pick = |current: &str, incoming: &str| -> String {
        if options.prioritize_existing {
            if current.is_empty() && options.overwrite_empty && !incoming.is_empty() {
                incoming.to_string()
            } else {
                current.to_string()
            }
        } else if !incoming.is_empty() {
            incoming.to_string()
        } else {
            current.to_string()
        }
    };

    merged.full_name = pick(&existing.full_name, &draft.full_name);
    merged.phone = pick(&existing.phone, &draft.phone);
    merged.cellphone = pick(&existing.cellphone, &draft.cellphone);
    merged.email = pick(&existing.email, &draft.email);
    merged.cpf = pick(&existing.cpf, &draft.cpf);
    merged.address = pick(&existing.address, &draft.address);
    merged.city = pick(&existing.city, &draft.city);
    merged.state = pick(&existing.state, &draft.state);
    merged.cep = pick(&existing.cep, &draft.cep);
    merged.neighborhood = pick(&existing.neighborhood, &draft.neighborhood);

    merged.birth_date = if options.prioritize_existing {
        existing.birth_date.or(if options.overwrite_empty {
            draft.birth_date
        } else {
            None
        })
    } else {
        draft.birth_date.or(existing.birth_date)
    };

    merged.updated_at = Utc::now();
    merged
}

/// Outcome of resolving one draft against the patient table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum Resolution {
    Created { patient: Patient },
    Updated { patient: Patient },
    Skipped,
}

/// Resolve one draft: insert it as a new patient, merge it into a matched
/// one, or skip it, per the options.
pub fn insert_or_update_patient(
    conn: &Connection,
    tenant_id: i64,
    draft: &PatientDraft,
    options: MergeOptions,
) -> Result<Resolution, DatabaseError> {
    match find_existing_patient(conn, tenant_id, draft)? {
        None => {
            let patient = Patient::from_draft(tenant_id, draft, Utc::now());
            patients::insert_patient(conn, &patient)?;
            Ok(Resolution::Created { patient })
        }
        Some(found) if options.skip_duplicates => {
            tracing::debug!(
                patient_id = %found.patient.id,
                reason = ?found.reason,
                "skipping duplicate draft"
            );
            Ok(Resolution::Skipped)
        }
        Some(found) => {
            let merged = merge_patient_data(&found.patient, draft, options);
            patients::update_patient(conn, &merged)?;
            Ok(Resolution::Updated { patient: merged })
        }
    }
}
