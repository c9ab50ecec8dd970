use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Minimum usable length for a patient name.
pub const MIN_NAME_LEN: usize = 3;

/// Canonical patient record, owned by a tenant.
///
/// Contact and address fields are empty strings when unknown — the pipeline
/// normalizes absent values to empty rather than NULL so merge logic can
/// treat "blank" uniformly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: Uuid,
    pub tenant_id: i64,
    pub full_name: String,
    pub phone: String,
    pub cellphone: String,
    pub email: String,
    pub cpf: String,
    pub birth_date: Option<NaiveDate>,
    pub address: String,
    pub city: String,
    pub state: String,
    pub cep: String,
    pub neighborhood: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    /// Build a new persisted record from a normalized draft.
    pub fn from_draft(tenant_id: i64, draft: &PatientDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            full_name: draft.full_name.clone(),
            phone: draft.phone.clone(),
            cellphone: draft.cellphone.clone(),
            email: draft.email.clone(),
            cpf: draft.cpf.clone(),
            birth_date: draft.birth_date,
            address: draft.address.clone(),
            city: draft.city.clone(),
            state: draft.state.clone(),
            cep: draft.cep.clone(),
            neighborhood: draft.neighborhood.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Output of the extraction engine for one source document.
///
/// Ephemeral: created once per document, consumed by the resolver, never
/// persisted directly. All fields except the name are optional; the engine
/// drops empty/invalid values to `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedPatientRecord {
    pub full_name: String,
    pub phone: Option<String>,
    pub cellphone: Option<String>,
    pub email: Option<String>,
    pub cpf: Option<String>,
    pub birth_date: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub cep: Option<String>,
    pub neighborhood: Option<String>,
}

impl ExtractedPatientRecord {
    /// Placeholder record for a document whose extraction failed.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A record is usable when the name is plausible: at least
    /// [`MIN_NAME_LEN`] characters and free of digits.
    pub fn is_usable(&self) -> bool {
        usable_name(&self.full_name)
    }
}

/// Normalized insert/update candidate: formatters applied, dates parsed,
/// absent fields collapsed to empty strings. Shared by the image, XLSX and
/// preview paths so the resolver sees one shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientDraft {
    pub full_name: String,
    pub phone: String,
    pub cellphone: String,
    pub email: String,
    pub cpf: String,
    pub birth_date: Option<NaiveDate>,
    pub address: String,
    pub city: String,
    pub state: String,
    pub cep: String,
    pub neighborhood: String,
}

impl PatientDraft {
    pub fn is_usable(&self) -> bool {
        usable_name(&self.full_name)
    }
}

fn usable_name(name: &str) -> bool {
    let trimmed = name.trim();
    trimmed.chars().count() >= MIN_NAME_LEN && !trimmed.chars().any(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_name_is_unusable() {
        let rec = ExtractedPatientRecord {
            full_name: "Jo".into(),
            ..Default::default()
        };
        assert!(!rec.is_usable());
    }

    #[test]
    fn name_with_digits_is_unusable() {
        let rec = ExtractedPatientRecord {
            full_name: "Maria 123".into(),
            ..Default::default()
        };
        assert!(!rec.is_usable());
    }

    #[test]
    fn plain_name_is_usable() {
        let rec = ExtractedPatientRecord {
            full_name: "Maria Silva".into(),
            ..Default::default()
        };
        assert!(rec.is_usable());
    }

    #[test]
    fn empty_record_is_unusable() {
        assert!(!ExtractedPatientRecord::empty().is_usable());
    }

    #[test]
    fn patient_from_draft_copies_fields() {
        let draft = PatientDraft {
            full_name: "Maria Silva".into(),
            cpf: "123.456.789-01".into(),
            ..Default::default()
        };
        let now = Utc::now();
        let patient = Patient::from_draft(7, &draft, now);
        assert_eq!(patient.tenant_id, 7);
        assert_eq!(patient.full_name, "Maria Silva");
        assert_eq!(patient.cpf, "123.456.789-01");
        assert_eq!(patient.created_at, now);
        assert_eq!(patient.updated_at, now);
    }
}
