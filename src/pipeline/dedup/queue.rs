//! One-at-a-time review queue for flagged duplicates.
//!
//! A preview run parks every flagged draft here in extraction order. The
//! review endpoints only ever expose the head of the queue; resolving the
//! head pops it and reveals the next item.

use std::collections::VecDeque;

use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{merge_patient_data, DuplicateMatch, MergeOptions, Resolution};
use crate::db::repository::patient as patients;
use crate::db::DatabaseError;
use crate::models::{Patient, PatientDraft};

/// A draft waiting for a human decision, paired with the match that
/// flagged it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingDuplicate {
    pub draft: PatientDraft,
    #[serde(rename = "match")]
    pub duplicate: DuplicateMatch,
}

/// What the reviewer chose for the head of the queue.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case", tag = "decision")]
pub enum ResolutionDecision {
    /// Merge the draft into a specific existing patient.
    Merge {
        #[serde(rename = "existingPatientId")]
        existing_patient_id: Uuid,
    },
    /// Ignore the match and create a new patient from the draft.
    New,
    /// Discard the draft.
    Skip,
}

/// FIFO queue of pending duplicates for one tenant.
#[derive(Debug, Default)]
pub struct DuplicateQueue {
    items: VecDeque<PendingDuplicate>,
}

impl DuplicateQueue {
    pub fn new(items: Vec<PendingDuplicate>) -> Self {
        Self {
            items: items.into(),
        }
    }

    /// The item under review. Only this one may be resolved.
    pub fn current(&self) -> Option<&PendingDuplicate> {
        self.items.front()
    }

    pub fn pop_current(&mut self) -> Option<PendingDuplicate> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Apply a reviewer's decision for one pending duplicate.
pub fn apply_resolution(
    conn: &Connection,
    tenant_id: i64,
    pending: &PendingDuplicate,
    decision: ResolutionDecision,
    options: MergeOptions,
) -> Result<Resolution, DatabaseError> {
    match decision {
        ResolutionDecision::Skip => Ok(Resolution::Skipped),
        ResolutionDecision::New => {
            let patient = Patient::from_draft(tenant_id, &pending.draft, Utc::now());
            patients::insert_patient(conn, &patient)?;
            Ok(Resolution::Created { patient })
        }
        ResolutionDecision::Merge {
            existing_patient_id,
        } => {
            let existing = patients::get_patient(conn, tenant_id, existing_patient_id)?.ok_or(
                DatabaseError::NotFound {
                    entity_type: "patient".into(),
                    id: existing_patient_id.to_string(),
                },
            )?;
            let merged = merge_patient_data(&existing, &pending.draft, options);
            patients::update_patient(conn, &merged)?;
            Ok(Resolution::Updated { patient: merged })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::pipeline::dedup::MatchReason;

    fn pending(draft_name: &str, existing: Patient) -> PendingDuplicate {
        PendingDuplicate {
            draft: PatientDraft {
                full_name: draft_name.into(),
                email: "maria@example.com".into(),
                ..Default::default()
            },
            duplicate: DuplicateMatch::new(existing, MatchReason::Email),
        }
    }

    fn stored(conn: &Connection, name: &str) -> Patient {
        let patient = Patient::from_draft(
            1,
            &PatientDraft {
                full_name: name.into(),
                ..Default::default()
            },
            Utc::now(),
        );
        patients::insert_patient(conn, &patient).unwrap();
        patient
    }

    #[test]
    fn queue_exposes_only_the_head() {
        let conn = open_memory_database().unwrap();
        let a = stored(&conn, "Ana Costa");
        let b = stored(&conn, "Beatriz Lima");
        let mut queue = DuplicateQueue::new(vec![
            pending("Maria Silva", a),
            pending("João Souza", b),
        ]);

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.current().unwrap().draft.full_name, "Maria Silva");

        queue.pop_current();
        assert_eq!(queue.current().unwrap().draft.full_name, "João Souza");

        queue.pop_current();
        assert!(queue.current().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn skip_leaves_database_untouched() {
        let conn = open_memory_database().unwrap();
        let existing = stored(&conn, "Ana Costa");
        let item = pending("Maria Silva", existing);

        let result = apply_resolution(
            &conn,
            1,
            &item,
            ResolutionDecision::Skip,
            MergeOptions::default(),
        )
        .unwrap();
        assert!(matches!(result, Resolution::Skipped));
        assert_eq!(patients::count_patients(&conn, 1).unwrap(), 1);
    }

    #[test]
    fn new_creates_a_separate_patient() {
        let conn = open_memory_database().unwrap();
        let existing = stored(&conn, "Ana Costa");
        let item = pending("Maria Silva", existing);

        let result = apply_resolution(
            &conn,
            1,
            &item,
            ResolutionDecision::New,
            MergeOptions::default(),
        )
        .unwrap();
        match result {
            Resolution::Created { patient } => assert_eq!(patient.full_name, "Maria Silva"),
            other => panic!("expected created, got {other:?}"),
        }
        assert_eq!(patients::count_patients(&conn, 1).unwrap(), 2);
    }

    #[test]
    fn merge_updates_the_chosen_patient() {
        let conn = open_memory_database().unwrap();
        let existing = stored(&conn, "Ana Costa");
        let item = pending("Maria Silva", existing.clone());

        let result = apply_resolution(
            &conn,
            1,
            &item,
            ResolutionDecision::Merge {
                existing_patient_id: existing.id,
            },
            MergeOptions::default(),
        )
        .unwrap();
        match result {
            Resolution::Updated { patient } => {
                assert_eq!(patient.id, existing.id);
                assert_eq!(patient.email, "maria@example.com");
            }
            other => panic!("expected updated, got {other:?}"),
        }
        assert_eq!(patients::count_patients(&conn, 1).unwrap(), 1);
    }

    #[test]
    fn merge_into_missing_patient_is_not_found() {
        let conn = open_memory_database().unwrap();
        let existing = stored(&conn, "Ana Costa");
        let item = pending("Maria Silva", existing);

        let err = apply_resolution(
            &conn,
            1,
            &item,
            ResolutionDecision::Merge {
                existing_patient_id: Uuid::new_v4(),
            },
            MergeOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[test]
    fn decision_deserializes_from_api_shape() {
        let decision: ResolutionDecision =
            serde_json::from_str(r#"{"decision": "skip"}"#).unwrap();
        assert!(matches!(decision, ResolutionDecision::Skip));

        let id = Uuid::new_v4();
        let decision: ResolutionDecision = serde_json::from_str(&format!(
            r#"{{"decision": "merge", "existingPatientId": "{id}"}}"#
        ))
        .unwrap();
        match decision {
            ResolutionDecision::Merge {
                existing_patient_id,
            } => assert_eq!(existing_patient_id, id),
            other => panic!("expected merge, got {other:?}"),
        }
    }
}
