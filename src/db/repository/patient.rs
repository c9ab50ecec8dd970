//! Tenant-scoped patient persistence.
//!
//! Besides plain CRUD this module carries the three match lookups the dedup
//! resolver probes in priority order: CPF, email, name + phone. Each lookup
//! only fires when the probe value is non-empty — blank fields never match
//! other blank fields.

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::Patient;

pub fn insert_patient(conn: &Connection, patient: &Patient) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO patients (id, tenant_id, full_name, phone, cellphone, email, cpf,
         birth_date, address, city, state, cep, neighborhood, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            patient.id.to_string(),
            patient.tenant_id,
            patient.full_name,
            patient.phone,
            patient.cellphone,
            patient.email,
            patient.cpf,
            patient.birth_date.map(|d| d.to_string()),
            patient.address,
            patient.city,
            patient.state,
            patient.cep,
            patient.neighborhood,
            patient.created_at,
            patient.updated_at,
        ],
    )?;
    Ok(())
}

pub fn update_patient(conn: &Connection, patient: &Patient) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE patients SET full_name = ?1, phone = ?2, cellphone = ?3, email = ?4,
         cpf = ?5, birth_date = ?6, address = ?7, city = ?8, state = ?9, cep = ?10,
         neighborhood = ?11, updated_at = ?12
         WHERE id = ?13 AND tenant_id = ?14",
        params![
            patient.full_name,
            patient.phone,
            patient.cellphone,
            patient.email,
            patient.cpf,
            patient.birth_date.map(|d| d.to_string()),
            patient.address,
            patient.city,
            patient.state,
            patient.cep,
            patient.neighborhood,
            patient.updated_at,
            patient.id.to_string(),
            patient.tenant_id,
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "patient".into(),
            id: patient.id.to_string(),
        });
    }
    Ok(())
}

pub fn get_patient(
    conn: &Connection,
    tenant_id: i64,
    id: Uuid,
) -> Result<Option<Patient>, DatabaseError> {
    conn.query_row(
        &format!("{SELECT_PATIENT} WHERE id = ?1 AND tenant_id = ?2"),
        params![id.to_string(), tenant_id],
        map_patient,
    )
    .optional()
    .map_err(Into::into)
}

/// Exact CPF match within the tenant. Highest-confidence identifier.
pub fn find_by_cpf(
    conn: &Connection,
    tenant_id: i64,
    cpf: &str,
) -> Result<Option<Patient>, DatabaseError> {
    conn.query_row(
        &format!("{SELECT_PATIENT} WHERE tenant_id = ?1 AND cpf = ?2 AND cpf != '' LIMIT 1"),
        params![tenant_id, cpf],
        map_patient,
    )
    .optional()
    .map_err(Into::into)
}

pub fn find_by_email(
    conn: &Connection,
    tenant_id: i64,
    email: &str,
) -> Result<Option<Patient>, DatabaseError> {
    conn.query_row(
        &format!("{SELECT_PATIENT} WHERE tenant_id = ?1 AND email = ?2 AND email != '' LIMIT 1"),
        params![tenant_id, email],
        map_patient,
    )
    .optional()
    .map_err(Into::into)
}

/// Name + phone match: the probe phone may match either the landline or the
/// mobile column of the stored record.
pub fn find_by_name_and_phone(
    conn: &Connection,
    tenant_id: i64,
    full_name: &str,
    phone: &str,
) -> Result<Option<Patient>, DatabaseError> {
    conn.query_row(
        &format!(
            "{SELECT_PATIENT} WHERE tenant_id = ?1 AND full_name = ?2
             AND (phone = ?3 OR cellphone = ?3) AND ?3 != '' LIMIT 1"
        ),
        params![tenant_id, full_name, phone],
        map_patient,
    )
    .optional()
    .map_err(Into::into)
}

pub fn count_patients(conn: &Connection, tenant_id: i64) -> Result<i64, DatabaseError> {
    conn.query_row(
        "SELECT COUNT(*) FROM patients WHERE tenant_id = ?1",
        params![tenant_id],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

const SELECT_PATIENT: &str = "SELECT id, tenant_id, full_name, phone, cellphone, email, cpf,
    birth_date, address, city, state, cep, neighborhood, created_at, updated_at FROM patients";

fn map_patient(row: &Row<'_>) -> rusqlite::Result<Patient> {
    let id: String = row.get(0)?;
    let birth_date: Option<String> = row.get(7)?;
    Ok(Patient {
        id: Uuid::parse_str(&id).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?,
        tenant_id: row.get(1)?,
        full_name: row.get(2)?,
        phone: row.get(3)?,
        cellphone: row.get(4)?,
        email: row.get(5)?,
        cpf: row.get(6)?,
        birth_date: birth_date.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
        address: row.get(8)?,
        city: row.get(9)?,
        state: row.get(10)?,
        cep: row.get(11)?,
        neighborhood: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}
