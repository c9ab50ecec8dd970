//! Spreadsheet ingestion: XLSX/XLS rows to normalized patient drafts.
//!
//! The first row is the header. Column meaning is resolved by a synonym
//! table over the normalized header text, so "Nome", "Nome Completo" and
//! "fullName" all land in the same field. Unrecognized columns are ignored.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};

use super::ImportError;
use crate::models::PatientDraft;
use crate::pipeline::extraction::format::{
    format_cep, format_cpf, format_phone, parse_birth_date,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    FullName,
    Phone,
    Cellphone,
    Email,
    Cpf,
    BirthDate,
    Address,
    City,
    State,
    Cep,
    Neighborhood,
}

/// Normalized header text to column meaning.
const HEADER_SYNONYMS: &[(&str, Column)] = &[
    ("nome", Column::FullName),
    ("nome completo", Column::FullName),
    ("nome do paciente", Column::FullName),
    ("paciente", Column::FullName),
    ("fullname", Column::FullName),
    ("full name", Column::FullName),
    ("telefone", Column::Phone),
    ("telefone fixo", Column::Phone),
    ("fone", Column::Phone),
    ("phone", Column::Phone),
    ("celular", Column::Cellphone),
    ("telefone celular", Column::Cellphone),
    ("whatsapp", Column::Cellphone),
    ("cellphone", Column::Cellphone),
    ("email", Column::Email),
    ("e-mail", Column::Email),
    ("cpf", Column::Cpf),
    ("data de nascimento", Column::BirthDate),
    ("data nascimento", Column::BirthDate),
    ("nascimento", Column::BirthDate),
    ("birthdate", Column::BirthDate),
    ("endereco", Column::Address),
    ("endereço", Column::Address),
    ("logradouro", Column::Address),
    ("address", Column::Address),
    ("cidade", Column::City),
    ("city", Column::City),
    ("estado", Column::State),
    ("uf", Column::State),
    ("state", Column::State),
    ("cep", Column::Cep),
    ("bairro", Column::Neighborhood),
    ("neighborhood", Column::Neighborhood),
];

/// Read all rows of the first worksheet.
pub fn read_records(path: &Path) -> Result<Vec<Vec<Data>>, ImportError> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| ImportError::Xlsx(e.to_string()))?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| ImportError::Xlsx("workbook has no sheets".into()))?;
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| ImportError::Xlsx(e.to_string()))?;

    Ok(range.rows().map(|row| row.to_vec()).collect())
}

/// Turn a header row plus data rows into normalized drafts, one per data
/// row, in sheet order. Rows that map no recognized column at all still
/// produce an (unusable) draft so row numbers stay aligned.
pub fn rows_to_drafts(rows: &[Vec<Data>]) -> Vec<PatientDraft> {
    let Some((header, data_rows)) = rows.split_first() else {
        return Vec::new();
    };

    let columns: Vec<Option<Column>> = header
        .iter()
        .map(|cell| resolve_header(&cell_to_string(cell)))
        .collect();

    data_rows
        .iter()
        .map(|row| {
            let mut draft = PatientDraft::default();
            for (i, cell) in row.iter().enumerate() {
                let Some(Some(column)) = columns.get(i) else {
                    continue;
                };
                let value = cell_to_string(cell);
                if value.is_empty() {
                    continue;
                }
                match column {
                    Column::FullName => draft.full_name = value,
                    Column::Phone => draft.phone = format_phone(&value),
                    Column::Cellphone => draft.cellphone = format_phone(&value),
                    Column::Email => draft.email = value,
                    Column::Cpf => draft.cpf = format_cpf(&value),
                    Column::BirthDate => draft.birth_date = parse_birth_date(&value),
                    Column::Address => draft.address = value,
                    Column::City => draft.city = value,
                    Column::State => draft.state = value.to_uppercase(),
                    Column::Cep => draft.cep = format_cep(&value),
                    Column::Neighborhood => draft.neighborhood = value,
                }
            }
            draft
        })
        .collect()
}

fn resolve_header(header: &str) -> Option<Column> {
    let normalized = header.trim().to_lowercase();
    HEADER_SYNONYMS
        .iter()
        .find(|(name, _)| *name == normalized)
        .map(|(_, column)| *column)
}

/// Render a cell as trimmed text. Numeric cells drop a trailing `.0` so
/// phone and document numbers survive Excel's float storage.
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.format("%d/%m/%Y").to_string())
            .unwrap_or_default(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::Error(_) | Data::Empty => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn s(value: &str) -> Data {
        Data::String(value.to_string())
    }

    #[test]
    fn header_synonyms_map_to_same_field() {
        let for_header = |h: &str| {
            let rows = vec![vec![s(h)], vec![s("Maria Silva")]];
            rows_to_drafts(&rows)[0].full_name.clone()
        };
        assert_eq!(for_header("Nome"), "Maria Silva");
        assert_eq!(for_header("Nome Completo"), "Maria Silva");
        assert_eq!(for_header("  fullName  "), "Maria Silva");
    }

    #[test]
    fn full_row_is_normalized() {
        let rows = vec![
            vec![
                s("Nome"),
                s("CPF"),
                s("Celular"),
                s("Data de Nascimento"),
                s("CEP"),
                s("UF"),
            ],
            vec![
                s("Maria Silva"),
                s("12345678901"),
                s("11988887777"),
                s("17/05/1990"),
                s("01310100"),
                s("sp"),
            ],
        ];
        let drafts = rows_to_drafts(&rows);
        assert_eq!(drafts.len(), 1);
        let draft = &drafts[0];
        assert_eq!(draft.cpf, "123.456.789-01");
        assert_eq!(draft.cellphone, "(11) 98888-7777");
        assert_eq!(draft.birth_date, NaiveDate::from_ymd_opt(1990, 5, 17));
        assert_eq!(draft.cep, "01310-100");
        assert_eq!(draft.state, "SP");
    }

    #[test]
    fn numeric_cpf_cell_survives_float_storage() {
        let rows = vec![
            vec![s("Nome"), s("CPF")],
            vec![s("Maria Silva"), Data::Float(12345678901.0)],
        ];
        let drafts = rows_to_drafts(&rows);
        assert_eq!(drafts[0].cpf, "123.456.789-01");
    }

    #[test]
    fn unknown_columns_are_ignored() {
        let rows = vec![
            vec![s("Nome"), s("Observações")],
            vec![s("Maria Silva"), s("alergia a penicilina")],
        ];
        let drafts = rows_to_drafts(&rows);
        assert_eq!(drafts[0].full_name, "Maria Silva");
        assert!(drafts[0].address.is_empty());
    }

    #[test]
    fn short_rows_and_empty_cells_are_tolerated() {
        let rows = vec![
            vec![s("Nome"), s("Email"), s("Cidade")],
            vec![s("Maria Silva")],
            vec![s("João Souza"), Data::Empty, s("Campinas")],
        ];
        let drafts = rows_to_drafts(&rows);
        assert_eq!(drafts.len(), 2);
        assert!(drafts[0].email.is_empty());
        assert_eq!(drafts[1].city, "Campinas");
    }

    #[test]
    fn empty_sheet_yields_no_drafts() {
        assert!(rows_to_drafts(&[]).is_empty());
        // Header only, no data rows
        let rows = vec![vec![s("Nome")]];
        assert!(rows_to_drafts(&rows).is_empty());
    }

    #[test]
    fn nameless_row_stays_in_position() {
        let rows = vec![
            vec![s("Nome"), s("Cidade")],
            vec![Data::Empty, s("Campinas")],
            vec![s("Maria Silva"), s("Santos")],
        ];
        let drafts = rows_to_drafts(&rows);
        assert!(!drafts[0].is_usable());
        assert!(drafts[1].is_usable());
    }
}
