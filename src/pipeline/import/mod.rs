pub mod importer;
pub mod xlsx;

pub use importer::*;

use thiserror::Error;

use crate::billing::BillingError;
use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error(transparent)]
    Billing(#[from] BillingError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Spreadsheet error: {0}")]
    Xlsx(String),
}
