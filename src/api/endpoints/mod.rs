pub mod billing;
pub mod duplicates;
pub mod health;
pub mod import;
