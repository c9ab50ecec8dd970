pub mod billing;
pub mod patient;
