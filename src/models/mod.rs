pub mod billing;
pub mod patient;

pub use billing::*;
pub use patient::*;
