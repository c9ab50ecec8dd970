pub mod dedup;
pub mod extraction;
pub mod import;
pub mod ocr;
