//! Fichário: patient record digitization for dental clinics.
//!
//! Scanned intake forms and spreadsheets go through an OCR + extraction
//! pipeline, get deduplicated against the tenant's patient base, and are
//! billed per digitized record. The HTTP API in [`api`] is the only
//! surface; everything under [`pipeline`] and [`billing`] is plain
//! synchronous Rust over SQLite.

pub mod api;
pub mod billing;
pub mod config;
pub mod db;
pub mod models;
pub mod pipeline;
