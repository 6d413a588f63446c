//! Durable storage for district records and the region registry.
//!
//! `RecordStore` keeps one JSON file per `(region, period)` under
//! `<data_dir>/records/` plus a `regions.json` registry. The store may be
//! unavailable (the directory could not be created, or went away); every
//! operation checks this first and answers with absent, no-op or zero so the
//! pipeline can move on to the next tier.

pub mod records;
pub mod regions;

use thiserror::Error;

pub use records::{RecordStore, StoredRecord};

/// Failures inside the store. Logged and absorbed by the public methods.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record store is unavailable")]
    Unavailable,

    #[error("Store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stored JSON is invalid: {0}")]
    Json(#[from] serde_json::Error),
}
