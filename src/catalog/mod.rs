//! Catalog storage layer
//!
//! Relational product records plus the persisted embedding vectors, both
//! living in one SQLite database so a single transaction can cover them.

pub mod record;
pub mod store;

pub use record::{normalize_epc, ProductRecord, RawEpc};
pub use store::{CatalogStore, StoreError};

use std::path::{Path, PathBuf};

/// Staging sibling of the live catalog path.
///
/// Ingestion builds into this file and atomically renames it over the live
/// path on success, so concurrent readers never observe a half-built store.
/// Its presence doubles as the guard that serializes ingestion runs.
pub fn staging_path(live: &Path) -> PathBuf {
    let mut name = live
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "catalog.db".into());
    name.push(".staging");
    live.with_file_name(name)
}
