//! Catalog ingestion pipeline
//!
//! Consumes raw catalog rows and produces a fully populated catalog store
//! plus vector index, or fails the run. The pipeline builds into a staging
//! database and atomically renames it over the live path on success, so
//! query processes never observe a half-built catalog and a failed run
//! leaves the previous catalog current.

pub mod source;

pub use source::SourceRow;

use crate::catalog::{staging_path, CatalogStore, ProductRecord, StoreError};
use crate::embedding::{EmbeddingError, EmbeddingProvider};
use ahash::AHashSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::info;

/// Default rows per embedding batch
pub const DEFAULT_BATCH_SIZE: usize = 100;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Catalog source error: {0}")]
    Source(#[from] csv::Error),

    #[error("Batch {batch} failed: {source}")]
    Batch {
        batch: usize,
        source: EmbeddingError,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    #[error("Another ingestion run appears to be in progress (staging file exists: {path})")]
    StagingInProgress { path: PathBuf },
}

/// Result of an ingestion run
#[derive(Debug)]
pub struct IngestReport {
    pub source_rows: usize,
    pub duplicates: usize,
    pub ingested: usize,
    pub batches: usize,
    pub duration_ms: u64,
}

/// Batch ingestion pipeline.
///
/// A single-run process: it owns exclusive write access to the staging
/// store for its duration, and the staging file doubles as the guard that
/// keeps two runs from racing to rebuild the same catalog.
pub struct IngestionPipeline {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl IngestionPipeline {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
        }
    }

    /// Ingest a CSV file into the catalog at `live_db`.
    pub fn run_file(&self, csv_path: &Path, live_db: &Path) -> Result<IngestReport, IngestError> {
        let file = std::fs::File::open(csv_path).map_err(|e| IngestError::Io {
            source: e,
            context: format!("Failed to open catalog source: {}", csv_path.display()),
        })?;
        self.run(file, live_db)
    }

    /// Ingest rows from any CSV source into the catalog at `live_db`.
    pub fn run<R: Read>(&self, source: R, live_db: &Path) -> Result<IngestReport, IngestError> {
        let start = Instant::now();

        let rows = source::read_rows(source)?;
        let source_rows = rows.len();

        // Deduplicate by link id, keeping the first occurrence in source
        // order; later duplicates are dropped silently (policy, not error).
        let mut seen = AHashSet::with_capacity(rows.len());
        let mut records: Vec<ProductRecord> = Vec::with_capacity(rows.len());
        for row in rows {
            if seen.insert(row.link_id) {
                records.push(row.into_record());
            }
        }
        let duplicates = source_rows - records.len();
        if duplicates > 0 {
            info!("Dropped {} duplicate rows by link id", duplicates);
        }

        if let Some(parent) = live_db.parent() {
            std::fs::create_dir_all(parent).map_err(|e| IngestError::Io {
                source: e,
                context: format!("Failed to create catalog directory: {}", parent.display()),
            })?;
        }

        let staging = staging_path(live_db);
        if staging.exists() {
            return Err(IngestError::StagingInProgress { path: staging });
        }

        info!(
            "Ingesting {} rows into staging catalog ({} per batch)",
            records.len(),
            self.batch_size
        );

        let batches = match self.build(&records, &staging) {
            Ok(batches) => batches,
            Err(e) => {
                remove_staging(&staging);
                return Err(e);
            }
        };

        // Atomic swap of the live store pointer
        std::fs::rename(&staging, live_db).map_err(|e| IngestError::Io {
            source: e,
            context: format!(
                "Failed to swap staging catalog into place: {}",
                live_db.display()
            ),
        })?;

        let report = IngestReport {
            source_rows,
            duplicates,
            ingested: records.len(),
            batches,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            "Ingestion complete: {} rows in {} batches ({} duplicates dropped, {}ms)",
            report.ingested, report.batches, report.duplicates, report.duration_ms
        );

        Ok(report)
    }

    /// Embed and write every batch into the staging store, then build the
    /// secondary indexes. The store handle drops before return so the WAL
    /// checkpoints ahead of the rename.
    fn build(&self, records: &[ProductRecord], staging: &Path) -> Result<usize, IngestError> {
        let store = CatalogStore::create(staging)?;

        let total_batches = records.len().div_ceil(self.batch_size);
        let mut batches = 0usize;

        for (i, chunk) in records.chunks(self.batch_size).enumerate() {
            let batch_no = i + 1;
            let texts: Vec<String> = chunk.iter().map(|r| r.embedding_text.clone()).collect();

            let vectors = self
                .provider
                .embed_batch(&texts)
                .map_err(|source| IngestError::Batch {
                    batch: batch_no,
                    source,
                })?;

            if vectors.len() != chunk.len() {
                return Err(IngestError::Batch {
                    batch: batch_no,
                    source: EmbeddingError::CountMismatch {
                        expected: chunk.len(),
                        actual: vectors.len(),
                    },
                });
            }

            store.insert_batch(chunk, &vectors)?;
            batches += 1;
            info!(
                "Ingested batch {}/{} ({} rows)",
                batch_no,
                total_batches,
                chunk.len()
            );
        }

        store.create_indexes()?;
        Ok(batches)
    }
}

/// Best-effort cleanup of a failed run's staging database and its WAL
/// side files.
fn remove_staging(staging: &Path) {
    for suffix in ["", "-wal", "-shm"] {
        let mut name = staging.as_os_str().to_os_string();
        name.push(suffix);
        let _ = std::fs::remove_file(PathBuf::from(name));
    }
}
