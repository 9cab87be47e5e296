//! Ingestion pipeline integration tests: deduplication, the cross-store
//! snapshot invariant, batch-failure behavior, and run serialization.

mod common;

use common::{FailingProvider, MockProvider};
use offerdex::catalog::{staging_path, CatalogStore};
use offerdex::ingest::{IngestError, IngestionPipeline};
use std::sync::Arc;
use tempfile::TempDir;

const HEADER: &str = "LINK ID,ADVERTISER,NAME,DESCRIPTION,KEYWORDS,CATEGORY,PROMOTION TYPE,SEVEN DAY EPC,THREE MONTH EPC,CLICK URL,COUPON CODE\n";

fn catalog_csv(rows: &[&str]) -> String {
    let mut csv = HEADER.to_string();
    for row in rows {
        csv.push_str(row);
        csv.push('\n');
    }
    csv
}

fn pipeline(batch_size: usize) -> IngestionPipeline {
    IngestionPipeline::new(Arc::new(MockProvider), batch_size)
}

#[test]
fn test_ingestion_populates_both_stores() {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("catalog.db");

    let csv = catalog_csv(&[
        "1,Acme,Cooking Book,Recipes to read,book,Books,Sale,$2.00 USD,,https://example.com/1,",
        "2,Acme,Novel Reader,A novel,book,Books,,1.50,,https://example.com/2,SAVE5",
        "3,Acme,Laptop Stand,For gadgets,tech,Tech,,,,https://example.com/3,",
    ]);

    let report = pipeline(100).run(csv.as_bytes(), &db).unwrap();
    assert_eq!(report.source_rows, 3);
    assert_eq!(report.duplicates, 0);
    assert_eq!(report.ingested, 3);
    assert_eq!(report.batches, 1);

    let store = CatalogStore::open(&db).unwrap();
    assert_eq!(store.count_offers().unwrap(), 3);
    assert_eq!(store.count_vectors().unwrap(), 3);

    // every record has exactly one vector and vice versa
    let record_ids = store.eligible_ids(None, None).unwrap();
    let vector_ids: Vec<i64> = store
        .load_vectors()
        .unwrap()
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    assert_eq!(record_ids.len(), vector_ids.len());
    for id in &vector_ids {
        assert!(record_ids.contains(id));
    }

    // no staging leftovers after a successful swap
    assert!(!staging_path(&db).exists());
}

#[test]
fn test_deduplication_keeps_first_occurrence() {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("catalog.db");

    let csv = catalog_csv(&[
        "7,Acme,First Name,,,Books,,1.00,,https://example.com/first,",
        "7,Acme,Second Name,,,Books,,9.00,,https://example.com/second,",
    ]);

    let report = pipeline(100).run(csv.as_bytes(), &db).unwrap();
    assert_eq!(report.source_rows, 2);
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.ingested, 1);

    let store = CatalogStore::open(&db).unwrap();
    let records = store.get_records(&[7]).unwrap();
    assert_eq!(records[0].name.as_deref(), Some("First Name"));
    assert_eq!(records[0].click_url.as_deref(), Some("https://example.com/first"));
}

#[test]
fn test_reingestion_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("catalog.db");

    let csv = catalog_csv(&[
        "1,Acme,Cooking Book,,,Books,,2.00,,https://example.com/1,",
        "2,Acme,Novel Reader,,,Books,,1.50,,https://example.com/2,",
    ]);

    pipeline(100).run(csv.as_bytes(), &db).unwrap();
    let report = pipeline(100).run(csv.as_bytes(), &db).unwrap();
    assert_eq!(report.ingested, 2);

    let store = CatalogStore::open(&db).unwrap();
    assert_eq!(store.count_offers().unwrap(), 2);
    assert_eq!(store.count_vectors().unwrap(), 2);

    // embedding text re-derives identically after a round trip
    let records = store.get_records(&[1, 2]).unwrap();
    for record in records {
        assert_eq!(record.embedding_text, record.derive_embedding_text());
    }
}

#[test]
fn test_batch_failure_aborts_and_preserves_live_catalog() {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("catalog.db");

    let first = catalog_csv(&[
        "1,Acme,Cooking Book,,,Books,,2.00,,https://example.com/1,",
    ]);
    pipeline(100).run(first.as_bytes(), &db).unwrap();

    // second run fails on its second batch; the live catalog must not change
    let second = catalog_csv(&[
        "10,Acme,A,,,Books,,1.00,,https://example.com/10,",
        "11,Acme,B,,,Books,,1.00,,https://example.com/11,",
        "12,Acme,C,,,Books,,1.00,,https://example.com/12,",
    ]);
    let failing = IngestionPipeline::new(Arc::new(FailingProvider::new(1)), 2);
    let result = failing.run(second.as_bytes(), &db);

    match result {
        Err(IngestError::Batch { batch, .. }) => assert_eq!(batch, 2),
        other => panic!("expected batch failure, got {:?}", other.map(|_| ())),
    }

    // staging cleaned up, previous catalog still current
    assert!(!staging_path(&db).exists());
    let store = CatalogStore::open(&db).unwrap();
    assert_eq!(store.count_offers().unwrap(), 1);
    let records = store.get_records(&[1]).unwrap();
    assert_eq!(records[0].name.as_deref(), Some("Cooking Book"));
}

#[test]
fn test_concurrent_run_guard() {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("catalog.db");

    // a staging file means another run is mid-rebuild
    std::fs::write(staging_path(&db), b"").unwrap();

    let csv = catalog_csv(&["1,Acme,Widget,,,Books,,1.00,,https://example.com/1,"]);
    let result = pipeline(100).run(csv.as_bytes(), &db);
    assert!(matches!(result, Err(IngestError::StagingInProgress { .. })));
}

#[test]
fn test_batching_splits_rows() {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("catalog.db");

    let rows: Vec<String> = (1..=5)
        .map(|i| format!("{i},Acme,Product {i},,,Books,,1.00,,https://example.com/{i},"))
        .collect();
    let row_refs: Vec<&str> = rows.iter().map(String::as_str).collect();
    let csv = catalog_csv(&row_refs);

    let report = pipeline(2).run(csv.as_bytes(), &db).unwrap();
    assert_eq!(report.batches, 3);
    assert_eq!(report.ingested, 5);

    let store = CatalogStore::open(&db).unwrap();
    assert_eq!(store.count_offers().unwrap(), 5);
    assert_eq!(store.count_vectors().unwrap(), 5);
}

#[test]
fn test_empty_source_yields_empty_catalog() {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("catalog.db");

    let report = pipeline(100).run(HEADER.as_bytes(), &db).unwrap();
    assert_eq!(report.ingested, 0);
    assert_eq!(report.batches, 0);

    let store = CatalogStore::open(&db).unwrap();
    assert_eq!(store.count_offers().unwrap(), 0);
    assert_eq!(store.count_vectors().unwrap(), 0);
}
