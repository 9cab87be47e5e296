//! SQLite-backed catalog store
//!
//! Holds the relational `offers` table (source of truth for all non-vector
//! attributes) and the sibling `offer_vectors` table that persists embedding
//! vectors keyed by the same `link_id`. Both tables are written together
//! inside one transaction per ingestion batch, which is what upholds the
//! snapshot invariant: no record without a vector, no vector without a record.

use crate::catalog::record::{ProductRecord, RawEpc};
use ahash::AHashSet;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Catalog store errors (relational and vector tables alike)
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("catalog database not found: {path}")]
    NotFound { path: PathBuf },

    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("{op} failed: {source}")]
    Query {
        op: &'static str,
        source: rusqlite::Error,
    },

    #[error("{op}: {message}")]
    Corrupt { op: &'static str, message: String },
}

fn query_err(op: &'static str) -> impl FnOnce(rusqlite::Error) -> StoreError {
    move |source| StoreError::Query { op, source }
}

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Catalog schema.
///
/// `epc_7day` and `epc_3month` are declared without a type name so SQLite
/// applies no affinity conversion: the raw catalog value round-trips as
/// REAL, TEXT, or NULL exactly as ingested.
const SCHEMA: &str = r#"
    CREATE TABLE offers (
        link_id INTEGER PRIMARY KEY,
        advertiser TEXT,
        name TEXT,
        description TEXT,
        keywords TEXT,
        category TEXT,
        promotion_type TEXT,
        epc_7day,
        epc_3month,
        click_url TEXT,
        coupon_code TEXT,
        embedding_text TEXT NOT NULL
    );

    CREATE TABLE offer_vectors (
        link_id INTEGER PRIMARY KEY REFERENCES offers(link_id) ON DELETE CASCADE,
        embedding BLOB NOT NULL
    );
"#;

const RECORD_COLUMNS: &str = "link_id, advertiser, name, description, keywords, category, \
     promotion_type, epc_7day, epc_3month, click_url, coupon_code, embedding_text";

/// SQLite catalog store with pooled connections
pub struct CatalogStore {
    pool: DbPool,
}

impl CatalogStore {
    /// Create a fresh catalog database at `path` (staging target for
    /// ingestion). The schema is created from scratch; the file must not
    /// carry a previous catalog.
    pub fn create(path: &Path) -> Result<Self, StoreError> {
        let store = Self::connect(path)?;
        let conn = store.conn()?;
        conn.execute_batch(SCHEMA).map_err(query_err("create schema"))?;
        Ok(store)
    }

    /// Open an existing catalog database read-mostly.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Err(StoreError::NotFound {
                path: path.to_path_buf(),
            });
        }
        Self::connect(path)
    }

    fn connect(path: &Path) -> Result<Self, StoreError> {
        let manager = SqliteConnectionManager::file(path);

        let pool = Pool::builder()
            .max_size(16)
            .build(manager)
            .map_err(|e| StoreError::Pool(e.to_string()))?;

        {
            let conn = pool.get().map_err(|e| StoreError::Pool(e.to_string()))?;

            // WAL for concurrent readers
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA foreign_keys = ON;
                PRAGMA busy_timeout = 5000;
                ",
            )
            .map_err(query_err("configure connection"))?;
        }

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>, StoreError> {
        self.pool.get().map_err(|e| StoreError::Pool(e.to_string()))
    }

    /// Insert one ingestion batch: every record row and its vector row
    /// commit together or not at all.
    pub fn insert_batch(
        &self,
        records: &[ProductRecord],
        vectors: &[Vec<f32>],
    ) -> Result<(), StoreError> {
        debug_assert_eq!(records.len(), vectors.len());

        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err("begin batch"))?;

        {
            let mut insert_offer = tx
                .prepare(&format!(
                    "INSERT INTO offers ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    RECORD_COLUMNS
                ))
                .map_err(query_err("prepare offer insert"))?;
            let mut insert_vector = tx
                .prepare("INSERT INTO offer_vectors (link_id, embedding) VALUES (?1, ?2)")
                .map_err(query_err("prepare vector insert"))?;

            for (record, vector) in records.iter().zip(vectors.iter()) {
                insert_offer
                    .execute(params![
                        record.link_id,
                        record.advertiser,
                        record.name,
                        record.description,
                        record.keywords,
                        record.category,
                        record.promotion_type,
                        record.epc_7day,
                        record.epc_3month,
                        record.click_url,
                        record.coupon_code,
                        record.embedding_text,
                    ])
                    .map_err(query_err("insert offer"))?;
                insert_vector
                    .execute(params![record.link_id, vector_to_blob(vector)])
                    .map_err(query_err("insert vector"))?;
            }
        }

        tx.commit().map_err(query_err("commit batch"))
    }

    /// Build the secondary indexes after bulk load.
    pub fn create_indexes(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute_batch(
            "
            CREATE INDEX IF NOT EXISTS idx_offers_category ON offers(category);
            CREATE INDEX IF NOT EXISTS idx_offers_epc ON offers(epc_7day DESC);
            ",
        )
        .map_err(query_err("create indexes"))
    }

    /// Link ids passing the relational filters, for intersection with the
    /// distance ordering.
    ///
    /// `category` is an exact case-sensitive predicate pushed into SQL;
    /// `min_epc` filters through [`crate::catalog::normalize_epc`] because
    /// currency-formatted raw values only normalize in Rust.
    pub fn eligible_ids(
        &self,
        category: Option<&str>,
        min_epc: Option<f64>,
    ) -> Result<AHashSet<i64>, StoreError> {
        let conn = self.conn()?;

        let (sql, category_param) = match category {
            Some(c) => (
                "SELECT link_id, epc_7day FROM offers WHERE category = ?1",
                Some(c),
            ),
            None => ("SELECT link_id, epc_7day FROM offers", None),
        };

        let mut stmt = conn.prepare(sql).map_err(query_err("prepare filter"))?;

        let map_row = |row: &rusqlite::Row<'_>| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, RawEpc>(1)?))
        };
        let rows = match category_param {
            Some(c) => stmt.query_map(params![c], map_row),
            None => stmt.query_map([], map_row),
        }
        .map_err(query_err("filter offers"))?;

        let mut ids = AHashSet::new();
        for row in rows {
            let (link_id, raw) = row.map_err(query_err("filter offers"))?;
            if let Some(threshold) = min_epc {
                if crate::catalog::normalize_epc(&raw) < threshold {
                    continue;
                }
            }
            ids.insert(link_id);
        }

        Ok(ids)
    }

    /// Fetch full records for the given link ids (candidate hydration).
    /// A missing id means the snapshot invariant is broken and surfaces
    /// as an error rather than a silently shorter result.
    pub fn get_records(&self, ids: &[i64]) -> Result<Vec<ProductRecord>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM offers WHERE link_id = ?1",
                RECORD_COLUMNS
            ))
            .map_err(query_err("prepare hydration"))?;

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            let record = stmt
                .query_row(params![id], row_to_record)
                .map_err(query_err("hydrate offer"))?;
            records.push(record);
        }
        Ok(records)
    }

    /// Records in one category, or the whole catalog.
    pub fn records_in_category(
        &self,
        category: Option<&str>,
    ) -> Result<Vec<ProductRecord>, StoreError> {
        let conn = self.conn()?;

        let (sql, category_param) = match category {
            Some(c) => (
                format!("SELECT {} FROM offers WHERE category = ?1", RECORD_COLUMNS),
                Some(c),
            ),
            None => (format!("SELECT {} FROM offers", RECORD_COLUMNS), None),
        };

        let mut stmt = conn.prepare(&sql).map_err(query_err("prepare listing"))?;
        let rows = match category_param {
            Some(c) => stmt.query_map(params![c], row_to_record),
            None => stmt.query_map([], row_to_record),
        }
        .map_err(query_err("list offers"))?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(query_err("list offers"))
    }

    /// Distinct non-null categories with record counts, ordered by count
    /// descending; ties break by category name ascending (deterministic).
    pub fn categories(&self) -> Result<Vec<(String, i64)>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT category, COUNT(*) AS cnt FROM offers
                 WHERE category IS NOT NULL
                 GROUP BY category
                 ORDER BY cnt DESC, category ASC",
            )
            .map_err(query_err("prepare categories"))?;

        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(query_err("count categories"))?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(query_err("count categories"))
    }

    /// Raw seven-day EPC values for every record where the source had one.
    pub fn non_null_epcs(&self) -> Result<Vec<RawEpc>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT epc_7day FROM offers WHERE epc_7day IS NOT NULL")
            .map_err(query_err("prepare epc scan"))?;

        let rows = stmt
            .query_map([], |row| row.get::<_, RawEpc>(0))
            .map_err(query_err("scan epcs"))?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(query_err("scan epcs"))
    }

    pub fn count_offers(&self) -> Result<i64, StoreError> {
        self.count("SELECT COUNT(*) FROM offers", "count offers")
    }

    pub fn count_vectors(&self) -> Result<i64, StoreError> {
        self.count("SELECT COUNT(*) FROM offer_vectors", "count vectors")
    }

    pub fn count_coupons(&self) -> Result<i64, StoreError> {
        self.count(
            "SELECT COUNT(*) FROM offers WHERE coupon_code IS NOT NULL",
            "count coupons",
        )
    }

    pub fn count_categories(&self) -> Result<i64, StoreError> {
        self.count(
            "SELECT COUNT(DISTINCT category) FROM offers WHERE category IS NOT NULL",
            "count categories",
        )
    }

    fn count(&self, sql: &str, op: &'static str) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        conn.query_row(sql, [], |row| row.get(0))
            .map_err(query_err(op))
    }

    /// Load every persisted vector for the in-memory index.
    pub fn load_vectors(&self) -> Result<Vec<(i64, Vec<f32>)>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT link_id, embedding FROM offer_vectors")
            .map_err(query_err("prepare vector load"))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?))
            })
            .map_err(query_err("load vectors"))?;

        let mut vectors = Vec::new();
        for row in rows {
            let (link_id, blob) = row.map_err(query_err("load vectors"))?;
            vectors.push((link_id, blob_to_vector(&blob)?));
        }
        Ok(vectors)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProductRecord> {
    Ok(ProductRecord {
        link_id: row.get(0)?,
        advertiser: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        keywords: row.get(4)?,
        category: row.get(5)?,
        promotion_type: row.get(6)?,
        epc_7day: row.get(7)?,
        epc_3month: row.get(8)?,
        click_url: row.get(9)?,
        coupon_code: row.get(10)?,
        embedding_text: row.get(11)?,
    })
}

/// Encode an embedding vector as little-endian f32 bytes.
pub fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

/// Decode a persisted embedding blob.
pub fn blob_to_vector(blob: &[u8]) -> Result<Vec<f32>, StoreError> {
    if blob.len() % 4 != 0 {
        return Err(StoreError::Corrupt {
            op: "decode vector",
            message: format!("blob length {} is not a multiple of 4", blob.len()),
        });
    }
    Ok(blob
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}
