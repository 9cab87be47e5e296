//! Semantic query engine
//!
//! Holds the handles every operation needs (catalog store, vector index,
//! embedding provider), constructed once and passed to every call. All four
//! operations are read-only against the stores and may run concurrently.

use crate::catalog::{normalize_epc, CatalogStore, ProductRecord, StoreError};
use crate::embedding::{EmbeddingError, EmbeddingProvider, VectorIndex, VectorIndexError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Default result count for search
pub const DEFAULT_SEARCH_LIMIT: usize = 5;
/// Default result count for top products
pub const DEFAULT_TOP_LIMIT: usize = 10;
/// Categories included in the stats summary
const STATS_TOP_CATEGORIES: usize = 5;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Embedding provider failed: {0}")]
    Provider(#[from] EmbeddingError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Vector search failed: {0}")]
    VectorSearch(#[from] VectorIndexError),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

/// Search request with optional filters.
///
/// Optional-argument shape issues (absent or non-positive limit) normalize
/// to the documented defaults; only a structurally empty query text is an
/// error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Free-text query
    pub query: String,

    /// Maximum number of results (default 5)
    pub limit: Option<i64>,

    /// Keep only records with normalized EPC at or above this threshold
    pub min_epc: Option<f64>,

    /// Keep only records in this exact category (case-sensitive)
    pub category: Option<String>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: None,
            min_epc: None,
            category: None,
        }
    }
}

/// One shaped product result.
///
/// `url` is the ingested click URL verbatim; `epc` is the normalized
/// seven-day earnings; `relevance` is present only for semantic search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductResult {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub url: Option<String>,
    pub coupon: Option<String>,
    pub epc: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance: Option<f64>,
}

/// A category with its record count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: String,
    pub product_count: i64,
}

/// Aggregate catalog statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogStats {
    pub total_products: i64,
    pub categories: i64,
    pub average_epc: f64,
    pub products_with_coupons: i64,
    pub top_categories: Vec<CategoryCount>,
}

/// Query engine over a populated catalog.
pub struct Engine {
    store: CatalogStore,
    vectors: VectorIndex,
    provider: Arc<dyn EmbeddingProvider>,
}

impl Engine {
    /// Open the live catalog and load its persisted vectors into the
    /// in-memory index.
    pub fn open(db_path: &Path, provider: Arc<dyn EmbeddingProvider>) -> crate::Result<Self> {
        let store = CatalogStore::open(db_path)?;
        let vectors = VectorIndex::new(provider.dimension());
        let persisted = store.load_vectors()?;
        vectors.insert_batch(&persisted)?;
        debug!("Loaded {} vectors from catalog", vectors.len());

        Ok(Self {
            store,
            vectors,
            provider,
        })
    }

    /// Semantic similarity search with optional relational filters.
    ///
    /// Filters restrict the candidate set before the distance ordering is
    /// truncated, so the result is always the best `limit` matches among
    /// records passing the filters.
    pub fn search(&self, request: &SearchRequest) -> Result<Vec<ProductResult>, QueryError> {
        if request.query.trim().is_empty() {
            return Err(QueryError::InvalidQuery(
                "query text cannot be empty".to_string(),
            ));
        }
        let limit = effective_limit(request.limit, DEFAULT_SEARCH_LIMIT);

        let query_vector = self.provider.embed(&request.query)?;

        let neighbors = if request.category.is_some() || request.min_epc.is_some() {
            let eligible = self
                .store
                .eligible_ids(request.category.as_deref(), request.min_epc)?;
            self.vectors
                .search_filtered(&query_vector, limit, |id| eligible.contains(&id))?
        } else {
            self.vectors.search(&query_vector, limit)?
        };

        let ids: Vec<i64> = neighbors.iter().map(|n| n.id).collect();
        let records = self.store.get_records(&ids)?;

        Ok(records
            .into_iter()
            .zip(neighbors.iter())
            .map(|(record, neighbor)| {
                let relevance = round3(1.0 - neighbor.distance as f64);
                product_result(record, Some(relevance))
            })
            .collect())
    }

    /// Every distinct non-null category with its record count, ordered by
    /// count descending, ties by name ascending.
    pub fn categories(&self) -> Result<Vec<CategoryCount>, QueryError> {
        Ok(self
            .store
            .categories()?
            .into_iter()
            .map(|(category, product_count)| CategoryCount {
                category,
                product_count,
            })
            .collect())
    }

    /// Records ordered by normalized seven-day EPC descending, optionally
    /// filtered to one category. Absent or unparseable EPC normalizes to
    /// 0.0 and sorts last. No embedding call is made.
    pub fn top_products(
        &self,
        category: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<ProductResult>, QueryError> {
        let limit = effective_limit(limit, DEFAULT_TOP_LIMIT);

        let records = self.store.records_in_category(category)?;
        let mut ranked: Vec<(f64, ProductRecord)> = records
            .into_iter()
            .map(|r| (normalize_epc(&r.epc_7day), r))
            .collect();
        ranked.sort_by(|(epc_a, a), (epc_b, b)| {
            epc_b.total_cmp(epc_a).then(a.link_id.cmp(&b.link_id))
        });
        ranked.truncate(limit);

        Ok(ranked
            .into_iter()
            .map(|(_, record)| product_result(record, None))
            .collect())
    }

    /// Aggregate catalog statistics.
    pub fn stats(&self) -> Result<CatalogStats, QueryError> {
        let total_products = self.store.count_offers()?;
        let categories = self.store.count_categories()?;
        let products_with_coupons = self.store.count_coupons()?;

        let epcs = self.store.non_null_epcs()?;
        let average_epc = if epcs.is_empty() {
            0.0
        } else {
            round2(epcs.iter().map(normalize_epc).sum::<f64>() / epcs.len() as f64)
        };

        let top_categories = self
            .store
            .categories()?
            .into_iter()
            .take(STATS_TOP_CATEGORIES)
            .map(|(category, product_count)| CategoryCount {
                category,
                product_count,
            })
            .collect();

        Ok(CatalogStats {
            total_products,
            categories,
            average_epc,
            products_with_coupons,
            top_categories,
        })
    }
}

fn product_result(record: ProductRecord, relevance: Option<f64>) -> ProductResult {
    ProductResult {
        name: record.name,
        description: record.description,
        category: record.category,
        url: record.click_url,
        coupon: record.coupon_code,
        epc: normalize_epc(&record.epc_7day),
        relevance,
    }
}

/// Positive caller-supplied limits pass through; absent or non-positive
/// values fall back to the default.
fn effective_limit(requested: Option<i64>, default: usize) -> usize {
    match requested {
        Some(n) if n > 0 => n as usize,
        _ => default,
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_limit() {
        assert_eq!(effective_limit(Some(3), 5), 3);
        assert_eq!(effective_limit(Some(0), 5), 5);
        assert_eq!(effective_limit(Some(-2), 5), 5);
        assert_eq!(effective_limit(None, 5), 5);
    }

    #[test]
    fn test_rounding() {
        assert_eq!(round3(0.87654), 0.877);
        assert_eq!(round3(1.0), 1.0);
        assert_eq!(round2(1.7499), 1.75);
        assert_eq!(round2(0.0), 0.0);
    }
}
