/// Exact cosine-distance vector index
///
/// Maps link ids to embedding vectors and answers nearest-neighbor queries
/// by exact scan. Exact (rather than approximate) search lets relational
/// filters combine with the distance ordering in the same retrieval step:
/// `search_filtered` ranks only ids passing the predicate, so a truncated
/// result is always the best k among the filtered candidates.
use ahash::AHashMap;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },
}

/// Search result with id and cosine distance (ascending is better)
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub id: i64,
    pub distance: f32,
}

struct Entry {
    vector: Vec<f32>,
    norm: f32,
}

/// In-memory vector index over the persisted `offer_vectors` table.
///
/// Loaded once at engine startup; reads are lock-shared so query
/// operations may run concurrently.
pub struct VectorIndex {
    dimension: usize,
    entries: RwLock<AHashMap<i64, Entry>>,
}

impl VectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: RwLock::new(AHashMap::new()),
        }
    }

    /// Insert a vector, replacing any existing vector for the same id.
    /// The vector's lifetime matches the owning record: created, replaced,
    /// or deleted together, never orphaned.
    pub fn insert(&self, id: i64, vector: &[f32]) -> Result<(), VectorIndexError> {
        if vector.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        let mut entries = self.entries.write().unwrap();
        entries.insert(
            id,
            Entry {
                vector: vector.to_vec(),
                norm,
            },
        );
        Ok(())
    }

    /// Insert multiple vectors.
    pub fn insert_batch(&self, items: &[(i64, Vec<f32>)]) -> Result<(), VectorIndexError> {
        for (id, vector) in items {
            self.insert(*id, vector)?;
        }
        Ok(())
    }

    /// K nearest neighbors by cosine distance, ascending.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, VectorIndexError> {
        self.search_filtered(query, k, |_| true)
    }

    /// K nearest neighbors among ids passing the predicate.
    ///
    /// Ordering is ascending by distance, ties broken by id ascending so
    /// repeated queries are stable.
    pub fn search_filtered(
        &self,
        query: &[f32],
        k: usize,
        predicate: impl Fn(i64) -> bool,
    ) -> Result<Vec<Neighbor>, VectorIndexError> {
        if query.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let query_norm = query.iter().map(|x| x * x).sum::<f32>().sqrt();

        let entries = self.entries.read().unwrap();
        let mut neighbors: Vec<Neighbor> = entries
            .iter()
            .filter(|(id, _)| predicate(**id))
            .map(|(id, entry)| Neighbor {
                id: *id,
                distance: cosine_distance(query, query_norm, &entry.vector, entry.norm),
            })
            .collect();

        neighbors.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));
        neighbors.truncate(k);
        Ok(neighbors)
    }

    /// Number of vectors in the index
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

fn cosine_distance(a: &[f32], a_norm: f32, b: &[f32], b_norm: f32) -> f32 {
    if a_norm == 0.0 || b_norm == 0.0 {
        return 1.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    1.0 - dot / (a_norm * b_norm)
}
