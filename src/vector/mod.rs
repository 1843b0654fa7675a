//! Vector store: semantic twins of memories with similarity search
//!
//! Similarity queries are a flat, user-scoped cosine scan over stored
//! embeddings with cached norms. Records whose dimension disagrees with
//! the query vector are excluded from scoring and surfaced only in stats.

mod backfill;

pub use backfill::BackfillReport;

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use std::collections::HashMap;

use crate::embedding::{cosine_with_norms, l2_norm};
use crate::error::{MnemoError, Result};
use crate::storage::Storage;
use crate::types::*;

/// Persistent store of `(content, embedding)` pairs, independently lived
/// from the lexical memory store
pub struct VectorStore {
    storage: Storage,
}

impl VectorStore {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub(crate) fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Store a vector record, caching its Euclidean norm
    pub fn store(
        &self,
        user_id: &str,
        content: &str,
        embedding: Vec<f32>,
        category: Category,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<VectorId> {
        if user_id.trim().is_empty() {
            return Err(MnemoError::InvalidInput("user_id is required".to_string()));
        }
        if content.trim().is_empty() {
            return Err(MnemoError::InvalidInput("content is required".to_string()));
        }
        if embedding.is_empty() {
            return Err(MnemoError::InvalidInput(
                "embedding must not be empty".to_string(),
            ));
        }

        let norm = l2_norm(&embedding);
        let blob = embedding_to_blob(&embedding);
        let dimension = embedding.len() as i64;
        let hash = content_key(content);
        let metadata_json = serde_json::to_string(&metadata)?;
        let now = Utc::now().to_rfc3339();

        self.storage.with_connection(|conn| {
            conn.execute(
                "INSERT INTO vectors
                    (user_id, content, category, metadata, embedding,
                     dimension, norm, content_hash, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    user_id,
                    content,
                    category.as_str(),
                    metadata_json,
                    blob,
                    dimension,
                    norm,
                    hash,
                    now,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Cosine similarity search over the user's records.
    ///
    /// Records below `threshold` are excluded before ranking; the rest
    /// are ordered by similarity descending, ties broken by recency.
    pub fn similarity_search(
        &self,
        user_id: &str,
        query: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<(VectorRecord, f32)>> {
        if query.is_empty() {
            return Err(MnemoError::InvalidInput(
                "query vector must not be empty".to_string(),
            ));
        }

        let query_norm = l2_norm(query);
        let records = self.load_user_records(user_id)?;

        let mut mismatches = 0usize;
        let mut scored: Vec<(VectorRecord, f32)> = Vec::new();

        for record in records {
            if record.embedding.len() != query.len() {
                mismatches += 1;
                continue;
            }
            let similarity =
                cosine_with_norms(query, query_norm, &record.embedding, record.norm);
            if similarity >= threshold {
                scored.push((record, similarity));
            }
        }

        if mismatches > 0 {
            tracing::warn!(
                user_id,
                mismatches,
                query_dimension = query.len(),
                "excluded vector records with mismatched embedding dimension"
            );
        }

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.0.created_at.cmp(&a.0.created_at))
        });
        scored.truncate(limit);

        Ok(scored)
    }

    /// Check whether a content twin already exists for this user
    pub fn has_content(&self, user_id: &str, content: &str) -> Result<bool> {
        let hash = content_key(content);
        self.storage.with_connection(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM vectors WHERE user_id = ? AND content_hash = ?",
                params![user_id, hash],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    /// Delete a vector record; returns whether a row was removed
    pub fn delete(&self, id: VectorId) -> Result<bool> {
        self.storage.with_connection(|conn| {
            let deleted = conn.execute("DELETE FROM vectors WHERE id = ?", [id])?;
            Ok(deleted > 0)
        })
    }

    /// Per-user vector store statistics.
    ///
    /// `expected_dimension` is the active embedding model's declared
    /// dimension; records that disagree count as mismatches, not as
    /// vectorized.
    pub fn stats(&self, user_id: &str, expected_dimension: usize) -> Result<VectorStoreStats> {
        self.storage.with_connection(|conn| {
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM vectors WHERE user_id = ?",
                [user_id],
                |row| row.get(0),
            )?;

            let vectorized: i64 = conn.query_row(
                "SELECT COUNT(*) FROM vectors WHERE user_id = ? AND dimension = ?",
                params![user_id, expected_dimension as i64],
                |row| row.get(0),
            )?;

            let avg_dimension: f64 = conn.query_row(
                "SELECT COALESCE(AVG(dimension), 0) FROM vectors WHERE user_id = ?",
                [user_id],
                |row| row.get(0),
            )?;

            let mut categories = HashMap::new();
            let mut stmt = conn.prepare_cached(
                "SELECT category, COUNT(*) FROM vectors WHERE user_id = ? GROUP BY category",
            )?;
            let rows = stmt.query_map([user_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (category, count) = row?;
                categories.insert(category, count);
            }

            Ok(VectorStoreStats {
                total,
                vectorized,
                dimension_mismatches: total - vectorized,
                avg_dimension,
                categories,
            })
        })
    }

    fn load_user_records(&self, user_id: &str) -> Result<Vec<VectorRecord>> {
        self.storage.with_connection(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT id, user_id, content, category, metadata, embedding, norm, created_at
                 FROM vectors
                 WHERE user_id = ?",
            )?;
            let records = stmt
                .query_map([user_id], vector_from_row)?
                .filter_map(|r| r.ok())
                .collect();
            Ok(records)
        })
    }
}

impl Clone for VectorStore {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
        }
    }
}

/// Parse a vector record from a database row
fn vector_from_row(row: &Row) -> rusqlite::Result<VectorRecord> {
    let id: i64 = row.get("id")?;
    let user_id: String = row.get("user_id")?;
    let content: String = row.get("content")?;
    let category_str: String = row.get("category")?;
    let metadata_str: String = row.get("metadata")?;
    let blob: Vec<u8> = row.get("embedding")?;
    let norm: f32 = row.get("norm")?;
    let created_at: String = row.get("created_at")?;

    Ok(VectorRecord {
        id,
        user_id,
        content,
        category: category_str.parse().unwrap_or_default(),
        metadata: serde_json::from_str(&metadata_str).unwrap_or_default(),
        embedding: blob_to_embedding(&blob),
        norm,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fixture() -> VectorStore {
        VectorStore::new(Storage::open_in_memory().unwrap())
    }

    #[test]
    fn test_blob_roundtrip() {
        let embedding = vec![1.0_f32, -0.5, 0.25, 3.75];
        assert_eq!(blob_to_embedding(&embedding_to_blob(&embedding)), embedding);
    }

    #[test]
    fn test_store_and_search() {
        let store = fixture();
        store
            .store("u1", "第一条", vec![1.0, 0.0], Category::Other, HashMap::new())
            .unwrap();
        store
            .store("u1", "第二条", vec![0.0, 1.0], Category::Other, HashMap::new())
            .unwrap();

        let results = store.similarity_search("u1", &[1.0, 0.0], 10, 0.0).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0.content, "第一条");
        assert!((results[0].1 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_threshold_excludes_before_ranking() {
        let store = fixture();
        store
            .store("u1", "a", vec![1.0, 0.0], Category::Other, HashMap::new())
            .unwrap();
        store
            .store("u1", "b", vec![1.0, 0.0], Category::Other, HashMap::new())
            .unwrap();
        store
            .store("u1", "c", vec![0.0, 1.0], Category::Other, HashMap::new())
            .unwrap();

        let results = store.similarity_search("u1", &[1.0, 0.0], 10, 0.5).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(r, _)| r.content != "c"));
    }

    #[test]
    fn test_dimension_mismatch_excluded_not_compared() {
        let store = fixture();
        store
            .store("u1", "老的", vec![1.0, 0.0, 0.0], Category::Other, HashMap::new())
            .unwrap();
        store
            .store("u1", "新的", vec![1.0, 0.0], Category::Other, HashMap::new())
            .unwrap();

        let results = store.similarity_search("u1", &[1.0, 0.0], 10, 0.0).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.content, "新的");

        let stats = store.stats("u1", 2).unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.vectorized, 1);
        assert_eq!(stats.dimension_mismatches, 1);
    }

    #[test]
    fn test_search_is_user_scoped() {
        let store = fixture();
        store
            .store("u1", "秘密", vec![1.0, 0.0], Category::Other, HashMap::new())
            .unwrap();

        let results = store.similarity_search("u2", &[1.0, 0.0], 10, 0.0).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_has_content() {
        let store = fixture();
        store
            .store("u1", "我喜欢打篮球", vec![1.0, 0.0], Category::Interests, HashMap::new())
            .unwrap();
        assert!(store.has_content("u1", "  我喜欢打篮球 ").unwrap());
        assert!(!store.has_content("u1", "别的内容").unwrap());
        assert!(!store.has_content("u2", "我喜欢打篮球").unwrap());
    }

    #[test]
    fn test_stats_avg_dimension_and_categories() {
        let store = fixture();
        store
            .store("u1", "a", vec![0.5; 4], Category::Work, HashMap::new())
            .unwrap();
        store
            .store("u1", "b", vec![0.5; 2], Category::Work, HashMap::new())
            .unwrap();

        let stats = store.stats("u1", 4).unwrap();
        assert_eq!(stats.total, 2);
        assert!((stats.avg_dimension - 3.0).abs() < 1e-9);
        assert_eq!(stats.categories.get("work"), Some(&2));
    }

    #[test]
    fn test_delete() {
        let store = fixture();
        let id = store
            .store("u1", "a", vec![1.0], Category::Other, HashMap::new())
            .unwrap();
        assert!(store.delete(id).unwrap());
        assert!(!store.delete(id).unwrap());
    }
}
