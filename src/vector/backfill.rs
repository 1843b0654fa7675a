//! Embedding backfill for memories without a vector twin
//!
//! Vector records are created by a separate embedding step, either at
//! write time or here, after the fact. The two stores stay uncoupled:
//! backfill matches on the content natural key, never on record ids.

use serde_json::json;

use super::VectorStore;
use crate::embedding::Embedder;
use crate::error::Result;
use crate::storage::queries::memory_from_row;
use crate::types::MemoryRecord;

/// Outcome of one backfill run
#[derive(Debug, Clone, Default)]
pub struct BackfillReport {
    /// Memories found without a vector twin
    pub pending: usize,
    /// Successfully embedded and stored
    pub embedded: usize,
    /// Embedding failures, skipped and left pending
    pub failed: usize,
}

impl VectorStore {
    /// Embed every memory of `user_id` that has no vector twin yet.
    ///
    /// Failures are per-record: an embedding error skips that record and
    /// the run continues.
    pub async fn backfill(
        &self,
        user_id: &str,
        embedder: &dyn Embedder,
        batch_size: usize,
    ) -> Result<BackfillReport> {
        let pending = self.pending_memories(user_id)?;
        let mut report = BackfillReport {
            pending: pending.len(),
            ..Default::default()
        };

        for batch in pending.chunks(batch_size.max(1)) {
            for memory in batch {
                match embedder.embed(&memory.content).await {
                    Ok(embedding) => {
                        let metadata = [
                            ("tags".to_string(), json!(&memory.tags)),
                            ("importance".to_string(), json!(memory.importance)),
                            ("source".to_string(), json!(memory.source.as_str())),
                        ]
                        .into_iter()
                        .collect();
                        self.store(
                            user_id,
                            &memory.content,
                            embedding,
                            memory.category,
                            metadata,
                        )?;
                        report.embedded += 1;
                    }
                    Err(e) => {
                        tracing::warn!(
                            memory_id = memory.id,
                            error = %e,
                            "embedding failed during backfill, skipping record"
                        );
                        report.failed += 1;
                    }
                }
            }
            tracing::debug!(
                user_id,
                embedded = report.embedded,
                failed = report.failed,
                pending = report.pending,
                "backfill batch complete"
            );
        }

        Ok(report)
    }

    /// Memories whose content natural key has no vector twin
    fn pending_memories(&self, user_id: &str) -> Result<Vec<MemoryRecord>> {
        self.storage().with_connection(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT m.id, m.user_id, m.content, m.category, m.source, m.importance,
                        m.conversation_id, m.extracted_from, m.created_at, m.updated_at
                 FROM memories m
                 WHERE m.user_id = ?
                   AND NOT EXISTS (
                       SELECT 1 FROM vectors v
                       WHERE v.user_id = m.user_id
                         AND v.content_hash = m.content_hash)
                 ORDER BY m.id",
            )?;
            let memories = stmt
                .query_map([user_id], memory_from_row)?
                .filter_map(|r| r.ok())
                .collect();
            Ok(memories)
        })
    }
}
