//! Hybrid search orchestrator
//!
//! Runs the keyword and vector paths (no ordering dependency between
//! them), fuses candidates by content identity, and supplements with
//! lexical results when the semantic dependency is degraded. Read-only:
//! a search never mutates either store.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use crate::embedding::Embedder;
use crate::error::{MnemoError, Result};
use crate::keywords::{
    extract_with_fallback, KeywordExtractor, PatternKeywordExtractor, RemoteKeywordService,
};
use crate::storage::{queries, Storage};
use crate::types::*;
use crate::vector::VectorStore;

use super::{importance_score, validate, ResolvedParams, SearchConfig, SearchRequest};

/// The retrieval engine: one instance per process, reused across queries,
/// no state carried between invocations
pub struct HybridSearcher {
    storage: Storage,
    vectors: VectorStore,
    embedder: Arc<dyn Embedder>,
    extractor: Arc<dyn KeywordExtractor>,
    remote_keywords: Option<Arc<dyn RemoteKeywordService>>,
    config: SearchConfig,
}

impl HybridSearcher {
    pub fn new(
        storage: Storage,
        vectors: VectorStore,
        embedder: Arc<dyn Embedder>,
        config: SearchConfig,
    ) -> Self {
        Self {
            storage,
            vectors,
            embedder,
            extractor: Arc::new(PatternKeywordExtractor::new()),
            remote_keywords: None,
            config,
        }
    }

    /// Substitute the local keyword extractor
    pub fn with_extractor(mut self, extractor: Arc<dyn KeywordExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Attach a remote NLP keyword service (tried before the local extractor)
    pub fn with_remote_keywords(mut self, service: Arc<dyn RemoteKeywordService>) -> Self {
        self.remote_keywords = Some(service);
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Run a search in the requested mode.
    ///
    /// Sub-path failures degrade to empty sub-results; only invalid
    /// parameters (or, in hybrid mode, both paths failing) surface as
    /// errors.
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>> {
        let params = validate(request, &self.config)?;
        let started = Instant::now();

        let results = match request.mode {
            SearchMode::Keyword => self.keyword_search(request, params).await?,
            SearchMode::Vector => self.vector_search(request, params).await?,
            SearchMode::Hybrid => self.hybrid_search(request, params).await?,
        };

        tracing::debug!(
            user_id = %request.user_id,
            mode = ?request.mode,
            results = results.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search complete"
        );

        Ok(results)
    }

    /// Lexical memory store statistics passthrough
    pub fn memory_stats(&self, user_id: &str) -> Result<MemoryStats> {
        self.storage
            .with_connection(|conn| queries::memory_stats(conn, user_id))
    }

    /// Vector store statistics passthrough
    pub fn vector_stats(&self, user_id: &str) -> Result<VectorStoreStats> {
        self.vectors
            .stats(user_id, self.embedder.model_info().dimension)
    }

    async fn keyword_search(
        &self,
        request: &SearchRequest,
        params: ResolvedParams,
    ) -> Result<Vec<SearchResult>> {
        let hits = self
            .keyword_candidates(&request.user_id, &request.query, params.limit)
            .await?;

        let mut results: Vec<SearchResult> =
            hits.into_iter().map(SearchResult::Keyword).collect();
        sort_results(&mut results);
        results.truncate(params.limit);
        Ok(results)
    }

    async fn vector_search(
        &self,
        request: &SearchRequest,
        params: ResolvedParams,
    ) -> Result<Vec<SearchResult>> {
        let candidates = self
            .vector_candidates(
                &request.user_id,
                &request.query,
                params.limit,
                params.threshold,
            )
            .await?;

        Ok(candidates
            .into_iter()
            .map(|(record, similarity)| {
                SearchResult::Vector(VectorHit {
                    record,
                    score: similarity,
                    similarity,
                })
            })
            .collect())
    }

    async fn hybrid_search(
        &self,
        request: &SearchRequest,
        params: ResolvedParams,
    ) -> Result<Vec<SearchResult>> {
        // Fetch wider than the final limit so fusion has something to rank
        let fetch = params.limit * 2;

        let (keyword_result, vector_result) = tokio::join!(
            self.keyword_candidates(&request.user_id, &request.query, fetch),
            self.vector_candidates(&request.user_id, &request.query, fetch, params.threshold),
        );

        // A failed sub-path yields an empty set; the query proceeds with
        // whatever succeeded. Both failing is the one fatal case.
        let (keyword_hits, vector_hits) = match (keyword_result, vector_result) {
            (Ok(k), Ok(v)) => (k, v),
            (Ok(k), Err(e)) => {
                tracing::warn!(error = %e, "vector path failed, continuing with keyword results");
                (k, Vec::new())
            }
            (Err(e), Ok(v)) => {
                tracing::warn!(error = %e, "keyword path failed, continuing with vector results");
                (Vec::new(), v)
            }
            (Err(keyword_err), Err(vector_err)) => {
                return Err(MnemoError::Search(format!(
                    "both search paths failed: keyword: {}; vector: {}",
                    keyword_err, vector_err
                )));
            }
        };

        let keyword_count = keyword_hits.len();
        let vector_count = vector_hits.len();

        let fused = fuse_by_content(keyword_hits, vector_hits);

        let mut results: Vec<SearchResult> = Vec::new();
        let mut supplements: Vec<SearchResult> = Vec::new();

        for (keyword, vector) in fused {
            // Any candidate with a lexical component can serve as a
            // degradation supplement, re-tagged keyword
            let supplement = keyword.as_ref().map(|k| {
                SearchResult::Keyword(KeywordHit {
                    memory: k.memory.clone(),
                    score: params.keyword_weight * k.keyword_score,
                    keyword_score: k.keyword_score,
                    matched_keywords: k.matched_keywords.clone(),
                })
            });

            let result = match (keyword, vector) {
                (Some(k), Some((_, similarity))) => {
                    // Raw weighted sum; exceeds 1.0 when the weights do.
                    // Intentionally not clamped or renormalized.
                    let score =
                        params.keyword_weight * k.keyword_score + params.vector_weight * similarity;
                    SearchResult::Hybrid(HybridHit {
                        memory: k.memory,
                        score,
                        keyword_score: k.keyword_score,
                        similarity,
                        matched_keywords: k.matched_keywords,
                    })
                }
                (Some(k), None) => SearchResult::Keyword(KeywordHit {
                    score: params.keyword_weight * k.keyword_score,
                    ..k
                }),
                (None, Some((record, similarity))) => SearchResult::Vector(VectorHit {
                    record,
                    score: params.vector_weight * similarity,
                    similarity,
                }),
                (None, None) => continue,
            };

            if result.score() >= params.threshold {
                results.push(result);
            } else if let Some(supplement) = supplement {
                supplements.push(supplement);
            }
        }

        sort_results(&mut results);
        results.truncate(params.limit);

        // Degradation: a thin vector path (no vectorized memories, failed
        // embedding call, few matches) must never leave the engine worse
        // than plain lexical search
        if vector_count < params.limit && results.len() < params.limit {
            sort_results(&mut supplements);
            let present: HashSet<String> = results.iter().map(|r| r.content_key()).collect();
            for supplement in supplements {
                if results.len() >= params.limit {
                    break;
                }
                if present.contains(&supplement.content_key()) {
                    continue;
                }
                results.push(supplement);
            }
        }

        tracing::debug!(
            user_id = %request.user_id,
            keyword_candidates = keyword_count,
            vector_candidates = vector_count,
            fused = results.len(),
            "hybrid fusion complete"
        );

        Ok(results)
    }

    /// Keyword path: extraction (remote-first with fallback) then lexical
    /// search, scored by importance
    async fn keyword_candidates(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<KeywordHit>> {
        let keywords = extract_with_fallback(
            self.remote_keywords.as_deref(),
            self.extractor.as_ref(),
            query,
            self.config.remote_keyword_timeout,
        )
        .await;

        let memories = self.storage.with_connection(|conn| {
            queries::search_memories(conn, user_id, &keywords, limit as i64)
        })?;

        Ok(memories
            .into_iter()
            .map(|memory| {
                let matched_keywords = matched_keywords(&memory, &keywords);
                let score = importance_score(memory.importance);
                KeywordHit {
                    memory,
                    score,
                    keyword_score: score,
                    matched_keywords,
                }
            })
            .collect())
    }

    /// Vector path: query embedding then similarity scan. Fails closed:
    /// embedding errors and timeouts yield an empty sub-result, and the
    /// path is skipped entirely for users with nothing vectorized.
    async fn vector_candidates(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<(VectorRecord, f32)>> {
        let dimension = self.embedder.model_info().dimension;
        let stats = self.vectors.stats(user_id, dimension)?;
        if stats.vectorized == 0 {
            tracing::debug!(user_id, "no vectorized memories, skipping vector path");
            return Ok(Vec::new());
        }

        let embedding = match tokio::time::timeout(
            self.config.embed_timeout,
            self.embedder.embed(query),
        )
        .await
        {
            Ok(Ok(embedding)) => embedding,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "embedding failed, vector path returns empty");
                return Ok(Vec::new());
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.config.embed_timeout.as_millis() as u64,
                    "embedding timed out, vector path returns empty"
                );
                return Ok(Vec::new());
            }
        };

        self.vectors
            .similarity_search(user_id, &embedding, limit, threshold)
    }
}

/// Join the two candidate sets on the content natural key, preserving
/// keyword-path order first, then vector-only candidates
fn fuse_by_content(
    keyword_hits: Vec<KeywordHit>,
    vector_hits: Vec<(VectorRecord, f32)>,
) -> Vec<(Option<KeywordHit>, Option<(VectorRecord, f32)>)> {
    let mut fused: Vec<(Option<KeywordHit>, Option<(VectorRecord, f32)>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for hit in keyword_hits {
        let key = content_key(&hit.memory.content);
        if !index.contains_key(&key) {
            index.insert(key, fused.len());
            fused.push((Some(hit), None));
        }
    }

    for (record, similarity) in vector_hits {
        let key = content_key(&record.content);
        match index.get(&key) {
            Some(&i) => {
                if fused[i].1.is_none() {
                    fused[i].1 = Some((record, similarity));
                }
            }
            None => {
                index.insert(key, fused.len());
                fused.push((None, Some((record, similarity))));
            }
        }
    }

    fused
}

/// Keywords that actually hit this record's content or tags
fn matched_keywords(memory: &MemoryRecord, keywords: &[String]) -> Vec<String> {
    keywords
        .iter()
        .filter(|k| {
            memory.content.contains(k.as_str()) || memory.tags.iter().any(|t| t.contains(k.as_str()))
        })
        .cloned()
        .collect()
}

/// Score descending, ties broken by recency descending
fn sort_results(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.score()
            .partial_cmp(&a.score())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.created_at().cmp(&a.created_at()))
    });
}
