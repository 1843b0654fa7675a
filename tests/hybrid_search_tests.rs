//! End-to-end retrieval scenarios over in-memory stores
//!
//! Exercises the hybrid search orchestrator against real SQLite-backed
//! stores with stub embedding backends, including the degradation paths.
//!
//! Run with: cargo test --test hybrid_search_tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use mnemo::embedding::{Embedder, ModelInfo};
use mnemo::error::{MnemoError, Result};
use mnemo::search::{HybridSearcher, SearchConfig, SearchRequest};
use mnemo::storage::{queries, Storage};
use mnemo::types::*;
use mnemo::vector::VectorStore;

/// Embedder returning canned vectors per trimmed input text
struct StubEmbedder {
    dimension: usize,
    table: HashMap<String, Vec<f32>>,
    fallback: Vec<f32>,
    calls: AtomicUsize,
}

impl StubEmbedder {
    fn new(dimension: usize, entries: &[(&str, Vec<f32>)]) -> Self {
        Self {
            dimension,
            table: entries
                .iter()
                .map(|(text, vector)| (text.to_string(), vector.clone()))
                .collect(),
            fallback: vec![0.0; dimension],
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .table
            .get(text.trim())
            .cloned()
            .unwrap_or_else(|| self.fallback.clone()))
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            name: "stub".to_string(),
            dimension: self.dimension,
        }
    }

    async fn test_connection(&self) -> bool {
        true
    }
}

/// Embedder whose service is down
struct FailingEmbedder {
    dimension: usize,
}

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(MnemoError::Embedding("embedding service down".to_string()))
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            name: "failing".to_string(),
            dimension: self.dimension,
        }
    }

    async fn test_connection(&self) -> bool {
        false
    }
}

fn stores() -> (Storage, VectorStore) {
    let storage = Storage::open_in_memory().unwrap();
    let vectors = VectorStore::new(storage.clone());
    (storage, vectors)
}

/// Two facts for one user: a high-importance interest and a device note
fn seed_memories(storage: &Storage) {
    storage
        .with_transaction(|conn| {
            queries::insert_memory(
                conn,
                &CreateMemoryInput {
                    importance: 8,
                    category: Category::Interests,
                    tags: vec!["运动".to_string()],
                    ..CreateMemoryInput::new("u1", "我喜欢打篮球")
                },
            )?;
            queries::insert_memory(
                conn,
                &CreateMemoryInput {
                    importance: 5,
                    category: Category::Device,
                    ..CreateMemoryInput::new("u1", "我的电脑是MacBook")
                },
            )?;
            Ok(())
        })
        .unwrap();
}

fn searcher_with(
    storage: &Storage,
    vectors: &VectorStore,
    embedder: Arc<dyn Embedder>,
) -> HybridSearcher {
    HybridSearcher::new(
        storage.clone(),
        vectors.clone(),
        embedder,
        SearchConfig::default(),
    )
}

#[tokio::test]
async fn keyword_mode_matches_exactly_one_record() {
    let (storage, vectors) = stores();
    seed_memories(&storage);
    let searcher = searcher_with(&storage, &vectors, Arc::new(StubEmbedder::new(2, &[])));

    let results = searcher
        .search(&SearchRequest::new("u1", "篮球").with_mode(SearchMode::Keyword))
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].content(), "我喜欢打篮球");
    assert_eq!(results[0].search_type(), "keyword");
}

#[tokio::test]
async fn empty_query_broadens_to_importance_order() {
    let (storage, vectors) = stores();
    seed_memories(&storage);
    let searcher = searcher_with(&storage, &vectors, Arc::new(StubEmbedder::new(2, &[])));

    let results = searcher
        .search(&SearchRequest::new("u1", "").with_mode(SearchMode::Keyword))
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].content(), "我喜欢打篮球");
    assert_eq!(results[1].content(), "我的电脑是MacBook");
    assert!(results[0].score() > results[1].score());
}

#[tokio::test]
async fn keyword_scores_are_importance_derived() {
    let (storage, vectors) = stores();
    seed_memories(&storage);
    let searcher = searcher_with(&storage, &vectors, Arc::new(StubEmbedder::new(2, &[])));

    let results = searcher
        .search(&SearchRequest::new("u1", "").with_mode(SearchMode::Keyword))
        .await
        .unwrap();

    assert!((results[0].score() - 0.8).abs() < 1e-6);
    assert!((results[1].score() - 0.5).abs() < 1e-6);
}

#[tokio::test]
async fn vector_threshold_excludes_orthogonal_records() {
    let (storage, vectors) = stores();
    vectors
        .store("u1", "a", vec![1.0, 0.0], Category::Other, HashMap::new())
        .unwrap();
    vectors
        .store("u1", "b", vec![1.0, 0.0], Category::Other, HashMap::new())
        .unwrap();
    vectors
        .store("u1", "c", vec![0.0, 1.0], Category::Other, HashMap::new())
        .unwrap();

    let embedder = Arc::new(StubEmbedder::new(2, &[("查询", vec![1.0, 0.0])]));
    let searcher = searcher_with(&storage, &vectors, embedder);

    let results = searcher
        .search(
            &SearchRequest::new("u1", "查询")
                .with_mode(SearchMode::Vector)
                .with_threshold(0.5),
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.content() != "c"));
    assert!(results.iter().all(|r| r.search_type() == "vector"));
}

#[tokio::test]
async fn hybrid_promotes_candidates_found_by_both_paths() {
    let (storage, vectors) = stores();
    seed_memories(&storage);
    vectors
        .store(
            "u1",
            "我喜欢打篮球",
            vec![1.0, 0.0],
            Category::Interests,
            HashMap::new(),
        )
        .unwrap();

    let embedder = Arc::new(StubEmbedder::new(2, &[("篮球", vec![1.0, 0.0])]));
    let searcher = searcher_with(&storage, &vectors, embedder);

    let results = searcher
        .search(&SearchRequest::new("u1", "篮球").with_threshold(0.0))
        .await
        .unwrap();

    let top = &results[0];
    assert_eq!(top.search_type(), "hybrid");
    assert_eq!(top.content(), "我喜欢打篮球");
    // 0.4 * 0.8 (importance) + 0.6 * 1.0 (similarity)
    assert!((top.score() - 0.92).abs() < 1e-5);

    match top {
        SearchResult::Hybrid(hit) => {
            assert!((hit.keyword_score - 0.8).abs() < 1e-6);
            assert!((hit.similarity - 1.0).abs() < 1e-5);
        }
        other => panic!("expected hybrid hit, got {:?}", other.search_type()),
    }
}

#[tokio::test]
async fn degraded_hybrid_equals_keyword_membership() {
    let (storage, vectors) = stores();
    seed_memories(&storage);
    // The user has vectorized memories, but the embedding service is down
    vectors
        .store(
            "u1",
            "我喜欢打篮球",
            vec![1.0, 0.0],
            Category::Interests,
            HashMap::new(),
        )
        .unwrap();

    let searcher = searcher_with(&storage, &vectors, Arc::new(FailingEmbedder { dimension: 2 }));

    let keyword_results = searcher
        .search(&SearchRequest::new("u1", "").with_mode(SearchMode::Keyword))
        .await
        .unwrap();
    let hybrid_results = searcher
        .search(&SearchRequest::new("u1", "").with_mode(SearchMode::Hybrid))
        .await
        .unwrap();

    assert!(!hybrid_results.is_empty());
    let keyword_contents: Vec<&str> = keyword_results.iter().map(|r| r.content()).collect();
    let hybrid_contents: Vec<&str> = hybrid_results.iter().map(|r| r.content()).collect();
    assert_eq!(keyword_contents, hybrid_contents);
    // Every surviving result is tagged keyword, never hybrid
    assert!(hybrid_results.iter().all(|r| r.search_type() == "keyword"));
}

#[tokio::test]
async fn vector_mode_fails_closed_on_embedding_error() {
    let (storage, vectors) = stores();
    vectors
        .store("u1", "a", vec![1.0, 0.0], Category::Other, HashMap::new())
        .unwrap();

    let searcher = searcher_with(&storage, &vectors, Arc::new(FailingEmbedder { dimension: 2 }));

    let results = searcher
        .search(&SearchRequest::new("u1", "查询").with_mode(SearchMode::Vector))
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn vector_path_skipped_when_nothing_vectorized() {
    let (storage, vectors) = stores();
    seed_memories(&storage);

    let embedder = Arc::new(StubEmbedder::new(2, &[]));
    let searcher = searcher_with(&storage, &vectors, embedder.clone());

    let results = searcher
        .search(&SearchRequest::new("u1", "篮球"))
        .await
        .unwrap();

    // No embedding round trip was paid for a user with zero vectors
    assert_eq!(embedder.calls(), 0);
    assert!(!results.is_empty());
}

#[tokio::test]
async fn results_sorted_descending_and_idempotent() {
    let (storage, vectors) = stores();
    seed_memories(&storage);
    vectors
        .store(
            "u1",
            "我喜欢打篮球",
            vec![0.9, 0.1],
            Category::Interests,
            HashMap::new(),
        )
        .unwrap();
    vectors
        .store("u1", "周末常去健身房", vec![0.5, 0.5], Category::Lifestyle, HashMap::new())
        .unwrap();

    let embedder = Arc::new(StubEmbedder::new(2, &[("篮球", vec![1.0, 0.0])]));
    let searcher = searcher_with(&storage, &vectors, embedder);
    let request = SearchRequest::new("u1", "篮球").with_threshold(0.1);

    let first = searcher.search(&request).await.unwrap();
    let second = searcher.search(&request).await.unwrap();

    for pair in first.windows(2) {
        assert!(pair[0].score() >= pair[1].score());
    }

    let fingerprint =
        |results: &[SearchResult]| -> Vec<(String, String)> {
            results
                .iter()
                .map(|r| (r.content().to_string(), format!("{:.6}", r.score())))
                .collect()
        };
    assert_eq!(fingerprint(&first), fingerprint(&second));
}

#[tokio::test]
async fn queries_are_user_scoped() {
    let (storage, vectors) = stores();
    seed_memories(&storage);
    vectors
        .store("u1", "我喜欢打篮球", vec![1.0, 0.0], Category::Interests, HashMap::new())
        .unwrap();

    let embedder = Arc::new(StubEmbedder::new(2, &[("篮球", vec![1.0, 0.0])]));
    let searcher = searcher_with(&storage, &vectors, embedder);

    let results = searcher
        .search(&SearchRequest::new("u2", "篮球").with_threshold(0.0))
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn invalid_parameters_are_hard_errors() {
    let (storage, vectors) = stores();
    let searcher = searcher_with(&storage, &vectors, Arc::new(StubEmbedder::new(2, &[])));

    let missing_user = searcher.search(&SearchRequest::new("", "篮球")).await;
    assert!(matches!(missing_user, Err(MnemoError::InvalidInput(_))));

    let bad_threshold = searcher
        .search(&SearchRequest::new("u1", "篮球").with_threshold(1.5))
        .await;
    assert!(matches!(bad_threshold, Err(MnemoError::InvalidInput(_))));

    let bad_weights = searcher
        .search(&SearchRequest::new("u1", "篮球").with_weights(-0.5, 0.5))
        .await;
    assert!(matches!(bad_weights, Err(MnemoError::InvalidInput(_))));
}

#[tokio::test]
async fn hybrid_score_can_exceed_unit_range() {
    // Fusion is a raw weighted sum: weights summing over 1 push fused
    // scores past 1.0, and the engine intentionally does not clamp
    let (storage, vectors) = stores();
    storage
        .with_transaction(|conn| {
            queries::insert_memory(
                conn,
                &CreateMemoryInput {
                    importance: 10,
                    ..CreateMemoryInput::new("u1", "我喜欢打篮球")
                },
            )?;
            Ok(())
        })
        .unwrap();
    vectors
        .store("u1", "我喜欢打篮球", vec![1.0, 0.0], Category::Interests, HashMap::new())
        .unwrap();

    let embedder = Arc::new(StubEmbedder::new(2, &[("篮球", vec![1.0, 0.0])]));
    let searcher = searcher_with(&storage, &vectors, embedder);

    let results = searcher
        .search(
            &SearchRequest::new("u1", "篮球")
                .with_weights(0.9, 0.9)
                .with_threshold(0.0),
        )
        .await
        .unwrap();

    assert_eq!(results[0].search_type(), "hybrid");
    assert!((results[0].score() - 1.8).abs() < 1e-5);
}

#[tokio::test]
async fn orphaned_vector_records_still_surface() {
    // A vector record whose lexical twin was deleted is still returned:
    // the stores are deliberately not transactionally coupled
    let (storage, vectors) = stores();
    let record = storage
        .with_transaction(|conn| {
            queries::insert_memory(conn, &CreateMemoryInput::new("u1", "早起跑步的习惯"))
        })
        .unwrap();
    vectors
        .store("u1", "早起跑步的习惯", vec![1.0, 0.0], Category::Lifestyle, HashMap::new())
        .unwrap();
    storage
        .with_connection(|conn| queries::delete_memory(conn, record.id))
        .unwrap();

    let embedder = Arc::new(StubEmbedder::new(2, &[("跑步", vec![1.0, 0.0])]));
    let searcher = searcher_with(&storage, &vectors, embedder);

    let results = searcher
        .search(&SearchRequest::new("u1", "跑步").with_threshold(0.0))
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].content(), "早起跑步的习惯");
    assert_eq!(results[0].search_type(), "vector");
}

#[tokio::test]
async fn stats_passthroughs_report_both_stores() {
    let (storage, vectors) = stores();
    seed_memories(&storage);
    vectors
        .store("u1", "我喜欢打篮球", vec![1.0, 0.0], Category::Interests, HashMap::new())
        .unwrap();

    let searcher = searcher_with(&storage, &vectors, Arc::new(StubEmbedder::new(2, &[])));

    let memory_stats = searcher.memory_stats("u1").unwrap();
    assert_eq!(memory_stats.total, 2);

    let vector_stats = searcher.vector_stats("u1").unwrap();
    assert_eq!(vector_stats.total, 1);
    assert_eq!(vector_stats.vectorized, 1);
}
