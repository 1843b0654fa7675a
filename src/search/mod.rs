//! Hybrid retrieval engine
//!
//! Mode dispatch, score fusion, threshold filtering, and degradation
//! control over the keyword and vector paths.

mod hybrid;

pub use hybrid::HybridSearcher;

use std::time::Duration;

use crate::error::{MnemoError, Result};
use crate::types::{clamp_importance, SearchMode, MAX_IMPORTANCE};

/// Search weights and thresholds.
///
/// Owned by the orchestrator at construction and threaded through every
/// call; never ambient process-wide state.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Weight of the lexical score in hybrid fusion
    pub keyword_weight: f32,
    /// Weight of the semantic score in hybrid fusion
    pub vector_weight: f32,
    /// Score threshold when the request does not specify one
    pub min_score: f32,
    /// Result count when the request does not specify one
    pub default_limit: usize,
    /// Bound on the remote keyword service call
    pub remote_keyword_timeout: Duration,
    /// Bound on the embedding service call
    pub embed_timeout: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            keyword_weight: 0.4,
            vector_weight: 0.6,
            min_score: 0.3,
            default_limit: 10,
            remote_keyword_timeout: Duration::from_secs(10),
            embed_timeout: Duration::from_secs(10),
        }
    }
}

/// One search request; unset fields resolve to the configured defaults.
///
/// The query may be an empty string: empty keyword extraction broadens
/// the lexical path instead of matching nothing.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub user_id: String,
    pub query: String,
    pub mode: SearchMode,
    pub keyword_weight: Option<f32>,
    pub vector_weight: Option<f32>,
    pub threshold: Option<f32>,
    pub limit: Option<usize>,
}

impl SearchRequest {
    pub fn new(user_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_weights(mut self, keyword_weight: f32, vector_weight: f32) -> Self {
        self.keyword_weight = Some(keyword_weight);
        self.vector_weight = Some(vector_weight);
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Request parameters after validation and default resolution
#[derive(Debug, Clone, Copy)]
pub(crate) struct ResolvedParams {
    pub keyword_weight: f32,
    pub vector_weight: f32,
    pub threshold: f32,
    pub limit: usize,
}

/// Reject invalid parameters before any sub-search runs; this is the one
/// failure that surfaces to the caller as a hard error.
pub(crate) fn validate(request: &SearchRequest, config: &SearchConfig) -> Result<ResolvedParams> {
    if request.user_id.trim().is_empty() {
        return Err(MnemoError::InvalidInput("user_id is required".to_string()));
    }

    let keyword_weight = request.keyword_weight.unwrap_or(config.keyword_weight);
    let vector_weight = request.vector_weight.unwrap_or(config.vector_weight);
    for (name, weight) in [
        ("keyword_weight", keyword_weight),
        ("vector_weight", vector_weight),
    ] {
        if !weight.is_finite() || weight < 0.0 {
            return Err(MnemoError::InvalidInput(format!(
                "{} must be finite and >= 0, got {}",
                name, weight
            )));
        }
    }

    let threshold = request.threshold.unwrap_or(config.min_score);
    if !(0.0..=1.0).contains(&threshold) {
        return Err(MnemoError::InvalidInput(format!(
            "threshold must be in [0, 1], got {}",
            threshold
        )));
    }

    let limit = request.limit.unwrap_or(config.default_limit);
    if limit == 0 {
        return Err(MnemoError::InvalidInput("limit must be >= 1".to_string()));
    }

    Ok(ResolvedParams {
        keyword_weight,
        vector_weight,
        threshold,
        limit,
    })
}

/// Deterministic importance-derived score for lexical matches: the
/// keyword path has no continuous relevance signal, so importance stands
/// in for it. Maps [1, 10] onto [0.1, 1.0].
pub fn importance_score(importance: i32) -> f32 {
    clamp_importance(importance) as f32 / MAX_IMPORTANCE as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_defaults() {
        let request = SearchRequest::new("u1", "篮球");
        let params = validate(&request, &SearchConfig::default()).unwrap();
        assert_eq!(params.limit, 10);
        assert!((params.keyword_weight - 0.4).abs() < 1e-6);
        assert!((params.vector_weight - 0.6).abs() < 1e-6);
        assert!((params.threshold - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_validate_rejects_missing_user() {
        let request = SearchRequest::new("  ", "篮球");
        assert!(validate(&request, &SearchConfig::default()).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let request = SearchRequest::new("u1", "篮球").with_threshold(1.5);
        assert!(validate(&request, &SearchConfig::default()).is_err());
        let request = SearchRequest::new("u1", "篮球").with_threshold(-0.1);
        assert!(validate(&request, &SearchConfig::default()).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_weights() {
        let request = SearchRequest::new("u1", "篮球").with_weights(-1.0, 0.5);
        assert!(validate(&request, &SearchConfig::default()).is_err());
        let request = SearchRequest::new("u1", "篮球").with_weights(f32::NAN, 0.5);
        assert!(validate(&request, &SearchConfig::default()).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_limit() {
        let request = SearchRequest::new("u1", "篮球").with_limit(0);
        assert!(validate(&request, &SearchConfig::default()).is_err());
    }

    #[test]
    fn test_validate_allows_empty_query() {
        let request = SearchRequest::new("u1", "");
        assert!(validate(&request, &SearchConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_allows_weights_summing_over_one() {
        // Weights need not sum to 1; fusion does not renormalize
        let request = SearchRequest::new("u1", "篮球").with_weights(0.9, 0.9);
        assert!(validate(&request, &SearchConfig::default()).is_ok());
    }

    #[test]
    fn test_importance_score_range() {
        assert!((importance_score(1) - 0.1).abs() < 1e-6);
        assert!((importance_score(5) - 0.5).abs() < 1e-6);
        assert!((importance_score(10) - 1.0).abs() < 1e-6);
        // Out-of-range importance clamps instead of escaping [0, 1]
        assert!((importance_score(99) - 1.0).abs() < 1e-6);
        assert!((importance_score(-3) - 0.1).abs() < 1e-6);
    }
}
