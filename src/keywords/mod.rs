//! Query keyword extraction
//!
//! Two tiers: an NLP-assisted remote service (bounded by a timeout) and a
//! local pattern-based extractor the caller falls back to on timeout,
//! error, or an empty remote result. One remote attempt per query, never
//! a retry.

mod patterns;
mod remote;

pub use patterns::PatternKeywordExtractor;
pub use remote::{HttpKeywordService, RemoteKeywordService};

use std::time::Duration;

/// Maximum number of keywords any extractor returns
pub const MAX_KEYWORDS: usize = 15;

/// Pluggable local keyword extraction.
///
/// The default implementation is heuristic; a real tokenizer can be
/// substituted without touching the search orchestrator.
pub trait KeywordExtractor: Send + Sync {
    /// Turn a raw query into an ordered, deduplicated keyword list,
    /// capped at [`MAX_KEYWORDS`]. An empty or whitespace-only query
    /// yields an empty list, which downstream means "broaden".
    fn extract(&self, query: &str) -> Vec<String>;
}

/// Extract keywords remote-first with local fallback.
pub async fn extract_with_fallback(
    remote: Option<&dyn RemoteKeywordService>,
    local: &dyn KeywordExtractor,
    query: &str,
    timeout: Duration,
) -> Vec<String> {
    if let Some(service) = remote {
        match tokio::time::timeout(timeout, service.extract(query)).await {
            Ok(Ok(mut keywords)) if !keywords.is_empty() => {
                keywords.truncate(MAX_KEYWORDS);
                return keywords;
            }
            Ok(Ok(_)) => {
                tracing::warn!("remote keyword service returned no keywords, using local extractor");
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "remote keyword service failed, using local extractor");
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "remote keyword service timed out, using local extractor"
                );
            }
        }
    }
    local.extract(query)
}
