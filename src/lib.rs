//! Mnemo - long-term memory for conversational agents
//!
//! Stores short textual facts extracted from chat and retrieves the
//! subset relevant to a new query by fusing lexical (keyword) matching
//! with semantic (embedding) similarity, degrading gracefully when
//! either upstream dependency is unavailable.

pub mod embedding;
pub mod error;
pub mod keywords;
pub mod search;
pub mod storage;
pub mod types;
pub mod vector;

pub use error::{MnemoError, Result};
pub use search::{HybridSearcher, SearchConfig, SearchRequest};
pub use storage::Storage;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
