//! Mnemo CLI
//!
//! Command-line interface for memory management and retrieval.

use std::sync::Arc;

use clap::{Parser, Subcommand};

use mnemo::embedding::create_embedder;
use mnemo::keywords::HttpKeywordService;
use mnemo::search::{HybridSearcher, SearchConfig, SearchRequest};
use mnemo::storage::{queries, Storage};
use mnemo::types::*;
use mnemo::vector::VectorStore;

#[derive(Parser)]
#[command(name = "mnemo")]
#[command(about = "Conversational agent memory CLI")]
#[command(version)]
struct Cli {
    /// Database path (defaults to the platform data dir)
    #[arg(long, env = "MNEMO_DB_PATH")]
    db_path: Option<String>,

    /// Embedding backend ("chargram" or "openai")
    #[arg(long, env = "MNEMO_EMBEDDING_BACKEND", default_value = "chargram")]
    embedding_backend: String,

    /// API key for the openai embedding backend
    #[arg(long, env = "OPENAI_API_KEY")]
    api_key: Option<String>,

    /// Embedding API base URL override
    #[arg(long, env = "MNEMO_EMBEDDING_URL")]
    embedding_url: Option<String>,

    /// Embedding model name override
    #[arg(long, env = "MNEMO_EMBEDDING_MODEL")]
    embedding_model: Option<String>,

    /// Expected embedding dimension
    #[arg(long, env = "MNEMO_EMBEDDING_DIMENSIONS", default_value = "1536")]
    embedding_dimensions: usize,

    /// Remote NLP keyword service base URL (optional)
    #[arg(long, env = "MNEMO_KEYWORD_SERVICE_URL")]
    keyword_service_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a new memory
    Remember {
        /// Content to remember
        content: String,
        /// Owner of the memory
        #[arg(short, long, default_value = "default")]
        user: String,
        /// Category
        #[arg(short, long, default_value = "other")]
        category: String,
        /// Tags (comma-separated)
        #[arg(short = 'T', long)]
        tags: Option<String>,
        /// Importance (1-10)
        #[arg(short, long, default_value = "5")]
        importance: i32,
        /// Source (conversation, document, manual)
        #[arg(short, long, default_value = "manual")]
        source: String,
        /// Skip storing if the same content already exists for the user
        #[arg(long)]
        dedupe: bool,
    },
    /// Search memories
    Search {
        /// Search query
        query: String,
        #[arg(short, long, default_value = "default")]
        user: String,
        /// Search mode (keyword, vector, hybrid)
        #[arg(short, long, default_value = "hybrid")]
        mode: String,
        /// Maximum results
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Score threshold override
        #[arg(short, long)]
        threshold: Option<f32>,
    },
    /// Get a memory by id
    Get {
        id: i64,
    },
    /// List memories by importance
    List {
        #[arg(short, long, default_value = "default")]
        user: String,
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },
    /// Delete a memory
    Delete {
        id: i64,
    },
    /// Show per-user statistics
    Stats {
        #[arg(short, long, default_value = "default")]
        user: String,
    },
    /// Embed memories that have no vector twin yet
    Backfill {
        #[arg(short, long, default_value = "default")]
        user: String,
        #[arg(short, long, default_value = "32")]
        batch_size: usize,
    },
    /// Test embedding service connectivity
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let db_path = match &cli.db_path {
        Some(path) => shellexpand::tilde(path).to_string(),
        None => dirs::data_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join("mnemo/memories.db")
            .to_string_lossy()
            .to_string(),
    };

    let storage = Storage::open(StorageConfig { db_path })?;
    let vectors = VectorStore::new(storage.clone());

    let embedder = create_embedder(&EmbeddingConfig {
        backend: cli.embedding_backend.clone(),
        api_key: cli.api_key.clone(),
        base_url: cli.embedding_url.clone(),
        model: cli.embedding_model.clone(),
        dimensions: cli.embedding_dimensions,
    })?;

    match cli.command {
        Commands::Remember {
            content,
            user,
            category,
            tags,
            importance,
            source,
            dedupe,
        } => {
            if dedupe {
                let existing =
                    storage.with_connection(|conn| queries::find_duplicate(conn, &user, &content))?;
                if let Some(existing) = existing {
                    println!("Already remembered as #{}: {}", existing.id, existing.content);
                    return Ok(());
                }
            }

            let input = CreateMemoryInput {
                user_id: user,
                content,
                category: category.parse().unwrap_or_default(),
                tags: tags
                    .map(|t| t.split(',').map(|s| s.trim().to_string()).collect())
                    .unwrap_or_default(),
                source: source.parse().unwrap_or_default(),
                importance,
                conversation_id: None,
                extracted_from: None,
            };
            let record = storage.with_transaction(|conn| queries::insert_memory(conn, &input))?;
            println!("Remembered #{}: {}", record.id, record.content);
        }

        Commands::Search {
            query,
            user,
            mode,
            limit,
            threshold,
        } => {
            let mut searcher = HybridSearcher::new(
                storage.clone(),
                vectors.clone(),
                embedder.clone(),
                SearchConfig::default(),
            );
            if let Some(url) = cli.keyword_service_url.clone() {
                searcher = searcher.with_remote_keywords(Arc::new(HttpKeywordService::new(url, None)));
            }

            let mut request = SearchRequest::new(user, query)
                .with_mode(mode.parse().map_err(anyhow::Error::msg)?)
                .with_limit(limit);
            if let Some(threshold) = threshold {
                request = request.with_threshold(threshold);
            }

            let results = searcher.search(&request).await?;
            if results.is_empty() {
                println!("No matching memories.");
            }
            for (i, result) in results.iter().enumerate() {
                println!(
                    "{:>2}. [{:.3}] ({}) {}",
                    i + 1,
                    result.score(),
                    result.search_type(),
                    result.content()
                );
            }
        }

        Commands::Get { id } => {
            let record = storage.with_connection(|conn| queries::get_memory(conn, id))?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }

        Commands::List { user, limit } => {
            let records =
                storage.with_connection(|conn| queries::list_memories(conn, &user, limit))?;
            for record in records {
                println!(
                    "#{:<5} [{}] ({}) {}",
                    record.id, record.importance, record.category, record.content
                );
            }
        }

        Commands::Delete { id } => {
            let deleted = storage.with_connection(|conn| queries::delete_memory(conn, id))?;
            if deleted {
                println!("Deleted #{}", id);
            } else {
                println!("No memory #{}", id);
            }
        }

        Commands::Stats { user } => {
            let memory_stats =
                storage.with_connection(|conn| queries::memory_stats(conn, &user))?;
            let vector_stats = vectors.stats(&user, embedder.model_info().dimension)?;
            println!("Memories: {}", memory_stats.total);
            for (category, count) in &memory_stats.by_category {
                println!("  {:<14} {}", category, count);
            }
            println!(
                "Vectors: {} total, {} vectorized, {} stale, avg dimension {:.0}",
                vector_stats.total,
                vector_stats.vectorized,
                vector_stats.dimension_mismatches,
                vector_stats.avg_dimension
            );
        }

        Commands::Backfill { user, batch_size } => {
            let report = vectors.backfill(&user, embedder.as_ref(), batch_size).await?;
            println!(
                "Backfill: {} pending, {} embedded, {} failed",
                report.pending, report.embedded, report.failed
            );
        }

        Commands::Check => {
            let info = embedder.model_info();
            if embedder.test_connection().await {
                println!("Embedding service ok: {} ({} dimensions)", info.name, info.dimension);
            } else {
                anyhow::bail!("Embedding service unreachable: {}", info.name);
            }
        }
    }

    Ok(())
}
