//! mailrag - Gmail thread indexing for retrieval

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use mailrag_common::config::{Config, LoggingConfig};
use mailrag_common::{Thread, ThreadSummary};
use mailrag_core::{
    embed_query, embed_threads, hybrid_query, lexical_query, map_threads, search_similar,
    vector_query, GmailClient, HttpEmbedder, HybridParams, OpenSearchClient, SearchResponse, ThreadFormat,
    ThreadIdEntry, VectorField,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "mailrag", version, about = "Gmail thread indexing for retrieval")]
struct Cli {
    /// Configuration file (default: ./mailrag.toml, then /etc/mailrag/config.toml)
    #[arg(short, long, global = true, env = "MAILRAG_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Gmail retrieval
    #[command(subcommand)]
    Gmail(GmailCommand),
    /// Attach subject and body embeddings to a threads file
    Embed {
        #[arg(short, long, default_value = "data/gmail_threads.json")]
        input: PathBuf,
        #[arg(short, long, default_value = "data/embedded_threads.json")]
        output: PathBuf,
    },
    /// Rank messages of an embedded threads file by similarity, without OpenSearch
    Similar {
        query: String,
        #[arg(short, long, default_value = "data/embedded_threads.json")]
        input: PathBuf,
        #[arg(long, default_value = "body_embedding")]
        field: VectorField,
        #[arg(short = 'n', long, default_value_t = 10)]
        top_k: usize,
    },
    /// OpenSearch index management and search
    #[command(subcommand)]
    Index(IndexCommand),
}

#[derive(Subcommand)]
enum GmailCommand {
    /// List thread ids matching a query
    List {
        #[arg(short, long, default_value = "")]
        query: String,
        #[arg(short = 'n', long, default_value_t = 50)]
        max_results: usize,
    },
    /// Search threads and save their ids and subjects
    Search {
        #[arg(short, long, default_value = "from:me")]
        query: String,
        #[arg(short = 'n', long, default_value_t = 500)]
        max_results: usize,
        #[arg(short, long, default_value = "data/thread_ids.json")]
        output: PathBuf,
        /// Skip fetching subjects (faster)
        #[arg(long)]
        no_metadata: bool,
    },
    /// Fetch full threads matching a query
    Fetch {
        #[arg(short, long, default_value = "")]
        query: String,
        #[arg(short = 'n', long, default_value_t = 10)]
        max_threads: usize,
        #[arg(short, long, default_value = "data/gmail_threads.json")]
        output: PathBuf,
    },
    /// Fetch full threads for a saved id list
    FetchIds {
        #[arg(short, long, default_value = "data/thread_ids.json")]
        input: PathBuf,
        #[arg(short, long, default_value = "data/searched_threads.json")]
        output: PathBuf,
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Fetch a single thread
    Thread {
        thread_id: String,
        /// Defaults to data/thread_<id>.json
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum IndexCommand {
    /// Create the message index
    Setup {
        /// Delete the existing index and its documents first
        #[arg(long)]
        recreate: bool,
    },
    /// Index a threads file, creating the index when missing
    Upload {
        #[arg(short, long, default_value = "data/embedded_threads.json")]
        input: PathBuf,
        #[arg(long)]
        recreate: bool,
    },
    /// Search indexed messages
    Search {
        query: String,
        #[arg(short, long, value_enum, default_value_t = SearchMode::Lexical)]
        mode: SearchMode,
        #[arg(short = 'n', long, default_value_t = 10)]
        size: usize,
        /// Vector field for vector and hybrid search
        #[arg(long, default_value = "body_embedding")]
        field: VectorField,
        #[arg(long, default_value_t = 0.3)]
        text_weight: f32,
        #[arg(long, default_value_t = 0.7)]
        vector_weight: f32,
        /// Drop vector hits scoring below this
        #[arg(long)]
        min_score: Option<f32>,
        /// Print the raw response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show document and thread counts
    Stats,
    /// Check cluster health
    Health,
}

#[derive(Clone, Copy, ValueEnum)]
enum SearchMode {
    Lexical,
    Vector,
    Hybrid,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    }
    .with_env_overrides();

    init_logging(&config.logging);

    match cli.command {
        Commands::Gmail(command) => run_gmail(&config, command).await,
        Commands::Embed { input, output } => run_embed(&config, &input, &output).await,
        Commands::Similar {
            query,
            input,
            field,
            top_k,
        } => run_similar(&config, &query, &input, field, top_k).await,
        Commands::Index(command) => run_index(&config, command).await,
    }
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("info,mailrag={}", config.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn run_gmail(config: &Config, command: GmailCommand) -> Result<()> {
    let client = GmailClient::new(config.gmail.clone())?;

    match command {
        GmailCommand::List { query, max_results } => {
            let threads = client.list_threads(&query, max_results).await?;
            if threads.is_empty() {
                println!("No threads found");
                return Ok(());
            }

            println!("Found {} threads\n", threads.len());
            for (i, thread) in threads.iter().take(20).enumerate() {
                println!("{}. Thread ID: {}", i + 1, thread.id);
                if !thread.snippet.is_empty() {
                    println!("   {}...", truncate(&thread.snippet, 80));
                }
            }
            if threads.len() > 20 {
                println!("\n... and {} more threads", threads.len() - 20);
            }
        }
        GmailCommand::Search {
            query,
            max_results,
            output,
            no_metadata,
        } => {
            let summaries = client
                .search_threads(&query, max_results, !no_metadata)
                .await?;
            if summaries.is_empty() {
                println!("No threads found");
                return Ok(());
            }

            write_json(&output, &summaries)?;
            println!("Found {} threads, saved to {}", summaries.len(), output.display());
            print_summaries(&summaries);
        }
        GmailCommand::Fetch {
            query,
            max_threads,
            output,
        } => {
            let threads = client.fetch_threads(&query, max_threads).await?;
            if threads.is_empty() {
                println!("No threads found");
                return Ok(());
            }

            write_json(&output, &threads)?;
            println!("Fetched {} threads, saved to {}", threads.len(), output.display());
            print_threads(&threads);
        }
        GmailCommand::FetchIds {
            input,
            output,
            limit,
        } => {
            let entries: Vec<ThreadIdEntry> = read_json(&input).with_context(|| {
                format!("Run 'mailrag gmail search' first to create {}", input.display())
            })?;
            let mut ids: Vec<String> = entries.iter().map(|e| e.id().to_string()).collect();
            if let Some(limit) = limit {
                ids.truncate(limit);
            }
            if ids.is_empty() {
                bail!("No thread ids found in {}", input.display());
            }

            let threads = client.fetch_thread_list(&ids).await;
            if threads.is_empty() {
                bail!("No threads could be fetched");
            }

            write_json(&output, &threads)?;
            let messages: usize = threads.iter().map(|t| t.messages.len()).sum();
            println!(
                "Fetched {} threads ({} messages), saved to {}",
                threads.len(),
                messages,
                output.display()
            );
        }
        GmailCommand::Thread { thread_id, output } => {
            let raw = client.get_thread(&thread_id, ThreadFormat::Full).await?;
            let thread = mailrag_core::extract_thread(&raw);
            let output =
                output.unwrap_or_else(|| PathBuf::from(format!("data/thread_{}.json", thread_id)));

            write_json(&output, &thread)?;
            println!("Saved thread to {}", output.display());
            print_threads(std::slice::from_ref(&thread));
        }
    }

    Ok(())
}

async fn run_embed(config: &Config, input: &Path, output: &Path) -> Result<()> {
    let mut threads: Vec<Thread> = read_json(input)?;
    if threads.is_empty() {
        println!("No threads to process");
        return Ok(());
    }

    let embedder = HttpEmbedder::new(config.embedding.clone(), config.opensearch.embedding_dim)?;
    let count = embed_threads(
        &mut threads,
        &embedder,
        config.embedding.batch_size,
        config.embedding.max_input_chars,
    )
    .await?;

    write_json(output, &threads)?;
    println!("Embedded {} messages, saved to {}", count, output.display());
    Ok(())
}

async fn run_similar(
    config: &Config,
    query: &str,
    input: &Path,
    field: VectorField,
    top_k: usize,
) -> Result<()> {
    let threads: Vec<Thread> = read_json(input).with_context(|| {
        format!("Run 'mailrag embed' first to create {}", input.display())
    })?;

    let embedder = HttpEmbedder::new(config.embedding.clone(), config.opensearch.embedding_dim)?;
    let hits = search_similar(&embedder, query, &threads, field, top_k).await?;
    if hits.is_empty() {
        println!("No embedded messages found in {}", input.display());
        return Ok(());
    }

    for (i, (score, message)) in hits.iter().enumerate() {
        println!("{}. Message ID: {}", i + 1, message.id);
        println!("   Thread ID: {}", message.thread_id);
        println!("   Subject: {}", message.headers.subject_or_empty());
        println!("   Similarity: {:.4}", score);
        if !message.snippet.is_empty() {
            println!("   {}...", truncate(&message.snippet, 100));
        }
        println!();
    }
    Ok(())
}

async fn run_index(config: &Config, command: IndexCommand) -> Result<()> {
    let client = OpenSearchClient::new(config.opensearch.clone())?;

    match command {
        IndexCommand::Health => {
            if client.health_check().await? {
                println!("OpenSearch is healthy");
            } else {
                bail!("OpenSearch is not healthy");
            }
        }
        IndexCommand::Setup { recreate } => {
            ensure_healthy(&client).await?;
            let setup = client.setup_index(recreate).await?;
            println!("Index {}: {}", client.index_name(), setup.as_str());
        }
        IndexCommand::Upload { input, recreate } => {
            ensure_healthy(&client).await?;
            let setup = client.setup_index(recreate).await?;
            info!("Index {}: {}", client.index_name(), setup.as_str());

            let threads: Vec<Thread> = read_json(&input)?;
            let documents = map_threads(&threads);
            if documents.iter().any(|d| d.body_embedding.is_none()) {
                warn!("Some messages have no embeddings; run 'mailrag embed' for vector search");
            }

            let outcome = client.bulk_index(documents).await?;
            println!("Indexed {} messages", outcome.succeeded);
            if outcome.failed > 0 {
                eprintln!("Failed to index {} messages", outcome.failed);
                for error in &outcome.errors {
                    eprintln!("  {}", error);
                }
            }

            let stats = client.stats().await?;
            println!(
                "Index now holds {} messages in {} threads",
                stats.total_messages, stats.unique_threads
            );
        }
        IndexCommand::Search {
            query,
            mode,
            size,
            field,
            text_weight,
            vector_weight,
            min_score,
            json,
        } => {
            let body = match mode {
                SearchMode::Lexical => lexical_query(&query, size)?,
                SearchMode::Vector | SearchMode::Hybrid => {
                    let embedder = HttpEmbedder::new(
                        config.embedding.clone(),
                        config.opensearch.embedding_dim,
                    )?;
                    let vector = embed_query(&embedder, &query).await?;
                    match mode {
                        SearchMode::Vector => vector_query(&vector, field, size, min_score)?,
                        _ => hybrid_query(
                            &HybridParams::new(&query, &vector, field, size)
                                .with_weights(text_weight, vector_weight),
                        )?,
                    }
                }
            };

            let response = client.search(&body).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_hits(&response);
            }
        }
        IndexCommand::Stats => {
            let stats = client.stats().await?;
            println!("Index: {}", stats.index_name);
            println!("Total messages: {}", stats.total_messages);
            println!("Unique threads: {}", stats.unique_threads);
            println!("Size: {} bytes", stats.index_size_bytes);
        }
    }

    Ok(())
}

async fn ensure_healthy(client: &OpenSearchClient) -> Result<()> {
    if !client.health_check().await? {
        bail!("OpenSearch is not accessible");
    }
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn print_summaries(summaries: &[ThreadSummary]) {
    for (i, summary) in summaries.iter().take(10).enumerate() {
        println!("\n{}. Thread ID: {}", i + 1, summary.id);
        match &summary.subject {
            Some(subject) => println!("   Subject: {}", subject),
            None if !summary.snippet.is_empty() => println!("   Preview: {}...", summary.snippet),
            None => {}
        }
    }
    if summaries.len() > 10 {
        println!("\n... and {} more threads", summaries.len() - 10);
    }
}

fn print_threads(threads: &[Thread]) {
    for thread in threads.iter().take(5) {
        let first = thread.messages.first();
        println!("\n• Thread ID: {}", thread.id);
        println!("  Messages: {}", thread.messages.len());
        if let Some(message) = first {
            println!("  Subject: {}", truncate(message.headers.subject_or_empty(), 60));
            println!("  From: {}", message.headers.from_or_empty());
        }
    }
    if threads.len() > 5 {
        println!("\n... and {} more threads", threads.len() - 5);
    }
}

fn print_hits(response: &SearchResponse) {
    let hits = &response.hits.hits;
    if hits.is_empty() {
        println!("No results found");
        return;
    }

    println!(
        "Found {} matching messages (showing {})\n",
        response.total(),
        hits.len()
    );
    for (i, hit) in hits.iter().enumerate() {
        let doc = &hit.source;
        println!("{}. Message ID: {}", i + 1, doc.message_id);
        println!("   Thread ID: {}", doc.thread_id);
        println!("   Subject: {}", doc.subject);
        println!("   From: {}", doc.from);
        println!("   Date: {}", doc.date.as_deref().unwrap_or("Unknown"));
        if let Some(score) = hit.score {
            println!("   Score: {:.4}", score);
        }

        if let Some(fragment) = hit.fragment("subject") {
            println!("   Match in subject: {}...", truncate(fragment, 100));
        } else if let Some(fragment) = hit.fragment("body_text") {
            println!("   Match in body: {}...", truncate(fragment, 100));
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_search_defaults() {
        let cli = Cli::try_parse_from(["mailrag", "index", "search", "budget"]).unwrap();
        match cli.command {
            Commands::Index(IndexCommand::Search {
                query,
                mode,
                size,
                field,
                ..
            }) => {
                assert_eq!(query, "budget");
                assert!(matches!(mode, SearchMode::Lexical));
                assert_eq!(size, 10);
                assert_eq!(field, VectorField::Body);
            }
            _ => panic!("expected index search"),
        }
    }

    #[test]
    fn test_parse_hybrid_options() {
        let cli = Cli::try_parse_from([
            "mailrag",
            "--config",
            "custom.toml",
            "index",
            "search",
            "budget",
            "--mode",
            "hybrid",
            "--field",
            "subject",
            "--text-weight",
            "1.5",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        match cli.command {
            Commands::Index(IndexCommand::Search {
                mode,
                field,
                text_weight,
                vector_weight,
                ..
            }) => {
                assert!(matches!(mode, SearchMode::Hybrid));
                assert_eq!(field, VectorField::Subject);
                assert_eq!(text_weight, 1.5);
                assert_eq!(vector_weight, 0.7);
            }
            _ => panic!("expected index search"),
        }
    }

    #[test]
    fn test_parse_similar() {
        let cli = Cli::try_parse_from([
            "mailrag", "similar", "budget", "--field", "subject", "-n", "3",
        ])
        .unwrap();
        match cli.command {
            Commands::Similar {
                query,
                input,
                field,
                top_k,
            } => {
                assert_eq!(query, "budget");
                assert_eq!(input, PathBuf::from("data/embedded_threads.json"));
                assert_eq!(field, VectorField::Subject);
                assert_eq!(top_k, 3);
            }
            _ => panic!("expected similar"),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_field() {
        assert!(
            Cli::try_parse_from(["mailrag", "index", "search", "q", "--field", "snippet"]).is_err()
        );
    }

    #[test]
    fn test_json_file_roundtrip_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/data/thread_ids.json");
        let summaries = vec![ThreadSummary {
            id: "t1".to_string(),
            snippet: "hello".to_string(),
            subject: Some("Hi".to_string()),
        }];

        write_json(&path, &summaries).unwrap();
        let entries: Vec<ThreadIdEntry> = read_json(&path).unwrap();
        assert_eq!(entries[0].id(), "t1");
    }

    #[test]
    fn test_read_json_reports_path() {
        let err = read_json::<Vec<Thread>>(Path::new("/nonexistent/threads.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/threads.json"));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }
}
