//! # BitRAG CLI
//!
//! Ingests a JSONL file of document chunks into one session, then answers
//! queries read from stdin, one per line.
//!
//! Usage:
//!   bitrag --docs chunks.jsonl                 # print context + citations
//!   bitrag --docs chunks.jsonl --answer        # ask the configured generator
//!   bitrag --init-config                       # write ~/.bitrag/config.toml

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bitrag_core::{BitRagConfig, DocumentChunk};
use bitrag_knowledge::KnowledgeService;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "bitrag",
    version,
    about = "🧲 BitRAG — binary-quantized retrieval over your documents"
)]
struct Cli {
    /// Config file (defaults to ~/.bitrag/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// JSONL file with one {"text", "filename", "page"} object per line
    #[arg(short, long)]
    docs: Option<String>,

    /// Session id (generated when omitted)
    #[arg(short, long)]
    session: Option<String>,

    /// Number of chunks to retrieve per query
    #[arg(short, long)]
    k: Option<usize>,

    /// Generate an answer instead of printing the raw context
    #[arg(long)]
    answer: bool,

    /// Index files again even if the session already holds them
    #[arg(long)]
    reingest: bool,

    /// Write the default config and exit
    #[arg(long)]
    init_config: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

fn load_config(path: Option<&str>) -> Result<BitRagConfig> {
    let config = match path {
        Some(p) => BitRagConfig::load_from(&expand_path(p))?,
        None => BitRagConfig::load()?,
    };
    Ok(config)
}

fn read_chunks(path: &Path) -> Result<Vec<DocumentChunk>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str::<DocumentChunk>(line)
                .with_context(|| format!("{}:{}: invalid chunk", path.display(), n + 1))
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "bitrag=debug,bitrag_knowledge=debug,bitrag_providers=debug"
    } else {
        "bitrag=info,bitrag_knowledge=info,bitrag_providers=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    if cli.init_config {
        let path = cli
            .config
            .as_deref()
            .map(expand_path)
            .unwrap_or_else(BitRagConfig::default_path);
        BitRagConfig::default().save_to(&path)?;
        println!("✅ Config written to {}", path.display());
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    let service = KnowledgeService::from_config(&config)?.with_reingest(cli.reingest);
    let session = service.open_session(cli.session.as_deref())?;
    eprintln!("🧲 Session {session}");

    if let Some(docs) = &cli.docs {
        let chunks = read_chunks(&expand_path(docs))?;
        let report = service.ingest(&session, chunks).await?;
        eprintln!(
            "📥 Indexed {} chunk(s) in {} batch(es)",
            report.items, report.batches
        );
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if cli.answer {
            match service.answer(&session, query, cli.k).await {
                Ok(answer) => println!("{}\n", answer.text),
                Err(e) => eprintln!("❌ {e}"),
            }
            continue;
        }
        match service.query(&session, query, cli.k).await {
            Ok(outcome) => {
                println!("{}", outcome.context);
                println!("\n📎 {}", outcome.citations.join(", "));
                println!("⏱️ {}ms\n", outcome.retrieval_time_ms);
            }
            Err(e) => eprintln!("❌ {e}"),
        }
    }

    let info = service.session_info(&session)?;
    tracing::debug!("Session {} held {} item(s)", info.id, info.items);
    service.close_session(&session)?;
    Ok(())
}
