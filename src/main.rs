//! semgraph - flat-file knowledge store tooling
//!
//! # Usage
//!
//! ```bash
//! # Validate a store file
//! semgraph validate graph.tsv
//!
//! # Show store statistics
//! semgraph stats graph.tsv
//!
//! # Bring the companion vector store up to date
//! semgraph sync
//!
//! # Semantic search (keyword fallback when no generator is configured)
//! semgraph search "water boiling point" --domain science --min-certainty 0.8
//!
//! # Archive a record as of today
//! semgraph archive rec-42
//! ```
//!
//! # Environment Variables
//!
//! - `SEMGRAPH_CONFIG`: Path to a TOML config file (default: ./semgraph.toml)
//! - `RUST_LOG`: Logging level (default: warn)

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

use semgraph::embedding::{
    CommandGenerator, EmbeddingGenerator, EmbeddingRequest, SyncOptions, VectorStore,
};
use semgraph::store::writer::write_snapshot;
use semgraph::types::{SearchFilter, Stance};
use semgraph::{validate_store, AppConfig, Snapshot};

/// Cap on per-problem listings so a badly broken store stays readable.
const MAX_LISTED: usize = 20;

#[derive(Parser, Debug)]
#[command(name = "semgraph")]
#[command(about = "Flat-file knowledge store: validate, search, synchronize")]
#[command(version)]
struct CliArgs {
    /// Override the store path from config
    #[arg(long, global = true, value_name = "PATH")]
    graph: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a store file for structural and semantic problems
    Validate {
        /// Store file (default: from config)
        path: Option<PathBuf>,

        /// Abort on the first malformed row instead of collecting everything
        #[arg(long)]
        strict: bool,
    },

    /// Print aggregate statistics for a store
    Stats {
        /// Store file (default: from config)
        path: Option<PathBuf>,
    },

    /// Rank records by similarity to a query
    Search {
        /// Query text
        query: String,

        /// Restrict to one domain (exact match)
        #[arg(long)]
        domain: Option<String>,

        /// Restrict to these stances (repeatable)
        #[arg(long = "stance", value_name = "STANCE")]
        stances: Vec<String>,

        /// Minimum certainty, inclusive
        #[arg(long, value_name = "0.0-1.0")]
        min_certainty: Option<f64>,

        /// Include archived records
        #[arg(long)]
        include_archived: bool,

        /// Number of results (default: from config)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Emit results as JSON lines instead of the table
        #[arg(long)]
        json: bool,
    },

    /// Regenerate missing and stale vector entries, prune orphans
    Sync {
        /// Override the configured batch size
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Archive a record as of a given date
    Archive {
        /// Record id
        id: String,

        /// Archive date, YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let config = AppConfig::load();
    let graph_path = args
        .graph
        .clone()
        .unwrap_or_else(|| config.store.graph_path.clone());

    match args.command {
        Command::Validate { path, strict } => {
            run_validate(&path.unwrap_or(graph_path), strict)
        }
        Command::Stats { path } => run_stats(&path.unwrap_or(graph_path)),
        Command::Search {
            query,
            domain,
            stances,
            min_certainty,
            include_archived,
            top_k,
            json,
        } => {
            let filter = build_filter(domain, &stances, min_certainty, include_archived)?;
            let top_k = top_k.unwrap_or(config.search.top_k);
            run_search(&graph_path, &config, &query, &filter, top_k, json).await
        }
        Command::Sync { batch_size } => run_sync(&graph_path, &config, batch_size).await,
        Command::Archive { id, date } => run_archive(&graph_path, &id, date),
    }
}

// ============================================================================
// validate
// ============================================================================

fn run_validate(path: &Path, strict: bool) -> Result<()> {
    if strict {
        let snapshot = Snapshot::load_strict(path)
            .with_context(|| format!("failed to load {}", path.display()))?;
        println!("OK: {} records, no problems found", snapshot.len());
        return Ok(());
    }

    let report = validate_store(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    println!("Checked {} records", report.record_count);

    if !report.skipped.is_empty() {
        println!("\nUnreadable rows ({}):", report.skipped.len());
        for skipped in report.skipped.iter().take(MAX_LISTED) {
            println!("  line {}: {}", skipped.line, skipped.reason);
        }
        print_overflow(report.skipped.len());
    }

    if !report.errors.is_empty() {
        println!("\nErrors ({}):", report.errors.len());
        for error in report.errors.iter().take(MAX_LISTED) {
            println!("  {error}");
        }
        print_overflow(report.errors.len());
    }

    if !report.warnings.is_empty() {
        println!("\nWarnings ({}):", report.warnings.len());
        for warning in report.warnings.iter().take(MAX_LISTED) {
            println!("  {warning}");
        }
        print_overflow(report.warnings.len());
    }

    if report.is_valid() {
        println!("\nOK");
        Ok(())
    } else {
        bail!(
            "store is invalid: {} errors, {} unreadable rows",
            report.errors.len(),
            report.skipped.len()
        );
    }
}

fn print_overflow(total: usize) {
    if total > MAX_LISTED {
        println!("  ... and {} more", total - MAX_LISTED);
    }
}

// ============================================================================
// stats
// ============================================================================

fn run_stats(path: &Path) -> Result<()> {
    let (snapshot, report) = Snapshot::load(path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    if !report.skipped.is_empty() {
        println!("(skipped {} unreadable rows)\n", report.skipped.len());
    }
    print!("{}", semgraph::stats::collect(&snapshot));
    Ok(())
}

// ============================================================================
// search
// ============================================================================

fn build_filter(
    domain: Option<String>,
    stance_tokens: &[String],
    min_certainty: Option<f64>,
    include_archived: bool,
) -> Result<SearchFilter> {
    let mut filter = SearchFilter::new();
    if include_archived {
        filter = filter.include_archived();
    }
    if let Some(domain) = domain {
        filter = filter.with_domain(&domain);
    }
    if let Some(min) = min_certainty {
        if !(0.0..=1.0).contains(&min) {
            bail!("--min-certainty must be within [0.0, 1.0], got {min}");
        }
        filter = filter.with_min_certainty(min);
    }
    if !stance_tokens.is_empty() {
        let mut stances = Vec::with_capacity(stance_tokens.len());
        for token in stance_tokens {
            match Stance::parse(token) {
                Some(stance) => stances.push(stance),
                None => bail!("unknown stance '{token}'"),
            }
        }
        filter = filter.with_stances(stances);
    }
    Ok(filter)
}

async fn run_search(
    graph_path: &Path,
    config: &AppConfig,
    query: &str,
    filter: &SearchFilter,
    top_k: usize,
    json: bool,
) -> Result<()> {
    let (snapshot, _) = Snapshot::load(graph_path)
        .with_context(|| format!("failed to load {}", graph_path.display()))?;
    let vectors = VectorStore::load(&config.semantics_path())
        .with_context(|| format!("failed to load {}", config.semantics_path().display()))?;

    // With nothing to score against there is no point invoking the
    // generator; skip straight to keyword matching.
    let embedding = if vectors.is_empty() {
        None
    } else {
        embed_query(config, query).await?
    };
    let hits = match embedding {
        Some(embedding) => semgraph::search(&snapshot, &vectors, &embedding, filter, top_k)?,
        None => {
            info!("no usable embeddings, falling back to keyword search");
            semgraph::keyword_search(&snapshot, query, filter, top_k)
        }
    };

    if json {
        for hit in &hits {
            println!("{}", serde_json::to_string(hit)?);
        }
        return Ok(());
    }

    if hits.is_empty() {
        println!("No results");
        return Ok(());
    }
    for (rank, hit) in hits.iter().enumerate() {
        println!(
            "{:>2}. [{:.3}] {} ({}, certainty {:.2})",
            rank + 1,
            hit.score,
            hit.record.id,
            hit.record.stance_token(),
            hit.record.certainty
        );
        println!("      {}", hit.record.content);
    }
    Ok(())
}

/// Embed the query via the configured generator. `None` when no command is
/// configured or the generator could not produce a vector; the caller falls
/// back to keyword matching.
async fn embed_query(config: &AppConfig, query: &str) -> Result<Option<Vec<f32>>> {
    let Some(ref command) = config.generator.command else {
        return Ok(None);
    };
    let generator = CommandGenerator::new(command, &config.generator.args);
    let batch = [EmbeddingRequest {
        id: "query".to_string(),
        text: query.to_string(),
    }];
    let results = generator
        .embed_batch(&batch)
        .await
        .context("embedding the query failed")?;

    for result in results {
        if result.id == "query" {
            return match result.outcome {
                Ok(embedding) => Ok(Some(embedding)),
                Err(message) => bail!("generator rejected the query: {message}"),
            };
        }
    }
    bail!("generator returned no reply for the query")
}

// ============================================================================
// sync
// ============================================================================

async fn run_sync(
    graph_path: &Path,
    config: &AppConfig,
    batch_size: Option<usize>,
) -> Result<()> {
    let Some(ref command) = config.generator.command else {
        bail!("no generator command configured; set [generator] command in semgraph.toml");
    };

    let (snapshot, report) = Snapshot::load(graph_path)
        .with_context(|| format!("failed to load {}", graph_path.display()))?;
    if !report.skipped.is_empty() {
        println!("(skipped {} unreadable rows)", report.skipped.len());
    }

    let semantics_path = config.semantics_path();
    let mut vectors = VectorStore::load(&semantics_path)
        .with_context(|| format!("failed to load {}", semantics_path.display()))?;

    let generator = CommandGenerator::new(command, &config.generator.args);
    let options = SyncOptions {
        batch_size: batch_size.unwrap_or(config.generator.batch_size),
        timeout: config.generator.timeout(),
    };

    let outcome = semgraph::synchronize(&snapshot, &mut vectors, &generator, &options).await;
    vectors
        .save(&semantics_path)
        .with_context(|| format!("failed to write {}", semantics_path.display()))?;

    println!("Fresh:       {}", outcome.fresh_count);
    println!("Regenerated: {}", outcome.regenerated_count);
    println!("Pruned:      {}", outcome.pruned_count);
    if !outcome.failed_ids.is_empty() {
        println!("Failed ({}):", outcome.failed_ids.len());
        for id in outcome.failed_ids.iter().take(MAX_LISTED) {
            println!("  {id}");
        }
        print_overflow(outcome.failed_ids.len());
        bail!("{} records failed to embed; rerun to retry", outcome.failed_ids.len());
    }
    Ok(())
}

// ============================================================================
// archive
// ============================================================================

fn run_archive(graph_path: &Path, id: &str, date: Option<NaiveDate>) -> Result<()> {
    let date = date.unwrap_or_else(|| chrono::Utc::now().date_naive());

    let (mut snapshot, report) = Snapshot::load(graph_path)
        .with_context(|| format!("failed to load {}", graph_path.display()))?;
    if !report.skipped.is_empty() {
        bail!(
            "refusing to rewrite a store with {} unreadable rows; run validate first",
            report.skipped.len()
        );
    }

    let record = snapshot
        .get(id)
        .with_context(|| format!("no record with id '{id}'"))?;
    if !record.archived_date.is_active() {
        bail!("record '{id}' is already archived");
    }

    let archived = semgraph::archive(record, date)?;
    snapshot.replace(archived)?;
    write_snapshot(graph_path, &snapshot)?;

    println!("Archived '{id}' as of {date}");
    Ok(())
}
