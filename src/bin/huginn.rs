//! huginn: alt-text enrichment CLI
//!
//! Describes local image files and writes the result to a sidecar
//! `<image>.alt.txt` next to each file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use huginn::{
    AltTextSink, BatchOutcome, BatchProcessor, EnrichmentConfig, EnrichmentService,
    GenerationMode, ImageId, ImageRef, Pricing, SidecarSink, SqliteStatistics, StatisticsStore,
    StatsSummary,
};

/// Huginn CLI
#[derive(Parser)]
#[command(name = "huginn")]
#[command(version = huginn::version::PKG_VERSION)]
#[command(about = "Generate image alt text with a vision model")]
struct Args {
    /// Config file (default: ~/.huginn/config.toml, then /etc/huginn/config.toml)
    #[arg(short, long, env = "HUGINN_CONFIG")]
    config: Option<PathBuf>,

    /// Statistics database (default: <data dir>/huginn/stats.db)
    #[arg(long, env = "HUGINN_STATS_DB")]
    stats_db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Describe a single image
    Generate {
        /// Image file
        path: PathBuf,
        /// Print the text without writing the sidecar
        #[arg(long)]
        preview: bool,
        /// Target language code (overrides config)
        #[arg(short, long)]
        language: Option<String>,
    },

    /// Describe many images
    Batch {
        /// Image files
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Items per chunk (default: from config)
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Skip images that already have a sidecar
        #[arg(long)]
        skip_existing: bool,
    },

    /// Show generation statistics
    Stats {
        #[arg(long, value_enum, default_value_t = Format::Table)]
        format: Format,
        /// Number of recent generations to list
        #[arg(long, default_value_t = 10)]
        recent: usize,
    },

    /// Delete all generation statistics
    ClearStats,

    /// Delete statistics for image files that no longer exist
    Prune {
        /// Only report how many images are gone
        #[arg(long)]
        dry_run: bool,
    },

    /// Print build version
    Version {
        /// Print build metadata as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Table,
    Json,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let stats_path = args.stats_db.clone().unwrap_or_else(default_stats_path);

    match args.command {
        Command::Generate {
            path,
            preview,
            language,
        } => {
            let mut config = EnrichmentConfig::load(args.config.as_deref())?;
            if let Some(language) = language {
                config.language = language;
            }
            let service = build_service(config, open_stats(&stats_path)?)?;

            let image = image_ref(&path);
            let result = service.generate(&image, GenerationMode::Cli, preview).await?;
            println!("{}", result.text);
            if !preview {
                eprintln!(
                    "wrote {} ({} tokens{})",
                    SidecarSink::sidecar_path(&image.id, None).display(),
                    result.tokens_used,
                    if result.cached { ", cached" } else { "" }
                );
            }
        }

        Command::Batch {
            paths,
            chunk_size,
            skip_existing,
        } => {
            let config = EnrichmentConfig::load(args.config.as_deref())?;
            let chunk_size = chunk_size.unwrap_or(config.batch_chunk_size);
            let service = Arc::new(build_service(config, open_stats(&stats_path)?)?);

            let mut images = Vec::with_capacity(paths.len());
            for path in &paths {
                let image = image_ref(path);
                if skip_existing && service.sink().current(&image.id).await?.is_some() {
                    eprintln!("skip {}", path.display());
                    continue;
                }
                images.push(image);
            }
            if images.is_empty() {
                eprintln!("nothing to do");
                return Ok(());
            }

            let report = BatchProcessor::new(service)
                .with_mode(GenerationMode::Cli)
                .process(&images, chunk_size)
                .await?;

            for (id, outcome) in report.iter() {
                match outcome {
                    BatchOutcome::Succeeded { text, .. } => println!("ok    {id}: {text}"),
                    BatchOutcome::Failed { error } => println!("error {id}: {error}"),
                }
            }
            eprintln!(
                "{} succeeded, {} failed, {} tokens",
                report.succeeded().len(),
                report.failed().len(),
                report.tokens_used()
            );
        }

        Command::Stats { format, recent } => {
            let summary = open_stats(&stats_path)?.aggregate(recent).await?;
            match format {
                Format::Json => {
                    let cost = summary.estimated_cost_usd(&Pricing::default());
                    let value = serde_json::json!({
                        "summary": summary,
                        "average_tokens": summary.average_tokens(),
                        "estimated_cost_usd": cost,
                    });
                    println!("{}", serde_json::to_string_pretty(&value)?);
                }
                Format::Table => print_stats_table(&summary),
            }
        }

        Command::ClearStats => {
            let removed = open_stats(&stats_path)?.truncate().await?;
            println!("removed {removed} records from {}", stats_path.display());
        }

        Command::Prune { dry_run } => {
            let stats = open_stats(&stats_path)?;
            let exists = |id: &ImageId| Path::new(id.as_str()).exists();
            if dry_run {
                let orphans = stats.orphaned_count(&exists).await?;
                println!("{orphans} images no longer exist");
            } else {
                let removed = stats.cleanup_orphans(&exists).await?;
                println!("removed {removed} records");
            }
        }

        Command::Version { json } => {
            let info = huginn::version::BuildInfo::current();
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("huginn {info}");
            }
        }
    }

    Ok(())
}

fn build_service(
    config: EnrichmentConfig,
    stats: Arc<dyn StatisticsStore>,
) -> huginn::Result<EnrichmentService> {
    let sink: Arc<dyn AltTextSink> = Arc::new(SidecarSink::new());
    EnrichmentService::builder(config)
        .stats(stats)
        .sink(sink)
        .build()
}

fn open_stats(path: &Path) -> huginn::Result<Arc<dyn StatisticsStore>> {
    Ok(Arc::new(SqliteStatistics::open(path)?))
}

fn image_ref(path: &Path) -> ImageRef {
    ImageRef::file(path.to_string_lossy().into_owned(), path)
}

fn default_stats_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("huginn")
        .join("stats.db")
}

fn print_stats_table(summary: &StatsSummary) {
    let pricing = Pricing::default();
    println!("Generations:     {}", summary.total_generations);
    println!("Applied:         {}", summary.applied);
    println!("Edited:          {}", summary.edited);
    println!("Tokens:          {}", summary.total_tokens);
    println!("Avg tokens:      {:.1}", summary.average_tokens());
    println!(
        "Estimated cost:  ${:.4}",
        summary.estimated_cost_usd(&pricing)
    );

    if !summary.by_type.is_empty() {
        println!();
        println!("{:<28} {:>8}", "TYPE", "COUNT");
        for (tag, count) in &summary.by_type {
            let mode = GenerationMode::from(tag.as_str());
            println!("{:<28} {:>8}", mode.label(), count);
        }
    }

    if !summary.recent.is_empty() {
        println!();
        println!(
            "{:<20} {:<24} {:>3} {:>6}  TEXT",
            "WHEN", "IMAGE", "#", "TOKENS"
        );
        for entry in &summary.recent {
            let record = &entry.record;
            let text = record.edited_text.as_deref().unwrap_or(&record.text);
            println!(
                "{:<20} {:<24} {:>3} {:>6}  {}",
                record.created_at.format("%Y-%m-%d %H:%M:%S"),
                truncate(record.image_id.as_str(), 24),
                entry.update_number,
                record.tokens_used,
                text
            );
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let skip = s.chars().count() - (max - 1);
    format!("…{}", s.chars().skip(skip).collect::<String>())
}
