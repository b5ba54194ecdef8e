mod assets;
mod config;
mod db;
mod error;
mod extractor;
mod model;
mod pipeline;
mod shard;
mod site;
mod throttle;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::assets::HttpAssetFetcher;
use crate::config::{
    Config, MaterializeMode, OutputFormat, DEFAULT_AGGREGATES_URL, DEFAULT_MAX_CONCURRENT_GROUPS,
    DEFAULT_MILESTONE_EVERY, DEFAULT_OUTPUT_DIR, DEFAULT_PARTS_URL, DEFAULT_REQUESTS_PER_SEC,
};
use crate::pipeline::Pipeline;
use crate::shard::Materializer;
use crate::site::{RenderClient, SiteExtractor};
use crate::throttle::Throttle;

#[derive(Parser)]
#[command(name = "parts_scraper", about = "Resumable parts catalogue scraper via spider.cloud")]
struct Cli {
    /// Root for sqlite/, csv/, parquet/ and images/
    #[arg(long, global = true, default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape the catalogue, resuming from stored checkpoints
    Run {
        /// Catalogue page listing every vehicle
        #[arg(long)]
        catalog_url: String,
        /// Reprocess groups and vehicles already marked done
        #[arg(long)]
        force: bool,
        /// Which output shards to write
        #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
        format: OutputFormat,
        /// When shards are rewritten
        #[arg(long, value_enum, default_value_t = MaterializeMode::PerGroup)]
        materialize: MaterializeMode,
        /// Max group extractions in flight per vehicle
        #[arg(long, default_value_t = DEFAULT_MAX_CONCURRENT_GROUPS)]
        concurrency: usize,
        /// Outbound requests per second
        #[arg(long, default_value_t = DEFAULT_REQUESTS_PER_SEC)]
        rate: f64,
        /// Record a milestone every K vehicles (0 disables)
        #[arg(long, default_value_t = DEFAULT_MILESTONE_EVERY)]
        milestone_every: usize,
        /// Per-vehicle aggregates view ({catalog_url}, {model_code})
        #[arg(long, default_value = DEFAULT_AGGREGATES_URL)]
        aggregates_url: String,
        /// Per-group parts view ({catalog_url}, {model_code}, {table_no}, {group_code}, {variant})
        #[arg(long, default_value = DEFAULT_PARTS_URL)]
        parts_url: String,
        /// Hide the progress bar
        #[arg(long)]
        no_progress: bool,
        #[arg(long, env = "SPIDER_API_KEY", hide_env_values = true)]
        spider_api_key: String,
    },
    /// Show checkpoint and store statistics
    Stats {
        /// Max failed groups to list
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
    /// Rebuild output shards from the canonical store
    Materialize {
        #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
        format: OutputFormat,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _guard = init_logging(cli.log_file.as_deref())?;

    let t0 = Instant::now();
    let mut config = Config::new(&cli.output_dir);

    let result = match cli.command {
        Commands::Run {
            catalog_url,
            force,
            format,
            materialize,
            concurrency,
            rate,
            milestone_every,
            aggregates_url,
            parts_url,
            no_progress,
            spider_api_key,
        } => {
            config.force = force;
            config.output = format;
            config.materialize = materialize;
            config.max_concurrent_groups = concurrency.max(1);
            config.requests_per_sec = rate;
            config.milestone_every = milestone_every;
            config.aggregates_url = aggregates_url;
            config.parts_url = parts_url;
            config.show_progress = !no_progress;
            config
                .ensure_directories()
                .context("Failed to create output directories")?;

            let conn = db::connect(&config.sqlite_path)?;
            db::init_schema(&conn)?;

            let throttle = Throttle::per_second(config.requests_per_sec);
            let client = RenderClient::new(spider_api_key, throttle.clone(), &config)?;
            let extractor = Arc::new(SiteExtractor::new(client, &config));
            let assets = Arc::new(HttpAssetFetcher::new(&config, throttle, Some(catalog_url.as_str()))?);

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received; finishing in-flight groups before exit");
                    on_signal.cancel();
                }
            });

            let stats = Pipeline::new(&config, &conn, extractor, assets)
                .with_cancellation(cancel)
                .run(&catalog_url)
                .await?;
            println!(
                "Done: {} groups completed, {} skipped, {} failed, {} rows, {} images.",
                stats.groups_done,
                stats.groups_skipped,
                stats.groups_failed,
                stats.parts_rows,
                stats.images_saved
            );
            Ok(())
        }
        Commands::Stats { limit } => {
            if !config.sqlite_path.exists() {
                println!(
                    "No database at {}. Run 'run' first.",
                    config.sqlite_path.display()
                );
                return Ok(());
            }
            let conn = db::connect(&config.sqlite_path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Vehicles:    {}", s.vehicles);
            println!("Parts pages: {}", s.parts_pages);
            println!("Part rows:   {}", s.part_rows);
            println!("Milestones:  {}", s.milestones);
            if let Some(last) = db::fetch_milestones(&conn)?.last() {
                println!(
                    "  last: batch {} at {} ({})",
                    last.batch, last.last_vehicle_id, last.created_at
                );
            }
            println!("Done:        {}", s.done);
            println!("Pending:     {}", s.pending);
            println!("Errors:      {}", s.errors);

            let failed = db::failed_checkpoints(&conn)?;
            if !failed.is_empty() {
                println!("\n--- Failed groups ---");
                for cp in failed.iter().take(limit) {
                    println!(
                        "  {} [{}]: {}",
                        cp.key,
                        cp.updated_at,
                        truncate(cp.last_error.as_deref().unwrap_or("-"), 100)
                    );
                }
                if failed.len() > limit {
                    println!("  ... and {} more", failed.len() - limit);
                }
            }
            Ok(())
        }
        Commands::Materialize { format } => {
            config.output = format;
            config
                .ensure_directories()
                .context("Failed to create output directories")?;
            let conn = db::connect(&config.sqlite_path)?;
            db::init_schema(&conn)?;
            let materializer = Materializer::new(&config);
            let rows = materializer.rebuild(&conn)?;
            for dest in materializer.destinations() {
                println!("Wrote {} ({} rows)", dest.path.display(), rows);
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// Console logging always; file logging when `log_file` is set. The guard
/// must outlive the run so buffered lines reach the file.
fn init_logging(log_file: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let console = fmt::layer().with_writer(std::io::stderr);

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            std::fs::create_dir_all(dir).context("Failed to create log directory")?;
            let name = path
                .file_name()
                .context("--log-file must name a file")?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .init();
    Ok(guard)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
