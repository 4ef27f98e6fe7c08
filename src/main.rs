//! Nagare - Concurrent Video and Audio Downloader
//!
//! Entry point: parses arguments, sets up logging, and runs one batch for the
//! given video or playlist reference.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tracing_appender::{non_blocking, rolling};

use nagare::catalog::ItemMetadata;
use nagare::cli::Args;
use nagare::config::Config;
use nagare::progress::{BarSink, LogSink, ProgressSink};
use nagare::workflow::Workflow;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(args.verbose)?;
    info!("Starting Nagare - Concurrent Video and Audio Downloader");

    let mut config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if std::path::Path::new("nagare.toml").exists() {
                info!("Found nagare.toml in current directory, loading...");
                Config::from_file("nagare.toml")?
            } else {
                Config::default()
            }
        }
    };
    args.apply_to(&mut config);
    config.validate()?;

    // Bars and per-line logging fight over the terminal; verbose runs get logs only.
    let sink: Arc<dyn ProgressSink> = if args.verbose {
        Arc::new(LogSink)
    } else {
        Arc::new(BarSink::new())
    };

    let workflow = Workflow::new(config, sink)?;

    if args.metadata_only {
        let described = workflow.describe(&args.reference).await?;
        let mut unresolved = 0;
        for (item, metadata) in &described {
            match metadata {
                Ok(metadata) => print_metadata(metadata),
                Err(e) => {
                    unresolved += 1;
                    println!("\n{}: failed to resolve: {}", item, e);
                }
            }
        }
        if unresolved > 0 {
            anyhow::bail!("{} of {} items could not be resolved", unresolved, described.len());
        }
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling downloads...");
            ctrl_c.cancel();
        }
    });

    let result = workflow.download(&args.reference, cancel).await?;

    println!();
    for outcome in result.outcomes() {
        println!("{}", outcome);
    }
    println!("{}", result.summary());

    if !result.all_succeeded() {
        anyhow::bail!(
            "{} of {} items failed",
            result.failures().count(),
            result.len()
        );
    }

    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let nagare_dir = std::env::current_dir()?.join(".nagare");
    let log_dir = nagare_dir.join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(&log_dir, "nagare.log");
    let (non_blocking_file, _guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(_guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false); // No ANSI colors in file

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - console: {}, file: {}",
        log_level,
        log_dir.join("nagare.log").display()
    );

    Ok(())
}

fn print_metadata(metadata: &ItemMetadata) {
    println!("\n{}", metadata.title);
    println!("  id:       {}", metadata.id);
    println!("  author:   {}", metadata.author);
    if let Some(duration) = metadata.duration {
        println!("  duration: {}", format_duration(duration.as_secs()));
    }
    println!("  {:<10} {:<10} {:<6} {:>10}  {}", "Format", "Quality", "Audio", "Size (MB)", "Mime");
    println!("  {}", "-".repeat(70));
    for variant in &metadata.variants {
        let size = variant
            .size
            .map(|bytes| format!("{:.1}", bytes as f64 / 1024.0 / 1024.0))
            .unwrap_or_else(|| "?".to_string());
        println!(
            "  {:<10} {:<10} {:<6} {:>10}  {}",
            variant.format_id,
            variant.quality,
            if variant.has_audio { "yes" } else { "no" },
            size,
            variant.mime_type
        );
    }
}

/// Format duration in seconds to human readable string
fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}
