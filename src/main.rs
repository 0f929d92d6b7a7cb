//! Palimpsest main entry point
//!
//! Command-line interface for the Palimpsest historical web content archiver.

use clap::{Parser, Subcommand};
use palimpsest::config::{default_config_toml, load_config_with_hash, Config};
use palimpsest::queue::Channel;
use palimpsest::Archiver;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Palimpsest: a historical web content archiver
///
/// Palimpsest resolves URLs against a snapshot index, downloads the captured
/// content with rate limiting and retries, rewrites embedded links to point
/// back into the archive, and stores the result for search.
#[derive(Parser, Debug)]
#[command(name = "palimpsest")]
#[command(version = "1.0.0")]
#[command(about = "A historical web content archiver", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults apply when omitted)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Archive all snapshots of the given URLs
    Archive {
        /// URLs to archive (plain or archive-coordinate form)
        #[arg(value_name = "URL")]
        urls: Vec<String>,

        /// File with one URL per line; lines starting with # are ignored
        #[arg(short, long, value_name = "FILE")]
        input: Option<PathBuf>,

        /// Override the configured output directory
        #[arg(short, long, value_name = "DIR")]
        output: Option<String>,

        /// Drive the URLs through the stage channels and a worker pool
        /// instead of the direct batch path
        #[arg(long)]
        queued: bool,

        /// Override the configured worker count (queued mode)
        #[arg(short, long, value_name = "COUNT")]
        workers: Option<u32>,
    },

    /// Run a worker pool draining the stage channels until interrupted
    Workers {
        /// Number of worker loops (defaults to the configured count)
        #[arg(short = 'n', long, value_name = "COUNT")]
        count: Option<u32>,
    },

    /// Inspect or clear the stage channels
    Queue {
        #[command(subcommand)]
        command: QueueCommand,
    },

    /// Print a commented starter configuration file
    Init,

    /// Load and validate the configuration, then exit
    ValidateConfig,
}

#[derive(Subcommand, Debug)]
enum QueueCommand {
    /// Show the number of queued messages per channel
    Size,
    /// Delete every queued message on a channel
    Clear {
        /// Channel name: discovery, ingestion, transformation, or indexing
        #[arg(value_name = "CHANNEL")]
        channel: Channel,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    // Init needs no configuration at all
    if matches!(cli.command, Command::Init) {
        print!("{}", default_config_toml());
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            match load_config_with_hash(path) {
                Ok((config, hash)) => {
                    tracing::info!("Configuration loaded successfully (hash: {})", hash);
                    config
                }
                Err(e) => {
                    tracing::error!("Failed to load configuration: {}", e);
                    return Err(e.into());
                }
            }
        }
        None => {
            tracing::debug!("No configuration file given, using defaults");
            Config::default()
        }
    };

    match cli.command {
        Command::Archive {
            urls,
            input,
            output,
            queued,
            workers,
        } => handle_archive(config, urls, input, output, queued, workers).await?,
        Command::Workers { count } => handle_workers(config, count).await?,
        Command::Queue { command } => handle_queue(config, command).await?,
        Command::ValidateConfig => {
            println!("✓ Configuration is valid");
        }
        Command::Init => unreachable!("handled above"),
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("palimpsest=info,warn"),
            1 => EnvFilter::new("palimpsest=debug,info"),
            2 => EnvFilter::new("palimpsest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the archive subcommand
async fn handle_archive(
    mut config: Config,
    mut urls: Vec<String>,
    input: Option<PathBuf>,
    output: Option<String>,
    queued: bool,
    workers: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(path) = input {
        urls.extend(read_url_file(&path)?);
    }
    if urls.is_empty() {
        return Err("no URLs given (pass them as arguments or via --input)".into());
    }
    if let Some(dir) = output {
        config.archive.output_dir = dir;
    }

    let workers = workers.unwrap_or(config.processing.workers);
    let archiver = Archiver::new(config)?;

    if queued {
        for url in &urls {
            archiver.enqueue_url(url)?;
        }
        archiver.start_workers(workers);
        wait_until_drained(&archiver).await;
        archiver.shutdown().await;
        println!("✓ Queued archive run complete");
        return Ok(());
    }

    let stats = archiver.archive_urls(&urls).await?;
    println!("=== Archive Run ===");
    println!("  Snapshots discovered: {}", stats.discovered);
    println!("  Downloaded:           {}", stats.downloaded);
    println!("  Transformed:          {}", stats.transformed);
    println!("  Indexed:              {}", stats.indexed);
    println!("  Failed:               {}", stats.failed);
    println!("  Skipped:              {}", stats.skipped);
    println!("  Success rate:         {:.1}%", stats.success_rate());
    if let Some(secs) = stats.duration_secs() {
        println!("  Duration:             {:.1}s", secs);
    }
    Ok(())
}

/// Handles the workers subcommand: drain channels until Ctrl-C
async fn handle_workers(
    config: Config,
    count: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let count = count.unwrap_or(config.processing.workers);
    let archiver = Archiver::new(config)?;

    archiver.start_workers(count);
    println!("Running {} workers, press Ctrl-C to stop", count);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Interrupt received, shutting down");
    archiver.shutdown().await;
    Ok(())
}

/// Handles the queue subcommand
async fn handle_queue(
    config: Config,
    command: QueueCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    let archiver = Archiver::new(config)?;

    match command {
        QueueCommand::Size => {
            for channel in Channel::ALL {
                println!("{:15} {}", channel, archiver.queue().queue_size(channel));
            }
        }
        QueueCommand::Clear { channel } => {
            archiver.queue().clear_queue(channel);
            println!("✓ Cleared channel: {}", channel);
        }
    }
    Ok(())
}

/// Reads a URL-per-line file, skipping blanks and # comments
fn read_url_file(path: &PathBuf) -> Result<Vec<String>, std::io::Error> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Waits until every stage channel has stayed empty for a settling period
async fn wait_until_drained(archiver: &Archiver) {
    let mut idle_checks = 0;
    loop {
        tokio::time::sleep(Duration::from_millis(500)).await;
        let empty = Channel::ALL
            .iter()
            .all(|&channel| archiver.queue().queue_size(channel) == 0);

        if empty {
            idle_checks += 1;
            // Workers may be mid-handoff between channels, so require the
            // queues to stay empty across consecutive checks
            if idle_checks >= 3 {
                return;
            }
        } else {
            idle_checks = 0;
        }
    }
}
