//! surfmap: web attack-surface mapper
//!
//! Crawls a target, admitting only URLs that are likely to expose new
//! endpoints, and writes a JSON report of what it found.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use surfmap::config::{Config, LogFormat, DEFAULT_CONFIG_FILE};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{crawl::run_crawl, extract::run_extract, init::init_config};

#[derive(Parser)]
#[command(name = "surfmap")]
#[command(about = "URL discovery and admission for web attack-surface mapping")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl from one or more seed URLs
    Crawl {
        /// Seed URLs
        #[arg(required = true)]
        seeds: Vec<String>,

        /// Concurrent fetch workers
        #[arg(short, long)]
        workers: Option<usize>,

        /// Stop after this many pages (0 = unlimited)
        #[arg(short, long)]
        max_pages: Option<usize>,

        /// Restrict scope to these domains (adds to the config file)
        #[arg(short, long)]
        domain: Vec<String>,

        /// Follow links to any host when no domains are configured
        #[arg(long)]
        open_scope: bool,

        /// Write the JSON report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run extraction and admission over a saved HTML page
    Extract {
        /// HTML file
        file: PathBuf,

        /// URL the page was fetched from
        #[arg(short, long)]
        base: String,

        /// Print only admitted URLs
        #[arg(long)]
        admitted_only: bool,
    },

    /// Write a default configuration file
    Init {
        /// Directory to write surfmap.toml into
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_or_default(&cli.config)?;

    let log_level: Level = config.logging.level.raised(cli.verbose).into();
    let builder = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr);
    match config.logging.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish())?,
    }

    match cli.command {
        Commands::Crawl {
            seeds,
            workers,
            max_pages,
            domain,
            open_scope,
            output,
        } => run_crawl(config, seeds, workers, max_pages, domain, open_scope, output).await,
        Commands::Extract {
            file,
            base,
            admitted_only,
        } => run_extract(config, file, base, admitted_only),
        Commands::Init { path } => init_config(path),
    }
}
