//! chunkcopy - Chunked file copy with read-back verification
//!
//! Usage:
//!   chunkcopy copy <source> <destination_dir>  - Copy and verify a file
//!   chunkcopy prompt                           - Ask for the paths interactively
//!   chunkcopy hash <file>                      - Print a file's SHA-256
//!   chunkcopy init                             - Write a default config file

use anyhow::{bail, Context};
use chunkcopy::{
    config::Config,
    hash::strong_digest,
    paths::{resolve_destination, validate_source},
    transfer::{IsolationStrategy, Orchestrator, TransferOutcome, TransferProgress, TransferRequest},
    Error,
};
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "chunkcopy")]
#[command(author = "chunkcopy Contributors")]
#[command(version)]
#[command(about = "Copy a file in verified chunks and check the result with SHA-256")]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy a file into a destination directory
    Copy {
        /// File to copy
        source: PathBuf,

        /// Existing directory to copy into
        destination: PathBuf,

        /// Chunk size in bytes
        #[arg(long)]
        chunk_size: Option<u64>,

        /// Maximum chunks copied at the same time
        #[arg(long)]
        workers: Option<usize>,

        /// Destination sharing strategy (shared or per-chunk)
        #[arg(long)]
        isolation: Option<IsolationStrategy>,

        /// Keep existing destination content beyond the copied range
        #[arg(long)]
        no_truncate: bool,

        /// Write the transfer outcome as JSON to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Ask for the source file and destination directory
    Prompt,

    /// Print the SHA-256 of a file
    Hash {
        /// File to hash
        file: PathBuf,
    },

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Overrides taken from the command line
#[derive(Default)]
struct CopyOverrides {
    chunk_size: Option<u64>,
    workers: Option<usize>,
    isolation: Option<IsolationStrategy>,
    no_truncate: bool,
    report: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set log subscriber: {}", e);
    }

    let config_path = cli.config.unwrap_or_else(Config::default_path);

    if let Err(e) = run_command(cli.command, &config_path) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run_command(command: Commands, config_path: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Copy {
            source,
            destination,
            chunk_size,
            workers,
            isolation,
            no_truncate,
            report,
        } => {
            let overrides = CopyOverrides {
                chunk_size,
                workers,
                isolation,
                no_truncate,
                report,
            };
            cmd_copy(config_path, &source, &destination, overrides)
        }

        Commands::Prompt => cmd_prompt(config_path),

        Commands::Hash { file } => cmd_hash(&file),

        Commands::Init { force } => cmd_init(config_path, force),
    }
}

fn cmd_copy(
    config_path: &Path,
    source: &Path,
    destination_dir: &Path,
    overrides: CopyOverrides,
) -> anyhow::Result<()> {
    let source = validate_source(source)?;
    let destination = resolve_destination(&source, destination_dir)?;
    run_transfer(config_path, &source, &destination, overrides)
}

fn cmd_prompt(config_path: &Path) -> anyhow::Result<()> {
    let stdin = std::io::stdin();
    let mut lines = stdin.lock();

    let source = loop {
        let input = prompt(&mut lines, "Enter source file path (e.g. /data/my_large_file.bin): ")?;
        match validate_source(Path::new(&input)) {
            Ok(path) => break path,
            Err(_) => println!("Error: The file doesn't exist, please try again."),
        }
    };

    let destination = loop {
        let input = prompt(&mut lines, "Enter destination path (e.g. /backup/): ")?;
        match resolve_destination(&source, Path::new(&input)) {
            Ok(path) => break path,
            Err(e) => println!("Please try again: {}", e),
        }
    };

    info!("Full destination file path is: {:?}", destination);
    run_transfer(config_path, &source, &destination, CopyOverrides::default())
}

fn cmd_hash(file: &Path) -> anyhow::Result<()> {
    let digest = strong_digest(file)?;
    println!("{}  {}", digest, file.display());
    Ok(())
}

fn cmd_init(config_path: &Path, force: bool) -> anyhow::Result<()> {
    if config_path.exists() && !force {
        bail!(
            "{:?} already exists (use --force to overwrite)",
            config_path
        );
    }

    Config::default()
        .save(config_path)
        .with_context(|| format!("Failed to initialize {:?}", config_path))?;

    info!("Configuration saved to {:?}", config_path);
    Ok(())
}

fn run_transfer(
    config_path: &Path,
    source: &Path,
    destination: &Path,
    overrides: CopyOverrides,
) -> anyhow::Result<()> {
    let mut config = Config::load_or_default(config_path)
        .with_context(|| format!("Failed to load configuration from {:?}", config_path))?;

    if let Some(chunk_size) = overrides.chunk_size {
        config.chunk.chunk_size = chunk_size;
    }
    if let Some(workers) = overrides.workers {
        config.transfer.max_concurrent_chunks = workers;
    }
    if let Some(isolation) = overrides.isolation {
        config.transfer.isolation = isolation;
    }
    if overrides.no_truncate {
        config.transfer.truncate_destination = false;
    }
    config.validate()?;

    let request = TransferRequest::for_source(source, destination, config.chunk.chunk_size)?;
    let orchestrator = Orchestrator::new(config.access_policy()).with_progress(Box::new(
        |p: &TransferProgress| {
            debug!(
                "Progress: {}/{} chunks ({}%)",
                p.completed_chunks,
                p.total_chunks,
                p.progress_percent()
            );
        },
    ));

    let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
    let result = runtime.block_on(orchestrator.transfer(&request));

    if let Some(ref report) = overrides.report {
        match &result {
            Ok(outcome) => write_report(report, outcome)?,
            Err(Error::Mismatch(outcome)) => write_report(report, outcome)?,
            Err(_) => {}
        }
    }

    match result {
        Ok(outcome) if outcome.success => {
            print_digests(&outcome);
            println!("The files are identical.");
            print_chunks(&outcome);
            Ok(())
        }
        Ok(outcome) => {
            for chunk in outcome.failed_chunks() {
                println!(
                    "The source hash does not match the destination hash for chunk with id = {}!",
                    chunk.index
                );
            }
            print_chunks(&outcome);
            bail!(
                "{} of {} chunks failed verification",
                outcome.failed_chunks().count(),
                outcome.chunks.len()
            )
        }
        Err(Error::Mismatch(outcome)) => {
            print_digests(&outcome);
            print_chunks(&outcome);
            bail!("The files do not match.")
        }
        Err(e) => Err(e.into()),
    }
}

fn print_digests(outcome: &TransferOutcome) {
    if let Some(ref digests) = outcome.digests {
        println!("Source SHA256: {}", digests.source);
        println!("Destination SHA256: {}", digests.destination);
    }
}

fn write_report(path: &Path, outcome: &TransferOutcome) -> anyhow::Result<()> {
    std::fs::write(path, outcome.to_json()?)
        .with_context(|| format!("Failed to write report {:?}", path))?;
    info!("Outcome report written to {:?}", path);
    Ok(())
}

fn print_chunks(outcome: &TransferOutcome) {
    for chunk in &outcome.chunks {
        println!("{}", chunk);
    }
}

/// Print `message` and read one trimmed line from `input`
fn prompt<R: BufRead>(input: &mut R, message: &str) -> anyhow::Result<String> {
    print!("{}", message);
    std::io::stdout().flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        bail!("No more input");
    }
    Ok(line.trim().to_string())
}
