//! tpcache: inspect tracepoint format metadata
//!
//! Resolves the tracing directory, loads tracepoint format files through the
//! metadata cache and prints what was parsed.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::Level;

use tracepoint_cache::{EventMetadata, TracepointCache, TracepointName, TracingDirResolver};

#[derive(Parser)]
#[command(name = "tpcache")]
#[command(about = "Load and inspect Linux tracepoint format metadata")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Mount table to scan for tracefs/debugfs
    #[arg(long, default_value = "/proc/mounts", global = true)]
    mounts: PathBuf,

    /// Use this tracing directory instead of scanning the mount table
    #[arg(long, global = true)]
    tracing_dir: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the resolved tracing directory
    Dir,
    /// Load and print tracepoints, given as system:event
    Show {
        #[arg(required = true)]
        events: Vec<String>,
    },
    /// Parse a format file that was copied from some system
    Parse {
        /// Path to the format file
        file: PathBuf,

        /// System the event belongs to
        #[arg(short, long)]
        system: String,

        /// Size of `long` on the system that produced the file
        #[arg(long, default_value = "8", value_parser = ["4", "8"])]
        long_size: String,
    },
    /// Find which of the given tracepoints a raw sample belongs to
    Match {
        /// Raw sample bytes as hex, e.g. 3c01000000000000
        #[arg(long)]
        raw: String,

        #[arg(required = true)]
        events: Vec<String>,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_name(event: &str) -> Result<TracepointName<'_>> {
    TracepointName::parse(event).ok_or_else(|| anyhow!("Invalid tracepoint name: {event}"))
}

fn parse_hex(hex: &str) -> Result<Vec<u8>> {
    let hex = hex.trim_start_matches("0x");
    if !hex.is_ascii() {
        bail!("Hex string contains non-ASCII characters");
    }
    if hex.len() % 2 != 0 {
        bail!("Hex string has odd length");
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .with_context(|| format!("Invalid hex byte at offset {i}"))
        })
        .collect()
}

fn print_metadata(metadata: &EventMetadata, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(metadata)?);
        return Ok(());
    }

    println!("{} (id {})", metadata.name(), metadata.id());
    let layout = metadata.common_type_layout();
    println!(
        "  common_type: offset {} size {}",
        layout.offset, layout.size
    );
    for field in metadata.event_fields() {
        let signed = match field.signed() {
            Some(true) => "signed",
            Some(false) => "unsigned",
            None => "?",
        };
        println!(
            "  {:<24} offset {:>4} size {:>4} {:<8} {}",
            field.name(),
            field.offset(),
            field.size(),
            signed,
            field.type_name()
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let resolver = match cli.tracing_dir {
        Some(dir) => TracingDirResolver::with_dir(Some(dir)),
        None => TracingDirResolver::new(&cli.mounts),
    };
    let mut cache = TracepointCache::with_resolver(Arc::new(resolver));

    match cli.command {
        Commands::Dir => match cache.resolver().tracing_dir() {
            Some(dir) => println!("{}", dir.display()),
            None => bail!(
                "No tracefs or debugfs mount found in {}",
                cache.resolver().mounts_path().display()
            ),
        },
        Commands::Show { events } => {
            for event in &events {
                let name = parse_name(event)?;
                let metadata = cache
                    .find_or_add_from_system(name)
                    .with_context(|| format!("Failed to load {name}"))?;
                print_metadata(metadata, cli.json)?;
            }
        }
        Commands::Parse {
            file,
            system,
            long_size,
        } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let metadata = cache
                .add_from_format(&system, &text, long_size == "8")
                .with_context(|| format!("Failed to parse {}", file.display()))?;
            print_metadata(metadata, cli.json)?;
        }
        Commands::Match { raw, events } => {
            let raw = parse_hex(&raw)?;
            for event in &events {
                let name = parse_name(event)?;
                cache
                    .find_or_add_from_system(name)
                    .with_context(|| format!("Failed to load {name}"))?;
            }
            match cache.find_by_raw_data(&raw) {
                Some(metadata) => print_metadata(metadata, cli.json)?,
                None => bail!("Sample does not match any of the given tracepoints"),
            }
        }
    }

    Ok(())
}
