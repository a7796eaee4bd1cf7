use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::thread;

use crate::core::{
    config::DriverConfig,
    driver::DriverHandle,
    error::DriverError,
    history::ReadHistory,
    poller::{DriverEvent, Poller},
    reader::PcscTransport,
    transport::{service_hint, ReaderRegistry},
    utils::{format_hex_separated, format_hex_spaced},
};

#[derive(Parser)]
#[command(name = "pcsc-cardnum")]
#[command(about = "Read card numbers from contactless cards through a PC/SC reader")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Driver configuration file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show whether the PC/SC service is available
    Status,

    /// List available PCSC readers
    List {
        /// Show card presence and ATR for each reader
        #[arg(short = 'l', long)]
        detailed: bool,
    },

    /// Read one card number and exit
    Read {
        /// Reader name or index (defaults to the first reader)
        reader: Option<String>,

        /// Separator placed between bytes of the card number
        #[arg(short, long, default_value = "")]
        separator: String,
    },

    /// Keep polling and print each card number once per presentation
    Watch {
        /// Reader name or index (defaults to the first reader)
        reader: Option<String>,

        /// Exit after this many card numbers (at least 1; runs until killed when omitted)
        #[arg(short = 'n', long)]
        count: Option<usize>,

        /// Poll interval in milliseconds
        #[arg(short, long)]
        interval: Option<u64>,

        /// Write the read history to this JSON file on exit
        #[arg(long)]
        history: Option<PathBuf>,

        /// Separator placed between bytes of the card number
        #[arg(short, long, default_value = "")]
        separator: String,
    },
}

pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.debug {
        log::LevelFilter::Debug
    } else if cli.verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    let config = match &cli.config {
        Some(path) => DriverConfig::load(path)?,
        None => DriverConfig::default(),
    };

    match cli.command {
        Commands::Status => cmd_status(),
        Commands::List { detailed } => cmd_list(detailed),
        Commands::Read { reader, separator } => cmd_read(reader, &separator, config),
        Commands::Watch {
            reader,
            count,
            interval,
            history,
            separator,
        } => {
            if count == Some(0) {
                bail!("--count must be at least 1");
            }
            let mut config = config;
            if let Some(interval) = interval {
                config.poll_interval_ms = interval;
            }
            config.validate()?;
            cmd_watch(reader, count, history.as_deref(), &separator, config)
        }
    }
}

fn cmd_status() -> Result<()> {
    let transport = PcscTransport::new();
    let listing = transport.list_readers();

    if listing.service_available {
        println!("PC/SC service: available");
        println!("Readers: {}", listing.readers.len());
    } else {
        println!("PC/SC service: not supported on this system");
        println!("{}", service_hint());
    }

    Ok(())
}

fn cmd_list(detailed: bool) -> Result<()> {
    let transport = PcscTransport::new();
    let listing = transport.list_readers();

    if !listing.service_available {
        println!("PC/SC not supported: {}", service_hint());
        return Ok(());
    }

    if listing.is_empty() {
        println!("No PCSC readers found.");
        return Ok(());
    }

    println!("Available PCSC readers:");
    if detailed {
        for (i, info) in transport.reader_infos().iter().enumerate() {
            println!("  [{}] {}", i, info.name);
            println!(
                "      Status: {}",
                if info.card_present { "Card present" } else { "No card" }
            );
            if let Some(ref atr) = info.atr {
                println!("      ATR: {}", format_hex_spaced(atr));
            }
        }
    } else {
        for (i, name) in listing.readers.iter().enumerate() {
            println!("  [{i}] {name}");
        }
    }

    Ok(())
}

fn cmd_read(reader: Option<String>, separator: &str, config: DriverConfig) -> Result<()> {
    let transport = PcscTransport::new();
    let reader = resolve_configured_reader(&transport, reader, &config)?;

    let mut poller = Poller::new(transport, config);
    let reader_name = poller
        .connect(reader.as_deref())
        .context("Failed to connect to reader")?;

    let event = poller.read_once();
    poller.disconnect();

    match event {
        DriverEvent::CardRead(identifier) => {
            println!("{}", format_hex_separated(identifier.as_bytes(), separator));
            Ok(())
        }
        DriverEvent::CardAbsent => bail!("No card detected on {}", reader_name),
        DriverEvent::Failed(e) => Err(e).context("Failed to read card number"),
        other => bail!("Unexpected driver event: {:?}", other),
    }
}

fn cmd_watch(
    reader: Option<String>,
    count: Option<usize>,
    history_path: Option<&Path>,
    separator: &str,
    config: DriverConfig,
) -> Result<()> {
    let transport = PcscTransport::new();
    let reader = resolve_configured_reader(&transport, reader, &config)?;
    let retry_delay = config.retry_delay();
    let mut history = ReadHistory::new(config.history_limit);

    let driver = DriverHandle::spawn(transport, config)?;
    driver.connect(reader.as_deref());

    let mut connected = false;
    let mut reads = 0;

    while let Some(event) = driver.recv() {
        match event {
            DriverEvent::Connected { reader } => {
                connected = true;
                eprintln!("Connected to {reader}. Waiting for cards...");
            }
            DriverEvent::CardRead(identifier) => {
                println!("{}", format_hex_separated(identifier.as_bytes(), separator));
                history.record(&identifier);
                reads += 1;
                if count.is_some_and(|limit| reads >= limit) {
                    break;
                }
            }
            DriverEvent::Failed(e @ (DriverError::ServiceUnavailable | DriverError::Connection(_)))
                if !connected =>
            {
                driver.shutdown();
                return Err(e).context("Failed to connect to reader");
            }
            DriverEvent::Failed(e) => eprintln!("Error: {e}"),
            DriverEvent::Disconnected => {
                connected = false;
                eprintln!("Reader connection lost, reconnecting...");
                thread::sleep(retry_delay);
                driver.connect(reader.as_deref());
            }
            DriverEvent::CardAbsent => {}
        }
    }

    driver.shutdown();

    if let Some(path) = history_path {
        let json = history.export_history()?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write history file: {}", path.display()))?;
        eprintln!("Saved {} read(s) to {}", history.len(), path.display());
    }

    Ok(())
}

/// Command-line reader wins over the config file; either may be a name or an index
fn resolve_configured_reader(
    registry: &impl ReaderRegistry,
    reader: Option<String>,
    config: &DriverConfig,
) -> Result<Option<String>> {
    match reader.or_else(|| config.reader.clone()) {
        Some(name_or_index) => Ok(Some(resolve_reader_name(registry, &name_or_index)?)),
        None => Ok(None),
    }
}

fn resolve_reader_name(registry: &impl ReaderRegistry, name_or_index: &str) -> Result<String> {
    // Try to parse as index first
    if let Ok(index) = name_or_index.parse::<usize>() {
        let listing = registry.list_readers();
        if !listing.service_available {
            return Err(DriverError::ServiceUnavailable).context(service_hint());
        }
        return match listing.readers.get(index) {
            Some(name) => Ok(name.clone()),
            None if listing.is_empty() => bail!("Reader index {} out of range (no readers)", index),
            None => bail!(
                "Reader index {} out of range (0-{})",
                index,
                listing.readers.len() - 1
            ),
        };
    }

    // Use as reader name directly
    Ok(name_or_index.to_string())
}
