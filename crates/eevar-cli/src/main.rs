//! eevar CLI
//!
//! Command-line interface for eevar - inspect, edit, back up and restore
//! the persistent configuration stored in a device image.

use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use eevar_core::{Config, FileDevice, Store, StoreError};

mod commands;
mod output;

use commands::ImageStore;
use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "eevar")]
#[command(about = "eevar - schema-driven persistent configuration store")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file to use instead of the default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Device image to operate on
    #[arg(long, global = true, value_name = "PATH")]
    image: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the stored configuration, migrating or resetting it as needed
    Init,
    /// Show a variable
    Get {
        /// Variable name (case-insensitive) or numeric id
        name: String,
    },
    /// Set a variable
    Set {
        /// Variable name (case-insensitive) or numeric id
        name: String,
        /// New value (IPv4 variables accept dotted quads)
        value: String,
    },
    /// List all variables
    #[command(alias = "ls")]
    List,
    /// Reset all variables to defaults
    Defaults {
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Erase the entire device
    Clear {
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Verify the stored configuration's CRC without modifying it
    Check,
    /// Write a binary image of the device to a file
    ExportBin {
        /// Destination file
        path: PathBuf,
    },
    /// Restore a binary image onto the device
    ImportBin {
        /// Source file from a previous export-bin
        path: PathBuf,
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Write all variables as NAME=value lines
    ExportText {
        /// Destination file
        path: PathBuf,
    },
    /// Hex dump of the device
    Dump,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, image_file, log_file)
        key: String,
        /// Configuration value
        value: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            if let Some(hint) = e
                .chain()
                .find_map(|cause| cause.downcast_ref::<StoreError>())
                .and_then(StoreError::recovery_suggestion)
            {
                eprintln!("Hint: {}", hint);
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    // Config commands don't need the device
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command.clone(), cli.config.as_ref(), &output);
    }

    let mut config = Config::load_with_cli_override(cli.config.as_ref())
        .context("Failed to load configuration")?;
    if let Some(image) = cli.image {
        config.image_file = Some(image);
    }
    init_logging(&config);

    let store = open_store(&config)?;

    match cli.command {
        Commands::Init => commands::status::init(&store, &output),
        Commands::Get { name } => commands::var::get(&store, name, &output),
        Commands::Set { name, value } => commands::var::set(&store, name, value, &output),
        Commands::List => commands::var::list(&store, &output),
        Commands::Defaults { yes } => commands::status::defaults(&store, yes, &output),
        Commands::Clear { yes } => commands::status::clear(&store, yes, &output),
        Commands::Check => commands::status::check(&store, &output),
        Commands::ExportBin { path } => commands::backup::export_bin(&store, path, &output),
        Commands::ImportBin { path, yes } => {
            commands::backup::import_bin(&store, path, yes, &output)
        }
        Commands::ExportText { path } => commands::backup::export_text(&store, path, &output),
        Commands::Dump => commands::backup::dump(&store, &output),
        Commands::Config { .. } => unreachable!(), // Handled above
    }
}

/// Open the configured device image
///
/// The startup sequence is not run here; only `init` runs it, so the
/// diagnostic commands see the image exactly as stored.
fn open_store(config: &Config) -> Result<ImageStore> {
    config.ensure_data_dir()?;
    let path = config.image_path();
    let device = FileDevice::open(&path)
        .with_context(|| format!("Failed to open device image {:?}", path))?;
    info!("Opened device image {:?}", device.path());
    Ok(Store::new(device))
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(key, value, config_path, output)
        }
    }
}

/// Initialize logging
///
/// Only initializes if the EEVAR_LOG environment variable is set.
/// Logs go to `config.log_file` when set, otherwise to stderr.
fn init_logging(config: &Config) {
    let Ok(log_level) = std::env::var("EEVAR_LOG") else {
        return;
    };

    let env_filter = EnvFilter::new(format!(
        "eevar_core={},eevar_cli={}",
        log_level, log_level
    ));

    match &config.log_file {
        Some(log_path) => {
            let log_file = match File::create(log_path) {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("Warning: Could not create log file {:?}: {}", log_path, e);
                    return;
                }
            };
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(log_file)
                .try_init();
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
}
