//! Startup, integrity and reset command handlers

use anyhow::{Context, Result};

use eevar_core::schema::{self, DATASIZE, EEPROM_ADDRESS};
use eevar_core::{var, InitStatus};

use super::{confirm_destructive, ImageStore};
use crate::output::{Output, OutputFormat};

/// Run the startup sequence on the device image
pub fn init(store: &ImageStore, output: &Output) -> Result<()> {
    let status = store.init().context("Startup sequence failed")?;

    let summary = match status {
        InitStatus::Normal => "Stored configuration is valid",
        InitStatus::Upgraded => "Converted legacy configuration to the current format",
        InitStatus::Defaulted => "Stored configuration was missing or invalid; wrote defaults",
    };

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "status": format!("{:?}", status).to_lowercase(),
                    "version": schema::VERSION,
                })
            );
        }
        OutputFormat::Quiet => println!("{:?}", status),
        OutputFormat::Human => output.success(summary),
    }
    Ok(())
}

/// Verify the CRC32 trailer without modifying anything
pub fn check(store: &ImageStore, output: &Output) -> Result<()> {
    let valid = store.check().context("Failed to read stored configuration")?;
    let version = store.get(var::VERSION).as_u16();
    let datasize = store.get(var::DATASIZE).as_u16();

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "valid": valid,
                    "address": EEPROM_ADDRESS,
                    "version": version,
                    "datasize": datasize,
                    "expected_datasize": DATASIZE,
                })
            );
        }
        OutputFormat::Quiet => println!("{}", if valid { "valid" } else { "invalid" }),
        OutputFormat::Human => {
            println!("Configuration Blob");
            println!("==================");
            println!();
            println!("  Address:  {:#06x}", EEPROM_ADDRESS);
            println!(
                "  Version:  {} (current {})",
                version.map(|v| v.to_string()).unwrap_or_else(|| "?".into()),
                schema::VERSION
            );
            println!(
                "  Size:     {} bytes (current {})",
                datasize.map(|v| v.to_string()).unwrap_or_else(|| "?".into()),
                DATASIZE
            );
            println!("  CRC32:    {}", if valid { "valid" } else { "INVALID" });
            if !valid {
                println!();
                println!("Run `eevar init` to repair or reset it.");
            }
        }
    }
    Ok(())
}

/// Reset every variable to its default
pub fn defaults(store: &ImageStore, yes: bool, output: &Output) -> Result<()> {
    if !confirm_destructive("Reset all variables to defaults?", yes, output)? {
        output.message("Cancelled.");
        return Ok(());
    }

    store.defaults().context("Failed to write defaults")?;
    output.success("Wrote default configuration");
    Ok(())
}

/// Erase the whole device image
pub fn clear(store: &ImageStore, yes: bool, output: &Output) -> Result<()> {
    if !confirm_destructive("Erase the entire device?", yes, output)? {
        output.message("Cancelled.");
        return Ok(());
    }

    store.clear().context("Failed to erase device")?;
    output.success("Erased device; the next `eevar init` writes defaults");
    Ok(())
}
