//! Backup, restore and dump command handlers

use std::path::PathBuf;

use anyhow::{Context, Result};

use super::{confirm_destructive, ImageStore};
use crate::output::{Output, OutputFormat};

/// Write a binary image of the device
pub fn export_bin(store: &ImageStore, path: PathBuf, output: &Output) -> Result<()> {
    store
        .save_binary(&path)
        .with_context(|| format!("Failed to export to {:?}", path))?;
    output.success(&format!("Exported device to {}", path.display()));
    Ok(())
}

/// Restore a binary image onto the device, then validate it
pub fn import_bin(store: &ImageStore, path: PathBuf, yes: bool, output: &Output) -> Result<()> {
    if !confirm_destructive(
        &format!("Overwrite the device with {}?", path.display()),
        yes,
        output,
    )? {
        output.message("Cancelled.");
        return Ok(());
    }

    store
        .load_binary(&path)
        .with_context(|| format!("Failed to import from {:?}", path))?;
    output.success(&format!("Imported device from {}", path.display()));

    if !store.check().context("Failed to verify imported data")? {
        output.message("Warning: imported configuration fails the CRC check; `eevar init` will reset it.");
    }
    Ok(())
}

/// Write every variable as `NAME=value` lines
pub fn export_text(store: &ImageStore, path: PathBuf, output: &Output) -> Result<()> {
    store
        .save_text(&path)
        .with_context(|| format!("Failed to export to {:?}", path))?;
    output.success(&format!("Exported variables to {}", path.display()));
    Ok(())
}

/// Print a hex dump of the device
pub fn dump(store: &ImageStore, output: &Output) -> Result<()> {
    let dump = store.hex_dump().context("Failed to read device")?;
    match output.format {
        OutputFormat::Json => {
            let lines: Vec<&str> = dump.lines().collect();
            println!("{}", serde_json::json!({ "lines": lines }));
        }
        OutputFormat::Human | OutputFormat::Quiet => print!("{}", dump),
    }
    Ok(())
}
