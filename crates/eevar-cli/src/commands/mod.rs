//! Command handlers

pub mod backup;
pub mod config;
pub mod status;
pub mod var;

use std::io::{self, IsTerminal, Write};

use anyhow::Result;

use eevar_core::{FileDevice, Store};

use crate::output::Output;

/// Store over the configured device image
pub type ImageStore = Store<FileDevice>;

/// Ask before a destructive operation
///
/// Skipped with `--yes` or outside human output. A non-interactive stdin
/// counts as "no".
pub fn confirm_destructive(prompt: &str, yes: bool, output: &Output) -> Result<bool> {
    if yes || !output.should_prompt() {
        return Ok(true);
    }
    if !io::stdin().is_terminal() {
        return Ok(false);
    }

    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    let input = input.trim().to_lowercase();
    Ok(input == "y" || input == "yes")
}
