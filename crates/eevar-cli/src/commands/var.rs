//! Variable command handlers

use anyhow::{anyhow, Context, Result};

use eevar_core::schema;

use super::ImageStore;
use crate::output::Output;

/// Resolve a variable name (case-insensitive) or numeric id
pub fn resolve(name: &str) -> Result<u8> {
    if let Some(id) = schema::find(name) {
        return Ok(id);
    }
    match name.parse::<u8>() {
        Ok(id) if schema::entry(id).is_some() => Ok(id),
        _ => Err(anyhow!(
            "Unknown variable: '{}'\nRun `eevar list` to see all variables.",
            name
        )),
    }
}

/// Show a single variable
pub fn get(store: &ImageStore, name: String, output: &Output) -> Result<()> {
    let id = resolve(&name)?;
    let value = store
        .try_get(id)
        .with_context(|| format!("Failed to read {}", name))?;
    output.print_var(id, &value);
    Ok(())
}

/// Parse and write a single variable
pub fn set(store: &ImageStore, name: String, value: String, output: &Output) -> Result<()> {
    let id = resolve(&name)?;
    let parsed = schema::parse_value(id, &value)
        .with_context(|| format!("Invalid value for {}", name))?;
    let shown = schema::format_value(id, &parsed);
    store
        .try_set(id, parsed)
        .with_context(|| format!("Failed to write {}", name))?;

    output.success(&format!(
        "Set {} = {}",
        schema::name(id).unwrap_or(&name),
        shown
    ));
    Ok(())
}

/// List every variable in layout order
pub fn list(store: &ImageStore, output: &Output) -> Result<()> {
    let blob = store.snapshot().context("Failed to read stored variables")?;
    let mut vars = Vec::with_capacity(schema::len());
    for id in 0..schema::len() as u8 {
        vars.push((id, blob.get(id)?));
    }
    output.print_vars(&vars);
    Ok(())
}
