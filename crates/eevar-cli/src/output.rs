//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use eevar_core::schema;
use eevar_core::Variant;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if we should prompt for confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }

    /// Print a single variable
    pub fn print_var(&self, id: u8, value: &Variant) {
        let name = schema::name(id).unwrap_or("?");
        let text = schema::format_value(id, value);
        match self.format {
            OutputFormat::Human => println!("{} = {}", name, text),
            OutputFormat::Json => {
                println!("{}", var_json(id, value));
            }
            OutputFormat::Quiet => println!("{}", text),
        }
    }

    /// Print every variable in schema order
    pub fn print_vars(&self, vars: &[(u8, Variant)]) {
        match self.format {
            OutputFormat::Human => {
                let width = vars
                    .iter()
                    .filter_map(|(id, _)| schema::name(*id))
                    .map(str::len)
                    .max()
                    .unwrap_or(0);
                for (id, value) in vars {
                    println!(
                        "{:>3}  {:<width$}  {}",
                        id,
                        schema::name(*id).unwrap_or("?"),
                        schema::format_value(*id, value),
                        width = width
                    );
                }
                println!("\n{} variable(s)", vars.len());
            }
            OutputFormat::Json => {
                let json_vars: Vec<_> = vars.iter().map(|(id, v)| var_json(*id, v)).collect();
                println!("{}", serde_json::Value::Array(json_vars));
            }
            OutputFormat::Quiet => {
                for (id, value) in vars {
                    println!(
                        "{}={}",
                        schema::name(*id).unwrap_or("?"),
                        schema::format_value(*id, value)
                    );
                }
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

/// JSON object describing one variable
fn var_json(id: u8, value: &Variant) -> serde_json::Value {
    let (kind, count) = schema::entry(id)
        .map(|e| (e.kind.name(), e.count))
        .unwrap_or(("empty", 0));
    serde_json::json!({
        "id": id,
        "name": schema::name(id),
        "kind": kind,
        "count": count,
        "value": schema::format_value(id, value),
    })
}
