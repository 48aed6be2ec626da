//! Utility functions shared across the harness.

use anyhow::{Context, Result};
use log::error;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

/// Reads a TOML file into an arbitrary struct.
///
/// # Parameters
///
/// - `path`: The path of the TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or data parsing fails.
pub fn read_toml_from_file<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    match toml::de::from_str(&content) {
        Ok(config) => Ok(config),
        Err(e) => {
            error!("Failed to parse TOML file: {e}");
            Err(e).with_context(|| format!("Invalid TOML in {}", path.display()))
        }
    }
}

/// Renders an error and its causes as log lines.
///
/// The first line is `Error: <top-level message>`, followed by one
/// `Caused by: <cause>` line per source in the chain. Multi-line messages are
/// split so every entry is a single line.
pub fn render_error_chain(err: &anyhow::Error) -> Vec<String> {
    let mut lines = Vec::new();
    for (depth, cause) in err.chain().enumerate() {
        let prefix = if depth == 0 { "Error: " } else { "Caused by: " };
        let message = cause.to_string();
        let mut parts = message.lines();
        lines.push(format!("{prefix}{}", parts.next().unwrap_or_default()));
        lines.extend(parts.map(|l| format!("    {l}")));
    }
    lines
}
