//! Rendering and writing command results.

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// Serialize `value` as pretty JSON, or on one line when `compact`.
pub fn render_json<T: Serialize>(value: &T, compact: bool) -> Result<String> {
    let rendered = if compact {
        serde_json::to_string(value)
    } else {
        serde_json::to_string_pretty(value)
    };
    rendered.context("Failed to serialize result")
}

/// Write `content` plus a trailing newline to `path`, or to stdout when `None`.
pub fn write_output(content: &str, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            let mut file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            writeln!(file, "{}", content)
                .with_context(|| format!("Failed to write output to {}", path.display()))?;
        }
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            writeln!(handle, "{}", content).context("Failed to write to stdout")?;
        }
    }
    Ok(())
}
