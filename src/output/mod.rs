use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use crate::cli::OutputFormat;
use crate::transcript::TranscriptResult;
use crate::InsightsError;

/// Render a transcript result in the requested format
pub fn format_transcript(result: &TranscriptResult, format: &OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(result.render_text().unwrap_or_default()),
        OutputFormat::Json => format_as_json(result),
    }
}

/// Pretty JSON for any serializable value
pub fn format_as_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("Failed to serialize output")
}

/// Save a transcript result to file
pub async fn save_to_file(result: &TranscriptResult, path: &Path, format: &OutputFormat) -> Result<()> {
    let content = format_transcript(result, format)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs_err::create_dir_all(parent)
            .map_err(|e| InsightsError::FileError(e.to_string()))?;
    }

    fs_err::write(path, content).map_err(|e| InsightsError::FileError(e.to_string()))?;
    Ok(())
}

/// Print a transcript result to console
pub fn print_to_console(result: &TranscriptResult, format: &OutputFormat) -> Result<()> {
    let content = format_transcript(result, format)?;
    print!("{}", content);
    if !content.ends_with('\n') {
        println!();
    }
    Ok(())
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", format_as_json(value)?);
    Ok(())
}
