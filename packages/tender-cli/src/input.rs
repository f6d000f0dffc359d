//! Identifier input: positional arguments and identifier files.

use anyhow::{Context, Result};
use std::path::Path;

/// Parse an identifier file: one per line, `#` starts a comment.
///
/// Identifiers are passed through untouched apart from trimming; the engine
/// reports malformed ones as failures.
pub fn parse_identifier_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Positional identifiers first, then the file's, in order.
pub fn collect_identifiers(positional: &[String], file: Option<&Path>) -> Result<Vec<String>> {
    let mut identifiers = positional.to_vec();
    if let Some(path) = file {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read identifier file {}", path.display()))?;
        identifiers.extend(parse_identifier_list(&contents));
    }
    Ok(identifiers)
}
