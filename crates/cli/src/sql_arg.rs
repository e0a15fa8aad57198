//! SQL given on the command line, inline or as `@path`

use std::path::Path;

/// Parse an SQL argument; `@path` reads the file at `path`
pub fn parse(value: &str) -> Result<String, String> {
    match value.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(Path::new(path))
            .map_err(|e| format!("failed to read {path}: {e}")),
        None => Ok(value.to_string()),
    }
}
