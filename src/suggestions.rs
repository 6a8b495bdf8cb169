//! # Error Suggestions
//!
//! This module provides helper functions for generating helpful error
//! messages with hints and suggestions. Errors should tell users what went
//! wrong AND how to fix it.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kdb_state::suggestions;
//!
//! // Instead of:
//! anyhow::bail!("Manifest not found: {}", path.display());
//!
//! // Use:
//! return Err(suggestions::manifest_not_found(path));
//! ```

use std::path::Path;

use crate::backend::PluginCatalog;

/// Generate an error for when the manifest file is not found.
///
/// Includes hints about:
/// - Creating a manifest
/// - Using the -m/--manifest flag
/// - Using the KDB_STATE_MANIFEST environment variable
pub fn manifest_not_found(path: &Path) -> anyhow::Error {
    anyhow::anyhow!(
        "Manifest not found: {path}\n\n\
         hint: Create a kdb-state.yaml file listing 'key' and 'mount' resources\n\
         hint: Use -m/--manifest to specify a different path\n\
         hint: Set KDB_STATE_MANIFEST environment variable",
        path = path.display()
    )
}

/// Generate an error for a mount requesting a plugin the catalog lacks.
///
/// Suggests the closest known plugin name.
pub fn unknown_plugin(mountpoint: &str, plugin: &str, catalog: &PluginCatalog) -> anyhow::Error {
    let known: Vec<&str> = catalog.names().collect();
    let did_you_mean = find_similar(plugin, &known)
        .map(|s| format!("\nhint: Did you mean '{s}'?"))
        .unwrap_or_default();

    anyhow::anyhow!(
        "Unknown plugin '{plugin}' requested by mount {mountpoint}{did_you_mean}\n\n\
         hint: Use --catalog to load a catalog describing your installed plugins\n\
         hint: Run 'kdb-state mounts' to see the plugins of mounted backends"
    )
}

/// Generate an error for a plugin catalog that could not be loaded.
pub fn invalid_catalog(path: &Path, error: &crate::error::Error) -> anyhow::Error {
    anyhow::anyhow!(
        "Invalid plugin catalog: {path}\n\
         error: {error}\n\n\
         hint: A catalog maps plugin names to 'provides', 'needs' and 'recommends' lists\n\
         hint: Omit --catalog to use the built-in catalog",
        path = path.display()
    )
}

/// Find a similar string from a list of candidates using edit distance.
///
/// Returns Some(candidate) if a close match is found (edit distance <= 2).
pub(crate) fn find_similar<'a>(input: &str, candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .filter_map(|&candidate| {
            let distance = edit_distance(input, candidate);
            if distance <= 2 && distance < input.len() {
                Some((candidate, distance))
            } else {
                None
            }
        })
        .min_by_key(|(_, distance)| *distance)
        .map(|(candidate, _)| candidate)
}

/// Calculate the Levenshtein edit distance between two strings.
fn edit_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let a_len = a_chars.len();
    let b_len = b_chars.len();

    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut matrix = vec![vec![0usize; b_len + 1]; a_len + 1];

    for (i, row) in matrix.iter_mut().enumerate() {
        row[0] = i;
    }
    for (j, cell) in matrix[0].iter_mut().enumerate() {
        *cell = j;
    }

    for i in 1..=a_len {
        for j in 1..=b_len {
            let cost = if a_chars[i - 1] == b_chars[j - 1] {
                0
            } else {
                1
            };
            matrix[i][j] = (matrix[i - 1][j] + 1)
                .min(matrix[i][j - 1] + 1)
                .min(matrix[i - 1][j - 1] + cost);
        }
    }

    matrix[a_len][b_len]
}
