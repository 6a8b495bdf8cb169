//! Default values for kdb-state configuration.
//!
//! This module provides centralized default values used across commands,
//! ensuring consistency and avoiding duplication.

use std::path::PathBuf;

/// Manifest read when no `--manifest` is given.
pub const DEFAULT_MANIFEST: &str = "kdb-state.yaml";

/// Returns the default location of the file-backed key database.
///
/// Uses the platform-appropriate data directory:
/// - Linux: `~/.local/share/kdb-state/store.json` (XDG Base Directory)
/// - macOS: `~/Library/Application Support/kdb-state/store.json`
/// - Windows: `{FOLDERID_RoamingAppData}\kdb-state\store.json`
///
/// Falls back to `.kdb-state/store.json` in the current directory if the
/// platform data directory cannot be determined.
///
/// This can be overridden by the `--store` CLI flag or the
/// `KDB_STATE_STORE` environment variable.
pub fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("kdb-state"))
        .unwrap_or_else(|| PathBuf::from(".kdb-state"))
        .join("store.json")
}
