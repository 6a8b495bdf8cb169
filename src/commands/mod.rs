//! # CLI Command Implementations
//!
//! This module contains the implementation for each subcommand of the
//! `kdb-state` command-line tool. Each subcommand is defined in its own file
//! to keep the logic separated and maintainable.
//!
//! ## Structure
//!
//! Each command module typically contains:
//! - An `Args` struct that defines the command-specific arguments and options,
//!   derived using `clap`.
//! - An `execute` function that takes the parsed `Args` and performs the
//!   command's logic.
//!
//! Arguments shared between commands (manifest, store and catalog location)
//! and the report printer live here.

pub mod apply;
pub mod check;
pub mod completions;
pub mod mounts;
pub mod validate;

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use kdb_state::backend::PluginCatalog;
use kdb_state::defaults::{default_store_path, DEFAULT_MANIFEST};
use kdb_state::output::{summary_line, OutputConfig};
use kdb_state::reconcile::Report;
use kdb_state::resource::{self, Ensure, Manifest, Resource};
use kdb_state::store::FileStore;
use kdb_state::suggestions;

/// Location of the manifest
#[derive(Args, Debug)]
pub struct ManifestArgs {
    /// Path to the manifest file.
    #[arg(
        short,
        long,
        value_name = "FILE",
        env = "KDB_STATE_MANIFEST",
        default_value = DEFAULT_MANIFEST
    )]
    pub manifest: PathBuf,
}

impl ManifestArgs {
    /// Read and parse the manifest.
    pub fn load(&self) -> Result<Manifest> {
        if !self.manifest.exists() {
            return Err(suggestions::manifest_not_found(&self.manifest));
        }
        Ok(resource::from_file(&self.manifest)?)
    }
}

/// Location of the key database
#[derive(Args, Debug)]
pub struct StoreArgs {
    /// Path to the key database file.
    ///
    /// Defaults to the platform data directory (e.g.
    /// `~/.local/share/kdb-state/store.json` on Linux).
    #[arg(long, value_name = "FILE", env = "KDB_STATE_STORE")]
    pub store: Option<PathBuf>,
}

impl StoreArgs {
    pub fn open(&self) -> FileStore {
        FileStore::new(self.store.clone().unwrap_or_else(default_store_path))
    }
}

/// Plugin catalog used to compose backends
#[derive(Args, Debug)]
pub struct CatalogArgs {
    /// YAML plugin catalog replacing the built-in one.
    #[arg(long, value_name = "FILE", env = "KDB_STATE_CATALOG")]
    pub catalog: Option<PathBuf>,
}

impl CatalogArgs {
    pub fn load(&self) -> Result<PluginCatalog> {
        match &self.catalog {
            Some(path) => {
                PluginCatalog::from_file(path).map_err(|e| suggestions::invalid_catalog(path, &e))
            }
            None => Ok(PluginCatalog::builtin()),
        }
    }
}

/// Fail with a suggestion when a present mount requests a plugin the
/// catalog does not know.
pub fn check_plugins(manifest: &Manifest, catalog: &PluginCatalog) -> Result<()> {
    for resource in manifest {
        let Resource::Mount { mount } = resource else {
            continue;
        };
        if mount.ensure == Ensure::Absent {
            continue;
        }
        let resolver = mount.resolver.split('#').next().unwrap_or_default();
        let requested = mount
            .plugins()
            .iter()
            .map(|plugin| plugin.name())
            .chain(std::iter::once(resolver));
        for name in requested {
            if !catalog.contains(name) {
                return Err(suggestions::unknown_plugin(&mount.name, name, catalog));
            }
        }
    }
    Ok(())
}

/// Print the per-resource outcomes and a summary line.
pub fn print_report(report: &Report, out: &OutputConfig, verbose: bool) {
    for line in out.report_lines(report, verbose) {
        println!("{}", line);
    }
    println!("{}", summary_line(report));
}
