//! # Check Command Implementation
//!
//! This module implements the `check` subcommand, which reports drift between
//! the manifest and the key database without changing anything.
//!
//! ## Functionality
//!
//! - **Drift Detection**: Runs the full reconciliation as a dry run. Every
//!   session is opened read-only, so the database is never modified.
//! - **Exit Status**: `0` when every resource is in sync, `2` when at least
//!   one resource would change. Errors exit with `1`, so scripts can tell
//!   drift apart from failure.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use kdb_state::output::{OutputConfig, Symbol};
use kdb_state::reconcile::{self, ApplyOptions};

use super::{check_plugins, print_report, CatalogArgs, ManifestArgs, StoreArgs};

/// Exit status reported when the database differs from the manifest.
pub const DRIFT_EXIT_CODE: u8 = 2;

/// Report drift between a manifest and the key database
#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub manifest: ManifestArgs,

    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub catalog: CatalogArgs,

    /// Also list resources that are already in sync
    #[arg(short, long)]
    pub verbose: bool,
}

/// Execute the `check` command.
pub fn execute(args: CheckArgs, color_flag: &str) -> Result<ExitCode> {
    let out = OutputConfig::from_env_and_flag(color_flag);

    let manifest = args.manifest.load()?;
    let catalog = args.catalog.load()?;
    check_plugins(&manifest, &catalog)?;
    let store = args.store.open();

    let options = ApplyOptions {
        dry_run: true,
        ..ApplyOptions::default()
    };
    let report = reconcile::apply(&manifest, &store, &catalog, &options)?;
    print_report(&report, &out, args.verbose);

    if report.is_in_sync() {
        println!("{} Key database is in sync", out.symbol(Symbol::Ok));
        Ok(ExitCode::SUCCESS)
    } else {
        println!(
            "{} Key database differs from {}",
            out.symbol(Symbol::Drift),
            args.manifest.manifest.display()
        );
        Ok(ExitCode::from(DRIFT_EXIT_CODE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn args(dir: &TempDir) -> CheckArgs {
        CheckArgs {
            manifest: ManifestArgs {
                manifest: dir.path().join("kdb-state.yaml"),
            },
            store: StoreArgs {
                store: Some(dir.path().join("store.json")),
            },
            catalog: CatalogArgs { catalog: None },
            verbose: false,
        }
    }

    #[test]
    fn test_drift_then_in_sync() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("kdb-state.yaml"),
            "- key:\n    name: user/app/port\n    value: 8080\n",
        )
        .unwrap();

        let code = execute(args(&temp_dir), "never").unwrap();
        assert_eq!(code, ExitCode::from(DRIFT_EXIT_CODE));
        assert!(!temp_dir.path().join("store.json").exists());

        crate::commands::apply::execute(
            crate::commands::apply::ApplyArgs {
                manifest: ManifestArgs {
                    manifest: temp_dir.path().join("kdb-state.yaml"),
                },
                store: StoreArgs {
                    store: Some(temp_dir.path().join("store.json")),
                },
                catalog: CatalogArgs { catalog: None },
                dry_run: false,
                verbose: false,
                quiet: true,
            },
            "never",
        )
        .unwrap();

        assert_eq!(execute(args(&temp_dir), "never").unwrap(), ExitCode::SUCCESS);
    }

    #[test]
    fn test_invalid_manifest_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("kdb-state.yaml"),
            "- key:\n    name: hello/world\n",
        )
        .unwrap();
        assert!(execute(args(&temp_dir), "never").is_err());
    }
}
