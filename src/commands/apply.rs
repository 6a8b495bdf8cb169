//! Apply command implementation
//!
//! The apply command reconciles the key database with the manifest:
//! 1. Parsing and validating the manifest
//! 2. Checking that every requested plugin is in the catalog
//! 3. Reconciling mounts and keys, each in its own session
//! 4. Reporting what changed

use std::process::ExitCode;
use std::time::Instant;

use anyhow::Result;
use clap::Args;

use kdb_state::output::{OutputConfig, Symbol};
use kdb_state::reconcile::{self, ApplyOptions};

use super::{check_plugins, print_report, CatalogArgs, ManifestArgs, StoreArgs};

/// Arguments for the apply command
#[derive(Args, Debug)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub manifest: ManifestArgs,

    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub catalog: CatalogArgs,

    /// Show what would be done without making changes
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Also list resources that are already in sync
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,
}

/// Execute the apply command
pub fn execute(args: ApplyArgs, color_flag: &str) -> Result<ExitCode> {
    let out = OutputConfig::from_env_and_flag(color_flag);
    let start_time = Instant::now();

    let manifest = args.manifest.load()?;
    let catalog = args.catalog.load()?;
    check_plugins(&manifest, &catalog)?;
    let store = args.store.open();

    if !args.quiet && args.dry_run {
        println!(
            "{} DRY RUN MODE - No changes will be made",
            out.symbol(Symbol::DryRun)
        );
        println!();
    }

    let options = ApplyOptions {
        dry_run: args.dry_run,
        ..ApplyOptions::default()
    };
    let report = match reconcile::apply(&manifest, &store, &catalog, &options) {
        Ok(report) => report,
        Err(e) => {
            if !args.quiet {
                println!("{} Apply failed", out.symbol(Symbol::Error));
            }
            return Err(e.into());
        }
    };

    if !args.quiet {
        print_report(&report, &out, args.verbose);
        println!(
            "{} Done in {:.2}s ({})",
            out.symbol(Symbol::Ok),
            start_time.elapsed().as_secs_f64(),
            store.path().display()
        );
    }
    Ok(ExitCode::SUCCESS)
}
