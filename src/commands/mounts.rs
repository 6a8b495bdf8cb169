//! # Mounts Command Implementation
//!
//! Lists the backends mounted in the key database, one per line:
//!
//! ```text
//! /etc/hosts on system/hosts with name system\/hosts
//! ```
//!
//! With `--verbose` the plugin chain of each backend follows its line.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use kdb_state::backend::MountInfo;
use kdb_state::keyname::escape_segment;
use kdb_state::reconcile::mount;

use super::StoreArgs;

/// List mounted backends
#[derive(Args, Debug)]
pub struct MountsArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Also print resolver and plugins of each backend
    #[arg(short, long)]
    pub verbose: bool,
}

fn describe(info: &MountInfo, verbose: bool) -> String {
    let mut line = format!(
        "{} on {} with name {}",
        info.file,
        info.mountpoint,
        escape_segment(&info.mountpoint)
    );
    if verbose {
        if let Some(resolver) = &info.resolver {
            line.push_str(&format!("\n    resolver: {}", resolver.name()));
        }
        for plugin in &info.plugins {
            line.push_str(&format!("\n    plugin: {}", plugin));
            for (name, value) in plugin.config() {
                line.push_str(&format!("\n      {} = {}", name, value));
            }
        }
    }
    line
}

/// Execute the `mounts` command.
pub fn execute(args: MountsArgs) -> Result<ExitCode> {
    let store = args.store.open();
    for info in mount::list(&store)? {
        println!("{}", describe(&info, args.verbose));
    }
    Ok(ExitCode::SUCCESS)
}
