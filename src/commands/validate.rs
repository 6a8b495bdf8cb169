//! # Validate Command Implementation
//!
//! This module implements the `validate` subcommand, which checks a manifest
//! without opening the key database.
//!
//! ## Functionality
//!
//! - **Manifest Parsing**: Parses the manifest and reports per-item errors.
//! - **Resource Validation**: Key names, mountpoints, plugin names and the
//!   rules between fields (e.g. no `check` on spec keys, `plugins` required
//!   with `file`).
//! - **Plugin Availability**: Every requested plugin must be in the catalog.
//! - **Plan**: Shows the order in which resources would be reconciled.
//!
//! This command is a safe, read-only operation that does not modify anything.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use kdb_state::output::{OutputConfig, Symbol};
use kdb_state::reconcile::plan;
use kdb_state::resource::{self, Resource};

use super::{check_plugins, CatalogArgs, ManifestArgs};

/// Validate a manifest
#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub manifest: ManifestArgs,

    #[command(flatten)]
    pub catalog: CatalogArgs,
}

/// Execute the `validate` command.
///
/// # Arguments
/// * `args` - The command arguments
/// * `color_flag` - The value of the global --color flag ("always", "never", or "auto")
pub fn execute(args: ValidateArgs, color_flag: &str) -> Result<ExitCode> {
    let out = OutputConfig::from_env_and_flag(color_flag);
    let manifest_path = &args.manifest.manifest;
    println!(
        "{} Validating manifest: {}",
        out.symbol(Symbol::Scan),
        manifest_path.display()
    );

    let manifest = match args.manifest.load() {
        Ok(manifest) => {
            println!("{} Manifest parsed successfully", out.symbol(Symbol::Ok));
            manifest
        }
        Err(e) => {
            println!("{} Manifest parsing failed", out.symbol(Symbol::Error));
            return Err(e);
        }
    };

    let key_count = manifest
        .iter()
        .filter(|resource| matches!(resource, Resource::Key { .. }))
        .count();
    println!("\n{} Manifest Summary:", out.symbol(Symbol::Info));
    println!("   Keys: {}", key_count);
    println!("   Mounts: {}", manifest.len() - key_count);

    if let Err(e) = resource::validate(&manifest) {
        println!("{} {}", out.symbol(Symbol::Error), e);
        return Err(e.into());
    }
    let catalog = args.catalog.load()?;
    if let Err(e) = check_plugins(&manifest, &catalog) {
        println!("{} Unknown plugin", out.symbol(Symbol::Error));
        return Err(e);
    }

    println!("\n{} Reconciliation order:", out.symbol(Symbol::Plan));
    for (position, step) in plan::build(&manifest)?.steps.iter().enumerate() {
        let resource = &manifest[step.index];
        if step.depends_on.is_empty() {
            println!("   {}. {}", position + 1, resource.describe());
        } else {
            println!(
                "   {}. {} (after mount {})",
                position + 1,
                resource.describe(),
                step.depends_on.join(", ")
            );
        }
    }

    println!("\n{} Manifest is valid", out.symbol(Symbol::Ok));
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn run(content: &str) -> Result<ExitCode> {
        let temp_dir = TempDir::new().unwrap();
        let manifest = temp_dir.path().join("kdb-state.yaml");
        fs::write(&manifest, content).unwrap();
        execute(
            ValidateArgs {
                manifest: ManifestArgs { manifest },
                catalog: CatalogArgs { catalog: None },
            },
            "never",
        )
    }

    #[test]
    fn test_valid_manifest() {
        let result = run(
            "- mount:\n    name: system/hosts\n    file: /etc/hosts\n    plugins: hosts\n\
             - key:\n    name: system/hosts/ipv4/localhost\n    value: 127.0.0.1\n",
        );
        assert_eq!(result.unwrap(), ExitCode::SUCCESS);
    }

    #[test]
    fn test_check_on_spec_key_is_rejected() {
        let err = run("- key:\n    name: spec/app/x\n    check: short\n").unwrap_err();
        assert!(err.to_string().contains("spec namespace"));
    }

    #[test]
    fn test_mount_without_plugins_is_rejected() {
        let err = run("- mount:\n    name: user/app\n    file: app.ini\n").unwrap_err();
        assert!(err.to_string().contains("'plugins' is required"));
    }
}
