//! # Reconciling a Manifest
//!
//! Brings a key database in line with a manifest, one resource at a time:
//!
//! 1.  **Validation**: the whole manifest is validated before any session
//!     is opened, so a bad resource never leaves a half-applied manifest.
//! 2.  **Planning**: mounts are ordered before the keys stored in them (see
//!     [`plan`]).
//! 3.  **Reconciling**: every resource runs in its own session, keys in
//!     [`key`] and mounts in [`mount`]. A session is committed only if its
//!     resource changed.
//!
//! A failing resource stops the run; resources reconciled before it stay
//! committed.

pub mod key;
pub mod mount;
pub mod plan;

use std::fmt;

use log::{debug, info};

use crate::backend::PluginCatalog;
use crate::error::Result;
use crate::meta::MetaClassifier;
use crate::resource::{validate, Manifest, Resource};
use crate::store::KeyStore;

/// Options for [`apply`].
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Compute changes without committing them.
    pub dry_run: bool,
    pub classifier: MetaClassifier,
}

/// What happened to a resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Outcome {
    #[default]
    Unchanged,
    Created,
    Updated,
    Removed,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Outcome::Unchanged => "unchanged",
            Outcome::Created => "created",
            Outcome::Updated => "updated",
            Outcome::Removed => "removed",
        };
        f.write_str(label)
    }
}

/// Result of reconciling one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceReport {
    /// e.g. `key user/app/x`
    pub resource: String,
    pub outcome: Outcome,
    /// Human readable details, one per change.
    pub changes: Vec<String>,
}

impl ResourceReport {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            outcome: Outcome::Unchanged,
            changes: Vec::new(),
        }
    }

    pub fn is_changed(&self) -> bool {
        self.outcome != Outcome::Unchanged
    }
}

/// Result of [`apply`], in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    pub dry_run: bool,
    pub resources: Vec<ResourceReport>,
}

impl Report {
    /// Resources that changed (or would change, in a dry run).
    pub fn changed(&self) -> impl Iterator<Item = &ResourceReport> {
        self.resources.iter().filter(|report| report.is_changed())
    }

    pub fn is_in_sync(&self) -> bool {
        self.changed().next().is_none()
    }
}

/// Reconcile every resource of `manifest` against `store`.
pub fn apply<S: KeyStore + ?Sized>(
    manifest: &Manifest,
    store: &S,
    catalog: &PluginCatalog,
    options: &ApplyOptions,
) -> Result<Report> {
    validate(manifest)?;
    let plan = plan::build(manifest)?;

    let mut report = Report {
        dry_run: options.dry_run,
        resources: Vec::with_capacity(plan.steps.len()),
    };
    for step in &plan.steps {
        let resource = &manifest[step.index];
        debug!("reconciling {}", resource.describe());
        let result = match resource {
            Resource::Key { key } => key::reconcile(key, store, options)?,
            Resource::Mount { mount } => mount::reconcile(mount, store, catalog, options)?,
        };

        if result.is_changed() {
            if options.dry_run {
                info!("{}: would be {}", result.resource, result.outcome);
            } else {
                info!("{}: {}", result.resource, result.outcome);
            }
            for change in &result.changes {
                info!("  {}", change);
            }
        }
        report.resources.push(result);
    }
    Ok(report)
}
