//! Reconciling a mount resource.
//!
//! All mounts share the mount configuration subtree, so every mount
//! resource opens its own session on [`MOUNTPOINTS_ROOT`].

use log::{debug, warn};

use super::{ApplyOptions, Outcome, ResourceReport};
use crate::backend::compose::resolver_spec;
use crate::backend::mountconf::{active_mounts, read_backend, set_file, unmount};
use crate::backend::{
    check_sync, compose, MountBackendBuilder, MountInfo, MountRequest, PluginCatalog,
    MOUNTPOINTS_ROOT,
};
use crate::error::{Error, Result};
use crate::resource::{Ensure, MountResource};
use crate::store::{with_changes, with_session, Access, KeySet, KeyStore};

/// The compose request for a present mount resource.
pub fn request_for(resource: &MountResource) -> Result<MountRequest> {
    let file = resource.file.clone().ok_or_else(|| Error::Validation {
        resource: format!("mount {}", resource.name),
        message: "'file' is required".to_string(),
    })?;
    Ok(MountRequest {
        mountpoint: resource.name.clone(),
        file,
        resolver: resource.resolver.clone(),
        plugins: resource.plugins().to_vec(),
        add_recommended: resource.add_recommended_plugins,
    })
}

/// Bring one mountpoint in line with `resource`.
pub fn reconcile<S: KeyStore + ?Sized>(
    resource: &MountResource,
    store: &S,
    catalog: &PluginCatalog,
    options: &ApplyOptions,
) -> Result<ResourceReport> {
    with_changes(store, MOUNTPOINTS_ROOT, options.dry_run, |mountconf| {
        let report = reconcile_mountconf(resource, mountconf, catalog)?;
        let changed = report.outcome != Outcome::Unchanged;
        Ok((report, changed))
    })
}

/// Apply `resource` to a loaded mount configuration.
pub fn reconcile_mountconf(
    resource: &MountResource,
    mountconf: &mut KeySet,
    catalog: &PluginCatalog,
) -> Result<ResourceReport> {
    let mut report = ResourceReport::new(format!("mount {}", resource.name));
    let live = read_backend(mountconf, &resource.name);

    match (resource.ensure, live) {
        (Ensure::Absent, None) => {}
        (Ensure::Absent, Some(_)) => {
            unmount(mountconf, &resource.name);
            report.outcome = Outcome::Removed;
        }
        (Ensure::Present, None) => {
            let request = request_for(resource)?;
            mount(&request, mountconf, catalog, &mut report)?;
            report.outcome = Outcome::Created;
        }
        (Ensure::Present, Some(live)) => {
            let request = request_for(resource)?;
            let drift = plugin_drift(&live, &request, catalog)?;
            if !drift.is_empty() {
                report.changes.extend(drift);
                remount(&request, mountconf, catalog, &mut report)?;
            } else if live.file != request.file {
                report.changes.push(format!("file {} -> {}", live.file, request.file));
                if let Err(e) = set_file(mountconf, &request.mountpoint, &request.file) {
                    warn!(
                        "{}: could not change the file in place ({}), mounting again",
                        request.mountpoint, e
                    );
                    remount(&request, mountconf, catalog, &mut report)?;
                }
            }
            if !report.changes.is_empty() {
                report.outcome = Outcome::Updated;
            }
        }
    }
    Ok(report)
}

/// Differences between the live backend and `request`, one line each.
fn plugin_drift(
    live: &MountInfo,
    request: &MountRequest,
    catalog: &PluginCatalog,
) -> Result<Vec<String>> {
    let mut drift = Vec::new();

    let wanted = resolver_spec(&request.resolver)?;
    let current = live.resolver.as_ref().map(|resolver| resolver.name());
    if current != Some(wanted.name()) {
        drift.push(format!(
            "resolver {} -> {}",
            current.unwrap_or("(none)"),
            wanted.name()
        ));
    }

    let sync = check_sync(MountBackendBuilder::new(catalog), &live.plugins, request)?;
    if !sync.missing.is_empty() {
        drift.push(format!("missing plugins: {}", sync.missing.join(", ")));
    }
    if !sync.unexpected.is_empty() {
        drift.push(format!("unexpected plugins: {}", sync.unexpected.join(", ")));
    }
    if !sync.reconfigured.is_empty() {
        drift.push(format!("plugin settings: {}", sync.reconfigured.join(", ")));
    }
    Ok(drift)
}

fn mount(
    request: &MountRequest,
    mountconf: &mut KeySet,
    catalog: &PluginCatalog,
    report: &mut ResourceReport,
) -> Result<()> {
    let mut builder = MountBackendBuilder::new(catalog);
    let composition = compose(&mut builder, request, mountconf)?;
    debug!(
        "{}: composed chain {}",
        request.mountpoint,
        composition
            .chain
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );
    if !composition.implicit.is_empty() {
        report.changes.push(format!(
            "implicit plugins: {}",
            composition
                .implicit
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }
    Ok(())
}

/// Unmount and compose again; the old backend is restored if composing fails.
fn remount(
    request: &MountRequest,
    mountconf: &mut KeySet,
    catalog: &PluginCatalog,
    report: &mut ResourceReport,
) -> Result<()> {
    let previous = mountconf.clone();
    unmount(mountconf, &request.mountpoint);
    if let Err(e) = mount(request, mountconf, catalog, report) {
        *mountconf = previous;
        return Err(e);
    }
    Ok(())
}

/// Every mounted backend, read in a read-only session.
pub fn list<S: KeyStore + ?Sized>(store: &S) -> Result<Vec<MountInfo>> {
    with_session(store, MOUNTPOINTS_ROOT, Access::ReadOnly, |mountconf| {
        Ok(active_mounts(mountconf))
    })
}
