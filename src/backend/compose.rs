//! Composing a backend from a mount request, and comparing a live backend
//! against a request.

use std::collections::BTreeSet;

use log::{debug, warn};

use super::builder::BackendBuilder;
use super::plugin::PluginSpec;
use crate::error::{Error, Result};
use crate::keyname::KeyName;
use crate::store::KeySet;

/// Capability every backend needs.
pub const STORAGE: &str = "storage";

/// Reference name of the plugin in the resolver role.
pub const RESOLVER_REF: &str = "resolver";

/// Everything needed to mount a file.
#[derive(Debug, Clone, PartialEq)]
pub struct MountRequest {
    pub mountpoint: String,
    pub file: String,
    /// Name of the resolver plugin.
    pub resolver: String,
    /// Requested plugins, in order, with their settings.
    pub plugins: Vec<PluginSpec>,
    pub add_recommended: bool,
}

/// Result of [`compose`].
#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    /// The full chain as serialized, resolver first.
    pub chain: Vec<PluginSpec>,
    /// Plugins in the chain that were not requested.
    pub implicit: Vec<PluginSpec>,
}

/// Spec of the resolver plugin `name` in its resolver role.
pub fn resolver_spec(name: &str) -> Result<PluginSpec> {
    let spec = PluginSpec::parse(name)?;
    if spec.ref_name() == spec.name() {
        Ok(spec.with_ref(RESOLVER_REF))
    } else {
        Ok(spec)
    }
}

/// The requested plugins that must be added explicitly.
///
/// A plugin with settings is always explicit. Any other requested plugin is
/// left to the resolver when another requested plugin, itself explicit,
/// would pull it in anyway.
pub fn explicit_plugins<B: BackendBuilder + ?Sized>(
    builder: &B,
    requested: &[PluginSpec],
    include_recommended: bool,
) -> Result<Vec<PluginSpec>> {
    let pulled: Vec<Vec<PluginSpec>> = requested
        .iter()
        .map(|plugin| builder.added_by(std::slice::from_ref(plugin), include_recommended))
        .collect::<Result<_>>()?;

    let mut skipped = vec![false; requested.len()];
    for (index, plugin) in requested.iter().enumerate() {
        if plugin.has_config() {
            continue;
        }
        let pulled_by = pulled.iter().enumerate().find(|(other, pulls)| {
            *other != index && !skipped[*other] && pulls.contains(plugin)
        });
        if let Some((other, _)) = pulled_by {
            debug!("{} is pulled in by {}, not adding it explicitly", plugin, requested[other]);
            skipped[index] = true;
        }
    }

    Ok(requested
        .iter()
        .zip(skipped)
        .filter(|(_, skipped)| !skipped)
        .map(|(plugin, _)| plugin.clone())
        .collect())
}

/// Compose the backend for `request` and write it into `mountconf`.
///
/// `mountconf` is only modified if the whole backend could be composed.
pub fn compose<B: BackendBuilder + ?Sized>(
    builder: &mut B,
    request: &MountRequest,
    mountconf: &mut KeySet,
) -> Result<Composition> {
    KeyName::parse_mountpoint(&request.mountpoint).map_err(|e| Error::Composition {
        mountpoint: request.mountpoint.clone(),
        message: e.to_string(),
    })?;
    builder.set_mountpoint(&request.mountpoint, mountconf)?;

    builder.add_plugin(resolver_spec(&request.resolver)?)?;
    builder.use_config_file(&request.file);
    builder.need_plugin(STORAGE);

    for plugin in explicit_plugins(&*builder, &request.plugins, request.add_recommended)? {
        builder.add_plugin(plugin)?;
    }
    builder.resolve_needs(request.add_recommended)?;

    let chain = builder.plugins().to_vec();
    let implicit: Vec<PluginSpec> = chain
        .iter()
        .filter(|plugin| !plugin.is_resolver() && !request.plugins.contains(*plugin))
        .cloned()
        .collect();
    if !implicit.is_empty() {
        warn!(
            "{}: added plugins implicitly: {}",
            request.mountpoint,
            implicit
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    let mut staged = mountconf.clone();
    builder.serialize(&mut staged)?;
    *mountconf = staged;

    Ok(Composition { chain, implicit })
}

/// Differences between a live backend and a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Requested or implied plugins the live backend lacks.
    pub missing: Vec<String>,
    /// Live plugins the request neither names nor implies.
    pub unexpected: Vec<String>,
    /// Requested plugins whose live settings differ.
    pub reconfigured: Vec<String>,
}

impl SyncReport {
    pub fn is_in_sync(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty() && self.reconfigured.is_empty()
    }
}

/// Compare the live plugins of a backend (resolver excluded) with
/// `request`, using a fresh `builder` for resolution.
///
/// The builder is seeded like [`compose`] seeds it, so plugins pulled in by
/// the resolver count as implied.
pub fn check_sync<B: BackendBuilder>(
    mut builder: B,
    live: &[PluginSpec],
    request: &MountRequest,
) -> Result<SyncReport> {
    let requested = &request.plugins;
    builder.add_plugin(resolver_spec(&request.resolver)?)?;
    builder.need_plugin(STORAGE);
    for plugin in requested {
        builder.add_plugin(plugin.clone())?;
    }
    builder.resolve_needs(request.add_recommended)?;
    let resolved: Vec<&PluginSpec> = builder
        .plugins()
        .iter()
        .filter(|plugin| !plugin.is_resolver())
        .collect();
    let live: Vec<&PluginSpec> = live.iter().filter(|plugin| !plugin.is_resolver()).collect();

    let mut missing = BTreeSet::new();
    for plugin in requested.iter().chain(resolved.iter().copied()) {
        if !live.contains(&plugin) {
            missing.insert(plugin.to_string());
        }
    }
    let unexpected: BTreeSet<String> = live
        .iter()
        .filter(|plugin| !resolved.contains(*plugin))
        .map(ToString::to_string)
        .collect();
    let reconfigured: BTreeSet<String> = requested
        .iter()
        .filter(|plugin| {
            live.iter()
                .any(|current| *current == *plugin && !current.same_config(plugin))
        })
        .map(ToString::to_string)
        .collect();

    Ok(SyncReport {
        missing: missing.into_iter().collect(),
        unexpected: unexpected.into_iter().collect(),
        reconfigured: reconfigured.into_iter().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::builder::MountBackendBuilder;
    use crate::backend::catalog::{PluginCatalog, PluginInfo};
    use crate::backend::mountconf::read_backend;

    fn catalog() -> PluginCatalog {
        PluginCatalog::new()
            .with_plugin("resolver", PluginInfo::default().provides(["resolver"]))
            .with_plugin(
                "ini",
                PluginInfo::default()
                    .provides(["storage"])
                    .needs(["type"])
                    .recommends(["sync"]),
            )
            .with_plugin("type", PluginInfo::default().provides(["check"]))
            .with_plugin("sync", PluginInfo::default().provides(["sync"]))
            .with_plugin("extra", PluginInfo::default())
            .with_plugin("dump", PluginInfo::default().provides(["storage"]))
            .with_plugin("a", PluginInfo::default().needs(["b"]))
            .with_plugin("b", PluginInfo::default().needs(["a"]))
            .with_default("storage", "dump")
    }

    fn specs(names: &[&str]) -> Vec<PluginSpec> {
        names.iter().map(|name| PluginSpec::parse(name).unwrap()).collect()
    }

    fn names(plugins: &[PluginSpec]) -> Vec<String> {
        plugins.iter().map(ToString::to_string).collect()
    }

    fn request(plugins: Vec<PluginSpec>) -> MountRequest {
        MountRequest {
            mountpoint: "user/test/puppet".to_string(),
            file: "/tmp/test.ini".to_string(),
            resolver: "resolver".to_string(),
            plugins,
            add_recommended: true,
        }
    }

    #[test]
    fn test_in_sync_with_implied_plugins() {
        let catalog = catalog();
        let check = |live: &[&str]| {
            check_sync(MountBackendBuilder::new(&catalog), &specs(live), &request(specs(&["ini"])))
                .unwrap()
        };

        assert!(check(&["ini", "type", "sync"]).is_in_sync());

        let missing = check(&["ini", "type"]);
        assert_eq!(missing.missing, vec!["sync"]);
        assert!(!missing.is_in_sync());

        let extra = check(&["ini", "type", "sync", "extra"]);
        assert_eq!(extra.unexpected, vec!["extra"]);
        assert!(!extra.is_in_sync());
    }

    #[test]
    fn test_recommendations_off_changes_expectation() {
        let catalog = catalog();
        let mut without_recommended = request(specs(&["ini"]));
        without_recommended.add_recommended = false;
        let report = check_sync(
            MountBackendBuilder::new(&catalog),
            &specs(&["ini", "type", "sync"]),
            &without_recommended,
        )
        .unwrap();
        assert_eq!(report.unexpected, vec!["sync"]);
    }

    #[test]
    fn test_settings_drift() {
        let catalog = catalog();
        let mut wanted = PluginSpec::parse("ini").unwrap();
        wanted.set_config("delimiter", " ");
        let report = check_sync(
            MountBackendBuilder::new(&catalog),
            &specs(&["ini", "type", "sync"]),
            &request(vec![wanted]),
        )
        .unwrap();
        assert_eq!(report.reconfigured, vec!["ini"]);
    }

    #[test]
    fn test_live_resolver_is_ignored() {
        let catalog = catalog();
        let live = specs(&["resolver#resolver", "ini", "type", "sync"]);
        let report =
            check_sync(MountBackendBuilder::new(&catalog), &live, &request(specs(&["ini"]))).unwrap();
        assert!(report.is_in_sync());
    }

    #[test]
    fn test_plugins_recommended_by_resolver_are_implied() {
        let catalog = catalog().with_plugin(
            "resolver",
            PluginInfo::default().provides(["resolver"]).recommends(["extra"]),
        );
        let mut mountconf = KeySet::new();
        let mut builder = MountBackendBuilder::new(&catalog);
        let request = request(specs(&["ini"]));

        let composition = compose(&mut builder, &request, &mut mountconf).unwrap();
        assert!(names(&composition.chain).contains(&"extra".to_string()));

        let live = read_backend(&mountconf, &request.mountpoint).unwrap().plugins;
        let report = check_sync(MountBackendBuilder::new(&catalog), &live, &request).unwrap();
        assert!(report.is_in_sync(), "{:?}", report);
    }

    #[test]
    fn test_compose_serializes_full_chain() {
        testing_logger::setup();
        let catalog = catalog();
        let mut mountconf = KeySet::new();
        let mut builder = MountBackendBuilder::new(&catalog);

        let composition = compose(&mut builder, &request(specs(&["ini"])), &mut mountconf).unwrap();
        assert_eq!(names(&composition.chain), vec!["resolver", "ini", "type", "sync"]);
        assert_eq!(names(&composition.implicit), vec!["type", "sync"]);

        let info = read_backend(&mountconf, "user/test/puppet").unwrap();
        assert_eq!(info.file, "/tmp/test.ini");
        assert_eq!(names(&info.plugins), vec!["ini", "type", "sync"]);

        testing_logger::validate(|logs| {
            assert!(logs.iter().any(|entry| entry.level == log::Level::Warn
                && entry.body.contains("added plugins implicitly: type, sync")));
        });
    }

    #[test]
    fn test_compose_skips_plugins_pulled_in_by_others() {
        let catalog = catalog();
        let mut mountconf = KeySet::new();
        let mut builder = MountBackendBuilder::new(&catalog);

        let composition =
            compose(&mut builder, &request(specs(&["type", "ini"])), &mut mountconf).unwrap();
        // type is a need of ini, so ini comes first and type follows it
        assert_eq!(names(&composition.chain), vec!["resolver", "ini", "type", "sync"]);
        assert_eq!(names(&composition.implicit), vec!["sync"]);
    }

    #[test]
    fn test_plugins_with_settings_stay_explicit() {
        let catalog = catalog();
        let builder = MountBackendBuilder::new(&catalog);
        let mut typed = PluginSpec::parse("type").unwrap();
        typed.set_config("strict", "1");

        let explicit = explicit_plugins(&builder, &[typed, PluginSpec::parse("ini").unwrap()], true)
            .unwrap();
        assert_eq!(names(&explicit), vec!["type", "ini"]);
    }

    #[test]
    fn test_mutual_needs_keep_one_plugin() {
        let catalog = catalog();
        let builder = MountBackendBuilder::new(&catalog);
        let explicit = explicit_plugins(&builder, &specs(&["a", "b"]), false).unwrap();
        assert_eq!(names(&explicit), vec!["b"]);
    }

    #[test]
    fn test_failed_compose_leaves_mountconf_untouched() {
        let catalog = catalog();
        let mut mountconf = KeySet::new();
        let mut builder = MountBackendBuilder::new(&catalog);
        let err = compose(&mut builder, &request(specs(&["unknown"])), &mut mountconf).unwrap_err();
        assert!(matches!(err, Error::Composition { .. }));
        assert!(mountconf.is_empty());
    }

    #[test]
    fn test_invalid_mountpoint_fails_fast() {
        let catalog = catalog();
        let mut mountconf = KeySet::new();
        let mut builder = MountBackendBuilder::new(&catalog);
        let mut bad = request(specs(&["ini"]));
        bad.mountpoint = "proc/x".to_string();
        assert!(matches!(
            compose(&mut builder, &bad, &mut mountconf),
            Err(Error::Composition { .. })
        ));
    }

    #[test]
    fn test_resolver_spec() {
        assert_eq!(resolver_spec("resolver_fm_b").unwrap().to_string(), "resolver_fm_b#resolver");
        assert_eq!(resolver_spec("resolver#main").unwrap().ref_name(), "main");
        assert!(resolver_spec("bad name").is_err());
    }
}
