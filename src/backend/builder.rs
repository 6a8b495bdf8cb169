//! Building a backend's plugin chain.

use log::debug;

use super::catalog::{PluginCatalog, PluginInfo};
use super::mountconf::{is_mounted, write_backend};
use super::plugin::PluginSpec;
use crate::error::{Error, Result};
use crate::keyname::KeyName;
use crate::store::KeySet;

/// Assembles the plugin chain of a single backend.
pub trait BackendBuilder {
    /// Bind the backend to `mountpoint`, which must not be in use in
    /// `mountconf`.
    fn set_mountpoint(&mut self, mountpoint: &str, mountconf: &KeySet) -> Result<()>;

    /// Append a plugin to the chain.
    fn add_plugin(&mut self, plugin: PluginSpec) -> Result<()>;

    /// Require a plugin or capability, filled in by [`resolve_needs`].
    ///
    /// [`resolve_needs`]: BackendBuilder::resolve_needs
    fn need_plugin(&mut self, need: &str);

    /// Recommend a plugin or capability, filled in by [`resolve_needs`] if
    /// recommendations are included.
    ///
    /// [`resolve_needs`]: BackendBuilder::resolve_needs
    fn recommend_plugin(&mut self, name: &str);

    fn use_config_file(&mut self, path: &str);

    /// Add plugins until every need (and optionally every recommendation)
    /// of the backend and its plugins is satisfied.
    fn resolve_needs(&mut self, include_recommended: bool) -> Result<()>;

    /// The chain as assembled so far.
    fn plugins(&self) -> &[PluginSpec];

    /// Plugins that resolving a backend consisting of `plugins` alone would
    /// add, without touching this builder.
    fn added_by(&self, plugins: &[PluginSpec], include_recommended: bool) -> Result<Vec<PluginSpec>>;

    /// Write the backend into `mountconf`.
    fn serialize(&self, mountconf: &mut KeySet) -> Result<()>;
}

/// [`BackendBuilder`] resolving needs against a [`PluginCatalog`].
#[derive(Debug, Clone)]
pub struct MountBackendBuilder<'a> {
    catalog: &'a PluginCatalog,
    mountpoint: Option<String>,
    file: Option<String>,
    plugins: Vec<PluginSpec>,
    needs: Vec<String>,
    recommends: Vec<String>,
}

impl<'a> MountBackendBuilder<'a> {
    pub fn new(catalog: &'a PluginCatalog) -> Self {
        Self {
            catalog,
            mountpoint: None,
            file: None,
            plugins: Vec::new(),
            needs: Vec::new(),
            recommends: Vec::new(),
        }
    }

    fn error(&self, message: String) -> Error {
        Error::Composition {
            mountpoint: self.mountpoint.clone().unwrap_or_default(),
            message,
        }
    }

    fn is_satisfied(&self, need: &str) -> bool {
        self.plugins
            .iter()
            .any(|plugin| self.catalog.satisfies(plugin.name(), need))
    }

    /// Backend-level entries followed by those declared by each plugin.
    fn declared(&self, own: &[String], select: fn(&PluginInfo) -> &[String]) -> Vec<String> {
        let mut all = own.to_vec();
        for plugin in &self.plugins {
            if let Some(info) = self.catalog.get(plugin.name()) {
                all.extend(select(info).iter().cloned());
            }
        }
        all
    }

    fn unsatisfied_need(&self) -> Option<String> {
        self.declared(&self.needs, |info| &info.needs)
            .into_iter()
            .find(|need| !self.is_satisfied(need))
    }

    fn unsatisfied_recommendation(&self) -> Option<(String, String)> {
        self.declared(&self.recommends, |info| &info.recommends)
            .into_iter()
            .filter(|recommendation| !self.is_satisfied(recommendation))
            .find_map(|recommendation| {
                match self.catalog.provider_for(&recommendation) {
                    Some(provider) => Some((recommendation, provider.to_string())),
                    None => {
                        debug!("ignoring recommended plugin {}: not available", recommendation);
                        None
                    }
                }
            })
    }
}

impl BackendBuilder for MountBackendBuilder<'_> {
    fn set_mountpoint(&mut self, mountpoint: &str, mountconf: &KeySet) -> Result<()> {
        KeyName::parse_mountpoint(mountpoint).map_err(|e| Error::Composition {
            mountpoint: mountpoint.to_string(),
            message: e.to_string(),
        })?;
        if is_mounted(mountconf, mountpoint) {
            return Err(Error::Composition {
                mountpoint: mountpoint.to_string(),
                message: "mountpoint already in use".to_string(),
            });
        }
        self.mountpoint = Some(mountpoint.to_string());
        Ok(())
    }

    fn add_plugin(&mut self, plugin: PluginSpec) -> Result<()> {
        if !self.catalog.contains(plugin.name()) {
            return Err(self.error(format!("plugin '{}' is not available", plugin.name())));
        }
        if self.plugins.contains(&plugin) {
            return Err(self.error(format!("plugin '{}' is already part of the backend", plugin)));
        }
        self.plugins.push(plugin);
        Ok(())
    }

    fn need_plugin(&mut self, need: &str) {
        self.needs.push(need.to_string());
    }

    fn recommend_plugin(&mut self, name: &str) {
        self.recommends.push(name.to_string());
    }

    fn use_config_file(&mut self, path: &str) {
        self.file = Some(path.to_string());
    }

    fn resolve_needs(&mut self, include_recommended: bool) -> Result<()> {
        loop {
            if let Some(need) = self.unsatisfied_need() {
                let provider = match self.catalog.provider_for(&need) {
                    Some(provider) => provider.to_string(),
                    None => return Err(self.error(format!("no plugin provides '{}'", need))),
                };
                debug!("adding plugin {} for need {}", provider, need);
                self.plugins.push(PluginSpec::named(provider));
                continue;
            }
            if include_recommended {
                if let Some((recommendation, provider)) = self.unsatisfied_recommendation() {
                    debug!("adding plugin {} for recommendation {}", provider, recommendation);
                    self.plugins.push(PluginSpec::named(provider));
                    continue;
                }
            }
            return Ok(());
        }
    }

    fn plugins(&self) -> &[PluginSpec] {
        &self.plugins
    }

    fn added_by(&self, plugins: &[PluginSpec], include_recommended: bool) -> Result<Vec<PluginSpec>> {
        let mut probe = MountBackendBuilder::new(self.catalog);
        for plugin in plugins {
            probe.add_plugin(plugin.clone())?;
        }
        probe.resolve_needs(include_recommended)?;
        Ok(probe.plugins.split_off(plugins.len()))
    }

    fn serialize(&self, mountconf: &mut KeySet) -> Result<()> {
        let Some(mountpoint) = self.mountpoint.as_deref() else {
            return Err(self.error("no mountpoint set".to_string()));
        };
        let Some(file) = self.file.as_deref() else {
            return Err(self.error("no configuration file set".to_string()));
        };
        if !self.plugins.iter().any(PluginSpec::is_resolver) {
            return Err(self.error("backend has no resolver".to_string()));
        }
        if let Some(need) = self.unsatisfied_need() {
            return Err(self.error(format!("need '{}' is not resolved", need)));
        }
        write_backend(mountconf, mountpoint, file, &self.plugins);
        Ok(())
    }
}
