//! # Plugin Catalog
//!
//! What the resolver knows about plugins: which capabilities each one
//! provides, which it needs and which it recommends. A need or a
//! recommendation names either a plugin or a capability.
//!
//! The built-in catalog describes the commonly installed plugins. A catalog
//! can also be loaded from YAML:
//!
//! ```yaml
//! plugins:
//!   ini:
//!     provides: [storage, storage/ini]
//!     recommends: [sync]
//!   sync:
//!     provides: [sync]
//! defaults:
//!   storage: ini
//! ```
//!
//! `defaults` picks the plugin used when a capability is needed and several
//! plugins provide it. Without a default, the alphabetically first provider
//! is used.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// What a single plugin provides, needs and recommends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provides: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub needs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommends: Vec<String>,
}

impl PluginInfo {
    pub fn provides<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.provides = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn needs<I, S>(mut self, needs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.needs = needs.into_iter().map(Into::into).collect();
        self
    }

    pub fn recommends<I, S>(mut self, recommends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recommends = recommends.into_iter().map(Into::into).collect();
        self
    }
}

/// The set of plugins available for composing backends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginCatalog {
    #[serde(default)]
    plugins: BTreeMap<String, PluginInfo>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    defaults: BTreeMap<String, String>,
}

impl PluginCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog of the commonly installed plugins.
    pub fn builtin() -> Self {
        let storage = |format: &str| PluginInfo::default().provides(["storage", format]);
        let check = |kind: &str| PluginInfo::default().provides(["check", kind]);

        Self::new()
            .with_plugin("resolver", PluginInfo::default().provides(["resolver"]))
            .with_plugin("resolver_fm_b", PluginInfo::default().provides(["resolver"]))
            .with_plugin("resolver_fm_hpu_b", PluginInfo::default().provides(["resolver"]))
            .with_plugin("dump", storage("storage/dump"))
            .with_plugin("ini", storage("storage/ini").recommends(["sync"]))
            .with_plugin("ni", storage("storage/ni"))
            .with_plugin("mini", storage("storage/properties"))
            .with_plugin("line", storage("storage/line"))
            .with_plugin(
                "hosts",
                storage("storage/hosts").recommends(["glob", "network", "error"]),
            )
            .with_plugin("yajl", storage("storage/json").needs(["directoryvalue"]))
            .with_plugin("xmltool", storage("storage/xml"))
            .with_plugin("augeas", storage("storage/augeas").needs(["glob"]))
            .with_plugin("sync", PluginInfo::default().provides(["sync"]))
            .with_plugin("type", check("check/type"))
            .with_plugin("enum", check("check/enum"))
            .with_plugin("path", check("check/path"))
            .with_plugin("range", check("check/range"))
            .with_plugin("validation", check("check/validation"))
            .with_plugin("network", check("check/network"))
            .with_plugin("error", PluginInfo::default())
            .with_plugin("glob", PluginInfo::default().provides(["apply"]))
            .with_plugin("directoryvalue", PluginInfo::default().provides(["directoryvalue"]))
            .with_plugin("base64", PluginInfo::default().provides(["binary"]))
            .with_plugin("lineending", PluginInfo::default().provides(["check/lineending"]))
            .with_plugin("iconv", PluginInfo::default().provides(["conv"]))
            .with_default("storage", "dump")
            .with_default("resolver", "resolver")
    }

    /// Parse a catalog from YAML.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let catalog: Self = serde_yaml::from_str(content)?;
        for (capability, plugin) in &catalog.defaults {
            if !catalog.plugins.contains_key(plugin) {
                return Err(Error::ConfigParse {
                    message: format!(
                        "default plugin '{}' for '{}' is not in the catalog",
                        plugin, capability
                    ),
                    hint: Some("add the plugin under 'plugins'".to_string()),
                });
            }
        }
        Ok(catalog)
    }

    /// Load a catalog from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(Error::Io)?;
        Self::from_yaml(&content)
    }

    pub fn with_plugin(mut self, name: impl Into<String>, info: PluginInfo) -> Self {
        self.plugins.insert(name.into(), info);
        self
    }

    pub fn with_default(mut self, capability: impl Into<String>, plugin: impl Into<String>) -> Self {
        self.defaults.insert(capability.into(), plugin.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&PluginInfo> {
        self.plugins.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    /// Names of all known plugins, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }

    /// Whether plugin `plugin` satisfies `need`, by name or by capability.
    pub fn satisfies(&self, plugin: &str, need: &str) -> bool {
        plugin == need
            || self
                .plugins
                .get(plugin)
                .is_some_and(|info| info.provides.iter().any(|p| p == need))
    }

    /// The plugin to add for an unsatisfied `need`.
    ///
    /// A plugin named like the need wins, then the configured default, then
    /// the alphabetically first provider.
    pub fn provider_for(&self, need: &str) -> Option<&str> {
        if let Some((name, _)) = self.plugins.get_key_value(need) {
            return Some(name.as_str());
        }
        if let Some(default) = self.defaults.get(need) {
            if self.plugins.contains_key(default) {
                return Some(default.as_str());
            }
        }
        self.plugins
            .iter()
            .find(|(_, info)| info.provides.iter().any(|p| p == need))
            .map(|(name, _)| name.as_str())
    }
}
