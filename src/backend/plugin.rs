//! Plugin specifications.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};

fn plugin_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9_]+)(?:#([A-Za-z0-9_]+))?$").expect("valid plugin name regex")
    })
}

/// A plugin in a backend's chain.
///
/// `name` selects the plugin implementation. `ref_name` distinguishes two
/// instances of the same plugin with different roles. Two specs are equal
/// when name and reference name match; differing settings are reported
/// separately through [`PluginSpec::same_config`].
#[derive(Debug, Clone)]
pub struct PluginSpec {
    name: String,
    ref_name: Option<String>,
    config: BTreeMap<String, String>,
}

impl PluginSpec {
    /// Parse `name` or `name#ref`.
    ///
    /// ```
    /// use kdb_state::backend::PluginSpec;
    ///
    /// let spec = PluginSpec::parse("ini#main").unwrap();
    /// assert_eq!(spec.name(), "ini");
    /// assert_eq!(spec.ref_name(), "main");
    /// assert!(PluginSpec::parse("in-i").is_err());
    /// ```
    pub fn parse(spec: &str) -> Result<Self> {
        let caps = plugin_name_regex()
            .captures(spec)
            .ok_or_else(|| Error::InvalidPluginName {
                name: spec.to_string(),
            })?;
        Ok(Self {
            name: caps[1].to_string(),
            ref_name: caps.get(2).map(|m| m.as_str().to_string()),
            config: BTreeMap::new(),
        })
    }

    /// A spec for a plugin known to have a valid name.
    pub(crate) fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ref_name: None,
            config: BTreeMap::new(),
        }
    }

    pub(crate) fn with_ref(mut self, ref_name: impl Into<String>) -> Self {
        self.ref_name = Some(ref_name.into());
        self
    }

    pub fn with_config(mut self, config: BTreeMap<String, String>) -> Self {
        self.config = config;
        self
    }

    pub fn set_config(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.config.insert(key.into(), value.into());
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reference name, defaulting to the plugin name.
    pub fn ref_name(&self) -> &str {
        self.ref_name.as_deref().unwrap_or(&self.name)
    }

    pub fn config(&self) -> &BTreeMap<String, String> {
        &self.config
    }

    pub fn has_config(&self) -> bool {
        !self.config.is_empty()
    }

    pub fn same_config(&self, other: &PluginSpec) -> bool {
        self.config == other.config
    }

    /// Whether this plugin plays the resolver role in a backend.
    pub fn is_resolver(&self) -> bool {
        self.ref_name() == "resolver" || self.name == "resolver"
    }
}

impl PartialEq for PluginSpec {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.ref_name() == other.ref_name()
    }
}

impl Eq for PluginSpec {}

impl Hash for PluginSpec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.ref_name().hash(state);
    }
}

impl fmt::Display for PluginSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ref_name {
            Some(ref_name) if ref_name != &self.name => write!(f, "{}#{}", self.name, ref_name),
            _ => write!(f, "{}", self.name),
        }
    }
}
