//! # Manifest Schema and Parsing
//!
//! This module defines the desired-state manifest: a YAML list of
//! resources, each either a key or a mountpoint.
//!
//! ```yaml
//! - mount:
//!     name: system/hosts
//!     file: /etc/hosts
//!     plugins: hosts
//! - key:
//!     name: /app/settings/port
//!     value: 8080
//!     metadata:
//!       description: listening port
//!     comments: |-
//!       port the service binds to
//!     check:
//!       type: unsigned_short
//! - key:
//!     name: user/app/servers
//!     value: [alpha, beta]
//!     purge_meta_keys: true
//! ```
//!
//! ## Key Components
//!
//! - **`Manifest`**: a `Vec<Resource>`, reconciled in dependency order.
//! - **`Resource`**: `Key` or `Mount`, distinguished by the single map key of
//!   each list item.
//! - **`KeyResource`** / **`MountResource`**: the desired state of one
//!   resource.
//!
//! Loosely typed YAML (a number where a string is expected, a plugin list
//! mixing names and settings maps) is normalized here, once, so the
//! reconcilers only ever see the typed form. [`validate`] then rejects
//! inconsistent resources before any key database access.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value as Yaml;

use crate::backend::PluginSpec;
use crate::check::Rule;
use crate::error::{Error, Result};
use crate::keyname::{KeyName, Namespace};
use crate::suggestions::find_similar;

/// A scalar manifest value read as a string.
///
/// Accepts YAML strings, numbers and booleans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawScalar", into = "String")]
pub struct Scalar(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawScalar {
    Text(String),
    Integer(i64),
    Unsigned(u64),
    Float(f64),
    Boolean(bool),
}

impl From<RawScalar> for Scalar {
    fn from(raw: RawScalar) -> Self {
        Scalar(match raw {
            RawScalar::Text(text) => text,
            RawScalar::Integer(value) => value.to_string(),
            RawScalar::Unsigned(value) => value.to_string(),
            RawScalar::Float(value) => value.to_string(),
            RawScalar::Boolean(value) => value.to_string(),
        })
    }
}

impl From<Scalar> for String {
    fn from(scalar: Scalar) -> Self {
        scalar.0
    }
}

fn scalar_map<'de, D>(deserializer: D) -> std::result::Result<Option<BTreeMap<String, String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Scalar>> = Option::deserialize(deserializer)?;
    Ok(raw.map(|map| map.into_iter().map(|(k, v)| (k, v.into())).collect()))
}

/// Whether a resource should exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ensure {
    #[default]
    Present,
    Absent,
}

/// Desired value of a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged, from = "RawKeyValue")]
pub enum KeyValue {
    Scalar(String),
    /// Stored as array elements below the key.
    List(Vec<String>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawKeyValue {
    Scalar(Scalar),
    List(Vec<Scalar>),
}

impl From<RawKeyValue> for KeyValue {
    fn from(raw: RawKeyValue) -> Self {
        match raw {
            RawKeyValue::Scalar(value) => KeyValue::Scalar(value.into()),
            RawKeyValue::List(values) => KeyValue::List(values.into_iter().map(String::from).collect()),
        }
    }
}

/// Key resource configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyResource {
    /// Key name, cascading (`/app/x`) or namespaced (`user/app/x`).
    pub name: String,
    /// Prefix joined in front of `name`.
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub ensure: Ensure,
    #[serde(default)]
    pub value: Option<KeyValue>,
    #[serde(default, deserialize_with = "scalar_map")]
    pub metadata: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub comments: Option<String>,
    /// Validation rules, stored on the specification key.
    #[serde(default)]
    pub check: Option<Rule>,
    /// Remove metadata not listed in `metadata`.
    #[serde(default)]
    pub purge_meta_keys: bool,
    /// Identity to act as while reconciling.
    #[serde(default)]
    pub user: Option<String>,
}

impl KeyResource {
    /// A present key with nothing but a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: None,
            ensure: Ensure::Present,
            value: None,
            metadata: None,
            comments: None,
            check: None,
            purge_meta_keys: false,
            user: None,
        }
    }

    /// The full key name with the prefix applied.
    pub fn key_name(&self) -> Result<KeyName> {
        match self.prefix.as_deref() {
            Some(prefix) => KeyName::with_prefix(prefix, &self.name),
            None => KeyName::parse(&self.name),
        }
    }
}

/// Requested plugins of a mount, in order, with their settings.
///
/// Accepted forms:
///
/// ```yaml
/// plugins: ini
/// plugins: [ini, {delimiter: " "}, type]      # settings follow their plugin
/// plugins: {ini: {delimiter: " "}, type: ~}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "Yaml")]
pub struct PluginList(pub Vec<PluginSpec>);

fn settings_from_yaml(plugin: &str, value: &Yaml) -> Result<BTreeMap<String, String>> {
    let invalid = |message: String| Error::ConfigParse {
        message,
        hint: Some("plugin settings are a map of setting name to scalar value".to_string()),
    };
    let mapping = match value {
        Yaml::Null => return Ok(BTreeMap::new()),
        Yaml::Mapping(mapping) => mapping,
        _ => return Err(invalid(format!("settings of plugin '{}' must be a map", plugin))),
    };

    let mut settings = BTreeMap::new();
    for (name, value) in mapping {
        let name = name
            .as_str()
            .ok_or_else(|| invalid(format!("setting names of plugin '{}' must be strings", plugin)))?;
        let value = match value {
            Yaml::Null => String::new(),
            Yaml::String(text) => text.clone(),
            Yaml::Number(number) => number.to_string(),
            Yaml::Bool(flag) => flag.to_string(),
            _ => {
                return Err(invalid(format!(
                    "setting '{}' of plugin '{}' must be a scalar",
                    name, plugin
                )))
            }
        };
        settings.insert(name.to_string(), value);
    }
    Ok(settings)
}

impl TryFrom<Yaml> for PluginList {
    type Error = Error;

    fn try_from(value: Yaml) -> Result<Self> {
        let mut plugins: Vec<PluginSpec> = Vec::new();
        match value {
            Yaml::Null => {}
            Yaml::String(name) => plugins.push(PluginSpec::parse(&name)?),
            Yaml::Sequence(items) => {
                let mut configured = false;
                for item in items {
                    match item {
                        Yaml::String(name) => {
                            plugins.push(PluginSpec::parse(&name)?);
                            configured = false;
                        }
                        settings @ Yaml::Mapping(_) => {
                            if configured {
                                return Err(Error::ConfigParse {
                                    message: format!(
                                        "plugin '{}' is followed by more than one settings map",
                                        plugins.last().map(|p| p.to_string()).unwrap_or_default()
                                    ),
                                    hint: Some("put all settings of a plugin into one map".to_string()),
                                });
                            }
                            let Some(previous) = plugins.pop() else {
                                return Err(Error::ConfigParse {
                                    message: "plugin settings given before any plugin name"
                                        .to_string(),
                                    hint: Some("list the plugin name first, then its settings".to_string()),
                                });
                            };
                            let config = settings_from_yaml(previous.name(), &settings)?;
                            plugins.push(previous.with_config(config));
                            configured = true;
                        }
                        _ => {
                            return Err(Error::ConfigParse {
                                message: "plugins must be names or settings maps".to_string(),
                                hint: None,
                            })
                        }
                    }
                }
            }
            Yaml::Mapping(mapping) => {
                for (name, settings) in mapping {
                    let name = name.as_str().ok_or_else(|| Error::ConfigParse {
                        message: "plugin names must be strings".to_string(),
                        hint: None,
                    })?;
                    let config = settings_from_yaml(name, &settings)?;
                    plugins.push(PluginSpec::parse(name)?.with_config(config));
                }
            }
            _ => {
                return Err(Error::ConfigParse {
                    message: "plugins must be a name, a list or a map".to_string(),
                    hint: None,
                })
            }
        }

        let mut seen = BTreeSet::new();
        for plugin in &plugins {
            if !seen.insert(plugin.to_string()) {
                return Err(Error::ConfigParse {
                    message: format!("plugin '{}' is listed more than once", plugin),
                    hint: Some("use name#ref to mount the same plugin twice".to_string()),
                });
            }
        }
        Ok(PluginList(plugins))
    }
}

pub fn default_resolver() -> String {
    "resolver".to_string()
}

fn default_true() -> bool {
    true
}

/// Mount resource configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MountResource {
    /// Mountpoint, e.g. `system/hosts` or `/app`.
    pub name: String,
    #[serde(default)]
    pub ensure: Ensure,
    /// File to mount.
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub plugins: Option<PluginList>,
    #[serde(default = "default_resolver")]
    pub resolver: String,
    #[serde(default = "default_true")]
    pub add_recommended_plugins: bool,
}

impl MountResource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ensure: Ensure::Present,
            file: None,
            plugins: None,
            resolver: default_resolver(),
            add_recommended_plugins: true,
        }
    }

    pub fn plugins(&self) -> &[PluginSpec] {
        self.plugins.as_ref().map(|list| list.0.as_slice()).unwrap_or_default()
    }
}

/// All resource types of a manifest
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Resource {
    /// A single key with value, metadata, comment and validation rules.
    Key { key: KeyResource },
    /// A backend mounting a file into the key database.
    Mount { mount: MountResource },
}

impl Resource {
    /// Human readable identifier, e.g. `key user/app/x`.
    pub fn describe(&self) -> String {
        match self {
            Resource::Key { key } => format!("key {}", key.name),
            Resource::Mount { mount } => format!("mount {}", mount.name),
        }
    }
}

/// The complete manifest, in declaration order.
pub type Manifest = Vec<Resource>;

const RESOURCE_TYPES: [&str; 2] = ["key", "mount"];

/// Parse a manifest from YAML.
///
/// When the manifest does not match the schema, each item is examined on
/// its own so the error names the offending item and field.
pub fn parse(yaml_content: &str) -> Result<Manifest> {
    if yaml_content.trim().is_empty() {
        return Ok(Vec::new());
    }
    match serde_yaml::from_str::<Option<Manifest>>(yaml_content) {
        Ok(manifest) => Ok(manifest.unwrap_or_default()),
        Err(_) => parse_items(yaml_content),
    }
}

fn parse_items(yaml_content: &str) -> Result<Manifest> {
    let items: Vec<Yaml> = serde_yaml::from_str(yaml_content).map_err(|e| Error::ConfigParse {
        message: e.to_string(),
        hint: Some("the manifest is a list of '- key:' and '- mount:' items".to_string()),
    })?;

    let mut manifest = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let position = index + 1;
        let Yaml::Mapping(mapping) = item else {
            return Err(Error::ConfigParse {
                message: format!("item {} is not a mapping", position),
                hint: Some("start each item with 'key:' or 'mount:'".to_string()),
            });
        };
        if mapping.len() != 1 {
            return Err(Error::ConfigParse {
                message: format!("item {} must have exactly one resource type", position),
                hint: Some("indent the resource attributes below 'key:' or 'mount:'".to_string()),
            });
        }
        let Some((kind, body)) = mapping.into_iter().next() else {
            continue;
        };
        let kind = kind.as_str().unwrap_or_default().to_string();
        let in_item = |e: serde_yaml::Error| Error::ConfigParse {
            message: format!("item {} ({}): {}", position, kind, e),
            hint: None,
        };
        let resource = match kind.as_str() {
            "key" => Resource::Key {
                key: serde_yaml::from_value(body).map_err(in_item)?,
            },
            "mount" => Resource::Mount {
                mount: serde_yaml::from_value(body).map_err(in_item)?,
            },
            other => {
                let hint = find_similar(other, &RESOURCE_TYPES)
                    .map(|s| format!("did you mean '{}'?", s))
                    .unwrap_or_else(|| format!("valid resource types are: {}", RESOURCE_TYPES.join(", ")));
                return Err(Error::ConfigParse {
                    message: format!("item {}: unknown resource type '{}'", position, other),
                    hint: Some(hint),
                });
            }
        };
        manifest.push(resource);
    }
    Ok(manifest)
}

/// Parse a manifest from a YAML file path
pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Manifest> {
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    parse(&content)
}

fn invalid(resource: &Resource, message: impl Into<String>) -> Error {
    Error::Validation {
        resource: resource.describe(),
        message: message.into(),
    }
}

/// Check every resource of `manifest`, without touching any key database.
pub fn validate(manifest: &Manifest) -> Result<()> {
    let mut keys = BTreeSet::new();
    let mut mounts = BTreeSet::new();

    for resource in manifest {
        match resource {
            Resource::Key { key } => {
                let name = key.key_name()?;
                if key.check.is_some() {
                    if name.namespace() == Namespace::Spec {
                        return Err(invalid(resource, "'check' is not allowed on keys in the spec namespace"));
                    }
                    if name.spec_key().is_err() {
                        return Err(invalid(resource, "'check' needs a key below a namespace root"));
                    }
                }
                if matches!(key.user.as_deref(), Some("")) {
                    return Err(invalid(resource, "'user' must not be empty"));
                }
                if !keys.insert(name.to_string()) {
                    return Err(invalid(resource, "key is declared more than once"));
                }
            }
            Resource::Mount { mount } => {
                KeyName::parse_mountpoint(&mount.name)?;
                PluginSpec::parse(&mount.resolver)?;
                if mount.ensure == Ensure::Present {
                    match mount.file.as_deref() {
                        None | Some("") => return Err(invalid(resource, "'file' is required")),
                        Some(_) if mount.plugins().is_empty() => {
                            return Err(invalid(resource, "'plugins' is required when 'file' is set"))
                        }
                        Some(_) => {}
                    }
                }
                if !mounts.insert(mount.name.clone()) {
                    return Err(invalid(resource, "mountpoint is declared more than once"));
                }
            }
        }
    }
    Ok(())
}
