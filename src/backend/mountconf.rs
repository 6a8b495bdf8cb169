//! Reading and writing the mount configuration subtree.
//!
//! Every mounted backend lives below
//! `system/elektra/mountpoints/<escaped mountpoint>`:
//!
//! ```text
//! …/mountpoint                          = user/test/puppet
//! …/config/path                         = /etc/app.ini
//! …/getplugins/#0#resolver#resolver#    (plugin definition)
//! …/getplugins/#1#ini#ini#/config/delimiter = " "
//! …/setplugins/#0#resolver              (reference to a definition)
//! …/errorplugins/#0#resolver
//! ```
//!
//! A definition is named `#<position>#<plugin>#<ref>#`, a reference
//! `#<position>#<ref>`. Plugin settings live below a definition's `config`.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use super::plugin::PluginSpec;
use crate::error::{Error, Result};
use crate::keyname::{escape_segment, split_segments, unescape_segment};
use crate::store::{Key, KeySet};

/// Root of all mounted backends.
pub const MOUNTPOINTS_ROOT: &str = "system/elektra/mountpoints";

const PLUGIN_SECTIONS: [&str; 3] = ["getplugins", "setplugins", "errorplugins"];

fn plugin_entry_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^#([0-9]+)#(\w+)(#(\w+)#)?$").expect("valid plugin entry regex"))
}

/// A backend as found in the mount configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MountInfo {
    pub mountpoint: String,
    pub file: String,
    /// The plugin in the resolver role, if any.
    pub resolver: Option<PluginSpec>,
    /// All other plugins in chain order, with their settings.
    pub plugins: Vec<PluginSpec>,
}

/// Name of the mount configuration root of `mountpoint`.
pub fn backend_root(mountpoint: &str) -> String {
    format!("{}/{}", MOUNTPOINTS_ROOT, escape_segment(mountpoint))
}

pub fn is_mounted(mountconf: &KeySet, mountpoint: &str) -> bool {
    mountconf.contains(&backend_root(mountpoint))
}

/// Write a complete backend definition for `mountpoint`.
///
/// `chain` is written in order; the first plugin in the resolver role is
/// also registered as error plugin.
pub fn write_backend(mountconf: &mut KeySet, mountpoint: &str, file: &str, chain: &[PluginSpec]) {
    let root = backend_root(mountpoint);
    mountconf.insert(Key::new(root.as_str()));
    mountconf.insert(Key::new(format!("{}/mountpoint", root)).with_value(mountpoint));
    mountconf.insert(Key::new(format!("{}/config", root)));
    mountconf.insert(Key::new(format!("{}/config/path", root)).with_value(file));
    for section in PLUGIN_SECTIONS {
        mountconf.insert(Key::new(format!("{}/{}", root, section)));
    }

    let mut resolver_written = false;
    for (position, plugin) in chain.iter().enumerate() {
        let definition = format!(
            "{}/getplugins/#{}#{}#{}#",
            root,
            position,
            plugin.name(),
            plugin.ref_name()
        );
        mountconf.insert(Key::new(definition.as_str()));
        for (name, value) in plugin.config() {
            mountconf.insert(Key::new(format!("{}/config", definition)));
            mountconf.insert(
                Key::new(format!("{}/config/{}", definition, escape_segment(name)))
                    .with_value(value.as_str()),
            );
        }

        let reference = format!("#{}#{}", position, plugin.ref_name());
        mountconf.insert(Key::new(format!("{}/setplugins/{}", root, reference)));
        if plugin.is_resolver() && !resolver_written {
            mountconf.insert(Key::new(format!("{}/errorplugins/{}", root, reference)));
            resolver_written = true;
        }
    }
}

/// Remove the backend of `mountpoint`. Returns whether it was mounted.
pub fn unmount(mountconf: &mut KeySet, mountpoint: &str) -> bool {
    !mountconf.cut(&backend_root(mountpoint)).is_empty()
}

/// Point the backend of `mountpoint` at another file.
pub fn set_file(mountconf: &mut KeySet, mountpoint: &str, file: &str) -> Result<()> {
    let path = format!("{}/config/path", backend_root(mountpoint));
    match mountconf.lookup_mut(&path) {
        Some(key) => {
            key.set_value(file);
            Ok(())
        }
        None => Err(Error::Composition {
            mountpoint: mountpoint.to_string(),
            message: "path key not found in backend config".to_string(),
        }),
    }
}

/// Read the backend of `mountpoint`, if mounted.
pub fn read_backend(mountconf: &KeySet, mountpoint: &str) -> Option<MountInfo> {
    let root = backend_root(mountpoint);
    mountconf.lookup(&root)?;

    let file = mountconf
        .lookup(&format!("{}/config/path", root))
        .map(|key| key.value().to_string())
        .unwrap_or_default();
    let mountpoint = mountconf
        .lookup(&format!("{}/mountpoint", root))
        .map(|key| key.value().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| mountpoint.to_string());

    let mut definitions: BTreeMap<String, (usize, PluginSpec)> = BTreeMap::new();
    let mut configs: Vec<(String, String, String)> = Vec::new();
    let prefix_len = root.len() + 1;

    for key in mountconf.below(&root) {
        let Some(relative) = key.name().get(prefix_len..) else {
            continue;
        };
        let segments = split_segments(relative);
        if segments.len() < 2 || !PLUGIN_SECTIONS.contains(&segments[0]) {
            continue;
        }
        let entry = segments[1];
        match segments.len() {
            2 => {
                if let Some(spec) = parse_definition(entry) {
                    definitions.entry(entry.to_string()).or_insert(spec);
                }
            }
            4 if segments[2] == "config" => {
                configs.push((
                    entry.to_string(),
                    unescape_segment(segments[3]),
                    key.value().to_string(),
                ));
            }
            _ => {}
        }
    }

    for (entry, name, value) in configs {
        if let Some((_, spec)) = definitions.get_mut(&entry) {
            spec.set_config(name, value);
        }
    }

    let mut chain: Vec<(usize, PluginSpec)> = Vec::new();
    for (_, (position, spec)) in definitions {
        if !chain.iter().any(|(_, existing)| *existing == spec) {
            chain.push((position, spec));
        }
    }
    chain.sort_by_key(|(position, _)| *position);

    let mut resolver = None;
    let mut plugins = Vec::new();
    for (_, spec) in chain {
        if spec.is_resolver() && resolver.is_none() {
            resolver = Some(spec);
        } else {
            plugins.push(spec);
        }
    }

    Some(MountInfo {
        mountpoint,
        file,
        resolver,
        plugins,
    })
}

fn parse_definition(entry: &str) -> Option<(usize, PluginSpec)> {
    let caps = plugin_entry_regex().captures(entry)?;
    let ref_name = caps.get(4)?.as_str();
    let position = caps[1].parse().ok()?;
    let mut spec = PluginSpec::named(&caps[2]);
    if ref_name != &caps[2] {
        spec = spec.with_ref(ref_name);
    }
    Some((position, spec))
}

/// Every backend in the mount configuration, ordered by mountpoint.
pub fn active_mounts(mountconf: &KeySet) -> Vec<MountInfo> {
    let depth = split_segments(MOUNTPOINTS_ROOT).len() + 1;
    let mut mounts: Vec<MountInfo> = mountconf
        .below(MOUNTPOINTS_ROOT)
        .filter(|key| split_segments(key.name()).len() == depth)
        .filter_map(|key| {
            let escaped = split_segments(key.name()).last().copied().unwrap_or_default();
            read_backend(mountconf, &unescape_segment(escaped))
        })
        .collect();
    mounts.sort_by(|a, b| a.mountpoint.cmp(&b.mountpoint));
    mounts
}
