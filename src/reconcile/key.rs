//! Reconciling a single key resource.

use log::debug;

use super::{ApplyOptions, Outcome, ResourceReport};
use crate::array::{array_key_name, is_contiguous, split_array_name};
use crate::check::write_rules;
use crate::comment::CommentCodec;
use crate::error::Result;
use crate::keyname::{KeyName, Namespace};
use crate::meta::MetaClassifier;
use crate::resource::{Ensure, KeyResource, KeyValue};
use crate::store::{as_user, with_changes, Key, KeySet, KeyStore};

/// Bring one key in line with `resource`.
///
/// The session covers the cascading path of the key, which includes its
/// specification key, and runs as `resource.user` if set.
pub fn reconcile<S: KeyStore + ?Sized>(
    resource: &KeyResource,
    store: &S,
    options: &ApplyOptions,
) -> Result<ResourceReport> {
    let name = resource.key_name()?;
    let root = name.cascading();

    as_user(store, resource.user.as_deref(), || {
        with_changes(store, &root, options.dry_run, |keys| {
            let report = reconcile_keys(resource, &name, keys, &options.classifier)?;
            let changed = report.outcome != Outcome::Unchanged;
            Ok((report, changed))
        })
    })
}

/// Apply `resource` to the loaded `keys`.
pub fn reconcile_keys(
    resource: &KeyResource,
    name: &KeyName,
    keys: &mut KeySet,
    classifier: &MetaClassifier,
) -> Result<ResourceReport> {
    let mut report = ResourceReport::new(format!("key {}", name));
    let requested = name.to_string();
    let existing = keys.resolve(&requested);

    if resource.ensure == Ensure::Absent {
        if let Some(resolved) = existing {
            let removed = remove_array(keys, &resolved);
            keys.delete(&resolved);
            debug!("removed {} and {} array element(s)", resolved, removed);
            report.outcome = Outcome::Removed;
        }
        return Ok(report);
    }

    let target = match existing {
        Some(resolved) => resolved,
        None => {
            let created = if name.is_cascading() {
                name.in_namespace(Namespace::User).to_string()
            } else {
                requested
            };
            debug!("creating {}", created);
            keys.insert(Key::new(created.as_str()));
            report.outcome = Outcome::Created;
            created
        }
    };

    if let Some(value) = &resource.value {
        if write_value(keys, &target, value) {
            report.changes.push("value".to_string());
        }
    }

    if let Some(key) = keys.lookup_mut(&target) {
        if let Some(desired) = &resource.metadata {
            let delta = classifier.apply(key, desired, resource.purge_meta_keys);
            if !delta.set.is_empty() {
                report.changes.push(format!("metadata set: {}", delta.set.join(", ")));
            }
            if !delta.removed.is_empty() {
                report.changes.push(format!("metadata removed: {}", delta.removed.join(", ")));
            }
        }

        if let Some(comment) = &resource.comments {
            let codec = CommentCodec::for_key(key);
            if codec.read(key) != *comment {
                codec.write(key, comment);
                report.changes.push("comments".to_string());
            }
        }
    }

    if let Some(rule) = &resource.check {
        let spec_name = name.spec_key()?.to_string();
        if !keys.contains(&spec_name) {
            keys.insert(Key::new(spec_name.as_str()));
        }
        if let Some(spec_key) = keys.lookup_mut(&spec_name) {
            if write_rules(spec_key, rule) {
                report.changes.push(format!("check on {}", spec_name));
            }
        }
    }

    if report.outcome == Outcome::Unchanged && !report.changes.is_empty() {
        report.outcome = Outcome::Updated;
    }
    Ok(report)
}

/// Array elements directly below `base`, with their indices.
fn array_elements(keys: &KeySet, base: &str) -> Vec<(String, usize)> {
    let mut elements = Vec::new();
    for name in keys.names_below(base) {
        let index = match split_array_name(&name) {
            Some((parent, index)) if parent == base => index,
            _ => continue,
        };
        elements.push((name, index));
    }
    elements
}

fn remove_array(keys: &mut KeySet, base: &str) -> usize {
    let elements = array_elements(keys, base);
    for (name, _) in &elements {
        keys.delete(name);
    }
    elements.len()
}

/// Write a scalar value, or a list as array elements below `base`.
///
/// Returns whether anything changed.
fn write_value(keys: &mut KeySet, base: &str, value: &KeyValue) -> bool {
    match value {
        KeyValue::Scalar(value) => match keys.lookup_mut(base) {
            Some(key) if key.value() != value => {
                key.set_value(value.as_str());
                true
            }
            _ => false,
        },
        KeyValue::List(items) => {
            let mut changed = false;
            if let Some(key) = keys.lookup_mut(base) {
                if !key.value().is_empty() {
                    key.set_value("");
                    changed = true;
                }
            }

            for (index, item) in items.iter().enumerate() {
                let element = array_key_name(base, index);
                match keys.lookup_mut(&element) {
                    Some(key) if key.value() == item => {}
                    Some(key) => {
                        key.set_value(item.as_str());
                        changed = true;
                    }
                    None => {
                        keys.insert(Key::new(element).with_value(item.as_str()));
                        changed = true;
                    }
                }
            }

            for (element, index) in array_elements(keys, base) {
                if index >= items.len() {
                    debug!("removing dangling array element {}", element);
                    keys.delete(&element);
                    changed = true;
                }
            }
            debug_assert!(is_contiguous(
                &array_elements(keys, base).iter().map(|(_, index)| *index).collect::<Vec<_>>()
            ));
            changed
        }
    }
}
