//! # Metadata Reconciliation
//!
//! Metadata entries on a key fall into three classes, derived purely from
//! their name:
//!
//! - **internal**: written by the key database itself (`internal/…` by
//!   default). Never shown, never touched.
//! - **reserved**: `order` and the comment entries (`comment…`). They are
//!   managed by dedicated codecs and only shown when explicitly requested.
//! - **user**: everything else.
//!
//! Applying a desired metadata map sets every desired entry. With purging
//! enabled, user entries that are not desired are removed as well; internal
//! and reserved entries always survive.
//!
//! Which names count as internal depends on the key database, so the
//! prefixes are configurable on [`MetaClassifier`].

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::store::Key;

/// Metadata entry holding an ordering hint.
pub const ORDER: &str = "order";

/// Default prefix of metadata written by the key database itself.
pub const INTERNAL_PREFIX: &str = "internal/";

/// Class of a metadata entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaClass {
    Internal,
    Reserved,
    User,
}

fn comment_array_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^comments?/#").expect("valid comment regex"))
}

/// Changes made by [`MetaClassifier::apply`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaDelta {
    /// Entries created or overwritten.
    pub set: Vec<String>,
    /// Entries removed by purging.
    pub removed: Vec<String>,
}

/// Classifies metadata entry names.
#[derive(Debug, Clone)]
pub struct MetaClassifier {
    internal_prefixes: Vec<String>,
}

impl Default for MetaClassifier {
    fn default() -> Self {
        Self {
            internal_prefixes: vec![INTERNAL_PREFIX.to_string()],
        }
    }
}

impl MetaClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different set of prefixes for internal entries.
    pub fn with_internal_prefixes<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            internal_prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_internal(&self, name: &str) -> bool {
        self.internal_prefixes
            .iter()
            .any(|prefix| name.starts_with(prefix.as_str()))
    }

    pub fn classify(&self, name: &str) -> MetaClass {
        if self.is_internal(name) {
            MetaClass::Internal
        } else if name == ORDER || name.starts_with("comment") {
            MetaClass::Reserved
        } else {
            MetaClass::User
        }
    }

    /// Internal or reserved.
    pub fn is_special(&self, name: &str) -> bool {
        self.classify(name) != MetaClass::User
    }

    /// Whether an entry is left out of the metadata reported as current
    /// state.
    ///
    /// Internal entries are always hidden. `order` and comment entries are
    /// hidden unless `keep_if_specified` is set and `desired` names them.
    pub fn should_hide(
        &self,
        name: &str,
        desired: &BTreeMap<String, String>,
        keep_if_specified: bool,
    ) -> bool {
        if self.is_internal(name) {
            return true;
        }
        let requested = keep_if_specified && desired.contains_key(name);
        !requested
            && (name == ORDER || name == "comments" || comment_array_regex().is_match(name))
    }

    /// Metadata of `key` as reported for comparison with `desired`.
    pub fn visible(
        &self,
        key: &Key,
        desired: &BTreeMap<String, String>,
        keep_if_specified: bool,
    ) -> BTreeMap<String, String> {
        key.meta()
            .filter(|(name, _)| !self.should_hide(name, desired, keep_if_specified))
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect()
    }

    /// Whether `key` already carries the desired metadata.
    ///
    /// Without purging, extra user entries are fine. With purging, the
    /// visible metadata must equal `desired` exactly.
    pub fn in_sync(&self, key: &Key, desired: &BTreeMap<String, String>, purge: bool) -> bool {
        let current = self.visible(key, desired, true);
        if purge {
            current == *desired
        } else {
            desired
                .iter()
                .all(|(name, value)| current.get(name) == Some(value))
        }
    }

    /// Write `desired` onto `key`, purging undesired user entries if asked.
    ///
    /// All desired entries are set before anything is removed, and nothing
    /// but non-desired user entries is ever removed.
    pub fn apply(&self, key: &mut Key, desired: &BTreeMap<String, String>, purge: bool) -> MetaDelta {
        let mut delta = MetaDelta::default();
        for (name, value) in desired {
            if key.get_meta(name) != Some(value.as_str()) {
                key.set_meta(name.as_str(), value.as_str());
                delta.set.push(name.clone());
            }
        }

        if purge {
            for name in key.meta_names() {
                if !desired.contains_key(&name) && !self.is_special(&name) {
                    key.del_meta(&name);
                    delta.removed.push(name);
                }
            }
        }
        delta
    }
}
