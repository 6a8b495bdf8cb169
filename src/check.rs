//! Validation rules stored on the specification key.
//!
//! A rule set is written as `check/<rule>` metadata on the key's
//! specification key (see [`crate::keyname::spec_key_name`]):
//!
//! ```text
//! check/type       = short
//! check/enum       = #2          (element counter)
//! check/enum/#0    = one
//! check/enum/#1    = two
//! check/enum/#2    = three
//! ```
//!
//! A rule without parameters, such as a presence-only `path` check, is stored
//! as `check/path` with an empty value and read back as a bare rule name.
//!
//! The `check/` entries of a specification key belong entirely to this
//! module: writing a rule set removes every `check/` entry not part of it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::array::{array_suffix, split_array_name};
use crate::resource::Scalar;
use crate::store::Key;

/// Metadata prefix of validation rules.
pub const CHECK_PREFIX: &str = "check/";

/// Desired validation rules of a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Rule {
    /// A single rule without parameters, e.g. `path`.
    Scalar(String),
    /// Rules with parameters, e.g. `{type: short}` or `{enum: [a, b]}`.
    Parametrized(BTreeMap<String, RuleValue>),
}

/// Parameter of a validation rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged, from = "RawRuleValue")]
pub enum RuleValue {
    Single(String),
    List(Vec<String>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRuleValue {
    Single(Scalar),
    List(Vec<Scalar>),
}

impl From<RawRuleValue> for RuleValue {
    fn from(raw: RawRuleValue) -> Self {
        match raw {
            RawRuleValue::Single(value) => RuleValue::Single(value.into()),
            RawRuleValue::List(values) => {
                RuleValue::List(values.into_iter().map(String::from).collect())
            }
        }
    }
}

impl Rule {
    /// The rule set as a map; a bare rule name maps to an empty parameter.
    pub fn to_map(&self) -> BTreeMap<String, RuleValue> {
        match self {
            Rule::Scalar(name) => {
                BTreeMap::from([(name.clone(), RuleValue::Single(String::new()))])
            }
            Rule::Parametrized(map) => map.clone(),
        }
    }

    /// Whether two rule sets store identically.
    pub fn equivalent(&self, other: &Rule) -> bool {
        self.to_map() == other.to_map()
    }
}

/// Metadata entries (name → value) that store `rule`.
pub fn rule_entries(rule: &Rule) -> BTreeMap<String, String> {
    let mut entries = BTreeMap::new();
    for (name, value) in rule.to_map() {
        let base = format!("{}{}", CHECK_PREFIX, name);
        match value {
            RuleValue::Single(value) => {
                entries.insert(base, value);
            }
            RuleValue::List(values) => {
                if values.is_empty() {
                    continue;
                }
                for (index, value) in values.iter().enumerate() {
                    entries.insert(format!("{}/{}", base, array_suffix(index)), value.clone());
                }
                entries.insert(base, array_suffix(values.len() - 1));
            }
        }
    }
    entries
}

/// Read the validation rules stored on `spec_key`.
///
/// Returns `None` when the key carries no `check/` metadata.
pub fn read_rules(spec_key: &Key) -> Option<Rule> {
    let mut scalars: BTreeMap<String, String> = BTreeMap::new();
    let mut lists: BTreeMap<String, BTreeMap<usize, String>> = BTreeMap::new();

    for (name, value) in spec_key.meta() {
        let Some(rest) = name.strip_prefix(CHECK_PREFIX) else {
            continue;
        };
        match split_array_name(rest) {
            Some((rule, index)) => {
                lists
                    .entry(rule.to_string())
                    .or_default()
                    .insert(index, value.to_string());
            }
            None => {
                scalars.insert(rest.to_string(), value.to_string());
            }
        }
    }

    let mut rules: BTreeMap<String, RuleValue> = scalars
        .into_iter()
        // a list's element counter is superseded by the list itself
        .filter(|(name, _)| !lists.contains_key(name))
        .map(|(name, value)| (name, RuleValue::Single(value)))
        .collect();
    for (name, elements) in lists {
        rules.insert(name, RuleValue::List(elements.into_values().collect()));
    }

    if rules.is_empty() {
        return None;
    }
    if rules.len() == 1 {
        if let Some((name, RuleValue::Single(value))) = rules.iter().next() {
            if value.is_empty() {
                return Some(Rule::Scalar(name.clone()));
            }
        }
    }
    Some(Rule::Parametrized(rules))
}

/// Store `rule` on `spec_key`, replacing every previous `check/` entry.
///
/// Returns whether anything changed.
pub fn write_rules(spec_key: &mut Key, rule: &Rule) -> bool {
    let entries = rule_entries(rule);
    let mut changed = false;

    for (name, value) in &entries {
        if spec_key.get_meta(name) != Some(value.as_str()) {
            spec_key.set_meta(name.as_str(), value.as_str());
            changed = true;
        }
    }
    for name in spec_key.meta_names() {
        if name.starts_with(CHECK_PREFIX) && !entries.contains_key(&name) {
            spec_key.del_meta(&name);
            changed = true;
        }
    }
    changed
}

/// Whether `spec_key` already stores `rule`.
pub fn rules_in_sync(spec_key: &Key, rule: &Rule) -> bool {
    read_rules(spec_key).is_some_and(|current| current.equivalent(rule))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(rule: Rule) {
        let mut key = Key::new("spec/test/x1");
        write_rules(&mut key, &rule);
        assert_eq!(read_rules(&key), Some(rule));
    }

    #[test]
    fn test_round_trip_bare_rule() {
        round_trip(Rule::Scalar("path".to_string()));
    }

    #[test]
    fn test_round_trip_scalar_map() {
        round_trip(Rule::Parametrized(BTreeMap::from([(
            "type".to_string(),
            RuleValue::Single("short".to_string()),
        )])));
    }

    #[test]
    fn test_round_trip_list_rule() {
        round_trip(Rule::Parametrized(BTreeMap::from([(
            "enum".to_string(),
            RuleValue::List(vec!["one".into(), "two".into(), "three".into()]),
        )])));
    }

    #[test]
    fn test_list_rule_layout() {
        let mut key = Key::new("spec/test/x1");
        let rule: Rule = serde_yaml::from_str("enum: [one, two, three]").unwrap();
        write_rules(&mut key, &rule);
        assert_eq!(key.get_meta("check/enum"), Some("#2"));
        assert_eq!(key.get_meta("check/enum/#0"), Some("one"));
        assert_eq!(key.get_meta("check/enum/#2"), Some("three"));
    }

    #[test]
    fn test_write_removes_stale_rules() {
        let mut key = Key::new("spec/test/x1")
            .with_meta("check/range", "0-10")
            .with_meta("check/enum", "#1")
            .with_meta("check/enum/#0", "a")
            .with_meta("check/enum/#1", "b")
            .with_meta("description", "kept");

        let changed = write_rules(&mut key, &Rule::Scalar("path".to_string()));
        assert!(changed);
        assert_eq!(key.meta_names(), vec!["check/path", "description"]);
        assert!(!write_rules(&mut key, &Rule::Scalar("path".to_string())));
    }

    #[test]
    fn test_deserialize_coerces_scalars() {
        let rule: Rule = serde_yaml::from_str("{type: short, range: 10, required: true}").unwrap();
        let map = rule.to_map();
        assert_eq!(map["range"], RuleValue::Single("10".to_string()));
        assert_eq!(map["required"], RuleValue::Single("true".to_string()));

        let bare: Rule = serde_yaml::from_str("path").unwrap();
        assert_eq!(bare, Rule::Scalar("path".to_string()));
    }

    #[test]
    fn test_equivalence_of_bare_and_empty_map() {
        let bare = Rule::Scalar("path".to_string());
        let map = Rule::Parametrized(BTreeMap::from([(
            "path".to_string(),
            RuleValue::Single(String::new()),
        )]));
        assert!(bare.equivalent(&map));

        let mut key = Key::new("spec/x");
        write_rules(&mut key, &map);
        assert!(rules_in_sync(&key, &bare));
    }

    #[test]
    fn test_no_check_metadata() {
        let key = Key::new("spec/x").with_meta("description", "nothing to check");
        assert_eq!(read_rules(&key), None);
    }
}
