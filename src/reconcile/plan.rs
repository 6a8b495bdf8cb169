//! Ordering the resources of a manifest.
//!
//! Keys stored in a mounted file can only be written once the file is
//! mounted, and should be removed before their file is unmounted. The plan
//! therefore runs, in declaration order within each group:
//!
//! 1.  **Keys below an absent mount**: removed while the backend still exists.
//! 2.  **Mounts**: composed, updated or unmounted.
//! 3.  **All other keys**.
//!
//! A key depends on a mount when the mountpoint is one of the key's
//! mountpoint candidates, or when the key lies below a cascading mountpoint.

use crate::error::Result;
use crate::keyname::{is_below_or_same, KeyName};
use crate::resource::{Ensure, Manifest, Resource};

/// One step of a [`Plan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Index of the resource in the manifest.
    pub index: usize,
    /// Mountpoints of manifest mounts this resource depends on.
    pub depends_on: Vec<String>,
}

/// Order in which the resources of a manifest are reconciled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub steps: Vec<Step>,
}

impl Plan {
    /// Manifest indices in execution order.
    pub fn order(&self) -> Vec<usize> {
        self.steps.iter().map(|step| step.index).collect()
    }
}

fn covers(key: &KeyName, candidates: &[String], mountpoint: &str) -> bool {
    let mountpoint = match KeyName::parse_mountpoint(mountpoint) {
        Ok(name) => name.to_string(),
        Err(_) => return false,
    };
    candidates.iter().any(|candidate| *candidate == mountpoint)
        || is_below_or_same(&key.to_string(), &mountpoint)
}

/// Build the plan for a validated manifest.
pub fn build(manifest: &Manifest) -> Result<Plan> {
    let mounts: Vec<(&str, Ensure)> = manifest
        .iter()
        .filter_map(|resource| match resource {
            Resource::Mount { mount } => Some((mount.name.as_str(), mount.ensure)),
            Resource::Key { .. } => None,
        })
        .collect();

    let mut before_mounts = Vec::new();
    let mut mount_steps = Vec::new();
    let mut after_mounts = Vec::new();

    for (index, resource) in manifest.iter().enumerate() {
        match resource {
            Resource::Mount { .. } => mount_steps.push(Step {
                index,
                depends_on: Vec::new(),
            }),
            Resource::Key { key } => {
                let name = key.key_name()?;
                let candidates = name.mountpoint_candidates();
                let dependencies: Vec<(&str, Ensure)> = mounts
                    .iter()
                    .filter(|(mountpoint, _)| covers(&name, &candidates, mountpoint))
                    .copied()
                    .collect();
                let unmounting = dependencies
                    .iter()
                    .any(|(_, ensure)| *ensure == Ensure::Absent);
                let step = Step {
                    index,
                    depends_on: dependencies
                        .iter()
                        .map(|(mountpoint, _)| mountpoint.to_string())
                        .collect(),
                };
                if unmounting {
                    before_mounts.push(step);
                } else {
                    after_mounts.push(step);
                }
            }
        }
    }

    let mut steps = before_mounts;
    steps.extend(mount_steps);
    steps.extend(after_mounts);
    Ok(Plan { steps })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::parse;

    #[test]
    fn test_mounts_run_before_their_keys() {
        let manifest = parse(
            r#"
- key:
    name: user/app/x
- key:
    name: system/other
- mount:
    name: user/app
    file: app.ini
    plugins: ini
"#,
        )
        .unwrap();
        let plan = build(&manifest).unwrap();
        assert_eq!(plan.order(), vec![2, 0, 1]);
        assert_eq!(plan.steps[1].depends_on, vec!["user/app"]);
        assert!(plan.steps[2].depends_on.is_empty());
    }

    #[test]
    fn test_keys_below_absent_mount_run_first() {
        let manifest = parse(
            r#"
- mount:
    name: system/hosts
    ensure: absent
- key:
    name: /hosts/ipv4/localhost
    ensure: absent
"#,
        )
        .unwrap();
        let plan = build(&manifest).unwrap();
        assert_eq!(plan.order(), vec![1, 0]);
    }

    #[test]
    fn test_cascading_mount_covers_namespaced_keys() {
        let manifest = parse(
            r#"
- key:
    name: system/app/x
- mount:
    name: /app
    file: app.ini
    plugins: ini
"#,
        )
        .unwrap();
        let plan = build(&manifest).unwrap();
        assert_eq!(plan.order(), vec![1, 0]);
        assert_eq!(plan.steps[1].depends_on, vec!["/app"]);
    }

    #[test]
    fn test_declaration_order_is_kept_within_groups() {
        let manifest = parse(
            r#"
- key:
    name: user/b
- key:
    name: user/a
"#,
        )
        .unwrap();
        assert_eq!(build(&manifest).unwrap().order(), vec![0, 1]);
    }
}
