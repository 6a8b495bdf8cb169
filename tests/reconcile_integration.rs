//! Integration tests for reconciling whole manifests against an in-memory
//! key database.

use kdb_state::backend::PluginCatalog;
use kdb_state::comment::CommentCodec;
use kdb_state::error::{Error, StoreError};
use kdb_state::reconcile::{apply, mount, ApplyOptions, Outcome};
use kdb_state::resource::parse;
use kdb_state::store::{Key, KeyStore, MemoryStore};

fn apply_yaml(store: &MemoryStore, yaml: &str) -> kdb_state::error::Result<kdb_state::reconcile::Report> {
    let manifest = parse(yaml)?;
    apply(&manifest, store, &PluginCatalog::builtin(), &ApplyOptions::default())
}

#[test]
fn test_create_update_and_remove_key() {
    let store = MemoryStore::new();

    let report = apply_yaml(&store, "- key:\n    name: /test/puppet/x1\n    value: hello\n").unwrap();
    assert_eq!(report.resources[0].outcome, Outcome::Created);
    let keys = store.snapshot().unwrap();
    assert_eq!(keys.lookup("user/test/puppet/x1").unwrap().value(), "hello");

    let report = apply_yaml(&store, "- key:\n    name: /test/puppet/x1\n    value: bye\n").unwrap();
    assert_eq!(report.resources[0].outcome, Outcome::Updated);
    assert_eq!(report.resources[0].changes, vec!["value"]);

    let report = apply_yaml(&store, "- key:\n    name: /test/puppet/x1\n    ensure: absent\n").unwrap();
    assert_eq!(report.resources[0].outcome, Outcome::Removed);
    assert!(store.snapshot().unwrap().lookup("user/test/puppet/x1").is_none());
}

#[test]
fn test_second_apply_commits_nothing() {
    let store = MemoryStore::new();
    let yaml = r#"
- key:
    name: user/test/puppet/port
    value: 8080
    metadata:
      owner: ops
    comments: |-
      port of the service
      change with care
    check:
      type: unsigned_short
- key:
    name: user/test/puppet/list
    value: [a, b, c]
"#;

    apply_yaml(&store, yaml).unwrap();
    let commits = store.commit_count().unwrap();
    assert_eq!(commits, 2);

    let again = apply_yaml(&store, yaml).unwrap();
    assert!(again.is_in_sync());
    assert_eq!(store.commit_count().unwrap(), commits);
    assert_eq!(store.open_sessions().unwrap(), 0);
}

#[test]
fn test_full_key_is_stored() {
    let store = MemoryStore::new();
    apply_yaml(
        &store,
        r#"
- key:
    name: user/test/puppet/port
    value: 8080
    metadata:
      owner: ops
    comments: |-
      first
      second
    check:
      type: unsigned_short
      range: 1-65535
"#,
    )
    .unwrap();

    let keys = store.snapshot().unwrap();
    let key = keys.lookup("user/test/puppet/port").unwrap();
    assert_eq!(key.value(), "8080");
    assert_eq!(key.get_meta("owner"), Some("ops"));
    assert_eq!(CommentCodec::for_key(key).read(key), "first\nsecond");

    let spec = keys.lookup("spec/test/puppet/port").unwrap();
    assert_eq!(spec.get_meta("check/type"), Some("unsigned_short"));
    assert_eq!(spec.get_meta("check/range"), Some("1-65535"));
}

#[test]
fn test_list_value_and_shrinking() {
    let store = MemoryStore::new();
    apply_yaml(&store, "- key:\n    name: user/test/list\n    value: [a, b, c]\n").unwrap();
    let keys = store.snapshot().unwrap();
    assert_eq!(keys.lookup("user/test/list/#2").unwrap().value(), "c");

    apply_yaml(&store, "- key:\n    name: user/test/list\n    value: [a]\n").unwrap();
    let keys = store.snapshot().unwrap();
    assert_eq!(keys.lookup("user/test/list/#0").unwrap().value(), "a");
    assert!(keys.lookup("user/test/list/#1").is_none());
    assert!(keys.lookup("user/test/list/#2").is_none());
}

#[test]
fn test_purge_keeps_internal_metadata() {
    let store = MemoryStore::with_keys(vec![Key::new("user/test/x")
        .with_value("v")
        .with_meta("stale", "1")
        .with_meta("internal/mtime", "42")])
    .unwrap();

    apply_yaml(
        &store,
        "- key:\n    name: user/test/x\n    metadata:\n      wanted: yes\n    purge_meta_keys: true\n",
    )
    .unwrap();

    let keys = store.snapshot().unwrap();
    let key = keys.lookup("user/test/x").unwrap();
    assert_eq!(key.get_meta("wanted"), Some("yes"));
    assert_eq!(key.get_meta("internal/mtime"), Some("42"));
    assert!(key.get_meta("stale").is_none());
}

#[test]
fn test_failed_commit_closes_the_session() {
    let store = MemoryStore::new();
    store
        .fail_next_set(StoreError::new("Sorry, could not write", "disk full"))
        .unwrap();

    let err = apply_yaml(&store, "- key:\n    name: user/test/x\n    value: v\n").unwrap_err();
    assert!(matches!(err, Error::Store(_)));
    assert!(err.to_string().contains("disk full"));
    assert_eq!(store.open_sessions().unwrap(), 0);
    assert!(store.snapshot().unwrap().is_empty());
}

#[test]
fn test_earlier_resources_stay_committed_after_failure() {
    let store = MemoryStore::new();
    let err = apply_yaml(
        &store,
        r#"
- mount:
    name: user/test/good
    file: good.ini
    plugins: ini
- mount:
    name: user/test/bad
    file: bad.xml
    plugins: [ini, nosuchplugin]
"#,
    )
    .unwrap_err();

    assert!(matches!(err, Error::Composition { .. }));
    let mounts = mount::list(&store).unwrap();
    assert_eq!(mounts.len(), 1);
    assert_eq!(mounts[0].mountpoint, "user/test/good");
    assert_eq!(store.open_sessions().unwrap(), 0);
}

#[test]
fn test_keys_are_written_as_requested_user() {
    let store = MemoryStore::new();
    apply_yaml(
        &store,
        "- key:\n    name: user/test/x\n    value: mine\n    user: alice\n",
    )
    .unwrap();

    assert_eq!(store.current_user().unwrap(), None);
    assert!(store.snapshot().unwrap().lookup("user/test/x").is_none());

    store.switch_user(Some("alice")).unwrap();
    let keys = store.snapshot().unwrap();
    assert_eq!(keys.lookup("user/test/x").unwrap().value(), "mine");
}

#[test]
fn test_mount_is_reconciled_before_its_keys() {
    let store = MemoryStore::new();
    let report = apply_yaml(
        &store,
        r#"
- key:
    name: system/hosts/ipv4/localhost
    value: 127.0.0.1
- mount:
    name: system/hosts
    file: /etc/hosts
    plugins: hosts
"#,
    )
    .unwrap();

    let order: Vec<&str> = report.resources.iter().map(|r| r.resource.as_str()).collect();
    assert_eq!(order, vec!["mount system/hosts", "key system/hosts/ipv4/localhost"]);

    let mounts = mount::list(&store).unwrap();
    assert_eq!(mounts[0].file, "/etc/hosts");
    assert!(mounts[0].plugins.iter().any(|plugin| plugin.name() == "hosts"));
    assert_eq!(
        store
            .snapshot()
            .unwrap()
            .lookup("system/hosts/ipv4/localhost")
            .unwrap()
            .value(),
        "127.0.0.1"
    );
}

#[test]
fn test_dry_run_reports_drift_without_writing() {
    let store = MemoryStore::with_keys(vec![Key::new("user/test/x").with_value("old")]).unwrap();
    let manifest = parse("- key:\n    name: user/test/x\n    value: new\n").unwrap();
    let options = ApplyOptions {
        dry_run: true,
        ..ApplyOptions::default()
    };

    let report = apply(&manifest, &store, &PluginCatalog::builtin(), &options).unwrap();
    assert!(report.dry_run);
    assert_eq!(report.changed().count(), 1);
    assert_eq!(store.commit_count().unwrap(), 0);
    assert_eq!(
        store.snapshot().unwrap().lookup("user/test/x").unwrap().value(),
        "old"
    );
}

#[test]
fn test_check_on_namespace_root_is_rejected() {
    let store = MemoryStore::new();
    let err = apply_yaml(&store, "- key:\n    name: user\n    check:\n      type: short\n").unwrap_err();

    assert!(err.is_validation());
    assert!(store.snapshot().unwrap().is_empty());
    assert_eq!(store.commit_count().unwrap(), 0);
}
