//! End-to-end tests of insert, remove and replace against real sources.

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;

use live_config::manager::Operation;
use live_config::source::FileSource;
use live_config::validation::{custom, ValidationError};
use live_config::{Error, Manager, Node, Source};

mod common;

#[test]
fn test_insert_end_to_end() {
    let m = common::manager(r#"{"items": [1, 2, 3]}"#);
    m.register_insert("/items", |_| Ok(())).unwrap();
    m.register_remove("/items", |_| Ok(())).unwrap();

    let version = m.insert("/items", 1, 99).unwrap();

    assert_eq!(version, 2);
    assert_eq!(m.version(), 2);
    assert_eq!(m.document().unwrap().to_value(), json!({"items": [1, 99, 2, 3]}));
    assert_eq!(m.source().config_object().as_ref(), &json!({"items": [1, 99, 2, 3]}));

    let id = m.locate("/items/1").unwrap();
    assert_eq!(m.node(id).unwrap(), Node::Integer(99));
    assert_eq!(m.path_of(id).unwrap(), "/items/1");
}

#[test]
fn test_paths_round_trip_after_changes() {
    let m = common::manager(r#"{"a": {"list": [{"x": 1}, {"x": 2}]}, "b": [true]}"#);
    m.register_insert("/a/list", |_| Ok(())).unwrap();
    m.insert("/a/list", 0, json!({"x": 0})).unwrap();

    for at in ["/", "/a", "/a/list", "/a/list/0", "/a/list/0/x", "/a/list/2/x", "/b/0"] {
        let id = m.locate(at).unwrap();
        assert_eq!(m.path_of(id).unwrap(), at);
    }
}

#[test]
fn test_insert_bounds() {
    let m = common::manager(r#"{"items": [1, 2]}"#);
    m.register_insert("/items", |_| Ok(())).unwrap();

    assert_eq!(m.insert("/items", 2, 3).unwrap(), 2);
    assert_eq!(m.get("/items").unwrap().to_value(), json!([1, 2, 3]));

    let err = m.insert("/items", 4, 5).unwrap_err();
    assert!(matches!(err, Error::IndexOutOfBounds { index: 4, len: 3 }));
    assert_eq!(m.version(), 2);
}

#[test]
fn test_unregistered_path_is_not_modifiable() {
    let m = common::manager(r#"{"items": [1], "name": "a"}"#);
    m.register_insert("/items", |_| Ok(())).unwrap();

    assert!(matches!(m.remove("/items", 0), Err(Error::NotModifiable { .. })));
    assert!(matches!(m.replace("/name", "b"), Err(Error::NotModifiable { .. })));
    assert_eq!(m.version(), 1);
}

#[test]
fn test_schema_failure_leaves_everything_untouched() {
    let schema = r#"{
        "type": "object",
        "properties": {"ports": {"type": "array", "items": {"type": "integer"}}}
    }"#;
    let m = common::manager_with_schema(r#"{"ports": [80, 443]}"#, schema);
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    m.register_insert("/ports", move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();
    let before = m.describe().unwrap();

    let err = m.insert("/ports", 0, "eighty").unwrap_err();

    assert!(matches!(err, Error::Validation(ValidationError::Schema(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(m.describe().unwrap(), before);
    assert_eq!(m.history().unwrap().len(), 0);
}

#[test]
fn test_custom_validator_rejects_before_handler() {
    let m = common::manager(r#"{"limit": 10}"#);
    m.register_replace("/limit", |_| Ok(())).unwrap();
    m.add_validator("/limit", custom::range(1.0, 100.0)).unwrap();

    assert_eq!(m.replace("/limit", 50).unwrap(), 2);
    let err = m.replace("/limit", 500).unwrap_err();
    assert!(matches!(err, Error::Validation(ValidationError::Custom { .. })));
    assert_eq!(m.get("/limit").unwrap(), Node::Integer(50));
}

#[test]
fn test_handler_veto_rolls_back_every_operation() {
    let m = common::manager(r#"{"items": [{"id": 1}, {"id": 2}], "mode": "fast"}"#);
    let veto = |_: &Node| -> Result<(), live_config::manager::BoxError> { Err("not today".into()) };
    m.register_insert("/items", veto).unwrap();
    m.register_remove("/items", veto).unwrap();
    m.register_replace("/mode", veto).unwrap();
    let before = m.document().unwrap();
    let item = m.locate("/items/1").unwrap();

    for result in [
        m.insert("/items", 1, json!({"id": 9})),
        m.remove("/items", 0),
        m.replace("/mode", "slow"),
    ] {
        match result {
            Err(Error::HandlerRejected { reason, .. }) => assert_eq!(reason, "not today"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    assert_eq!(m.version(), 1);
    assert_eq!(m.document().unwrap(), before);
    assert_eq!(m.source().config_object().as_ref(), &before.to_value());
    // A rolled-back removal splices the original node back in.
    assert_eq!(m.path_of(item).unwrap(), "/items/1");
}

#[test]
fn test_persistence_failure_rolls_back() {
    let source = Arc::new(common::FlakySource::new(json!({"tags": ["a"], "level": 1})));
    let m = Manager::new(source.clone()).unwrap();
    m.register_insert("/tags", |_| Ok(())).unwrap();
    m.register_replace("/level", |_| Ok(())).unwrap();

    source.fail_writes(true);
    assert!(matches!(m.insert("/tags", 1, "b"), Err(Error::PersistenceFailed(_))));
    assert!(matches!(m.replace("/level", 2), Err(Error::PersistenceFailed(_))));
    assert_eq!(m.version(), 1);
    assert_eq!(m.document().unwrap().to_value(), json!({"tags": ["a"], "level": 1}));

    source.fail_writes(false);
    assert_eq!(m.insert("/tags", 1, "b").unwrap(), 2);
    assert_eq!(source.config_object()["tags"], json!(["a", "b"]));
}

#[test]
fn test_registry_follows_removals() {
    let m = common::manager(r#"{"items": [{"v": 0}, {"v": 1}, {"v": 2}]}"#);
    m.register_remove("/items", |_| Ok(())).unwrap();
    for i in 0..3 {
        m.register_replace(&format!("/items/{}/v", i), |_| Ok(())).unwrap();
    }

    m.remove("/items", 0).unwrap();

    let paths = m.modifiable_paths().unwrap();
    assert_eq!(paths.replaceable, vec!["/items/0/v", "/items/1/v"]);
    assert_eq!(paths.removable, vec!["/items"]);

    m.replace("/items/0/v", 10).unwrap();
    assert_eq!(m.get("/items").unwrap().to_value(), json!([{"v": 10}, {"v": 2}]));
}

#[test]
fn test_change_feed_and_history() {
    let m = common::manager(r#"{"items": [1, 2, 3]}"#);
    m.register_insert("/items", |_| Ok(())).unwrap();
    m.register_remove("/items", |node| {
        if node == &Node::Integer(1) {
            Err("1 stays".into())
        } else {
            Ok(())
        }
    })
    .unwrap();
    let mut feed = m.subscribe();

    m.insert("/items", 1, 99).unwrap();
    assert!(m.remove("/items", 0).is_err());
    m.remove("/items", 2).unwrap();

    let first = feed.try_recv().unwrap();
    assert_eq!(first.operation, Operation::Insert);
    assert_eq!(first.path, "/items");
    assert_eq!(first.index, Some(1));
    assert_eq!(first.new_value, Some(Node::Integer(99)));
    assert_eq!(first.version, 2);

    let second = feed.try_recv().unwrap();
    assert_eq!(second.operation, Operation::Remove);
    assert_eq!(second.old_value, Some(Node::Integer(2)));
    assert_eq!(second.version, 3);
    assert!(feed.try_recv().is_err());

    let recent = m.recent_changes(10).unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(m.changes_at("/items", 1).unwrap()[0].version, 3);
}

#[test]
fn test_file_source_persists_and_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.json");
    fs::write(&path, r#"{"servers": ["a"], "timeout": 5}"#).unwrap();
    let schema = r#"{"properties": {"timeout": {"type": "integer", "minimum": 1}}}"#;

    let m = Manager::new(Arc::new(FileSource::new(&path, schema).unwrap())).unwrap();
    m.register_insert("/servers", |_| Ok(())).unwrap();
    m.register_replace("/timeout", |_| Ok(())).unwrap();

    m.insert("/servers", 1, "b").unwrap();
    let on_disk: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(on_disk, json!({"servers": ["a", "b"], "timeout": 5}));

    // Our own write is not a change.
    assert_eq!(m.reload().unwrap(), None);

    fs::write(&path, r#"{"servers": ["c"], "timeout": 7}"#).unwrap();
    assert_eq!(m.reload().unwrap(), Some(3));
    assert_eq!(m.get("/timeout").unwrap(), Node::Integer(7));

    // Bindings survive the rebuild by path.
    m.replace("/timeout", 9).unwrap();
    assert_eq!(m.get("/timeout").unwrap(), Node::Integer(9));

    // An edit that breaks the schema is refused and the last good document stays.
    fs::write(&path, r#"{"servers": [], "timeout": 0}"#).unwrap();
    assert!(matches!(m.reload(), Err(Error::Validation(_))));
    assert_eq!(m.get("/timeout").unwrap(), Node::Integer(9));
}
