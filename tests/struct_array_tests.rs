mod common;

use datatree::{
    DataTreeError, Entry, EntryKey, NodeMetadata, StructArray, UpdateOp,
};
use serde_json::{json, Value};

#[test]
fn find_or_create_synthesizes_exactly_once() {
    let aos = StructArray::new(NodeMetadata::default());

    let first = aos.find_or_create("A").unwrap();
    assert_eq!(first.get("@id", Value::Null).unwrap(), json!("A"));
    assert_eq!(aos.len().unwrap(), 1);

    let second = aos.find_or_create("A").unwrap();
    assert_eq!(second.get("@id", Value::Null).unwrap(), json!("A"));
    assert_eq!(aos.len().unwrap(), 1);
}

#[test]
fn find_is_read_only() {
    let aos = StructArray::new(NodeMetadata::default());
    assert!(aos.find("A").unwrap().is_none());
    assert_eq!(aos.len().unwrap(), 0);
}

#[test]
fn sync_prevents_duplicating_backing_identifiers() {
    let backing = Entry::from_value(json!([
        {"@id": "pf1", "turns": 140, "resistance": 0.02},
        {"@id": "pf2", "turns": 120}
    ]));
    let aos = StructArray::from_entry(backing, NodeMetadata::default());

    // the identifier already exists in the backing store: found, not added
    let pf2 = aos.find_or_create("pf2").unwrap();
    assert_eq!(aos.len().unwrap(), 2);

    // the sync seeded a skeleton; values keep resolving through backing
    assert_eq!(pf2.get("turns", Value::Null).unwrap(), json!(120));

    // writes land in the element's cache slice and shadow the backing
    pf2.update(
        Some(datatree::PathSegment::from("turns")),
        json!(121),
        UpdateOp::Replace,
    )
    .unwrap();
    assert_eq!(pf2.get("turns", Value::Null).unwrap(), json!(121));
}

#[test]
fn extend_always_appends_replace_requires_identifier() {
    let aos = StructArray::new(NodeMetadata::default());

    aos.update(None, json!({"value": 1}), UpdateOp::Extend).unwrap();
    aos.update(None, json!({"value": 2}), UpdateOp::Extend).unwrap();
    assert_eq!(aos.len().unwrap(), 2);

    let err = aos
        .update(None, json!({"value": 3}), UpdateOp::Replace)
        .unwrap_err();
    assert!(matches!(err, DataTreeError::MissingIdentifier(_)));

    // a value carrying the tag needs no explicit key
    aos.update(None, json!({"@id": "tagged", "value": 4}), UpdateOp::Replace)
        .unwrap();
    assert!(aos.find("tagged").unwrap().is_some());
}

#[test]
fn merge_and_remove_by_identifier() {
    let aos = StructArray::new(NodeMetadata::default());
    aos.find_or_create("probe").unwrap();

    aos.update(Some("probe"), json!({"gain": 2.5}), UpdateOp::Merge)
        .unwrap();
    let probe = aos.find("probe").unwrap().unwrap();
    assert_eq!(probe.get("gain", Value::Null).unwrap(), json!(2.5));

    aos.update(Some("probe"), Value::Null, UpdateOp::Remove).unwrap();
    assert!(aos.find("probe").unwrap().is_none());
    assert_eq!(aos.len().unwrap(), 0);
}

#[test]
fn iteration_is_identifier_ordered_with_positional_fallback() {
    let aos = StructArray::new(NodeMetadata::default());
    aos.update(None, json!({"@id": "z"}), UpdateOp::Extend).unwrap();
    aos.update(None, json!({"untagged": true}), UpdateOp::Extend)
        .unwrap();
    aos.update(None, json!({"@id": "a"}), UpdateOp::Extend).unwrap();

    let children = aos.for_each().unwrap();
    let keys: Vec<EntryKey> = children.iter().map(|(k, _)| k.clone()).collect();
    assert_eq!(
        keys,
        vec![
            EntryKey::Key("z".to_string()),
            EntryKey::Index(1),
            EntryKey::Key("a".to_string())
        ]
    );
}

#[test]
fn dump_serializes_elements_in_order() {
    common::init_logging();
    let aos = StructArray::new(NodeMetadata::default());
    aos.find_or_create("pf1").unwrap();
    aos.update(Some("pf1"), json!({"turns": 140}), UpdateOp::Merge)
        .unwrap();
    aos.find_or_create("pf2").unwrap();

    let target = Entry::from_value(Value::Null);
    aos.dump(&target).unwrap();
    assert_eq!(
        target.fetch().unwrap(),
        Some(json!([
            {"@id": "pf1", "turns": 140},
            {"@id": "pf2"}
        ]))
    );
}

#[test]
fn reset_is_the_only_invalidation() {
    let backing = Entry::from_value(json!([{"@id": "x"}]));
    let aos = StructArray::from_entry(backing, NodeMetadata::default());

    aos.find_or_create("y").unwrap();
    assert_eq!(aos.len().unwrap(), 2);

    // a second sync never runs implicitly
    assert_eq!(aos.len().unwrap(), 2);

    aos.reset().unwrap();
    assert_eq!(aos.identifiers().unwrap(), vec!["x".to_string()]);
    assert_eq!(aos.len().unwrap(), 1);
}
