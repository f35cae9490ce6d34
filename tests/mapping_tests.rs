mod common;

use datatree::{DataTreeError, Entry, Mapper, MappingLookup, Path, PathSegment, UpdateOp};
use serde_json::{json, Value};

fn source_entry() -> Entry {
    Entry::from_value(json!({
        "x": {"val": 42},
        "diagnostics": {
            "flux_loop": [
                {"@id": "fl1", "voltage": 0.5},
                {"@id": "fl2", "voltage": 0.7}
            ]
        }
    }))
}

#[test]
fn identical_schemas_short_circuit_to_pass_through() {
    let mapper = Mapper::new(Vec::new(), "A", "A");
    assert!(matches!(
        mapper.find_mapping(None, None).unwrap(),
        MappingLookup::PassThrough
    ));

    // no view object is constructed: the source entry comes back as-is
    let source = source_entry();
    let mapped = mapper.map(source, None, None).unwrap();
    assert!(matches!(mapped, Entry::Value(_)));
}

#[test]
fn missing_descriptor_raises_mapping_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let mapper = Mapper::new(vec![dir.path().to_path_buf()], "A", "B");
    assert!(matches!(
        mapper.find_mapping(None, None),
        Err(DataTreeError::MappingNotFound(_))
    ));
}

#[test]
fn basic_round_trip_and_unmapped_request() {
    common::init_logging();
    let dir = tempfile::tempdir().unwrap();
    common::write_descriptor(dir.path(), "A", "B", &json!({"y": "@x/val"}));

    let mapper = Mapper::new(vec![dir.path().to_path_buf()], "A", "B");
    let view = mapper.map(source_entry(), None, None).unwrap();

    assert_eq!(view.child("y").fetch().unwrap(), Some(json!(42)));
    // unmapped request: the sentinel, not an error
    assert_eq!(view.child("z").fetch().unwrap(), None);
}

#[test]
fn descriptor_candidates_are_searched_in_order() {
    let dir = tempfile::tempdir().unwrap();
    common::write_static_descriptor(dir.path(), "A", "B", &json!({"y": "static wins"}));

    let mapper = Mapper::new(vec![dir.path().to_path_buf()], "A", "B");
    let view = mapper.map(source_entry(), None, None).unwrap();
    assert_eq!(view.child("y").fetch().unwrap(), Some(json!("static wins")));

    // the primary candidate outranks static/ once present, but the loaded
    // descriptor for the pair is memoized for the mapper's lifetime
    common::write_descriptor(dir.path(), "A", "B", &json!({"y": "primary"}));
    let view = mapper.map(source_entry(), None, None).unwrap();
    assert_eq!(view.child("y").fetch().unwrap(), Some(json!("static wins")));

    let fresh = Mapper::new(vec![dir.path().to_path_buf()], "A", "B");
    let view = fresh.map(source_entry(), None, None).unwrap();
    assert_eq!(view.child("y").fetch().unwrap(), Some(json!("primary")));
}

#[test]
fn malformed_descriptor_fails_at_load() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("A").join("B");
    std::fs::create_dir_all(&target).unwrap();
    std::fs::write(target.join("config.json"), "{broken").unwrap();

    let mapper = Mapper::new(vec![dir.path().to_path_buf()], "A", "B");
    assert!(matches!(
        mapper.find_mapping(None, None),
        Err(DataTreeError::Malformed(_))
    ));
}

#[test]
fn nested_structures_interpret_recursively() {
    let dir = tempfile::tempdir().unwrap();
    common::write_descriptor(
        dir.path(),
        "A",
        "B",
        &json!({
            "summary": {
                "answer": "@x/val",
                "label": "static label",
                "loops": ["@diagnostics/flux_loop/#fl1/voltage", "@absent/field"]
            }
        }),
    );

    let mapper = Mapper::new(vec![dir.path().to_path_buf()], "A", "B");
    let view = mapper.map(source_entry(), None, None).unwrap();

    assert_eq!(
        view.child("summary").fetch().unwrap(),
        Some(json!({
            "answer": 42,
            "label": "static label",
            "loops": [0.5]
        }))
    );
}

#[test]
fn for_each_interprets_lazily_per_child() {
    let dir = tempfile::tempdir().unwrap();
    common::write_descriptor(
        dir.path(),
        "A",
        "B",
        &json!({"good": "@x/val", "bad": "@@@"}),
    );

    let mapper = Mapper::new(vec![dir.path().to_path_buf()], "A", "B");
    let view = mapper.map(source_entry(), None, None).unwrap();

    // listing children interprets nothing, so the malformed sibling does
    // not get in the way of the good one
    let children = view.for_each().unwrap();
    assert_eq!(children.len(), 2);
    for (key, child) in children {
        if key.to_string() == "good" {
            assert_eq!(child.fetch().unwrap(), Some(json!(42)));
        }
    }
}

#[test]
fn ancestor_identifiers_parameterize_references() {
    let dir = tempfile::tempdir().unwrap();
    common::write_descriptor(
        dir.path(),
        "A",
        "B",
        &json!({
            "loop": [
                {"@id": "fl1", "v": "@diagnostics/flux_loop/#{id}/voltage"},
                {"@id": "fl2", "v": "@diagnostics/flux_loop/#{id}/voltage"}
            ]
        }),
    );

    let mapper = Mapper::new(vec![dir.path().to_path_buf()], "A", "B");
    let view = mapper.map(source_entry(), None, None).unwrap();

    let fl2 = view
        .child("loop")
        .child(PathSegment::identifier("fl2"))
        .child("v");
    assert_eq!(fl2.fetch().unwrap(), Some(json!(0.7)));
}

#[test]
fn mapped_view_is_read_only() {
    let dir = tempfile::tempdir().unwrap();
    common::write_descriptor(dir.path(), "A", "B", &json!({"y": "@x/val"}));

    let mapper = Mapper::new(vec![dir.path().to_path_buf()], "A", "B");
    let view = mapper.map(source_entry(), None, None).unwrap();
    assert!(matches!(
        view.child("y").update(json!(1), UpdateOp::Replace),
        Err(DataTreeError::UnsupportedOperation(_))
    ));
}

#[test]
fn reference_resolution_composes_with_paths() {
    let dir = tempfile::tempdir().unwrap();
    common::write_descriptor(
        dir.path(),
        "A",
        "B",
        &json!({"deep": {"chain": "@x"}}),
    );

    let mapper = Mapper::new(vec![dir.path().to_path_buf()], "A", "B");
    let view = mapper.map(source_entry(), None, None).unwrap();
    assert_eq!(
        view.fetch_path(&Path::parse("deep/chain/val").unwrap())
            .unwrap(),
        None,
        "request paths resolve inside the descriptor, not inside referenced source values"
    );
    assert_eq!(
        view.fetch_path(&Path::parse("deep/chain").unwrap()).unwrap(),
        Some(json!({"val": 42}))
    );
}
