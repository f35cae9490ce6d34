mod common;

use datatree::backend::{JsonFormat, StoreFormat};
use datatree::{Entry, EntryKey, OpenMode, Path, SourceFactory, UpdateOp};
use serde_json::{json, Value};

fn sample_entry() -> Entry {
    Entry::from_value(json!({
        "equilibrium": {
            "time": [0.0, 0.1, 0.2],
            "profiles": {"q": [1.0, 1.5, 2.0]}
        },
        "wall": null
    }))
}

#[test]
fn child_composition_matches_joined_path() {
    let entry = sample_entry();
    let p = Path::parse("equilibrium/profiles").unwrap();
    let q = Path::parse("q/1").unwrap();

    let stepped = entry.child_path(&p).child_path(&q);
    let joined = entry.child_path(&p.join(&q));

    assert_eq!(stepped.fetch().unwrap(), Some(json!(1.5)));
    assert_eq!(stepped.fetch().unwrap(), joined.fetch().unwrap());
}

#[test]
fn get_with_default_never_errors_on_absent_paths() {
    let entry = sample_entry();
    let value = entry
        .get(&Path::parse("no/such/path/at/all").unwrap(), json!("fallback"))
        .unwrap();
    assert_eq!(value, json!("fallback"));
}

#[test]
fn explicit_null_is_not_not_found() {
    let entry = sample_entry();
    assert_eq!(entry.child("wall").fetch().unwrap(), Some(Value::Null));
    assert_eq!(entry.child("divertor").fetch().unwrap(), None);
}

#[test]
fn descent_past_missing_keys_is_silent() {
    let entry = sample_entry();
    let deep = entry.child("missing").child("deeper").child("deepest");
    assert_eq!(deep.fetch().unwrap(), None);
    assert!(!deep.exists().unwrap());
    assert_eq!(deep.count().unwrap(), 0);
}

#[test]
fn for_each_yields_one_level() {
    let entry = sample_entry();
    let children = entry.child("equilibrium").for_each().unwrap();
    // mapping children come back in key order
    let keys: Vec<EntryKey> = children.iter().map(|(k, _)| k.clone()).collect();
    assert_eq!(
        keys,
        vec![
            EntryKey::Key("profiles".to_string()),
            EntryKey::Key("time".to_string())
        ]
    );
}

#[test]
fn slice_and_wildcard_reads() {
    let entry = sample_entry();
    assert_eq!(
        entry
            .fetch_path(&Path::parse("equilibrium/time/1:3").unwrap())
            .unwrap(),
        Some(json!([0.1, 0.2]))
    );
    assert_eq!(
        entry
            .fetch_path(&Path::parse("equilibrium/profiles/q/*").unwrap())
            .unwrap(),
        Some(json!([1.0, 1.5, 2.0]))
    );
}

#[test]
fn updates_flow_through_shared_document() {
    let entry = Entry::from_value(Value::Null);
    entry
        .child("scenario")
        .child("tag")
        .insert(json!("baseline"))
        .unwrap();
    entry
        .update(json!({"scenario": {"shots": 12}}), UpdateOp::Merge)
        .unwrap();

    assert_eq!(
        entry.fetch().unwrap(),
        Some(json!({"scenario": {"tag": "baseline", "shots": 12}}))
    );

    entry.child("scenario").child("tag").remove().unwrap();
    assert_eq!(
        entry.fetch().unwrap(),
        Some(json!({"scenario": {"shots": 12}}))
    );
}

#[test]
fn json_connection_round_trip() {
    common::init_logging();
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("shot.json");
    let locator = file.to_str().unwrap().to_string();

    {
        let conn = JsonFormat.open(&locator, OpenMode::create()).unwrap();
        let entry = conn.read().unwrap();
        entry
            .child("device")
            .child("coils")
            .append(json!({"@id": "pf1", "turns": 140}))
            .unwrap();
        conn.close().unwrap();
    }

    let conn = JsonFormat.open(&locator, OpenMode::read()).unwrap();
    let entry = conn.read().unwrap();
    assert_eq!(
        entry
            .fetch_path(&Path::parse("device/coils/#pf1/turns").unwrap())
            .unwrap(),
        Some(json!(140))
    );
    // read-only connection rejects mutation
    assert!(matches!(
        entry.child("device").insert(json!(1)),
        Err(datatree::DataTreeError::UnsupportedOperation(_))
    ));
}

#[test]
fn store_connection_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let locator = format!("store://{}", dir.path().join("db").display());

    let conn = StoreFormat.open(&locator, OpenMode::create()).unwrap();
    let entry = conn.read().unwrap();
    entry
        .update(
            json!({"pulse": {"number": 4211, "signals": [1, 2, 3]}}),
            UpdateOp::Replace,
        )
        .unwrap();

    assert_eq!(
        entry
            .fetch_path(&Path::parse("pulse/signals/2").unwrap())
            .unwrap(),
        Some(json!(3))
    );
    assert_eq!(entry.child("pulse").count().unwrap(), 2);
    assert_eq!(entry.child("nothing").fetch().unwrap(), None);
}
