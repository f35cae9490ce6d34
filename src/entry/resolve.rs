//! Pure traversal and mutation helpers over materialized
//! `serde_json::Value` trees. All path evaluation on in-memory data funnels
//! through here so that cache overlays, file documents and store
//! reconstructions behave identically.

use crate::error::{DataTreeError, DataTreeResult};
use crate::path::{OpTag, PathSegment};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Key of an immediate child yielded during iteration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKey {
    Key(String),
    Index(usize),
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKey::Key(k) => write!(f, "{}", k),
            EntryKey::Index(i) => write!(f, "{}", i),
        }
    }
}

impl From<EntryKey> for PathSegment {
    fn from(key: EntryKey) -> Self {
        match key {
            EntryKey::Key(k) => PathSegment::Key(k),
            EntryKey::Index(i) => PathSegment::Index(i),
        }
    }
}

/// Mutation operators accepted by `update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateOp {
    /// Assign, replacing whatever was there
    Replace,
    /// Deep-merge mappings, replace everything else
    Merge,
    /// Append at the end of a sequence
    Extend,
    /// Remove the addressed value
    Remove,
}

fn category_name(value: &Value) -> &'static str {
    match value {
        Value::Object(_) => "Mapping",
        Value::Array(_) => "Sequence",
        Value::Null => "Empty",
        _ => "Scalar",
    }
}

/// Resolves slice bounds against a sequence length, python-style: negative
/// bounds count from the end, everything clamps into range. Only positive
/// steps are meaningful here.
fn slice_indices(len: usize, start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Vec<usize> {
    let clamp = |bound: i64| -> usize {
        let resolved = if bound < 0 { bound + len as i64 } else { bound };
        resolved.clamp(0, len as i64) as usize
    };
    let start = clamp(start.unwrap_or(0));
    let stop = clamp(stop.unwrap_or(len as i64));
    let step = step.unwrap_or(1).max(1) as usize;
    (start..stop).step_by(step).collect()
}

fn find_identified<'a>(elements: &'a [Value], tag: &str, id: &str) -> Option<&'a Value> {
    elements
        .iter()
        .find(|e| e.get(tag).and_then(Value::as_str) == Some(id))
}

/// Reads the value addressed by `segments`, cloning what it finds.
///
/// Returns `None` for a merely-absent location; wildcard and slice
/// segments fan out and collect into a sequence, skipping absent branches.
pub fn fetch(value: &Value, segments: &[PathSegment]) -> Option<Value> {
    let (seg, rest) = match segments.split_first() {
        None => return Some(value.clone()),
        Some(split) => split,
    };
    match seg {
        PathSegment::Key(k) => value.as_object()?.get(k).and_then(|v| fetch(v, rest)),
        PathSegment::Index(i) => value.as_array()?.get(*i).and_then(|v| fetch(v, rest)),
        PathSegment::IdentifierMatch { tag, value: id } => {
            find_identified(value.as_array()?, tag, id).and_then(|v| fetch(v, rest))
        }
        PathSegment::Wildcard => {
            let collected: Vec<Value> = children(value)
                .into_iter()
                .filter_map(|(_, child)| fetch(&child, rest))
                .collect();
            Some(Value::Array(collected))
        }
        PathSegment::Slice { start, stop, step } => {
            let elements = value.as_array()?;
            let collected: Vec<Value> = slice_indices(elements.len(), *start, *stop, *step)
                .into_iter()
                .filter_map(|i| elements.get(i))
                .filter_map(|v| fetch(v, rest))
                .collect();
            Some(Value::Array(collected))
        }
        // Parent ops are resolved structurally before evaluation; the rest
        // have no read semantics.
        PathSegment::Operation(_) => None,
    }
}

/// Immediate children of a materialized value, in document order.
pub fn children(value: &Value) -> Vec<(EntryKey, Value)> {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| (EntryKey::Key(k.clone()), v.clone()))
            .collect(),
        Value::Array(elements) => elements
            .iter()
            .enumerate()
            .map(|(i, v)| (EntryKey::Index(i), v.clone()))
            .collect(),
        _ => Vec::new(),
    }
}

/// Number of immediate children at the addressed location: container
/// length, 1 for a scalar, 0 for an absent location or explicit null.
pub fn count(value: &Value, segments: &[PathSegment]) -> usize {
    match fetch(value, segments) {
        Some(Value::Object(map)) => map.len(),
        Some(Value::Array(elements)) => elements.len(),
        Some(Value::Null) | None => 0,
        Some(_) => 1,
    }
}

fn deep_merge(target: &mut Value, incoming: Value) {
    match (target, incoming) {
        (Value::Object(target_map), Value::Object(incoming_map)) => {
            for (k, v) in incoming_map {
                match target_map.get_mut(&k) {
                    Some(slot) => deep_merge(slot, v),
                    None => {
                        target_map.insert(k, v);
                    }
                }
            }
        }
        (slot, incoming) => *slot = incoming,
    }
}

fn apply_at(target: &mut Value, value: Value, op: UpdateOp) -> DataTreeResult<()> {
    match op {
        UpdateOp::Replace => {
            *target = value;
            Ok(())
        }
        UpdateOp::Merge => {
            deep_merge(target, value);
            Ok(())
        }
        UpdateOp::Extend => match target {
            Value::Array(elements) => {
                elements.push(value);
                Ok(())
            }
            Value::Null => {
                *target = Value::Array(vec![value]);
                Ok(())
            }
            Value::Object(_) => Err(DataTreeError::IllegalTransition {
                from: "Mapping",
                to: "Sequence",
            }),
            scalar => {
                // explicit append turns a scalar into a sequence, keeping
                // the scalar as element 0
                let previous = scalar.take();
                *scalar = Value::Array(vec![previous, value]);
                Ok(())
            }
        },
        UpdateOp::Remove => {
            *target = Value::Null;
            Ok(())
        }
    }
}

/// Writes `value` at the location addressed by `segments`, creating
/// intermediate containers on the way down. Descending with a key fixes a
/// location as a mapping, with an index or append as a sequence; crossing
/// the two afterwards is an illegal transition.
pub fn write(
    root: &mut Value,
    segments: &[PathSegment],
    value: Value,
    op: UpdateOp,
) -> DataTreeResult<()> {
    let (seg, rest) = match segments.split_first() {
        None => return apply_at(root, value, op),
        Some(split) => split,
    };
    match seg {
        PathSegment::Key(k) => {
            match root {
                Value::Null => *root = Value::Object(serde_json::Map::new()),
                Value::Object(_) => {}
                other => {
                    return Err(DataTreeError::IllegalTransition {
                        from: category_name(other),
                        to: "Mapping",
                    })
                }
            }
            let map = root
                .as_object_mut()
                .ok_or_else(|| DataTreeError::Malformed("object vanished during write".into()))?;
            let slot = map.entry(k.clone()).or_insert(Value::Null);
            write(slot, rest, value, op)
        }
        PathSegment::Index(i) => {
            match root {
                Value::Null => *root = Value::Array(Vec::new()),
                Value::Array(_) => {}
                other => {
                    return Err(DataTreeError::IllegalTransition {
                        from: category_name(other),
                        to: "Sequence",
                    })
                }
            }
            let elements = root
                .as_array_mut()
                .ok_or_else(|| DataTreeError::Malformed("array vanished during write".into()))?;
            while elements.len() <= *i {
                elements.push(Value::Null);
            }
            write(&mut elements[*i], rest, value, op)
        }
        PathSegment::Operation(OpTag::Extend) => {
            match root {
                Value::Null => *root = Value::Array(Vec::new()),
                Value::Array(_) => {}
                Value::Object(_) => {
                    return Err(DataTreeError::IllegalTransition {
                        from: "Mapping",
                        to: "Sequence",
                    })
                }
                _ => {
                    let previous = root.take();
                    *root = Value::Array(vec![previous]);
                }
            }
            let elements = root
                .as_array_mut()
                .ok_or_else(|| DataTreeError::Malformed("array vanished during write".into()))?;
            elements.push(Value::Null);
            let last = elements
                .last_mut()
                .ok_or_else(|| DataTreeError::Malformed("append slot vanished".into()))?;
            write(last, rest, value, op)
        }
        PathSegment::IdentifierMatch { tag, value: id } => {
            match root {
                Value::Null => *root = Value::Array(Vec::new()),
                Value::Array(_) => {}
                other => {
                    return Err(DataTreeError::IllegalTransition {
                        from: category_name(other),
                        to: "Sequence",
                    })
                }
            }
            let elements = root
                .as_array_mut()
                .ok_or_else(|| DataTreeError::Malformed("array vanished during write".into()))?;
            let position = elements
                .iter()
                .position(|e| e.get(tag).and_then(Value::as_str) == Some(id.as_str()));
            let slot = match position {
                Some(found) => &mut elements[found],
                None => {
                    let mut skeleton = serde_json::Map::new();
                    skeleton.insert(tag.clone(), Value::String(id.clone()));
                    elements.push(Value::Object(skeleton));
                    elements
                        .last_mut()
                        .ok_or_else(|| DataTreeError::Malformed("append slot vanished".into()))?
                }
            };
            write(slot, rest, value, op)
        }
        PathSegment::Wildcard | PathSegment::Slice { .. } => Err(
            DataTreeError::UnsupportedOperation("write through wildcard or slice".to_string()),
        ),
        PathSegment::Operation(tag) => Err(DataTreeError::UnsupportedOperation(format!(
            "write through operation segment {:?}",
            tag
        ))),
    }
}

/// Removes the value addressed by `segments`. Removing an absent location
/// is a no-op; removing the root resets it to null.
pub fn remove(root: &mut Value, segments: &[PathSegment]) -> DataTreeResult<()> {
    let (parent_segments, last) = match segments.split_last() {
        None => {
            *root = Value::Null;
            return Ok(());
        }
        Some((last, init)) => (init, last),
    };
    let parent = match fetch_mut(root, parent_segments) {
        Some(parent) => parent,
        None => return Ok(()),
    };
    match (last, parent) {
        (PathSegment::Key(k), Value::Object(map)) => {
            map.remove(k);
            Ok(())
        }
        (PathSegment::Index(i), Value::Array(elements)) => {
            if *i < elements.len() {
                elements.remove(*i);
            }
            Ok(())
        }
        (PathSegment::IdentifierMatch { tag, value: id }, Value::Array(elements)) => {
            elements.retain(|e| e.get(tag).and_then(Value::as_str) != Some(id.as_str()));
            Ok(())
        }
        (PathSegment::Wildcard, parent) => {
            *parent = Value::Null;
            Ok(())
        }
        (seg, _) => Err(DataTreeError::UnsupportedOperation(format!(
            "remove through segment {:?}",
            seg
        ))),
    }
}

fn fetch_mut<'a>(value: &'a mut Value, segments: &[PathSegment]) -> Option<&'a mut Value> {
    let (seg, rest) = match segments.split_first() {
        None => return Some(value),
        Some(split) => split,
    };
    match seg {
        PathSegment::Key(k) => value.as_object_mut()?.get_mut(k).and_then(|v| fetch_mut(v, rest)),
        PathSegment::Index(i) => value.as_array_mut()?.get_mut(*i).and_then(|v| fetch_mut(v, rest)),
        PathSegment::IdentifierMatch { tag, value: id } => {
            let elements = value.as_array_mut()?;
            let position = elements
                .iter()
                .position(|e| e.get(tag).and_then(Value::as_str) == Some(id.as_str()))?;
            fetch_mut(&mut elements[position], rest)
        }
        _ => None,
    }
}
