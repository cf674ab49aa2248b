//! Dot-delimited path access into nested JSON values.
//!
//! A path like `"user.address.city"` walks object keys; numeric segments
//! index into arrays (`"items.0.price"`). The empty path addresses the root.
//!
//! Writes never create intermediate containers: the parent of the final
//! segment must already exist, otherwise the write fails with
//! [`Error::InvalidPath`].

use crate::{error::Result, Error};
use serde_json::Value;

/// Split a path into its segments. The empty path has no segments.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').filter(|_| !path.is_empty())
}

/// Read the value at `path`, or `None` if any segment is missing.
pub fn get<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    segments(path).try_fold(root, step)
}

fn step<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn step_mut<'a>(value: &'a mut Value, segment: &str) -> Option<&'a mut Value> {
    match value {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => segment
            .parse::<usize>()
            .ok()
            .and_then(move |i| items.get_mut(i)),
        _ => None,
    }
}

/// Split `path` into (parent path, final segment).
fn split_last(path: &str) -> (&str, &str) {
    match path.rfind('.') {
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("", path),
    }
}

/// Write `value` at `path`, returning the value it replaced.
///
/// Returns `Ok(None)` when the final key did not exist before the write.
pub fn set(root: &mut Value, path: &str, value: Value) -> Result<Option<Value>> {
    if path.is_empty() {
        return Err(Error::invalid_path(path, "empty path"));
    }
    if path.split('.').any(str::is_empty) {
        return Err(Error::invalid_path(path, "empty segment"));
    }
    let (parent_path, key) = split_last(path);

    let parent = segments(parent_path)
        .try_fold(root, step_mut)
        .ok_or_else(|| {
            Error::invalid_path(path, format!("parent '{parent_path}' does not exist"))
        })?;

    match parent {
        Value::Object(map) => Ok(map.insert(key.to_string(), value)),
        Value::Array(items) => {
            let index: usize = key
                .parse()
                .map_err(|_| Error::invalid_path(path, format!("'{key}' is not an array index")))?;
            match index.cmp(&items.len()) {
                std::cmp::Ordering::Less => Ok(Some(std::mem::replace(&mut items[index], value))),
                std::cmp::Ordering::Equal => {
                    items.push(value);
                    Ok(None)
                }
                std::cmp::Ordering::Greater => Err(Error::invalid_path(
                    path,
                    format!("index {index} out of bounds (len {})", items.len()),
                )),
            }
        }
        other => Err(Error::invalid_path(
            path,
            format!("parent '{parent_path}' is {}, not a container", kind_name(other)),
        )),
    }
}

/// Remove the value at `path`, returning it if it existed.
///
/// Removing from an array only pops the last element, so that indices of
/// the remaining elements stay stable.
pub fn remove(root: &mut Value, path: &str) -> Option<Value> {
    if path.is_empty() {
        return None;
    }
    let (parent_path, key) = split_last(path);
    let parent = segments(parent_path).try_fold(root, step_mut)?;
    match parent {
        Value::Object(map) => map.remove(key),
        Value::Array(items) => {
            let index: usize = key.parse().ok()?;
            if index + 1 == items.len() {
                items.pop()
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Whether a change at `changed` can affect a value observed at `filter`.
///
/// True when one path is a segment-wise prefix of the other: a write to
/// `a.b.c` affects a watcher on `a.b`, and a write to `a` (replacing the
/// whole subtree) affects a watcher on `a.b`. `a.bc` does not match `a.b`.
/// The empty path overlaps everything.
pub fn overlaps(changed: &str, filter: &str) -> bool {
    is_prefix(filter, changed) || is_prefix(changed, filter)
}

/// Segment-aware `path.starts_with(prefix)`.
pub fn is_prefix(prefix: &str, path: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('.'),
        None => false,
    }
}

/// Human-readable name for a JSON value's type.
pub fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "Null",
        Value::Bool(_) => "Bool",
        Value::Number(n) if n.is_i64() || n.is_u64() => "Int",
        Value::Number(_) => "Float",
        Value::String(_) => "String",
        Value::Array(_) => "Array",
        Value::Object(_) => "Object",
    }
}
