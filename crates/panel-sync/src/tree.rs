//! Path-addressed operations on a JSON tree.
//!
//! Paths use the realtime-database convention: `/`-separated segments,
//! leading and trailing slashes ignored, the empty path is the root.
//! Writing `null` deletes the node, and parents left empty are pruned
//! (the database has no notion of an empty object).

use serde_json::{Map, Value};

/// Split a path into its non-empty segments.
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Join a section and child field into a remote path.
pub fn child_path(section: &str, field: &str) -> String {
    format!("/{}/{}", section.trim_matches('/'), field.trim_matches('/'))
}

/// Read the node at `path`, if present.
pub fn get_at<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut node = root;
    for segment in segments(path) {
        node = node.as_object()?.get(segment)?;
    }
    Some(node)
}

/// Replace the node at `path` with `value`.
///
/// Intermediate objects are created as needed; a non-object met on the way
/// is replaced by an object, the same way the database overwrites leaves.
pub fn set_at(root: &mut Value, path: &str, value: Value) {
    let segs = segments(path);
    if segs.is_empty() {
        *root = if value.is_null() {
            Value::Object(Map::new())
        } else {
            value
        };
        return;
    }
    set_in(root, &segs, value);
}

fn set_in(node: &mut Value, segs: &[&str], value: Value) {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    let Some(map) = node.as_object_mut() else {
        return;
    };

    let (head, rest) = (segs[0], &segs[1..]);
    if rest.is_empty() {
        if value.is_null() {
            map.remove(head);
        } else {
            map.insert(head.to_string(), value);
        }
        return;
    }

    if value.is_null() && !map.contains_key(head) {
        return;
    }
    let child = map
        .entry(head.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    set_in(child, rest, value);

    if child.as_object().is_some_and(|m| m.is_empty()) {
        map.remove(head);
    }
}

/// Apply a shallow merge of `children` under `path` (realtime-database `patch`).
pub fn merge_at(root: &mut Value, path: &str, children: Map<String, Value>) {
    for (key, value) in children {
        let child = if segments(path).is_empty() {
            format!("/{}", key)
        } else {
            format!("/{}/{}", path.trim_matches('/'), key)
        };
        set_at(root, &child, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_creates_intermediate_objects() {
        let mut root = json!({});
        set_at(&mut root, "/wordle/daily-words", json!(["casa"]));
        assert_eq!(root, json!({"wordle": {"daily-words": ["casa"]}}));
    }

    #[test]
    fn test_set_leaves_siblings_untouched() {
        let mut root = json!({"wordle": {"daily-words": [], "stats": {"played": 3}}});
        set_at(&mut root, "/wordle/daily-words", json!(["luz"]));
        assert_eq!(
            root,
            json!({"wordle": {"daily-words": ["luz"], "stats": {"played": 3}}})
        );
    }

    #[test]
    fn test_null_deletes_and_prunes() {
        let mut root = json!({"a": {"b": 1}, "c": 2});
        set_at(&mut root, "a/b", Value::Null);
        assert_eq!(root, json!({"c": 2}));

        // Deleting a missing path is a no-op
        set_at(&mut root, "/x/y", Value::Null);
        assert_eq!(root, json!({"c": 2}));
    }

    #[test]
    fn test_root_replace() {
        let mut root = json!({"a": 1});
        set_at(&mut root, "/", json!({"b": 2}));
        assert_eq!(root, json!({"b": 2}));

        set_at(&mut root, "", Value::Null);
        assert_eq!(root, json!({}));
    }

    #[test]
    fn test_merge_at() {
        let mut root = json!({"songs": {"data": [1], "updatedAt": "x"}});
        let patch = json!({"updatedAt": "y", "extra": true});
        merge_at(&mut root, "/songs", patch.as_object().unwrap().clone());
        assert_eq!(
            root,
            json!({"songs": {"data": [1], "updatedAt": "y", "extra": true}})
        );
    }

    #[test]
    fn test_get_at() {
        let root = json!({"a": {"b": [1, 2]}});
        assert_eq!(get_at(&root, "/a/b"), Some(&json!([1, 2])));
        assert_eq!(get_at(&root, "/a/z"), None);
        assert_eq!(get_at(&root, ""), Some(&root));
    }
}
