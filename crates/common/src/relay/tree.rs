//! Helpers for addressing nodes inside a JSON record tree

use serde_json::{Map, Value};

use super::provider::RecordPath;

pub fn get<'a>(tree: &'a Value, path: &RecordPath) -> Option<&'a Value> {
    let mut node = tree;
    for segment in path.segments() {
        node = node.as_object()?.get(segment)?;
    }
    match node {
        Value::Null => None,
        node => Some(node),
    }
}

/// Set `value` at `path`, creating intermediate objects and replacing any
///  scalar that sits where an object is needed
pub fn set(tree: &mut Value, path: &RecordPath, value: Value) {
    let mut node = tree;
    for segment in path.segments() {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Value::Object(map) = node else {
            unreachable!("node was just made an object");
        };
        node = map
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    *node = value;
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_and_set() {
        let mut tree = json!({});
        let path = RecordPath::root().child("users/alice/name");

        assert_eq!(get(&tree, &path), None);
        set(&mut tree, &path, json!("Alice"));
        assert_eq!(get(&tree, &path), Some(&json!("Alice")));
        assert_eq!(
            get(&tree, &RecordPath::root().child("users")),
            Some(&json!({"alice": {"name": "Alice"}}))
        );
        assert_eq!(get(&tree, &RecordPath::root()), Some(&tree));
    }

    #[test]
    fn test_set_through_scalar() {
        let mut tree = json!({"a": 1});
        set(&mut tree, &RecordPath::root().child("a/b"), json!(2));
        assert_eq!(tree, json!({"a": {"b": 2}}));
    }

    #[test]
    fn test_null_reads_as_absent() {
        let tree = json!({"a": null});
        assert_eq!(get(&tree, &RecordPath::root().child("a")), None);
    }
}
