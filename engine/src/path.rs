//! Dotted paths into a record tree.
//!
//! A path such as `pets[0].name` addresses a single node inside the record's
//! JSON tree. Keys are separated by `.`, array indices use brackets.

use crate::error::{Error, Result};
use serde_json::{Map, Value};

/// How many `null` slots a single write may pad an array with.
pub const MAX_ARRAY_GAP: usize = 1024;

/// One step of a parsed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathStep {
    Key(String),
    Index(usize),
}

/// Parse a path string into its steps.
pub fn parse(path: &str) -> Result<Vec<PathStep>> {
    if path.is_empty() {
        return Err(Error::invalid_path(path, "path is empty"));
    }

    let mut steps = Vec::new();
    for segment in path.split('.') {
        let (key, mut rest) = match segment.find('[') {
            Some(open) => segment.split_at(open),
            None => (segment, ""),
        };

        if key.is_empty() && rest.is_empty() {
            return Err(Error::invalid_path(path, "empty key"));
        }
        if !key.is_empty() {
            steps.push(PathStep::Key(key.to_string()));
        }

        while !rest.is_empty() {
            let close = rest
                .find(']')
                .ok_or_else(|| Error::invalid_path(path, "unclosed '['"))?;
            let index = rest[1..close]
                .trim()
                .parse::<usize>()
                .map_err(|_| Error::invalid_path(path, "index is not a number"))?;
            steps.push(PathStep::Index(index));

            rest = &rest[close + 1..];
            if !rest.is_empty() && !rest.starts_with('[') {
                return Err(Error::invalid_path(path, "unexpected text after ']'"));
            }
        }
    }

    Ok(steps)
}

/// Read the value at `path`, if present.
pub fn get<'a>(root: &'a Value, path: &str) -> Result<Option<&'a Value>> {
    let steps = parse(path)?;
    let mut node = root;
    for step in &steps {
        let next = match (step, node) {
            (PathStep::Key(key), Value::Object(map)) => map.get(key),
            (PathStep::Index(index), Value::Array(items)) => items.get(*index),
            _ => None,
        };
        match next {
            Some(value) => node = value,
            None => return Ok(None),
        }
    }
    Ok(Some(node))
}

/// Write `value` at `path`, creating intermediate containers on the way.
///
/// A scalar standing where a container is needed is replaced. Arrays are
/// padded with `null` up to the addressed index, at most [`MAX_ARRAY_GAP`]
/// slots past their current end. The tree is left untouched on error.
pub fn set(root: &mut Value, path: &str, value: Value) -> Result<()> {
    let steps = parse(path)?;
    check_growth(root, &steps, path)?;

    let mut node = root;
    for step in &steps {
        node = child_mut(node, step);
    }
    *node = value;
    Ok(())
}

/// Remove the value at `path`. Missing paths are left untouched.
pub fn erase(root: &mut Value, path: &str) -> Result<()> {
    let mut steps = parse(path)?;
    let Some(leaf) = steps.pop() else {
        return Ok(());
    };

    let mut node = root;
    for step in &steps {
        let next = match (step, node) {
            (PathStep::Key(key), Value::Object(map)) => map.get_mut(key),
            (PathStep::Index(index), Value::Array(items)) => items.get_mut(*index),
            _ => None,
        };
        match next {
            Some(value) => node = value,
            None => return Ok(()),
        }
    }

    match (leaf, node) {
        (PathStep::Key(key), Value::Object(map)) => {
            map.remove(&key);
        }
        (PathStep::Index(index), Value::Array(items)) if index < items.len() => {
            items.remove(index);
        }
        _ => {}
    }
    Ok(())
}

/// Reject indices that would pad an array past [`MAX_ARRAY_GAP`].
///
/// Containers created along the way start empty, so a missing node counts
/// as an array of length zero.
fn check_growth(root: &Value, steps: &[PathStep], path: &str) -> Result<()> {
    let mut node = Some(root);
    for step in steps {
        node = match step {
            PathStep::Key(key) => node.and_then(|value| value.get(key.as_str())),
            PathStep::Index(index) => {
                let current = node.and_then(Value::as_array);
                let len = current.map_or(0, Vec::len);
                let limit = len.saturating_add(MAX_ARRAY_GAP);
                if *index > limit {
                    return Err(Error::invalid_path(
                        path,
                        format!("index {index} is too far past the end of the array ({len} items)"),
                    ));
                }
                current.and_then(|items| items.get(*index))
            }
        };
    }
    Ok(())
}

fn child_mut<'a>(node: &'a mut Value, step: &PathStep) -> &'a mut Value {
    match step {
        PathStep::Key(key) => {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            &mut node[key.as_str()]
        }
        PathStep::Index(index) => {
            if !node.is_array() {
                *node = Value::Array(Vec::new());
            }
            if let Value::Array(items) = &mut *node {
                if items.len() <= *index {
                    items.resize(index.saturating_add(1), Value::Null);
                }
            }
            &mut node[*index]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn parse_keys_and_indices() {
        assert_eq!(
            parse("pets[1].name").unwrap(),
            vec![
                PathStep::Key("pets".into()),
                PathStep::Index(1),
                PathStep::Key("name".into()),
            ]
        );
        assert_eq!(
            parse("matrix[0][2]").unwrap(),
            vec![
                PathStep::Key("matrix".into()),
                PathStep::Index(0),
                PathStep::Index(2),
            ]
        );
    }

    #[test]
    fn parse_rejects_malformed_paths() {
        assert!(parse("").is_err());
        assert!(parse("a..b").is_err());
        assert!(parse("a[x]").is_err());
        assert!(parse("a[1").is_err());
        assert!(parse("a[1]b").is_err());
    }

    #[test]
    fn set_creates_intermediate_containers() {
        let mut data = json!({});
        set(&mut data, "address.street", json!("Main")).unwrap();
        set(&mut data, "pets[2]", json!("cat")).unwrap();

        assert_eq!(
            data,
            json!({"address": {"street": "Main"}, "pets": [null, null, "cat"]})
        );
    }

    #[test]
    fn set_rejects_indices_far_past_the_end() {
        let mut data = json!({"a": [1]});
        let original = data.clone();

        for path in ["a[18446744073709551615]", "a[4000000000000]", "b.c[2000]"] {
            let result = set(&mut data, path, json!(true));
            assert!(matches!(result, Err(Error::InvalidPath { .. })), "{path}");
        }
        assert_eq!(data, original);

        set(&mut data, &format!("a[{}]", 1 + MAX_ARRAY_GAP), json!(2)).unwrap();
        assert_eq!(data["a"].as_array().map(Vec::len), Some(MAX_ARRAY_GAP + 2));
    }

    #[test]
    fn set_replaces_scalar_in_the_way() {
        let mut data = json!({"address": "unknown"});
        set(&mut data, "address.city", json!("Berlin")).unwrap();
        assert_eq!(data, json!({"address": {"city": "Berlin"}}));
    }

    #[test]
    fn erase_removes_keys_and_elements() {
        let mut data = json!({"firstname": "wolfram", "pets": ["a", "b", "c"]});
        erase(&mut data, "firstname").unwrap();
        erase(&mut data, "pets[1]").unwrap();
        assert_eq!(data, json!({"pets": ["a", "c"]}));
    }

    #[test]
    fn erase_missing_path_is_noop() {
        let mut data = json!({"a": {"b": 1}});
        erase(&mut data, "a.c.d").unwrap();
        erase(&mut data, "x[4]").unwrap();
        assert_eq!(data, json!({"a": {"b": 1}}));
    }

    #[test]
    fn get_reads_nested_values() {
        let data = json!({"pets": [{"name": "Rex"}]});
        assert_eq!(get(&data, "pets[0].name").unwrap(), Some(&json!("Rex")));
        assert_eq!(get(&data, "pets[3].name").unwrap(), None);
    }

    proptest! {
        #[test]
        fn set_then_get_returns_value(key in "[a-z]{1,8}", index in 0usize..8, value in any::<i64>()) {
            let mut data = json!({});
            let path = format!("{key}[{index}]");
            set(&mut data, &path, json!(value)).unwrap();
            prop_assert_eq!(get(&data, &path).unwrap(), Some(&json!(value)));
        }
    }
}
