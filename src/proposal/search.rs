use serde_json::Value;

/// Depth-first, pre-order search for the first non-null value stored under
/// `key` anywhere in `value`.
///
/// At each object the object's own keys are checked before descending into
/// its children, and children are visited in document order (serde_json is
/// built with `preserve_order`). Arrays are walked item by item; scalars
/// never match.
pub fn find_value<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => {
            if let Some(found) = map.get(key) {
                if !found.is_null() {
                    return Some(found);
                }
            }
            map.values()
                .filter(|child| child.is_object() || child.is_array())
                .find_map(|child| find_value(child, key))
        }
        Value::Array(items) => items.iter().find_map(|item| find_value(item, key)),
        _ => None,
    }
}
