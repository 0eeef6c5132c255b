use std::collections::HashMap;

use serde_json::Value;

/// Overlay persisted preferences (flat, dotted-path keyed) on top of a merged
/// baseline value. Preferences always win: this is the last step of the
/// `user preferences → environment → defaults` priority chain.
pub fn overlay(baseline: &Value, prefs: &HashMap<String, Value>) -> Value {
    let mut result = baseline.clone();
    for (key, value) in prefs {
        set_path(&mut result, key, value.clone());
    }
    result
}

fn set_path(root: &mut Value, dotted_key: &str, value: Value) {
    let parts: Vec<&str> = dotted_key.split('.').collect();
    let mut cursor = root;
    for (i, part) in parts.iter().enumerate() {
        if !cursor.is_object() {
            *cursor = Value::Object(serde_json::Map::new());
        }
        let obj = cursor.as_object_mut().expect("just ensured object");
        if i == parts.len() - 1 {
            obj.insert((*part).to_string(), value);
            return;
        }
        cursor = obj
            .entry((*part).to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }
}
