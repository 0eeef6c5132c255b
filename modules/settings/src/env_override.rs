use serde_json::Value;

/// Scan `std::env` for variables starting with `prefix`, coerce them against
/// the shape of `defaults`, and merge the overrides into a clone of
/// `defaults`. Nesting is resolved by greedily matching the longest run of
/// `_`-joined suffix segments against an object key at each level of
/// `defaults`; a suffix with no matching nested key falls back to a flat key
/// built by lowercasing the whole remainder.
pub fn apply_env_overrides(defaults: &Value, prefix: &str) -> Value {
    let mut merged = defaults.clone();
    for (name, raw) in std::env::vars() {
        let Some(suffix) = name.strip_prefix(prefix) else {
            continue;
        };
        if suffix.is_empty() {
            continue;
        }
        let parts: Vec<String> = suffix.split('_').map(|p| p.to_lowercase()).collect();
        if let Some(path) = resolve_path(defaults, &parts) {
            set_coerced(&mut merged, &path, defaults, &raw);
        }
    }
    merged
}

/// Resolve `parts` against `value`'s nested object structure, preferring the
/// longest match at each level. Falls back to a single flat key (all parts
/// joined by `_`) when no nested key matches at all.
fn resolve_path(value: &Value, parts: &[String]) -> Option<Vec<String>> {
    let mut path = Vec::new();
    let mut cursor = value;
    let mut remaining = parts;

    while !remaining.is_empty() {
        let obj = cursor.as_object()?;
        let mut matched = None;
        for take in (1..=remaining.len()).rev() {
            let candidate = remaining[..take].join("_");
            if obj.contains_key(&candidate) {
                matched = Some((candidate, take));
                break;
            }
        }
        match matched {
            Some((key, take)) => {
                cursor = &obj[&key];
                path.push(key);
                remaining = &remaining[take..];
            }
            None => {
                if path.is_empty() {
                    return Some(vec![parts.join("_")]);
                }
                return None;
            }
        }
    }
    Some(path)
}

fn set_coerced(target: &mut Value, path: &[String], defaults: &Value, raw: &str) {
    let default_leaf = path
        .iter()
        .try_fold(defaults, |v, k| v.get(k))
        .unwrap_or(&Value::Null);
    let coerced = coerce(default_leaf, raw);

    let mut cursor = target;
    for (i, key) in path.iter().enumerate() {
        if !cursor.is_object() {
            *cursor = Value::Object(serde_json::Map::new());
        }
        let obj = cursor.as_object_mut().expect("just ensured object");
        if i == path.len() - 1 {
            obj.insert(key.clone(), coerced);
            return;
        }
        cursor = obj.entry(key.clone()).or_insert_with(|| Value::Object(serde_json::Map::new()));
    }
}

/// Coerce a raw environment string into the JSON type implied by the
/// corresponding default value: bool, number, comma-separated list, or
/// plain string for anything else (including enums).
fn coerce(default_leaf: &Value, raw: &str) -> Value {
    match default_leaf {
        Value::Bool(_) => match raw.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Value::Bool(true),
            "false" | "0" | "no" | "off" => Value::Bool(false),
            _ => Value::String(raw.to_string()),
        },
        Value::Number(n) if n.is_i64() || n.is_u64() => raw
            .parse::<i64>()
            .map(|v| Value::Number(v.into()))
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        Value::Number(_) => raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(raw.to_string())),
        Value::Array(_) => Value::Array(
            raw.split(',')
                .map(|s| Value::String(s.trim().to_string()))
                .collect(),
        ),
        _ => Value::String(raw.to_string()),
    }
}
