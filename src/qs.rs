//! Nested decoding of flat `key=value` pairs.
//!
//! Query strings and form bodies share this decoder so that
//! `customer[id]=1`, `customer.id=1`, `status=a&status=b` and `items[0]=x`
//! produce the same structure regardless of where they came from.

use serde_json::{Map, Value};

/// Highest numeric index turned into an array position.
const ARRAY_LIMIT: usize = 100;

/// Maximum number of bracket groups split out of one key.
const DEPTH: usize = 5;

/// Decode a URL-encoded string (a leading `?` is ignored).
pub fn parse_query(query: &str) -> Value {
    let query = query.strip_prefix('?').unwrap_or(query);
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query).unwrap_or_default();
    decode_pairs(pairs)
}

/// Decode ordered pairs into a nested object.
pub fn decode_pairs<I>(pairs: I) -> Value
where
    I: IntoIterator<Item = (String, String)>,
{
    // Repeated raw keys are combined first, in order of appearance.
    let mut grouped = Map::new();
    for (key, value) in pairs {
        if key.is_empty() {
            continue;
        }
        match grouped.get_mut(&key) {
            Some(Value::Array(values)) => values.push(Value::String(value)),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(value)]);
            }
            None => {
                grouped.insert(key, Value::String(value));
            }
        }
    }

    let mut result = Value::Object(Map::new());
    for (key, value) in grouped {
        let chain = split_key(&key);
        result = merge(result, build_object(&chain, value));
    }
    compact(&mut result);
    result
}

/// Split a raw key into its parent and bracket groups.
///
/// Dots are rewritten to brackets first, so `a.b[c]` and `a[b][c]` split the
/// same way.
fn split_key(raw: &str) -> Vec<String> {
    let key = dots_to_brackets(raw);
    let mut chain = Vec::new();

    let first_group = find_group(&key, 0);
    let parent_end = first_group.map(|(start, _)| start).unwrap_or(key.len());
    if parent_end > 0 {
        chain.push(key[..parent_end].to_string());
    }

    let mut cursor = parent_end;
    let mut depth = 0;
    while let Some((start, end)) = find_group(&key, cursor) {
        if depth == DEPTH {
            chain.push(format!("[{}]", &key[start..]));
            break;
        }
        chain.push(key[start..end].to_string());
        cursor = end;
        depth += 1;
    }

    chain
}

/// `a.b.c` becomes `a[b][c]`; a dot followed by `.` or `[` is left alone.
fn dots_to_brackets(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    let mut chars = key.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '.' && matches!(chars.peek(), Some(c) if *c != '.' && *c != '[') {
            out.push('[');
            while let Some(c) = chars.peek() {
                if *c == '.' || *c == '[' {
                    break;
                }
                out.push(*c);
                chars.next();
            }
            out.push(']');
        } else {
            out.push(ch);
        }
    }
    out
}

/// Next `[...]` group without nested brackets, starting at `from`.
fn find_group(key: &str, from: usize) -> Option<(usize, usize)> {
    let bytes = key.as_bytes();
    let mut start = None;
    for (i, byte) in bytes.iter().enumerate().skip(from) {
        match byte {
            b'[' => start = Some(i),
            b']' => {
                if let Some(s) = start {
                    return Some((s, i + 1));
                }
            }
            _ => {}
        }
    }
    None
}

/// Build the innermost-out structure for one key chain.
fn build_object(chain: &[String], value: Value) -> Value {
    let mut leaf = value;

    for root in chain.iter().rev() {
        if root == "[]" {
            leaf = match leaf {
                Value::Array(items) => Value::Array(items),
                other => Value::Array(vec![other]),
            };
            continue;
        }

        let bracketed = root.len() >= 2 && root.starts_with('[') && root.ends_with(']');
        let clean = if bracketed { &root[1..root.len() - 1] } else { root.as_str() };

        let index = clean
            .parse::<usize>()
            .ok()
            .filter(|i| bracketed && i.to_string() == clean && *i <= ARRAY_LIMIT);

        leaf = match index {
            Some(index) => {
                let mut items = vec![Value::Null; index];
                items.push(leaf);
                Value::Array(items)
            }
            None => {
                let mut map = Map::new();
                map.insert(clean.to_string(), leaf);
                Value::Object(map)
            }
        };
    }

    leaf
}

/// Merge `source` into `target` the way repeated and overlapping keys
/// combine.
///
/// `Null` only ever marks a hole in a sparse array.
fn merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Array(mut items), source @ Value::String(_)) => {
            items.push(source);
            Value::Array(items)
        }
        (Value::Object(mut map), Value::String(key)) => {
            map.insert(key, Value::Bool(true));
            Value::Object(map)
        }
        (target, source) if !is_container(&target) => {
            let mut items = vec![target];
            match source {
                Value::Array(rest) => items.extend(rest.into_iter().filter(|v| !v.is_null())),
                other => items.push(other),
            }
            Value::Array(items)
        }
        (target, source) if !is_container(&source) => Value::Array(vec![target, source]),
        (Value::Array(mut items), Value::Array(source)) => {
            for (i, item) in source.into_iter().enumerate() {
                if item.is_null() {
                    continue;
                }
                match items.get_mut(i) {
                    Some(existing) if !existing.is_null() => {
                        if is_container(existing) && is_container(&item) {
                            let current = existing.take();
                            *existing = merge(current, item);
                        } else {
                            items.push(item);
                        }
                    }
                    Some(hole) => *hole = item,
                    None => {
                        items.resize(i, Value::Null);
                        items.push(item);
                    }
                }
            }
            Value::Array(items)
        }
        (Value::Array(items), Value::Object(source)) => {
            merge(Value::Object(array_to_object(items)), Value::Object(source))
        }
        (Value::Object(map), Value::Array(items)) => {
            merge(Value::Object(map), Value::Object(array_to_object(items)))
        }
        (Value::Object(mut map), Value::Object(source)) => {
            for (key, value) in source {
                let merged = match map.remove(&key) {
                    Some(existing) => merge(existing, value),
                    None => value,
                };
                map.insert(key, merged);
            }
            Value::Object(map)
        }
        (target, _) => target,
    }
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Array(_) | Value::Object(_))
}

fn array_to_object(items: Vec<Value>) -> Map<String, Value> {
    items
        .into_iter()
        .enumerate()
        .filter(|(_, v)| !v.is_null())
        .map(|(i, v)| (i.to_string(), v))
        .collect()
}

/// Drop sparse-array holes, recursively.
fn compact(value: &mut Value) {
    match value {
        Value::Array(items) => {
            items.retain(|v| !v.is_null());
            items.iter_mut().for_each(compact);
        }
        Value::Object(map) => map.values_mut().for_each(compact),
        _ => {}
    }
}
