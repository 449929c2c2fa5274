//! Tolerant numeric extraction from heterogeneous JSON payloads.
//!
//! The game's APIs report numbers inconsistently: sometimes as JSON numbers,
//! sometimes as strings with thousands separators ("1,234.5"), sometimes
//! buried several levels deep under drifting key names. These helpers pull a
//! usable `f64` out of whatever shape arrives, or return `None` — they never
//! fail loudly, because a dropped field is recoverable and a panic is not.

use serde_json::Value;

/// Best-effort conversion of a JSON value to `f64`.
///
/// Strings are scanned for their first numeric token, so `"1,234.5 BUILD"`
/// parses to `1234.5`. Booleans and nulls yield `None`.
pub fn parse_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => extract_number(s),
        _ => None,
    }
}

/// Scan a string for its first numeric token, tolerating a leading sign and
/// embedded thousands separators.
pub fn extract_number(s: &str) -> Option<f64> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let negative = bytes[i] == b'-' && i + 1 < bytes.len() && bytes[i + 1].is_ascii_digit();
        let start_digit = if negative { i + 1 } else { i };
        if bytes.get(start_digit).is_some_and(|b| b.is_ascii_digit()) {
            let mut end = start_digit;
            let mut seen_dot = false;
            while end < bytes.len() {
                match bytes[end] {
                    b'0'..=b'9' | b',' => end += 1,
                    b'.' if !seen_dot => {
                        seen_dot = true;
                        end += 1;
                    }
                    _ => break,
                }
            }
            let token: String = s[i..end].chars().filter(|c| *c != ',').collect();
            return token.parse::<f64>().ok();
        }
        i += 1;
    }
    None
}

/// Recursively walk a JSON document collecting every numeric leaf together
/// with its lowercased dotted key path (`"data.user_asset.build"`).
///
/// Array elements keep their parent's path with an index suffix, so keyword
/// matching still works for numbers inside lists of objects.
pub fn numeric_fields(v: &Value) -> Vec<(String, f64)> {
    let mut found = Vec::new();
    walk(v, String::new(), &mut found);
    found
}

fn walk(v: &Value, path: String, found: &mut Vec<(String, f64)>) {
    match v {
        Value::Object(map) => {
            for (k, vv) in map {
                let next = if path.is_empty() {
                    k.to_lowercase()
                } else {
                    format!("{path}.{}", k.to_lowercase())
                };
                match vv {
                    Value::Object(_) | Value::Array(_) => walk(vv, next, found),
                    other => {
                        if let Some(n) = parse_number(other) {
                            found.push((next, n));
                        }
                    }
                }
            }
        }
        Value::Array(items) => {
            for (idx, item) in items.iter().enumerate() {
                walk(item, format!("{path}[{idx}]"), found);
            }
        }
        _ => {}
    }
}

/// Find the first numeric field whose key path contains any of the given
/// keywords. Fields are visited in traversal order (objects by key, depth
/// first), so the match is deterministic under schema drift — callers should
/// try exact known keys before falling back to this.
pub fn find_keyed_number(v: &Value, keywords: &[&str]) -> Option<f64> {
    numeric_fields(v)
        .into_iter()
        .find(|(path, _)| keywords.iter().any(|kw| path.contains(kw)))
        .map(|(_, n)| n)
}
