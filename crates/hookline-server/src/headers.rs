//! Header conversions between HTTP maps and the stored JSON shape.
//!
//! Stored shape: header name -> string, or an ordered array of strings
//! for multi-valued headers.

use axum::http::HeaderMap;
use serde_json::{Map, Value};

/// Hop-by-hop and length headers never copied onto outbound requests;
/// the HTTP client computes its own.
pub const SKIP_OUTBOUND_HEADERS: [&str; 3] = ["host", "connection", "content-length"];

/// Convert an HTTP header map to the stored JSON shape.
pub fn header_map_to_json(headers: &HeaderMap) -> Value {
    let mut map = Map::new();
    for name in headers.keys() {
        let mut values: Vec<Value> = headers
            .get_all(name)
            .iter()
            .map(|v| Value::String(String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect();
        let entry = if values.len() == 1 {
            values.pop().unwrap()
        } else {
            Value::Array(values)
        };
        map.insert(name.as_str().to_string(), entry);
    }
    Value::Object(map)
}

/// Apply a JSON header map to an outbound request, expanding array values
/// and skipping headers the client manages itself.
pub fn apply_json_headers(
    mut request: reqwest::RequestBuilder,
    headers: &Map<String, Value>,
) -> reqwest::RequestBuilder {
    for (name, value) in headers {
        if SKIP_OUTBOUND_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
            continue;
        }
        match value {
            Value::Array(items) => {
                for item in items {
                    request = request.header(name.as_str(), header_value_string(item));
                }
            }
            other => {
                request = request.header(name.as_str(), header_value_string(other));
            }
        }
    }
    request
}

fn header_value_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Case-insensitive lookup in a stored header map.
pub fn lookup_header<'a>(headers: &'a Value, name: &str) -> Option<&'a Value> {
    let map = headers.as_object()?;
    map.get(name).or_else(|| {
        map.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_valued_headers_store_as_strings() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/json".parse().unwrap());

        let json = header_map_to_json(&headers);
        assert_eq!(json, json!({"content-type": "application/json"}));
    }

    #[test]
    fn test_multi_valued_headers_store_as_ordered_arrays() {
        let mut headers = HeaderMap::new();
        headers.append("x-tag", "one".parse().unwrap());
        headers.append("x-tag", "two".parse().unwrap());

        let json = header_map_to_json(&headers);
        assert_eq!(json, json!({"x-tag": ["one", "two"]}));
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let headers = json!({"x-webhook-event": "push"});
        assert_eq!(
            lookup_header(&headers, "X-Webhook-Event"),
            Some(&json!("push"))
        );
        assert_eq!(lookup_header(&headers, "x-missing"), None);
    }
}
