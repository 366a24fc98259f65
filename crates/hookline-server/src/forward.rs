//! Conditional forwarding of captured requests with retry and backoff.
//!
//! Runs entirely on background tasks spawned after the capture commit;
//! nothing here may hold onto the inbound request context. Delivery is
//! at-least-once: every outbound call is recorded as a `ForwardAttempt`
//! row, success being the first response with a status below 400.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde_json::{Map, Value};
use tracing::{error, warn};
use uuid::Uuid;

use hookline_relay_db::body as body_codec;
use hookline_relay_db::entities::forwarding_rule;
use hookline_relay_db::store::{self, AttemptOutcome};

use crate::headers::{apply_json_headers, header_map_to_json, lookup_header};
use crate::AppState;

/// Per-attempt HTTP timeout.
pub const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Response bodies are captured up to this many bytes.
pub const RESPONSE_CAPTURE_LIMIT: usize = 1024 * 1024;

/// Fan a freshly captured request out to every matching enabled rule.
/// Each match gets its own independent task.
pub async fn trigger_forwarding(
    state: Arc<AppState>,
    endpoint_id: Uuid,
    request_id: Uuid,
    method: String,
    headers: Value,
    body: Bytes,
) {
    let rules = match store::enabled_rules_for(&state.db, endpoint_id).await {
        Ok(rules) => rules,
        Err(err) => {
            error!(%endpoint_id, error = %err, "failed to fetch forwarding rules");
            return;
        }
    };

    for rule in rules {
        if !condition_matches(
            rule.condition_type.as_deref(),
            rule.condition_config.as_ref(),
            &headers,
            &body,
        ) {
            continue;
        }

        let state = Arc::clone(&state);
        let method = method.clone();
        let headers = headers.clone();
        let body = body.clone();
        tokio::spawn(async move {
            forward_request(state, request_id, rule, method, headers, body).await;
        });
    }
}

/// Evaluate a rule's condition against the captured headers and raw body.
/// Unknown condition types match (fail-open); malformed configs do not.
pub fn condition_matches(
    condition_type: Option<&str>,
    config: Option<&Value>,
    headers: &Value,
    body: &[u8],
) -> bool {
    match condition_type {
        None | Some("always") => true,
        Some("header_match") => {
            let Some(config) = config else { return false };
            let (Some(name), Some(want)) = (
                config.get("header").and_then(Value::as_str),
                config.get("value").and_then(Value::as_str),
            ) else {
                return false;
            };
            match lookup_header(headers, name) {
                Some(Value::String(s)) => s == want,
                Some(Value::Array(items)) => {
                    items.first().and_then(Value::as_str) == Some(want)
                }
                _ => false,
            }
        }
        Some("body_match") => {
            let Some(pattern) = config
                .and_then(|c| c.get("pattern"))
                .and_then(Value::as_str)
            else {
                return false;
            };
            if pattern.is_empty() {
                return true;
            }
            body.windows(pattern.len()).any(|w| w == pattern.as_bytes())
        }
        Some(_) => true,
    }
}

/// Validate a condition's shape at rule creation time, so evaluation
/// never has to guess about malformed configs.
pub fn validate_condition(
    condition_type: Option<&str>,
    config: Option<&Value>,
) -> Result<(), String> {
    match condition_type {
        None | Some("always") => Ok(()),
        Some("header_match") => {
            let valid = config
                .map(|c| {
                    c.get("header").and_then(Value::as_str).is_some()
                        && c.get("value").and_then(Value::as_str).is_some()
                })
                .unwrap_or(false);
            if valid {
                Ok(())
            } else {
                Err("header_match requires a config with string `header` and `value`".to_string())
            }
        }
        Some("body_match") => {
            let valid = config
                .map(|c| c.get("pattern").and_then(Value::as_str).is_some())
                .unwrap_or(false);
            if valid {
                Ok(())
            } else {
                Err("body_match requires a config with a string `pattern`".to_string())
            }
        }
        Some(other) => Err(format!("unknown condition type: {other}")),
    }
}

/// Retry backoff parameters, parsed leniently from the rule's JSON config.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    pub kind: Option<String>,
    pub base: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

impl BackoffConfig {
    pub fn from_value(config: &Value) -> Self {
        let number = |key: &str, default: f64| {
            config
                .get(key)
                .and_then(Value::as_f64)
                .filter(|n| *n != 0.0)
                .unwrap_or(default)
        };
        Self {
            kind: config
                .get("type")
                .and_then(Value::as_str)
                .map(str::to_string),
            base: number("base", 2.0),
            min_ms: number("min_ms", 1000.0),
            max_ms: number("max_ms", 30000.0),
        }
    }

    /// Delay after failed attempt `attempt` (1-based), before the next
    /// try, clamped to `[min_ms, max_ms]`. The schedule is the one the
    /// delivery pipeline has always used: the "exponential" curve grows
    /// linearly in the attempt number.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let mut delay_ms = match self.kind.as_deref() {
            Some("exponential") => self.min_ms * (self.base * (attempt as f64 - 1.0)),
            Some("linear") => self.min_ms * attempt as f64,
            _ => self.min_ms,
        };
        if delay_ms > self.max_ms {
            delay_ms = self.max_ms;
        }
        if delay_ms < self.min_ms {
            delay_ms = self.min_ms;
        }
        Duration::from_millis(delay_ms as u64)
    }
}

/// Deliver one (request, rule) pair: transform, then retry until the
/// first success or `max_retries` attempts.
async fn forward_request(
    state: Arc<AppState>,
    request_id: Uuid,
    rule: forwarding_rule::Model,
    original_method: String,
    headers: Value,
    body: Bytes,
) {
    let method = rule
        .method
        .clone()
        .filter(|m| !m.is_empty())
        .unwrap_or(original_method);

    let body_data = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()))
    };

    let (transformed_headers, transformed_body) =
        match hookline_transform::apply_request_transformations(
            &state.db,
            rule.endpoint_id,
            headers.clone(),
            body_data.clone(),
        )
        .await
        {
            Ok(pair) => pair,
            Err(err) => {
                warn!(rule = %rule.id, error = %err, "transformations unavailable, forwarding original payload");
                (headers, body_data)
            }
        };

    // Rule's static headers win on collision.
    let mut forward_headers = transformed_headers.as_object().cloned().unwrap_or_default();
    if let Some(rule_headers) = rule.headers.as_object() {
        for (name, value) in rule_headers {
            forward_headers.insert(name.clone(), value.clone());
        }
    }

    // Strings go out verbatim, null sends no body, anything else is
    // JSON-encoded.
    let forward_body: Option<Bytes> = match &transformed_body {
        Value::Null => None,
        Value::String(s) => Some(Bytes::from(s.clone().into_bytes())),
        other => serde_json::to_vec(other).ok().map(Bytes::from),
    };

    let max_retries = rule.max_retries.max(1) as u32;
    let backoff = BackoffConfig::from_value(&rule.backoff_config);

    for attempt in 1..=max_retries {
        let success = execute_forward(
            &state,
            request_id,
            rule.id,
            attempt as i32,
            &rule.target_url,
            &method,
            &forward_headers,
            forward_body.as_ref(),
        )
        .await;

        if success {
            return;
        }
        if attempt < max_retries {
            tokio::time::sleep(backoff.delay_after(attempt)).await;
        }
    }
}

/// One outbound call, recorded as exactly one attempt row whether it
/// produced a response or a transport error.
#[allow(clippy::too_many_arguments)]
async fn execute_forward(
    state: &Arc<AppState>,
    request_id: Uuid,
    rule_id: Uuid,
    attempt_number: i32,
    target_url: &str,
    method: &str,
    headers: &Map<String, Value>,
    body: Option<&Bytes>,
) -> bool {
    let started = Instant::now();

    let method = match reqwest::Method::from_bytes(method.as_bytes()) {
        Ok(method) => method,
        Err(err) => {
            record_attempt(
                state,
                request_id,
                rule_id,
                attempt_number,
                AttemptOutcome {
                    status: "failed".to_string(),
                    response_status: None,
                    response_headers: None,
                    response_body: None,
                    error_message: Some(format!("invalid method: {err}")),
                    duration_ms: None,
                },
            )
            .await;
            return false;
        }
    };

    let mut request = state
        .http
        .request(method, target_url)
        .timeout(ATTEMPT_TIMEOUT);
    request = apply_json_headers(request, headers);
    if let Some(body) = body {
        request = request.body(body.clone());
    }

    match request.send().await {
        Err(err) => {
            let duration = started.elapsed().as_millis() as i32;
            record_attempt(
                state,
                request_id,
                rule_id,
                attempt_number,
                AttemptOutcome {
                    status: "failed".to_string(),
                    response_status: None,
                    response_headers: None,
                    response_body: None,
                    error_message: Some(err.to_string()),
                    duration_ms: Some(duration),
                },
            )
            .await;
            false
        }
        Ok(response) => {
            let status_code = response.status().as_u16();
            let response_headers = header_map_to_json(response.headers());
            let captured = read_capped(response, RESPONSE_CAPTURE_LIMIT).await;
            let duration = started.elapsed().as_millis() as i32;

            let status = if status_code < 400 { "success" } else { "failed" };
            record_attempt(
                state,
                request_id,
                rule_id,
                attempt_number,
                AttemptOutcome {
                    status: status.to_string(),
                    response_status: Some(status_code as i32),
                    response_headers: Some(response_headers),
                    response_body: body_codec::encode_body(&captured),
                    error_message: None,
                    duration_ms: Some(duration),
                },
            )
            .await;
            status == "success"
        }
    }
}

/// Read a response body up to `cap` bytes, discarding the rest.
pub(crate) async fn read_capped(mut response: reqwest::Response, cap: usize) -> Vec<u8> {
    let mut buf = Vec::new();
    while let Ok(Some(chunk)) = response.chunk().await {
        let remaining = cap - buf.len();
        if chunk.len() >= remaining {
            buf.extend_from_slice(&chunk[..remaining]);
            break;
        }
        buf.extend_from_slice(&chunk);
    }
    buf
}

async fn record_attempt(
    state: &Arc<AppState>,
    request_id: Uuid,
    rule_id: Uuid,
    attempt_number: i32,
    outcome: AttemptOutcome,
) {
    if let Err(err) =
        store::record_forward_attempt(&state.db, request_id, rule_id, attempt_number, outcome)
            .await
    {
        error!(%request_id, %rule_id, attempt_number, error = %err, "failed to record forward attempt");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_backoff_defaults() {
        let backoff = BackoffConfig::from_value(&json!({}));
        assert_eq!(backoff.kind, None);
        assert_eq!(backoff.base, 2.0);
        assert_eq!(backoff.min_ms, 1000.0);
        assert_eq!(backoff.max_ms, 30000.0);
    }

    #[test]
    fn test_exponential_schedule() {
        let backoff = BackoffConfig::from_value(&json!({
            "type": "exponential", "base": 2, "min_ms": 1000, "max_ms": 30000
        }));
        // After the first failure the floor applies; then the curve grows
        // linearly in the attempt number.
        assert_eq!(backoff.delay_after(1), Duration::from_millis(1000));
        assert_eq!(backoff.delay_after(2), Duration::from_millis(2000));
        assert_eq!(backoff.delay_after(3), Duration::from_millis(4000));
        assert_eq!(backoff.delay_after(4), Duration::from_millis(6000));
    }

    #[test]
    fn test_linear_schedule() {
        let backoff = BackoffConfig::from_value(&json!({
            "type": "linear", "min_ms": 10, "max_ms": 100
        }));
        assert_eq!(backoff.delay_after(1), Duration::from_millis(10));
        assert_eq!(backoff.delay_after(2), Duration::from_millis(20));
        assert_eq!(backoff.delay_after(3), Duration::from_millis(30));
    }

    #[test]
    fn test_unknown_type_uses_min_delay() {
        let backoff = BackoffConfig::from_value(&json!({"type": "fibonacci", "min_ms": 50}));
        assert_eq!(backoff.delay_after(1), Duration::from_millis(50));
        assert_eq!(backoff.delay_after(7), Duration::from_millis(50));
    }

    #[test]
    fn test_max_ms_caps_the_delay() {
        let backoff = BackoffConfig::from_value(&json!({
            "type": "linear", "min_ms": 1000, "max_ms": 2500
        }));
        assert_eq!(backoff.delay_after(10), Duration::from_millis(2500));
    }

    #[test]
    fn test_min_ms_floors_the_delay() {
        let backoff = BackoffConfig::from_value(&json!({
            "type": "exponential", "min_ms": 1000, "max_ms": 30000
        }));
        // base * (1 - 1) = 0 computes below the floor.
        assert_eq!(backoff.delay_after(1), Duration::from_millis(1000));
    }

    #[test]
    fn test_condition_always_and_absent_match() {
        assert!(condition_matches(None, None, &json!({}), b""));
        assert!(condition_matches(Some("always"), None, &json!({}), b""));
    }

    #[test]
    fn test_condition_unknown_type_fails_open() {
        assert!(condition_matches(Some("phase-of-moon"), None, &json!({}), b""));
    }

    #[test]
    fn test_header_match() {
        let config = json!({"header": "x-event", "value": "push"});
        let headers = json!({"x-event": "push"});
        assert!(condition_matches(Some("header_match"), Some(&config), &headers, b""));

        let headers = json!({"x-event": "pull"});
        assert!(!condition_matches(Some("header_match"), Some(&config), &headers, b""));

        let headers = json!({});
        assert!(!condition_matches(Some("header_match"), Some(&config), &headers, b""));
    }

    #[test]
    fn test_header_match_uses_first_value_of_arrays() {
        let config = json!({"header": "x-event", "value": "push"});
        let headers = json!({"x-event": ["push", "pull"]});
        assert!(condition_matches(Some("header_match"), Some(&config), &headers, b""));

        let headers = json!({"x-event": ["pull", "push"]});
        assert!(!condition_matches(Some("header_match"), Some(&config), &headers, b""));
    }

    #[test]
    fn test_header_match_with_malformed_config_does_not_match() {
        let config = json!({"header": "x-event"});
        assert!(!condition_matches(Some("header_match"), Some(&config), &json!({}), b""));
        assert!(!condition_matches(Some("header_match"), None, &json!({}), b""));
    }

    #[test]
    fn test_body_match_is_byte_exact_substring() {
        let config = json!({"pattern": "\"type\":\"order\""});
        assert!(condition_matches(
            Some("body_match"),
            Some(&config),
            &json!({}),
            br#"{"type":"order","id":9}"#
        ));
        assert!(!condition_matches(
            Some("body_match"),
            Some(&config),
            &json!({}),
            br#"{"type":"refund"}"#
        ));
    }

    #[test]
    fn test_validate_condition() {
        assert!(validate_condition(None, None).is_ok());
        assert!(validate_condition(Some("always"), None).is_ok());
        assert!(validate_condition(
            Some("header_match"),
            Some(&json!({"header": "x", "value": "y"}))
        )
        .is_ok());
        assert!(validate_condition(Some("header_match"), Some(&json!({"header": "x"}))).is_err());
        assert!(validate_condition(Some("body_match"), Some(&json!({"pattern": "p"}))).is_ok());
        assert!(validate_condition(Some("body_match"), None).is_err());
        assert!(validate_condition(Some("phase-of-moon"), None).is_err());
    }
}
