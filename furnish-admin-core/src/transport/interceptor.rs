//! Turns non-2xx answers into classified [`ApiError`]s.

use crate::error::ApiError;
use serde_json::Value;
use std::time::Duration;

pub fn classify_status(status: u16, body: &Value, retry_after: Option<Duration>) -> ApiError {
    let message = server_message(body);
    match status {
        401 => ApiError::Unauthorized { message },
        403 => ApiError::Forbidden { message },
        422 => ApiError::Validation {
            errors: validation_errors(body),
            message,
        },
        429 => ApiError::RateLimited { retry_after },
        500..=599 => ApiError::Server { status, message },
        _ => ApiError::Http { status, message },
    }
}

/// Best human-readable message in an error body.
pub fn server_message(body: &Value) -> Option<String> {
    match body {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Object(map) => ["message", "error"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string),
        _ => None,
    }
}

/// The `errors` map of a 422 body, keeping the server's field order.
fn validation_errors(body: &Value) -> Vec<(String, Vec<String>)> {
    let Some(errors) = body.get("errors").and_then(Value::as_object) else {
        return Vec::new();
    };

    errors
        .iter()
        .map(|(field, messages)| {
            let messages = match messages {
                Value::Array(items) => items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
                Value::String(message) => vec![message.clone()],
                _ => Vec::new(),
            };
            (field.clone(), messages)
        })
        .collect()
}

/// `Retry-After` in its delay-seconds form. HTTP dates are ignored.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
