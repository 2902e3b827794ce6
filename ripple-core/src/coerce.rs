//! Tolerant coercion of LLM-produced JSON values.
//!
//! Models sometimes wrap a scalar in an object (`{"value": 0.8, "reason": ..}`)
//! or send numbers as strings. The lookup keys for unwrapping live in the
//! two tables below and nowhere else.

use serde_json::Value;

/// Keys probed, in order, when a float arrives wrapped in an object.
pub const FLOAT_KEYS: &[&str] = &["value", "score", "energy", "initial_energy"];

/// Keys probed, in order, when an integer arrives wrapped in an object.
pub const INT_KEYS: &[&str] = &["value", "count", "total", "estimated_total_waves"];

/// Coerce to `f64`, returning `None` when nothing numeric is found.
pub fn try_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Object(map) => FLOAT_KEYS
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_f64)),
        _ => None,
    }
}

/// Coerce to `f64` with a fallback.
pub fn as_f64(value: Option<&Value>, default: f64) -> f64 {
    value.and_then(try_f64).unwrap_or(default)
}

/// Coerce to `i64`, truncating floats. `None` when nothing numeric is found.
pub fn try_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        Value::Object(map) => INT_KEYS.iter().find_map(|k| {
            map.get(*k)
                .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        }),
        _ => None,
    }
}

/// Coerce to `i64` with a fallback.
pub fn as_i64(value: Option<&Value>, default: i64) -> i64 {
    value.and_then(try_i64).unwrap_or(default)
}

/// Truthiness of a JSON value.
pub fn as_bool(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "yes" | "1"
        ),
        _ => false,
    }
}

/// Render any value as display text. Strings pass through unquoted.
pub fn as_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Normalise a time-window value. A bare number means hours.
pub fn as_window(value: Option<&Value>) -> String {
    match value {
        Some(Value::Number(n)) => format!("{}h", n),
        other => as_text(other),
    }
}

/// Clamp into `[0, 1]`, mapping NaN to 0.
pub fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}
