//! Caller-supplied simulation request.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use ripple_core::coerce;

/// Free-form simulation input (event, source, historical data, horizon...).
///
/// The engine only interprets `simulation_horizon` and `historical`; every
/// other field is passed through to the decision agent verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimulationInput {
    fields: Map<String, Value>,
}

impl SimulationInput {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Wrap a JSON value. Non-objects are stored under `"event"`.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self { fields },
            other => {
                let mut fields = Map::new();
                fields.insert("event".to_string(), other);
                Self { fields }
            }
        }
    }

    pub fn with_field(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Horizon string, e.g. `"48h"`. A bare number means hours.
    pub fn simulation_horizon(&self) -> String {
        coerce::as_window(self.fields.get("simulation_horizon"))
    }

    /// Whether truthy historical data was supplied.
    pub fn has_historical(&self) -> bool {
        self.fields.get("historical").is_some_and(is_truthy)
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(&self.fields).unwrap_or_default()
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
