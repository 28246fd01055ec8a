//! Raw wire value → display value rules. Every function here is total:
//! malformed input falls back to the raw value with a warning.

use indexmap::IndexMap;
use serde_json::Value;
use tracing::warn;

use crate::types::{DpType, TempConvert};

/// String form used for table lookups and string comparisons. Strings are
/// taken verbatim, everything else as its JSON text.
pub fn value_text(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Numbers, numeric strings and booleans (as 0/1).
pub fn as_number(raw: &Value) -> Option<f64> {
    match raw {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn is_scalar_numeric(v: &Value) -> bool {
    matches!(v, Value::Number(_) | Value::Bool(_))
}

/// Boolean-like state: numeric/boolean pairs compare by value, anything
/// else by string form.
pub fn matches_on_value(raw: &Value, on_value: &Value) -> bool {
    if is_scalar_numeric(raw) && is_scalar_numeric(on_value) {
        return as_number(raw) == as_number(on_value);
    }
    value_text(raw) == value_text(on_value)
}

/// Truthiness by declared type, for switches without an explicit on value.
pub fn truthy(raw: &Value, dp_type: DpType) -> bool {
    match dp_type {
        DpType::Integer | DpType::Float => match as_number(raw) {
            Some(n) => n != 0.0,
            None => {
                warn!(raw = %raw, ?dp_type, "type cast failed, using raw truthiness");
                loose_truthy(raw)
            }
        },
        DpType::Enum | DpType::String => {
            let text = value_text(raw).to_ascii_lowercase();
            !matches!(text.as_str(), "off" | "false" | "0" | "")
        }
        DpType::Boolean | DpType::Bitfield => loose_truthy(raw),
    }
}

fn loose_truthy(raw: &Value) -> bool {
    match raw {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

pub fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Divide by `scale`, then apply the optional unit conversion (rounded to
/// one decimal). Non-numeric input comes back unchanged.
pub fn scaled(raw: &Value, scale: f64, convert: Option<TempConvert>) -> Value {
    let Some(n) = as_number(raw).filter(|_| !raw.is_boolean()) else {
        warn!(raw = %raw, "non-numeric value for scaled data point, keeping raw");
        return raw.clone();
    };
    let value = n / scale;
    let value = match convert {
        Some(c) => round1(c.to_display(value)),
        None => value,
    };
    Value::from(value)
}

/// Inverse of [`scaled`] for outbound commands: undo the unit conversion,
/// multiply by the scale and round to the integer the device expects.
pub fn to_wire(display: f64, scale: f64, convert: Option<TempConvert>) -> Value {
    let device = match convert {
        Some(c) => c.to_device(display),
        None => display,
    };
    Value::from((device * scale).round() as i64)
}

/// Table lookup by raw value (as-is, then as a string); the raw value when
/// there is no entry.
pub fn translate(raw: &Value, table: &IndexMap<String, String>) -> Value {
    if let Value::String(s) = raw
        && let Some(label) = table.get(s)
    {
        return Value::String(label.clone());
    }
    match table.get(&value_text(raw)) {
        Some(label) => Value::String(label.clone()),
        None => raw.clone(),
    }
}

/// Labels of the set bits of a bitfield, with the table keyed by bit index.
pub fn bitfield_labels(raw: &Value, table: &IndexMap<String, String>) -> Value {
    let Some(bits) = raw.as_u64().or_else(|| raw.as_str().and_then(|s| s.parse().ok())) else {
        warn!(raw = %raw, "non-integer bitfield value, keeping raw");
        return raw.clone();
    };
    let labels = table
        .iter()
        .filter_map(|(index, label)| {
            let index: u32 = index.parse().ok()?;
            (index < 64 && bits & (1u64 << index) != 0).then(|| Value::String(label.clone()))
        })
        .collect();
    Value::Array(labels)
}
