use serde_json::{Map, Value};

/// Data points whose value differs from the previous report, sorted by code.
/// Codes missing from `current` are not reported.
pub(crate) fn diff_status(
    previous: &Map<String, Value>,
    current: &Map<String, Value>,
) -> Vec<(String, Value, Value)> {
    current
        .iter()
        .filter_map(|(code, new)| match previous.get(code) {
            Some(old) if old == new => None,
            Some(old) => Some((code.clone(), old.clone(), new.clone())),
            None => Some((code.clone(), Value::Null, new.clone())),
        })
        .collect()
}
