//! Evolve signals carried in contract state.
//!
//! A contract evolves by writing the id of a new source into its own state,
//! either as a top-level `evolve` field or as an `evolve` entry of a
//! `settings` list of `[key, value]` pairs. `canEvolve: false` disables it.

use serde_json::Value;

/// Length of a base64url transaction id.
pub const SRC_TX_ID_LEN: usize = 43;

fn setting<'a>(state: &'a Value, key: &str) -> Option<&'a Value> {
    state
        .get("settings")?
        .as_array()?
        .iter()
        .filter_map(Value::as_array)
        .find(|pair| pair.first().and_then(Value::as_str) == Some(key))
        .and_then(|pair| pair.get(1))
}

fn field<'a>(state: &'a Value, key: &str) -> Option<&'a Value> {
    if state.get("settings").is_some() {
        setting(state, key)
    } else {
        state.get(key)
    }
}

/// Whether the state allows evolving. Defaults to `true`.
#[must_use]
pub fn can_evolve(state: &Value) -> bool {
    field(state, "canEvolve")
        .and_then(Value::as_bool)
        .unwrap_or(true)
}

/// Evolved source id requested by the state, if evolving is allowed.
#[must_use]
pub fn evolved_src(state: &Value) -> Option<String> {
    if !can_evolve(state) {
        return None;
    }
    field(state, "evolve")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Whether `id` looks like a transaction id (43 base64url characters).
#[must_use]
pub fn is_valid_src_id(id: &str) -> bool {
    id.len() == SRC_TX_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
