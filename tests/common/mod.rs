use i18n_compact::{Value, ValueTree};

/// Builds a tree level from `(key, value)` pairs, preserving order.
#[must_use]
pub fn tree(pairs: &[(&str, Value)]) -> ValueTree {
    pairs
        .iter()
        .map(|(key, value)| (std::sync::Arc::from(*key), value.clone()))
        .collect()
}

/// Shorthand for a UTF-8 string leaf.
#[must_use]
pub fn s(value: &str) -> Value {
    Value::from(value)
}
