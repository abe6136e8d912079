//! Raw schema node reads.
//!
//! [`RawNode`] is the only place that pattern-matches the parsed document
//! representation; every schema accessor goes through it, so the rest of the
//! engine never depends on a concrete document format.

use serde_json::Value;

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Typed reads over a single parsed node.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RawNode<'a>(pub(crate) &'a Value);

impl<'a> RawNode<'a> {
    pub fn value(&self) -> &'a Value {
        self.0
    }

    pub fn has(&self, key: &str) -> bool {
        self.0.as_object().is_some_and(|map| map.contains_key(key))
    }

    pub fn child(&self, key: &str) -> Option<RawNode<'a>> {
        self.0.get(key).map(RawNode)
    }

    pub fn string(&self, key: &str) -> Option<&'a str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn boolean(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    pub fn unsigned(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Value::as_u64)
    }

    /// Ordered map entries of an object-valued child.
    pub fn entries(&self, key: &str) -> Option<impl Iterator<Item = (&'a String, &'a Value)>> {
        self.0
            .get(key)
            .and_then(Value::as_object)
            .map(|map| map.iter())
    }

    /// Elements of an array-valued child.
    pub fn elements(&self, key: &str) -> Option<&'a [Value]> {
        self.0.get(key).and_then(Value::as_array).map(Vec::as_slice)
    }

    /// Elements of an array-valued child that are strings.
    pub fn string_elements(&self, key: &str) -> Option<Vec<String>> {
        self.elements(key).map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(String::from))
                .collect()
        })
    }
}
