// SPDX-FileCopyrightText: 2026 Coderelay contributors
// SPDX-License-Identifier: MIT

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Extension properties carried by graph records beyond their typed core.
pub type PropMap = BTreeMap<String, PropValue>;

/// A closed value type for dynamic property bags.
///
/// Components, tasks, and relationships accept arbitrary extra metadata; this
/// keeps those bags structured without falling back to unchecked dynamic
/// typing. Nested lists/maps are allowed, other JSON shapes (e.g. null) are
/// rejected at deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum PropValue {
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<PropValue>),
    Map(BTreeMap<String, PropValue>),
}

impl PropValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

#[cfg(test)]
mod tests {
    use super::PropValue;

    #[test]
    fn deserializes_scalars_and_nesting() {
        let value: PropValue =
            serde_json::from_str(r#"{"lang": "rust", "loc": 1200, "flags": [true, false]}"#)
                .expect("prop value");
        let PropValue::Map(map) = value else { panic!("expected map") };
        assert_eq!(map["lang"], PropValue::String("rust".to_owned()));
        assert_eq!(map["loc"], PropValue::Number(1200.0));
        assert_eq!(
            map["flags"],
            PropValue::List(vec![PropValue::Bool(true), PropValue::Bool(false)])
        );
    }

    #[test]
    fn rejects_null() {
        let result: Result<PropValue, _> = serde_json::from_str("null");
        result.unwrap_err();
    }

    #[test]
    fn round_trips_through_json() {
        let value = PropValue::List(vec![PropValue::from("a"), PropValue::from(2.0)]);
        let json = serde_json::to_string(&value).expect("serialize");
        assert_eq!(json, r#"["a",2.0]"#);
        let back: PropValue = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, value);
    }
}
