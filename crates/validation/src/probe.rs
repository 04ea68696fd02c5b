//! Duplicate-key audit.
//!
//! `serde_json::Value` keeps only the last of repeated keys, so duplicates
//! are found with a separate streaming pass over the same text.

use corpus_core::fields;
use serde::de::{self, DeserializeSeed, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use std::collections::HashSet;
use std::fmt;

/// Keys that appear more than once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyAudit {
    /// Repeated top-level keys.
    pub top_level: Vec<String>,
    /// Repeated keys inside `technical_indicators`.
    pub indicators: Vec<String>,
}

impl KeyAudit {
    /// Whether nothing was repeated.
    pub fn is_clean(&self) -> bool {
        self.top_level.is_empty() && self.indicators.is_empty()
    }
}

/// Audit a JSON object for repeated keys.
///
/// Returns an error if the text is not a JSON object.
pub fn audit_keys(text: &str) -> Result<KeyAudit, serde_json::Error> {
    let mut deserializer = serde_json::Deserializer::from_str(text);
    (&mut deserializer).deserialize_map(TopLevel)
}

struct TopLevel;

impl<'de> Visitor<'de> for TopLevel {
    type Value = KeyAudit;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a JSON object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<KeyAudit, A::Error> {
        let mut seen = HashSet::new();
        let mut audit = KeyAudit::default();
        while let Some(key) = map.next_key::<String>()? {
            if key == fields::TECHNICAL_INDICATORS {
                audit.indicators.extend(map.next_value_seed(RepeatedKeys)?);
            } else {
                map.next_value::<IgnoredAny>()?;
            }
            if !seen.insert(key.clone()) {
                audit.top_level.push(key);
            }
        }
        Ok(audit)
    }
}

/// Repeated keys of a nested object; any other value yields nothing.
struct RepeatedKeys;

impl<'de> DeserializeSeed<'de> for RepeatedKeys {
    type Value = Vec<String>;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Vec<String>, D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for RepeatedKeys {
    type Value = Vec<String>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Vec<String>, A::Error> {
        let mut seen = HashSet::new();
        let mut repeated = Vec::new();
        while let Some(key) = map.next_key::<String>()? {
            map.next_value::<IgnoredAny>()?;
            if !seen.insert(key.clone()) {
                repeated.push(key);
            }
        }
        Ok(repeated)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Vec<String>, A::Error> {
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(Vec::new())
    }

    fn visit_bool<E: de::Error>(self, _: bool) -> Result<Vec<String>, E> {
        Ok(Vec::new())
    }

    fn visit_i64<E: de::Error>(self, _: i64) -> Result<Vec<String>, E> {
        Ok(Vec::new())
    }

    fn visit_u64<E: de::Error>(self, _: u64) -> Result<Vec<String>, E> {
        Ok(Vec::new())
    }

    fn visit_f64<E: de::Error>(self, _: f64) -> Result<Vec<String>, E> {
        Ok(Vec::new())
    }

    fn visit_str<E: de::Error>(self, _: &str) -> Result<Vec<String>, E> {
        Ok(Vec::new())
    }

    fn visit_unit<E: de::Error>(self) -> Result<Vec<String>, E> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_object() {
        let audit = audit_keys(r#"{"a": 1, "technical_indicators": {"rsi": 50}}"#).unwrap();
        assert!(audit.is_clean());
    }

    #[test]
    fn test_top_level_duplicate() {
        let audit = audit_keys(r#"{"action": "BUY", "action": "SELL"}"#).unwrap();
        assert_eq!(audit.top_level, vec!["action".to_string()]);
    }

    #[test]
    fn test_indicator_duplicate() {
        let audit =
            audit_keys(r#"{"technical_indicators": {"rsi": 50, "macd": 1, "rsi": 70}}"#).unwrap();
        assert_eq!(audit.indicators, vec!["rsi".to_string()]);
        assert!(audit.top_level.is_empty());
    }

    #[test]
    fn test_non_object_indicators_ignored() {
        let audit = audit_keys(r#"{"technical_indicators": [1, {"a": 1}], "x": null}"#).unwrap();
        assert!(audit.is_clean());
    }

    #[test]
    fn test_not_an_object() {
        assert!(audit_keys("[1, 2]").is_err());
    }
}
