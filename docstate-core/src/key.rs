//! Document keys and identifier-field extraction.

use crate::Document;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

/// Key extracted from a document's identifier field.
///
/// Strings and numbers are keys. Numbers keep their canonical JSON text, so
/// the number `1` and the string `"1"` are different keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DocKey {
    Str(String),
    Num(String),
}

impl DocKey {
    /// Build a key from a JSON value.
    ///
    /// Returns `None` for `null`, booleans, arrays and objects.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(DocKey::Str(s.clone())),
            Value::Number(n) => Some(DocKey::Num(n.to_string())),
            _ => None,
        }
    }

    /// Convert the key back into the JSON value it was read from.
    pub fn to_value(&self) -> Value {
        match self {
            DocKey::Str(s) => Value::String(s.clone()),
            DocKey::Num(n) => {
                serde_json::from_str(n).unwrap_or_else(|_| Value::String(n.clone()))
            }
        }
    }
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocKey::Str(s) | DocKey::Num(s) => f.write_str(s),
        }
    }
}

impl From<&str> for DocKey {
    fn from(s: &str) -> Self {
        DocKey::Str(s.to_string())
    }
}

impl From<String> for DocKey {
    fn from(s: String) -> Self {
        DocKey::Str(s)
    }
}

impl From<i64> for DocKey {
    fn from(n: i64) -> Self {
        DocKey::Num(n.to_string())
    }
}

impl From<u64> for DocKey {
    fn from(n: u64) -> Self {
        DocKey::Num(n.to_string())
    }
}

/// Accessor for the identifier field of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyField {
    field: String,
}

impl KeyField {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.field
    }

    /// Extract the key of a document, if it has a usable one.
    pub fn key_of(&self, doc: &Document) -> Option<DocKey> {
        doc.get(&self.field).and_then(DocKey::from_value)
    }

    /// Write `key` into the identifier field of `doc`.
    pub fn attach(&self, doc: &mut Document, key: &DocKey) {
        doc.insert(self.field.clone(), key.to_value());
    }
}

impl Default for KeyField {
    fn default() -> Self {
        Self::new(crate::DEFAULT_ID_FIELD)
    }
}

/// Keep the first document for each distinct key, in input order.
///
/// Documents without a key are dropped.
pub fn dedupe_by_key<'a, I>(docs: I, key_field: &KeyField) -> Vec<(DocKey, &'a Document)>
where
    I: IntoIterator<Item = &'a Document>,
{
    let mut seen = HashSet::new();
    docs.into_iter()
        .filter_map(|doc| key_field.key_of(doc).map(|key| (key, doc)))
        .filter(|(key, _)| seen.insert(key.clone()))
        .collect()
}

/// Owned variant of [`dedupe_by_key`] that returns only the documents.
pub fn dedupe_owned<I>(docs: I, key_field: &KeyField) -> Vec<Document>
where
    I: IntoIterator<Item = Document>,
{
    let mut seen = HashSet::new();
    docs.into_iter()
        .filter(|doc| match key_field.key_of(doc) {
            Some(key) => seen.insert(key),
            None => false,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    #[test]
    fn test_key_from_string_and_number() {
        assert_eq!(
            DocKey::from_value(&json!("abc")),
            Some(DocKey::Str("abc".to_string()))
        );
        assert_eq!(DocKey::from_value(&json!(42)), Some(DocKey::from(42i64)));
    }

    #[test]
    fn test_numeric_and_string_keys_differ() {
        let num = DocKey::from_value(&json!(1)).unwrap();
        let text = DocKey::from_value(&json!("1")).unwrap();
        assert_ne!(num, text);
        assert_eq!(num.to_string(), text.to_string());
    }

    #[test]
    fn test_nullish_values_are_not_keys() {
        assert!(DocKey::from_value(&Value::Null).is_none());
        assert!(DocKey::from_value(&json!(true)).is_none());
        assert!(DocKey::from_value(&json!([1])).is_none());
        assert!(DocKey::from_value(&json!({"a": 1})).is_none());
    }

    #[test]
    fn test_to_value_preserves_type() {
        assert_eq!(DocKey::from(7i64).to_value(), json!(7));
        assert_eq!(DocKey::from("7").to_value(), json!("7"));
    }

    #[test]
    fn test_key_field_extract_and_attach() {
        let field = KeyField::new("uid");
        let mut d = doc(json!({"data": "x"}));
        assert!(field.key_of(&d).is_none());

        field.attach(&mut d, &DocKey::from("u-1"));
        assert_eq!(field.key_of(&d), Some(DocKey::from("u-1")));
        assert_eq!(d.get("uid"), Some(&json!("u-1")));
    }

    #[test]
    fn test_dedupe_keeps_first_occurrence_in_order() {
        let a = doc(json!({"id": "a", "v": 1}));
        let b = doc(json!({"id": "b", "v": 1}));
        let a2 = doc(json!({"id": "a", "v": 2}));
        let c = doc(json!({"id": "c", "v": 1}));
        let input = vec![a.clone(), b.clone(), a2, c.clone()];

        let deduped = dedupe_by_key(&input, &KeyField::default());
        let docs: Vec<&Document> = deduped.iter().map(|(_, d)| *d).collect();
        assert_eq!(docs, vec![&a, &b, &c]);

        let owned = dedupe_owned(input, &KeyField::default());
        assert_eq!(owned, vec![a, b, c]);
    }

    #[test]
    fn test_dedupe_drops_keyless_documents() {
        let input = vec![doc(json!({"data": 1})), doc(json!({"id": null}))];
        assert!(dedupe_by_key(&input, &KeyField::default()).is_empty());
    }
}
