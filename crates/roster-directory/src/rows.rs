//! Roster shape normalisation
//!
//! The directory answers with one of:
//! - a header-row matrix: `[["ID", "Nombre", ...], ["V-1", "Ana", ...]]`
//! - an array of loosely-keyed objects: `[{"Nombre": "Ana", ...}]`
//! - either of the above wrapped as `{ "data": ... }`
//! - `{ "error": "..." }` when the backend failed
//!
//! Everything becomes a `Row` here; nothing downstream looks at the shape.

use crate::aliases::Field;
use indexmap::IndexMap;
use roster_core::DirectoryError;
use serde_json::Value;

/// One roster entry keyed by normalised column name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: IndexMap<String, Value>,
}

fn normalise_key(key: &str) -> String {
    key.trim().to_lowercase()
}

impl Row {
    /// Build from `(column, value)` pairs; the first occurrence of a column wins
    pub fn from_pairs<K, I>(pairs: I) -> Self
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let mut cells = IndexMap::new();
        for (key, value) in pairs {
            cells.entry(normalise_key(key.as_ref())).or_insert(value);
        }
        Self { cells }
    }

    /// First alias of `field` present with a non-null value
    #[must_use]
    pub fn get(&self, field: Field) -> Option<&Value> {
        field
            .aliases()
            .iter()
            .find_map(|alias| self.cells.get(*alias).filter(|v| !v.is_null()))
    }

    /// Field rendered as trimmed text; absent and blank read as `None`
    #[must_use]
    pub fn text(&self, field: Field) -> Option<String> {
        let text = match self.get(field)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            other => other.to_string(),
        };
        (!text.is_empty()).then_some(text)
    }

    /// Number of columns
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// No columns
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

fn header_name(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn backend_error(map: &serde_json::Map<String, Value>) -> Option<String> {
    match map.get("error")? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Normalise a raw directory response into rows
pub fn normalise(raw: Value) -> Result<Vec<Row>, DirectoryError> {
    let content = match raw {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            if let Some(message) = backend_error(&map) {
                return Err(DirectoryError::Backend(message));
            }
            match map.remove("data") {
                Some(Value::Array(items)) => items,
                Some(Value::Null) | None => Vec::new(),
                Some(other) => {
                    return Err(DirectoryError::Parse(format!(
                        "`data` is not an array: {other}"
                    )))
                }
            }
        }
        other => {
            return Err(DirectoryError::Parse(format!(
                "unexpected roster payload: {other}"
            )))
        }
    };

    let mut items = content.into_iter();
    let Some(first) = items.next() else {
        tracing::warn!("directory returned an empty roster");
        return Ok(Vec::new());
    };

    match first {
        Value::Array(headers) => {
            let headers: Vec<String> = headers.iter().map(header_name).collect();
            Ok(items
                .filter_map(|row| match row {
                    Value::Array(cells) => Some(Row::from_pairs(
                        headers.iter().zip(cells).map(|(h, v)| (h.as_str(), v)),
                    )),
                    other => {
                        tracing::debug!(row = %other, "skipping non-array row in matrix roster");
                        None
                    }
                })
                .collect())
        }
        first => Ok(std::iter::once(first)
            .chain(items)
            .filter_map(|item| match item {
                Value::Object(map) => Some(Row::from_pairs(map)),
                other => {
                    tracing::debug!(row = %other, "skipping non-object roster entry");
                    None
                }
            })
            .collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn matrix_and_objects_normalise_alike() {
        let matrix = normalise(json!([
            [" ID ", "Nombre", "Biblia"],
            ["V-1", "Ana", 40]
        ]))
        .unwrap();
        let objects = normalise(json!([{ "id": "V-1", "NOMBRE": "Ana", "biblia": 40 }])).unwrap();

        assert_eq!(matrix.len(), 1);
        assert_eq!(matrix[0].text(Field::Id), objects[0].text(Field::Id));
        assert_eq!(matrix[0].text(Field::Name).as_deref(), Some("Ana"));
        assert_eq!(objects[0].text(Field::Biblical).as_deref(), Some("40"));
    }

    #[test]
    fn short_matrix_rows_leave_fields_absent() {
        let rows = normalise(json!([["id", "nombre", "biblia"], ["V-1"]])).unwrap();
        assert!(rows[0].get(Field::Biblical).is_none());
    }

    #[test]
    fn data_wrapper_is_unwrapped() {
        let rows = normalise(json!({ "data": [{ "id": "V-9" }] })).unwrap();
        assert_eq!(rows[0].text(Field::Id).as_deref(), Some("V-9"));
    }

    #[test]
    fn backend_error_payload_fails() {
        let err = normalise(json!({ "error": "quota exceeded" })).unwrap_err();
        assert!(matches!(err, DirectoryError::Backend(msg) if msg == "quota exceeded"));
    }

    #[test]
    fn scalar_payload_fails() {
        assert!(matches!(
            normalise(json!("<html>")),
            Err(DirectoryError::Parse(_))
        ));
    }

    #[test]
    fn first_alias_with_a_value_wins() {
        let row = Row::from_pairs([
            ("cedula", json!("V-2")),
            ("id", Value::Null),
            ("identificación", json!("V-3")),
        ]);
        assert_eq!(row.text(Field::Id).as_deref(), Some("V-2"));
    }

    #[test]
    fn duplicate_columns_keep_the_first() {
        let row = Row::from_pairs([("Rango", json!("ACTIVO")), ("rango ", json!("RECLUTA"))]);
        assert_eq!(row.len(), 1);
        assert_eq!(row.text(Field::Rank).as_deref(), Some("ACTIVO"));
    }
}
