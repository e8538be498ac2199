//! Declarative row ↔ entity mapping
//!
//! Each domain lists its fields once: remote column, entity property and a
//! conversion. Decoding builds a JSON object keyed by property names and hands
//! it to serde; encoding walks the same table backwards. Patches and drafts go
//! through the same routine, so only properties actually present are written.

use crate::core::{RawRow, Result, SyncError, id_string};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// How one column's value becomes a property value and back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Convert {
    /// Primary key: integer or text remotely, always text locally. Never written.
    Id,
    /// Text, with a default for null or missing values.
    Text(&'static str),
    /// Integer, with a default for null or missing values.
    Integer(i64),
    /// Optional text. Null, missing and empty all mean "none"; written back as null.
    OptionalText,
    /// JSON array; null or missing decodes as empty.
    List,
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub column: &'static str,
    pub property: &'static str,
    pub convert: Convert,
    /// Column read when `column` is null or missing.
    pub fallback_column: Option<&'static str>,
}

impl Field {
    pub const fn new(column: &'static str, property: &'static str, convert: Convert) -> Self {
        Self {
            column,
            property,
            convert,
            fallback_column: None,
        }
    }

    /// Same column and property name.
    pub const fn same(name: &'static str, convert: Convert) -> Self {
        Self::new(name, name, convert)
    }

    pub const fn or_column(mut self, fallback: &'static str) -> Self {
        self.fallback_column = Some(fallback);
        self
    }

    fn read<'a>(&self, row: &'a RawRow) -> Option<&'a Value> {
        let present = |value: &&Value| match value {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            _ => true,
        };
        row.get(self.column)
            .filter(present)
            .or_else(|| self.fallback_column.and_then(|c| row.get(c)).filter(present))
    }

    fn decode(&self, row: &RawRow) -> Result<Value> {
        let raw = self.read(row);
        let value = match self.convert {
            Convert::Id => raw
                .and_then(id_string)
                .map(Value::String)
                .ok_or_else(|| SyncError::Transport(format!("row has no '{}'", self.column)))?,
            Convert::Text(default) => match raw {
                Some(Value::String(s)) => Value::String(s.clone()),
                Some(other) => Value::String(other.to_string()),
                None => Value::String(default.to_string()),
            },
            Convert::Integer(default) => match raw {
                Some(Value::Number(n)) => Value::from(
                    n.as_i64()
                        .or_else(|| n.as_f64().map(|f| f.round() as i64))
                        .unwrap_or(default),
                ),
                Some(Value::String(s)) => Value::from(s.trim().parse::<i64>().unwrap_or(default)),
                _ => Value::from(default),
            },
            Convert::OptionalText => match raw {
                Some(Value::String(s)) => Value::String(s.clone()),
                Some(other) => Value::String(other.to_string()),
                None => Value::Null,
            },
            Convert::List => match raw {
                Some(Value::Array(items)) => Value::Array(items.clone()),
                _ => Value::Array(Vec::new()),
            },
        };
        Ok(value)
    }

    fn encode(&self, value: &Value) -> Option<Value> {
        match (self.convert, value) {
            (Convert::Id, _) => None,
            (Convert::OptionalText, Value::String(s)) if s.trim().is_empty() => Some(Value::Null),
            (_, value) => Some(value.clone()),
        }
    }
}

/// Field table of one domain.
#[derive(Debug, Clone, Copy)]
pub struct FieldMap {
    fields: &'static [Field],
}

impl FieldMap {
    pub const fn new(fields: &'static [Field]) -> Self {
        Self { fields }
    }

    fn decode_object(&self, row: &RawRow) -> Result<Map<String, Value>> {
        let mut object = Map::with_capacity(self.fields.len());
        for field in self.fields {
            object.insert(field.property.to_string(), field.decode(row)?);
        }
        Ok(object)
    }

    /// Converts a raw row into an entity.
    pub fn decode<T: DeserializeOwned>(&self, row: &RawRow) -> Result<T> {
        let object = self.decode_object(row)?;
        Ok(serde_json::from_value(Value::Object(object))?)
    }

    /// Converts an entity, draft or patch into a writable row.
    ///
    /// Properties absent from the serialized value are left out, so a patch
    /// that skips unset fields yields a partial row. Identifiers are never
    /// written.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<RawRow> {
        let object = to_object(value)?;
        let mut row = RawRow::new();
        for field in self.fields {
            if let Some(value) = object.get(field.property)
                && let Some(encoded) = field.encode(value)
            {
                row.insert(field.column.to_string(), encoded);
            }
        }
        Ok(row)
    }
}

fn to_object<T: Serialize>(value: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(value)? {
        Value::Object(object) => Ok(object),
        other => Err(SyncError::validation(format!(
            "expected a record, got {}",
            other
        ))),
    }
}

/// Returns `entity` with every property present in `patch` replaced.
pub fn overlay<E, P>(entity: &E, patch: &P) -> Result<E>
where
    E: Serialize + DeserializeOwned,
    P: Serialize,
{
    let mut object = to_object(entity)?;
    for (property, value) in to_object(patch)? {
        object.insert(property, value);
    }
    Ok(serde_json::from_value(Value::Object(object))?)
}

/// Builds an entity from a draft plus the identifier the store assigned.
pub fn with_id<D, E>(draft: &D, id: &str) -> Result<E>
where
    D: Serialize,
    E: DeserializeOwned,
{
    let mut object = to_object(draft)?;
    object.insert("id".to_string(), Value::String(id.to_string()));
    Ok(serde_json::from_value(Value::Object(object))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Card {
        id: String,
        title: String,
        score: i64,
        image: Option<String>,
        posted: String,
    }

    #[derive(Debug, Default, Serialize)]
    struct CardPatch {
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        image: Option<String>,
    }

    static CARD_FIELDS: [Field; 5] = [
        Field::same("id", Convert::Id),
        Field::new("card_title", "title", Convert::Text("")),
        Field::same("score", Convert::Integer(5)),
        Field::same("image", Convert::OptionalText),
        Field::new("date", "posted", Convert::Text("")).or_column("created_at"),
    ];
    const CARDS: FieldMap = FieldMap::new(&CARD_FIELDS);

    fn row(value: Value) -> RawRow {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_decode_applies_defaults_and_renames() {
        let card: Card = CARDS
            .decode(&row(json!({
                "id": 42,
                "card_title": "Hello",
                "score": null,
                "image": "",
                "created_at": "2025-02-01T00:00:00Z"
            })))
            .unwrap();

        assert_eq!(
            card,
            Card {
                id: "42".to_string(),
                title: "Hello".to_string(),
                score: 5,
                image: None,
                posted: "2025-02-01T00:00:00Z".to_string(),
            }
        );
    }

    #[test]
    fn test_decode_without_id_fails() {
        let result: Result<Card> = CARDS.decode(&row(json!({"card_title": "x"})));
        assert!(matches!(result, Err(SyncError::Transport(_))));
    }

    #[test]
    fn test_encode_partial_patch_writes_only_present_columns() {
        let patch = CardPatch {
            title: Some("New".to_string()),
            image: Some(String::new()),
        };
        let encoded = CARDS.encode(&patch).unwrap();

        assert_eq!(encoded, row(json!({"card_title": "New", "image": null})));
    }

    #[test]
    fn test_encode_never_writes_identifier() {
        let card = Card {
            id: "7".to_string(),
            title: "T".to_string(),
            score: 3,
            image: None,
            posted: "2025-01-01".to_string(),
        };
        let encoded = CARDS.encode(&card).unwrap();

        assert!(!encoded.contains_key("id"));
        assert_eq!(encoded["date"], json!("2025-01-01"));
    }

    #[test]
    fn test_overlay_keeps_untouched_fields() {
        let card = Card {
            id: "7".to_string(),
            title: "T".to_string(),
            score: 3,
            image: Some("a.png".to_string()),
            posted: "2025-01-01".to_string(),
        };
        let patched = overlay(&card, &CardPatch {
            title: Some("U".to_string()),
            image: None,
        })
        .unwrap();

        assert_eq!(patched.title, "U");
        assert_eq!(patched.image.as_deref(), Some("a.png"));
        assert_eq!(patched.score, 3);
    }
}
