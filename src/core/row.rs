use serde_json::{Map, Value};

/// One row as the remote store ships it: column name to JSON value.
pub type RawRow = Map<String, Value>;

/// Column holding the primary key in every table.
pub const ID_COLUMN: &str = "id";

/// Renders an identifier value in its string form.
///
/// Tables use either integer or text primary keys; everything above the
/// gateway sees the string form only.
pub fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Extracts the identifier of a raw row, if it carries one.
pub fn row_id(row: &RawRow) -> Option<String> {
    row.get(ID_COLUMN).and_then(id_string)
}
