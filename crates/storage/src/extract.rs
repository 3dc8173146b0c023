#![forbid(unsafe_code)]

use rusqlite::Connection;
use serde_json::{Map, Value};
use snap_core::schema::{Field, ValueCast};
use snap_core::{EntityRow, Schema, Snapshot};

use crate::error::StoreError;
use crate::sql::select_all;

/// Reads one snapshot row per table row, for every entity of the schema.
pub(crate) fn extract(conn: &Connection, schema: &Schema) -> Result<Snapshot, StoreError> {
    let mut snapshot = Snapshot::default();
    for entity in schema.entities() {
        let rows = select_all(conn, &entity.name)?;
        tracing::debug!(entity = %entity.name, rows = rows.len(), "entity extracted");
        for mut fields in rows {
            let key = fields.get(entity.key_name()).cloned().ok_or_else(|| {
                StoreError::InvalidInput(format!(
                    "table has no key column (entity={}, key={})",
                    entity.name,
                    entity.key_name()
                ))
            })?;
            for field in &entity.fields {
                lift(field, &mut fields)?;
            }
            snapshot.push(EntityRow::new(entity.name.clone(), key, fields));
        }
    }
    Ok(snapshot)
}

/// Rebuilds a field's snapshot value from the columns it compiles into.
fn lift(field: &Field, fields: &mut Map<String, Value>) -> Result<(), StoreError> {
    match field {
        Field::Value(value) if value.cast == ValueCast::Json => {
            if let Some(Value::String(text)) = fields.get(&value.name) {
                let parsed = serde_json::from_str(text)?;
                fields.insert(value.name.clone(), parsed);
            }
        }
        Field::Value(_) => {}
        Field::BelongsTo(belongs_to) => {
            if let Some(id) = fields.get(&belongs_to.local_key).cloned() {
                fields.insert(belongs_to.name.clone(), id);
            }
        }
        Field::MorphTo(morph) => {
            let morph_type = fields.get(&morph.type_field).cloned().unwrap_or(Value::Null);
            let id = fields.get(&morph.id_field).cloned().unwrap_or(Value::Null);
            let lifted = if morph_type.is_null() && id.is_null() {
                Value::Null
            } else {
                Value::Array(vec![morph_type, id])
            };
            fields.insert(morph.name.clone(), lifted);
        }
        Field::Map(map) => {
            if let Some(Value::String(text)) = fields.get(&map.name) {
                let parsed = serde_json::from_str(text)?;
                fields.insert(map.name.clone(), parsed);
            }
        }
        Field::Match(matcher) => {
            let resolved = matcher.resolve(fields)?.clone();
            lift(&resolved, fields)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use snap_core::schema::{MorphToField, ValueField};

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected an object, got {other}"),
        }
    }

    #[test]
    fn morph_columns_fold_into_pairs() {
        let field = Field::MorphTo(MorphToField {
            name: "owner".to_string(),
            id_field: "owner_id".to_string(),
            type_field: "owner_type".to_string(),
            optional: false,
            fallback: Value::Null,
            circular_fallback: Value::Null,
            type_circular_fallback: Value::Null,
        });
        let mut row = fields(json!({"owner_id": 3, "owner_type": "Post"}));
        lift(&field, &mut row).unwrap();
        assert_eq!(row["owner"], json!(["Post", 3]));

        let mut empty = fields(json!({"owner_id": null, "owner_type": null}));
        lift(&field, &mut empty).unwrap();
        assert_eq!(empty["owner"], Value::Null);
    }

    #[test]
    fn json_values_are_parsed_back() {
        let field = Field::Value(ValueField::new("meta", ValueCast::Json));
        let mut row = fields(json!({"meta": "{\"a\":1}"}));
        lift(&field, &mut row).unwrap();
        assert_eq!(row["meta"], json!({"a": 1}));
    }
}
