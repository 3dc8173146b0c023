#![forbid(unsafe_code)]

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, params_from_iter};
use serde_json::{Map, Number, Value};

use snap_core::{Repository, RowRepository};

use crate::error::StoreError;

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Arrays and objects are stored as their JSON text.
pub(crate) fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => SqlValue::Integer(integer),
            None => number
                .as_f64()
                .map(SqlValue::Real)
                .unwrap_or_else(|| SqlValue::Text(number.to_string())),
        },
        Value::String(text) => SqlValue::Text(text.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

pub(crate) fn from_sql(column: &str, value: ValueRef<'_>) -> Result<Value, StoreError> {
    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(integer) => Value::from(integer),
        ValueRef::Real(real) => match Number::from_f64(real) {
            Some(number) => Value::Number(number),
            None => {
                return Err(StoreError::InvalidInput(format!(
                    "non-finite real value (column={column}, value={real})"
                )));
            }
        },
        ValueRef::Text(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => Value::String(text.to_string()),
            Err(err) => {
                return Err(StoreError::InvalidInput(format!(
                    "text is not valid utf-8 (column={column}): {err}"
                )));
            }
        },
        ValueRef::Blob(_) => {
            return Err(StoreError::InvalidInput(format!(
                "blob columns are not supported (column={column})"
            )));
        }
    })
}

/// Reads every row of `table` as a column map, in rowid order.
pub(crate) fn select_all(conn: &Connection, table: &str) -> Result<Vec<Map<String, Value>>, StoreError> {
    let mut stmt = conn.prepare(&format!("SELECT * FROM {}", quote_ident(table)))?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut fields = Map::new();
        for (index, column) in columns.iter().enumerate() {
            fields.insert(column.clone(), from_sql(column, row.get_ref(index)?)?);
        }
        out.push(fields);
    }
    Ok(out)
}

/// Writes tasks and deserialized rows through one connection (or transaction).
pub struct SqlRepository<'c> {
    conn: &'c Connection,
}

impl<'c> SqlRepository<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn insert_row(&self, table: &str, columns: &[String], values: &[Value]) -> Result<Value, rusqlite::Error> {
        let sql = if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", quote_ident(table))
        } else {
            let names: Vec<String> = columns.iter().map(|column| quote_ident(column)).collect();
            let slots: Vec<String> = (1..=columns.len()).map(|index| format!("?{index}")).collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_ident(table),
                names.join(", "),
                slots.join(", ")
            )
        };
        self.conn
            .execute(&sql, params_from_iter(values.iter().map(to_sql)))?;
        Ok(Value::from(self.conn.last_insert_rowid()))
    }

    fn update_row(
        &self,
        table: &str,
        key_name: &str,
        id: &Value,
        columns: &[String],
        values: &[Value],
    ) -> Result<(), rusqlite::Error> {
        if columns.is_empty() {
            return Ok(());
        }
        let assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(index, column)| format!("{} = ?{}", quote_ident(column), index + 1))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?{}",
            quote_ident(table),
            assignments.join(", "),
            quote_ident(key_name),
            columns.len() + 1
        );
        let params = values.iter().chain(std::iter::once(id)).map(to_sql);
        self.conn.execute(&sql, params_from_iter(params))?;
        Ok(())
    }
}

impl Repository for SqlRepository<'_> {
    type Error = rusqlite::Error;

    fn insert(&mut self, entity: &str, columns: &[String], values: Vec<Value>) -> Result<Value, Self::Error> {
        self.insert_row(entity, columns, &values)
    }

    fn update(
        &mut self,
        entity: &str,
        key_name: &str,
        id: &Value,
        columns: &[String],
        values: Vec<Value>,
    ) -> Result<(), Self::Error> {
        self.update_row(entity, key_name, id, columns, &values)
    }
}

impl RowRepository for SqlRepository<'_> {
    type Error = rusqlite::Error;

    fn insert(&mut self, entity_type: &str, row: Map<String, Value>) -> Result<Value, Self::Error> {
        let (columns, values): (Vec<String>, Vec<Value>) = row.into_iter().unzip();
        self.insert_row(entity_type, &columns, &values)
    }

    fn update(
        &mut self,
        entity_type: &str,
        key_name: &str,
        id: &Value,
        row: Map<String, Value>,
    ) -> Result<(), Self::Error> {
        let (columns, values): (Vec<String>, Vec<Value>) = row.into_iter().unzip();
        self.update_row(entity_type, key_name, id, &columns, &values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn json_values_map_onto_sqlite_types() {
        assert_eq!(to_sql(&json!(null)), SqlValue::Null);
        assert_eq!(to_sql(&json!(true)), SqlValue::Integer(1));
        assert_eq!(to_sql(&json!(7)), SqlValue::Integer(7));
        assert_eq!(to_sql(&json!(1.5)), SqlValue::Real(1.5));
        assert_eq!(to_sql(&json!("x")), SqlValue::Text("x".to_string()));
        assert_eq!(to_sql(&json!({"a": [1]})), SqlValue::Text("{\"a\":[1]}".to_string()));

        assert_eq!(from_sql("c", ValueRef::Integer(3)).unwrap(), json!(3));
        assert_eq!(from_sql("c", ValueRef::Text(b"hi")).unwrap(), json!("hi"));
        assert!(matches!(
            from_sql("c", ValueRef::Blob(b"\x00")),
            Err(StoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn unrepresentable_values_are_rejected() {
        assert_eq!(from_sql("c", ValueRef::Real(2.5)).unwrap(), json!(2.5));
        assert!(matches!(
            from_sql("c", ValueRef::Real(f64::NAN)),
            Err(StoreError::InvalidInput(ref message)) if message.contains("column=c")
        ));
        assert!(matches!(
            from_sql("c", ValueRef::Real(f64::INFINITY)),
            Err(StoreError::InvalidInput(_))
        ));
        assert!(matches!(
            from_sql("name", ValueRef::Text(b"caf\xe9")),
            Err(StoreError::InvalidInput(ref message)) if message.contains("column=name")
        ));
    }

    #[test]
    fn invalid_text_fails_a_table_read() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (name TEXT); INSERT INTO t VALUES (CAST(X'FF' AS TEXT));")
            .unwrap();
        assert!(matches!(select_all(&conn, "t"), Err(StoreError::InvalidInput(_))));
    }
}
