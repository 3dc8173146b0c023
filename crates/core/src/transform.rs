#![forbid(unsafe_code)]

use serde_json::Value;

use crate::error::CompileError;
use crate::schema::{FieldTransformer, Schema};
use crate::snapshot::{EntityRow, Snapshot};

/// Rewrites every id of a snapshot: row keys and the references schema
/// fields hold.
pub struct Transformer;

impl Transformer {
    /// `f` receives `(entity, id)` and returns the new id. Morph tags are
    /// mapped to entity names before `f` sees them. Columns the schema does
    /// not describe are kept as they are.
    pub fn transform<F>(schema: &Schema, snapshot: &Snapshot, mut f: F) -> Result<Snapshot, CompileError>
    where
        F: FnMut(&str, &Value) -> Value,
    {
        let morphs = schema.morph_table();
        let mut rows = Vec::with_capacity(snapshot.len());
        for row in snapshot.rows() {
            let entity = schema.entity(row.name())?;
            let key = f(&entity.name, row.key());
            let mut fields = row.fields().clone();
            for field in &entity.fields {
                let mut canonical = |name: &str, id: &Value| f(morphs.get(name).map_or(name, String::as_str), id);
                for (name, value) in field.transform(row.fields(), &mut canonical)? {
                    fields.insert(name, value);
                }
            }
            rows.push(EntityRow::new(entity.name.clone(), key, fields));
        }
        Ok(Snapshot::new(rows))
    }
}
