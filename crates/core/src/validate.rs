#![forbid(unsafe_code)]

use serde::Serialize;
use serde_json::Value;

use crate::error::CompileError;
use crate::schema::{FieldCompiler, FieldTransformer, Schema};
use crate::snapshot::Snapshot;

/// A reference from a snapshot row to a row the snapshot does not hold.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MissingReference {
    pub entity: String,
    pub key: Value,
    pub field: String,
    pub foreign_entity: String,
    pub value: Value,
}

/// Lists every reference whose target row is missing from `snapshot`.
/// An empty list means the snapshot is closed under its own references.
pub fn validate(schema: &Schema, snapshot: &Snapshot) -> Result<Vec<MissingReference>, CompileError> {
    let morphs = schema.morph_table();
    let mut missing = Vec::new();
    for row in snapshot.rows() {
        let entity = schema.entity(row.name())?;
        for field in &entity.fields {
            let mut references = Vec::new();
            field.transform(row.fields(), &mut |name: &str, id: &Value| {
                let foreign = morphs.get(name).map_or(name, String::as_str);
                references.push((foreign.to_string(), id.clone()));
                id.clone()
            })?;
            missing.extend(
                references
                    .into_iter()
                    .filter(|(foreign, id)| !snapshot.has_entity(foreign, id))
                    .map(|(foreign_entity, value)| MissingReference {
                        entity: entity.name.clone(),
                        key: row.key().clone(),
                        field: field.name().to_string(),
                        foreign_entity,
                        value,
                    }),
            );
        }
    }
    if !missing.is_empty() {
        tracing::debug!(missing = missing.len(), "snapshot has dangling references");
    }
    Ok(missing)
}
