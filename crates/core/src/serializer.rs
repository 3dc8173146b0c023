#![forbid(unsafe_code)]

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::books::SerializationBookKeeper;
use crate::error::{IntegrityError, RecipeError};
use crate::ids::key_text;
use crate::ops::{OpKind, Operation};
use crate::recipe::{Ingredient, Recipe};
use crate::topo::{self, TopoError};

pub type RowHook = Box<dyn FnMut(&str, &Map<String, Value>) -> Option<Map<String, Value>>>;

/// Hooks run on every serialized row. Returning `Some` replaces the row.
pub enum SerializerEvent {
    OnInsert(RowHook),
    OnUpdate(RowHook),
}

/// Returned by [`Serializer::on`]; pass it to [`Serializer::off`] to remove the hook.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HookHandle(u64);

impl HookHandle {
    pub(crate) fn new(index: u64) -> Self {
        Self(index)
    }
}

struct PendingRow {
    entity_type: String,
    row: Map<String, Value>,
    deps: Vec<String>,
}

/// Turns rows of a source store into id-independent batched operations.
pub struct Serializer {
    recipes: IndexMap<String, Recipe>,
    books: SerializationBookKeeper,
    rows: IndexMap<String, PendingRow>,
    circular_rows: IndexMap<String, PendingRow>,
    events: IndexMap<HookHandle, SerializerEvent>,
    next_hook: u64,
}

impl Serializer {
    pub fn new(recipes: IndexMap<String, Recipe>) -> Self {
        Self {
            recipes,
            books: SerializationBookKeeper::new(),
            rows: IndexMap::new(),
            circular_rows: IndexMap::new(),
            events: IndexMap::new(),
            next_hook: 0,
        }
    }

    pub fn set_recipe(&mut self, entity_type: impl Into<String>, recipe: Recipe) -> &mut Self {
        self.recipes.insert(entity_type.into(), recipe);
        self
    }

    pub fn books(&self) -> &SerializationBookKeeper {
        &self.books
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn on(&mut self, event: SerializerEvent) -> HookHandle {
        let handle = HookHandle::new(self.next_hook);
        self.next_hook += 1;
        self.events.insert(handle, event);
        handle
    }

    pub fn off(&mut self, handle: HookHandle) -> bool {
        self.events.shift_remove(&handle).is_some()
    }

    /// Resolves one row. Adding the same row twice replaces the first.
    pub fn add(&mut self, entity_type: &str, row: &Map<String, Value>) -> Result<&mut Self, RecipeError> {
        let recipe = self
            .recipes
            .get(entity_type)
            .ok_or_else(|| RecipeError::UnknownType(entity_type.to_string()))?;
        let primary_key = recipe.primary_key();
        let id = row
            .get(primary_key)
            .ok_or_else(|| RecipeError::MissingPrimaryKey {
                type_name: entity_type.to_string(),
                key: primary_key.to_string(),
            })?;
        let uuid = self.books.uuid(entity_type, id);

        let mut deps = Vec::new();
        let mut circular_deps = Vec::new();
        let mut resolved = Map::new();
        resolved.insert(primary_key.to_string(), Value::String(uuid.clone()));
        let mut resolved_circular = Map::new();
        let mut extra_fields: Vec<&str> = Vec::new();

        for (field, ingredient) in recipe.ingredients() {
            let Some(value) = row.get(field) else {
                continue;
            };
            for (dep_type, dep_id) in ingredient.deps(value, row, false)? {
                deps.push(self.books.uuid(&dep_type, &dep_id));
            }
            if let Some(serialized) = ingredient.serialize(value, row, &mut self.books, false)? {
                resolved.insert(field.clone(), serialized);
            }

            if let Ingredient::Circular { .. } = ingredient {
                for (dep_type, dep_id) in ingredient.deps(value, row, true)? {
                    circular_deps.push(self.books.uuid(&dep_type, &dep_id));
                }
                if let Some(serialized) = ingredient.serialize(value, row, &mut self.books, true)? {
                    resolved_circular.insert(field.clone(), serialized);
                }
                extra_fields.extend(ingredient.required_extra_fields());
            }
        }

        if !resolved_circular.is_empty() {
            resolved_circular.insert(primary_key.to_string(), Value::String(uuid.clone()));
            for field in extra_fields {
                if resolved_circular.contains_key(field) {
                    continue;
                }
                if let Some(value) = resolved.get(field) {
                    resolved_circular.insert(field.to_string(), value.clone());
                }
            }
            for event in self.events.values_mut() {
                if let SerializerEvent::OnUpdate(hook) = event {
                    if let Some(replacement) = hook(entity_type, &resolved_circular) {
                        resolved_circular = replacement;
                    }
                }
            }
            self.circular_rows.insert(
                uuid.clone(),
                PendingRow {
                    entity_type: entity_type.to_string(),
                    row: resolved_circular,
                    deps: circular_deps,
                },
            );
        }

        for event in self.events.values_mut() {
            if let SerializerEvent::OnInsert(hook) = event {
                if let Some(replacement) = hook(entity_type, &resolved) {
                    resolved = replacement;
                }
            }
        }
        tracing::trace!(entity_type, id = %key_text(id), deps = deps.len(), "row added");
        self.rows.insert(
            uuid,
            PendingRow {
                entity_type: entity_type.to_string(),
                row: resolved,
                deps,
            },
        );
        Ok(self)
    }

    /// Orders the added rows into INSERT batches followed by the UPDATE
    /// batches that close circular references.
    pub fn compile(&self) -> Result<Vec<Operation>, IntegrityError> {
        let graph: IndexMap<String, Vec<String>> = self
            .rows
            .iter()
            .map(|(uuid, pending)| (uuid.clone(), pending.deps.clone()))
            .collect();
        let order = topo::sort(&graph).map_err(|err| self.integrity(err))?;

        // Updates may point at any row, so they are ordered among all of them.
        let circular_graph: IndexMap<String, Vec<String>> = self
            .rows
            .keys()
            .map(|uuid| {
                let deps = self
                    .circular_rows
                    .get(uuid)
                    .map(|pending| pending.deps.iter().filter(|dep| *dep != uuid).cloned().collect())
                    .unwrap_or_default();
                (uuid.clone(), deps)
            })
            .collect();
        let circular_order: Vec<String> = topo::sort(&circular_graph)
            .map_err(|err| self.integrity(err))?
            .into_iter()
            .filter(|uuid| self.circular_rows.contains_key(uuid))
            .collect();

        let mut ops = self.insert_ops(&order);
        ops.extend(self.update_ops(&circular_order));
        tracing::debug!(rows = self.rows.len(), updates = circular_order.len(), ops = ops.len(), "serialization compiled");
        Ok(ops)
    }

    fn integrity(&self, err: TopoError) -> IntegrityError {
        match err {
            TopoError::Missing { source, target } => IntegrityError::MissingRow {
                row: self.books.describe(&source),
                missing: self.books.describe(&target),
            },
            TopoError::Circular(uuid) => IntegrityError::CircularRows(self.books.describe(&uuid)),
        }
    }

    fn insert_ops(&self, order: &[String]) -> Vec<Operation> {
        let mut batcher = Batcher::new(OpKind::Insert);
        for uuid in order {
            let Some(pending) = self.rows.get(uuid) else {
                continue;
            };
            let depends_on_batch = pending.deps.iter().any(|dep| batcher.contains(dep));
            batcher.push(uuid, pending, depends_on_batch);
        }
        batcher.finish()
    }

    fn update_ops(&self, order: &[String]) -> Vec<Operation> {
        let mut batcher = Batcher::new(OpKind::Update);
        for uuid in order {
            if let Some(pending) = self.circular_rows.get(uuid) {
                batcher.push(uuid, pending, false);
            }
        }
        batcher.finish()
    }
}

/// Groups consecutive rows of one type with the same fields.
struct Batcher<'a> {
    op: OpKind,
    ops: Vec<Operation>,
    entity_type: &'a str,
    fields: Vec<&'a str>,
    uuids: Vec<&'a str>,
    rows: Vec<Map<String, Value>>,
}

impl<'a> Batcher<'a> {
    fn new(op: OpKind) -> Self {
        Self {
            op,
            ops: Vec::new(),
            entity_type: "",
            fields: Vec::new(),
            uuids: Vec::new(),
            rows: Vec::new(),
        }
    }

    fn contains(&self, uuid: &str) -> bool {
        self.uuids.contains(&uuid)
    }

    fn push(&mut self, uuid: &'a str, pending: &'a PendingRow, split: bool) {
        let fields: Vec<&str> = pending.row.keys().map(String::as_str).collect();
        if split || pending.entity_type != self.entity_type || fields != self.fields {
            self.flush();
        }
        self.entity_type = &pending.entity_type;
        self.fields = fields;
        self.uuids.push(uuid);
        self.rows.push(pending.row.clone());
    }

    fn flush(&mut self) {
        if self.rows.is_empty() {
            return;
        }
        self.uuids.clear();
        let rows = std::mem::take(&mut self.rows);
        self.ops.push(Operation::new(self.op, self.entity_type, rows));
    }

    fn finish(mut self) -> Vec<Operation> {
        self.flush();
        self.ops
    }
}
