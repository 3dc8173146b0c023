#![forbid(unsafe_code)]

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::books::{BookKeeper, DeserializationBookKeeper};
use crate::error::{IntegrityError, RecipeError, ReplayError};
use crate::ops::{OpKind, Operation};
use crate::recipe::Recipe;
use crate::serializer::HookHandle;

/// Writes deserialized rows into the target store.
pub trait RowRepository {
    type Error;

    /// Creates a row and returns its new primary key.
    fn insert(&mut self, entity_type: &str, row: Map<String, Value>) -> Result<Value, Self::Error>;

    fn update(
        &mut self,
        entity_type: &str,
        key_name: &str,
        id: &Value,
        row: Map<String, Value>,
    ) -> Result<(), Self::Error>;
}

pub type RowObserver = Box<dyn FnMut(&str, &Map<String, Value>)>;

/// Observers of deserialized rows, called before the row is written.
pub enum DeserializerEvent {
    OnInsert(RowObserver),
    OnUpdate(RowObserver),
}

/// Replays serialized operations, translating uuids into the ids the
/// repository hands out.
pub struct Deserializer {
    recipes: IndexMap<String, Recipe>,
    books: DeserializationBookKeeper,
    events: IndexMap<HookHandle, DeserializerEvent>,
    next_hook: u64,
}

impl Deserializer {
    pub fn new(recipes: IndexMap<String, Recipe>) -> Self {
        Self {
            recipes,
            books: DeserializationBookKeeper::new(),
            events: IndexMap::new(),
            next_hook: 0,
        }
    }

    pub fn set_recipe(&mut self, entity_type: impl Into<String>, recipe: Recipe) -> &mut Self {
        self.recipes.insert(entity_type.into(), recipe);
        self
    }

    pub fn books(&self) -> &DeserializationBookKeeper {
        &self.books
    }

    pub fn on(&mut self, event: DeserializerEvent) -> HookHandle {
        let handle = HookHandle::new(self.next_hook);
        self.next_hook += 1;
        self.events.insert(handle, event);
        handle
    }

    pub fn off(&mut self, handle: HookHandle) -> bool {
        self.events.shift_remove(&handle).is_some()
    }

    pub fn deserialize<R: RowRepository>(
        &mut self,
        ops: &[Operation],
        repository: &mut R,
    ) -> Result<(), ReplayError<R::Error>> {
        let mut rows = 0usize;
        for op in ops {
            for row in &op.rows {
                self.run(op.op, &op.entity_type, row, repository)?;
                rows += 1;
            }
        }
        tracing::debug!(ops = ops.len(), rows, "serialization deserialized");
        Ok(())
    }

    fn run<R: RowRepository>(
        &mut self,
        op: OpKind,
        entity_type: &str,
        row: &Map<String, Value>,
        repository: &mut R,
    ) -> Result<(), ReplayError<R::Error>> {
        let recipe = self
            .recipes
            .get(entity_type)
            .ok_or_else(|| RecipeError::UnknownType(entity_type.to_string()))?;
        let primary_key = recipe.primary_key();
        let uuid = row
            .get(primary_key)
            .ok_or_else(|| RecipeError::MissingPrimaryKey {
                type_name: entity_type.to_string(),
                key: primary_key.to_string(),
            })?;

        let mut resolved = Map::new();
        for (field, ingredient) in recipe.ingredients() {
            let Some(value) = row.get(field) else {
                continue;
            };
            if let Some(value) = ingredient.deserialize(value, row, &mut self.books)? {
                resolved.insert(field.clone(), value);
            }
        }
        resolved.remove(primary_key);

        for event in self.events.values_mut() {
            match (op, event) {
                (OpKind::Insert, DeserializerEvent::OnInsert(observer))
                | (OpKind::Update, DeserializerEvent::OnUpdate(observer)) => {
                    observer(entity_type, &resolved)
                }
                _ => {}
            }
        }

        match op {
            OpKind::Insert => {
                let id = repository
                    .insert(entity_type, resolved)
                    .map_err(ReplayError::Repository)?;
                if id.is_null() {
                    return Err(RecipeError::from(IntegrityError::MissingInsertId(
                        entity_type.to_string(),
                    ))
                    .into());
                }
                self.books.wire(uuid, id);
            }
            OpKind::Update => {
                let id = self
                    .books
                    .resolve_id(entity_type, uuid)
                    .map_err(RecipeError::from)?;
                repository
                    .update(entity_type, primary_key, &id, resolved)
                    .map_err(ReplayError::Repository)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::Ingredient;
    use crate::serializer::Serializer;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct MemoryRepository {
        next_id: i64,
        tables: IndexMap<String, IndexMap<i64, Map<String, Value>>>,
    }

    impl RowRepository for MemoryRepository {
        type Error = String;

        fn insert(&mut self, entity_type: &str, row: Map<String, Value>) -> Result<Value, String> {
            self.next_id += 1;
            self.tables
                .entry(entity_type.to_string())
                .or_default()
                .insert(self.next_id, row);
            Ok(json!(self.next_id))
        }

        fn update(
            &mut self,
            entity_type: &str,
            _key_name: &str,
            id: &Value,
            row: Map<String, Value>,
        ) -> Result<(), String> {
            let missing = format!("no row {entity_type}/{id}");
            let key = id.as_i64().ok_or_else(|| missing.clone())?;
            let table = self.tables.get_mut(entity_type).ok_or_else(|| missing.clone())?;
            let stored = table.get_mut(&key).ok_or(missing)?;
            stored.extend(row);
            Ok(())
        }
    }

    fn row(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected an object, got {other}"),
        }
    }

    fn recipes() -> IndexMap<String, Recipe> {
        [
            (
                "roots".to_string(),
                Recipe::new("id").with("name", Ingredient::Value).with(
                    "favorite_node_id",
                    Ingredient::circular(
                        Ingredient::reference("nodes").with_optional(vec![json!(0)]),
                        Ingredient::Raw(json!(0)),
                    ),
                ),
            ),
            (
                "nodes".to_string(),
                Recipe::new("id").with("root_id", Ingredient::reference("roots")),
            ),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn serialized_rows_land_with_fresh_ids() {
        let mut serializer = Serializer::new(recipes());
        serializer
            .add("roots", &row(json!({"id": 50, "name": "Lorem", "favorite_node_id": 70})))
            .unwrap()
            .add("nodes", &row(json!({"id": 70, "root_id": 50})))
            .unwrap();
        let ops = serializer.compile().unwrap();

        let inserted = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&inserted);
        let mut deserializer = Deserializer::new(recipes());
        deserializer.on(DeserializerEvent::OnInsert(Box::new(move |entity_type, row| {
            log.borrow_mut().push((entity_type.to_string(), row.clone()));
        })));

        let mut repository = MemoryRepository::default();
        deserializer.deserialize(&ops, &mut repository).unwrap();

        assert_eq!(
            repository.tables["roots"][&1],
            row(json!({"name": "Lorem", "favorite_node_id": 2}))
        );
        assert_eq!(repository.tables["nodes"][&2], row(json!({"root_id": 1})));
        assert_eq!(inserted.borrow().len(), 2);
        assert_eq!(inserted.borrow()[0].1["favorite_node_id"], json!(0));
        assert_eq!(deserializer.books().len(), 2);
    }

    #[test]
    fn unknown_uuids_fail_integrity() {
        let ops = vec![Operation::new(
            OpKind::Insert,
            "nodes",
            vec![row(json!({"id": "u-1", "root_id": "missing"}))],
        )];
        let err = Deserializer::new(recipes())
            .deserialize(&ops, &mut MemoryRepository::default())
            .unwrap_err();
        assert!(matches!(
            err,
            ReplayError::Recipe(RecipeError::Integrity(IntegrityError::UnknownId(id))) if id == "missing"
        ));
    }

    struct NullInserts;

    impl RowRepository for NullInserts {
        type Error = String;

        fn insert(&mut self, _: &str, _: Map<String, Value>) -> Result<Value, String> {
            Ok(Value::Null)
        }

        fn update(&mut self, _: &str, _: &str, _: &Value, _: Map<String, Value>) -> Result<(), String> {
            Ok(())
        }
    }

    #[test]
    fn inserters_must_return_an_id() {
        let ops = vec![Operation::new(
            OpKind::Insert,
            "roots",
            vec![row(json!({"id": "u-1", "name": "x"}))],
        )];
        let err = Deserializer::new(recipes())
            .deserialize(&ops, &mut NullInserts)
            .unwrap_err();
        assert!(matches!(
            err,
            ReplayError::Recipe(RecipeError::Integrity(IntegrityError::MissingInsertId(_)))
        ));
    }

    #[test]
    fn unknown_types_are_rejected() {
        let ops = vec![Operation::new(OpKind::Insert, "ghosts", vec![row(json!({"id": "u"}))])];
        let err = Deserializer::new(recipes())
            .deserialize(&ops, &mut NullInserts)
            .unwrap_err();
        assert!(matches!(err, ReplayError::Recipe(RecipeError::UnknownType(_))));
    }
}
