#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ReplayError, ValueError};
use crate::task::{CreateTask, Task, UpdateTask};
use crate::value::{AliasLookup, TaskValue};

/// Executes replayed tasks against a store.
pub trait Repository {
    type Error;

    /// Inserts one row and returns its new primary key.
    fn insert(
        &mut self,
        entity: &str,
        columns: &[String],
        values: Vec<Value>,
    ) -> Result<Value, Self::Error>;

    fn update(
        &mut self,
        entity: &str,
        key_name: &str,
        id: &Value,
        columns: &[String],
        values: Vec<Value>,
    ) -> Result<(), Self::Error>;
}

/// Ordered create tasks followed by the updates that close circular references.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskSequence {
    tasks: Vec<Task>,
}

impl TaskSequence {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn creates(&self) -> impl Iterator<Item = &CreateTask> {
        self.tasks.iter().filter_map(|task| match task {
            Task::Create(task) => Some(task),
            Task::Update(_) => None,
        })
    }

    pub fn updates(&self) -> impl Iterator<Item = &UpdateTask> {
        self.tasks.iter().filter_map(|task| match task {
            Task::Update(task) => Some(task),
            Task::Create(_) => None,
        })
    }

    /// Runs every task in order and returns the internal id to real id table.
    pub fn replay<R: Repository>(
        &self,
        repository: &mut R,
    ) -> Result<AliasLookup, ReplayError<R::Error>> {
        let mut lookup = AliasLookup::new();
        for task in &self.tasks {
            match task {
                Task::Create(task) => {
                    let values = resolve_all(task.values(), &lookup)?;
                    let id = repository
                        .insert(task.entity(), task.columns(), values)
                        .map_err(ReplayError::Repository)?;
                    if !is_scalar(&id) {
                        return Err(ReplayError::NonScalarId {
                            entity: task.entity().to_string(),
                        });
                    }
                    lookup.insert(task.id(), id);
                }
                Task::Update(task) => {
                    let id = lookup
                        .get(&task.id())
                        .cloned()
                        .ok_or(ValueError::MissingAlias(task.id()))?;
                    let values = resolve_all(task.values(), &lookup)?;
                    repository
                        .update(task.entity(), task.key_name(), &id, task.columns(), values)
                        .map_err(ReplayError::Repository)?;
                }
            }
        }
        tracing::debug!(tasks = self.tasks.len(), rows = lookup.len(), "task sequence replayed");
        Ok(lookup)
    }
}

fn resolve_all(values: &[TaskValue], lookup: &AliasLookup) -> Result<Vec<Value>, ValueError> {
    values.iter().map(|value| value.resolve(lookup)).collect()
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}
