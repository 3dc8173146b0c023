#![forbid(unsafe_code)]

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::CompileError;
use crate::ids::InternalId;
use crate::value::TaskValue;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreateTask {
    entity: String,
    #[serde(rename = "alias")]
    id: InternalId,
    columns: Vec<String>,
    values: Vec<TaskValue>,
    // Which schema field produced which columns; not part of the wire form.
    #[serde(skip)]
    field_columns: IndexMap<String, Vec<String>>,
}

impl CreateTask {
    pub fn new(
        entity: impl Into<String>,
        id: InternalId,
        columns: Vec<String>,
        values: Vec<TaskValue>,
        field_columns: IndexMap<String, Vec<String>>,
    ) -> Self {
        Self {
            entity: entity.into(),
            id,
            columns,
            values,
            field_columns,
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn id(&self) -> InternalId {
        self.id
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[TaskValue] {
        &self.values
    }

    pub fn field_columns(&self) -> &IndexMap<String, Vec<String>> {
        &self.field_columns
    }

    pub fn dependencies(&self) -> Vec<InternalId> {
        let mut out = Vec::new();
        for value in &self.values {
            for id in value.dependencies() {
                if !out.contains(&id) {
                    out.push(id);
                }
            }
        }
        out
    }

    /// Columns whose values depend on any of `ids`.
    pub fn columns_depending_on(&self, ids: &[InternalId]) -> Vec<&str> {
        self.columns
            .iter()
            .zip(&self.values)
            .filter(|(_, value)| value.dependencies().iter().any(|id| ids.contains(id)))
            .map(|(column, _)| column.as_str())
            .collect()
    }

    pub fn field_name(&self, column: &str) -> Result<&str, CompileError> {
        self.field_columns
            .iter()
            .find(|(_, columns)| columns.iter().any(|candidate| candidate == column))
            .map(|(field, _)| field.as_str())
            .ok_or_else(|| CompileError::UnknownColumn(column.to_string()))
    }

    pub fn to_update_task(
        &self,
        key_name: impl Into<String>,
        columns: &[String],
    ) -> Result<UpdateTask, CompileError> {
        let values = columns
            .iter()
            .map(|column| {
                self.columns
                    .iter()
                    .position(|candidate| candidate == column)
                    .map(|index| self.values[index].clone())
                    .ok_or_else(|| CompileError::UnknownColumn(column.clone()))
            })
            .collect::<Result<_, _>>()?;
        Ok(UpdateTask {
            entity: self.entity.clone(),
            id: self.id,
            key_name: key_name.into(),
            columns: columns.to_vec(),
            values,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpdateTask {
    entity: String,
    #[serde(rename = "alias")]
    id: InternalId,
    #[serde(rename = "keyName")]
    key_name: String,
    columns: Vec<String>,
    values: Vec<TaskValue>,
}

impl UpdateTask {
    pub fn new(
        entity: impl Into<String>,
        id: InternalId,
        key_name: impl Into<String>,
        columns: Vec<String>,
        values: Vec<TaskValue>,
    ) -> Self {
        Self {
            entity: entity.into(),
            id,
            key_name: key_name.into(),
            columns,
            values,
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn id(&self) -> InternalId {
        self.id
    }

    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[TaskValue] {
        &self.values
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Task {
    #[serde(rename = "CREATE_TASK")]
    Create(CreateTask),
    #[serde(rename = "UPDATE_TASK")]
    Update(UpdateTask),
}

impl Task {
    pub fn entity(&self) -> &str {
        match self {
            Self::Create(task) => task.entity(),
            Self::Update(task) => task.entity(),
        }
    }

    pub fn id(&self) -> InternalId {
        match self {
            Self::Create(task) => task.id(),
            Self::Update(task) => task.id(),
        }
    }
}
