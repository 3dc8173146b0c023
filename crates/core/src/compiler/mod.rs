#![forbid(unsafe_code)]

mod sorter;

use indexmap::IndexMap;

use crate::error::CompileError;
use crate::ids::IdRegistry;
use crate::resolver::IdResolver;
use crate::schema::{Entity, FieldCompiler, Schema};
use crate::sequence::TaskSequence;
use crate::snapshot::{EntityRow, Snapshot};
use crate::task::{CreateTask, Task, UpdateTask};

pub use sorter::{InputOrder, SortByMostRequired, Sorter};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompileOptions {
    /// Run [`SortByMostRequired`] before compiling instead of keeping input order.
    pub presort: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self { presort: true }
    }
}

/// Compiles a snapshot into a replayable [`TaskSequence`].
pub struct Compiler {
    sorter: Box<dyn Sorter>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(CompileOptions::default())
    }
}

impl Compiler {
    pub fn new(options: CompileOptions) -> Self {
        if options.presort {
            Self::with_sorter(SortByMostRequired)
        } else {
            Self::with_sorter(InputOrder)
        }
    }

    pub fn with_sorter(sorter: impl Sorter + 'static) -> Self {
        Self {
            sorter: Box::new(sorter),
        }
    }

    pub fn compile(&self, schema: &Schema, snapshot: &Snapshot) -> Result<TaskSequence, CompileError> {
        let mut ids = IdRegistry::with_morph_table(schema.morph_table());
        let mut resolver: IdResolver<CreateTask> = IdResolver::new();
        let mut creates: Vec<CreateTask> = Vec::new();
        let mut updates: Vec<UpdateTask> = Vec::new();

        // Ids are allocated in snapshot order by this first pass.
        let unsorted = snapshot
            .rows()
            .iter()
            .map(|row| make_create_task(&mut ids, schema.entity(row.name())?, row, &[]))
            .collect::<Result<Vec<_>, _>>()?;
        let rows = self.sorter.sort(&ids, snapshot.rows(), &unsorted)?;

        for row in rows {
            let entity = schema.entity(row.name())?;
            let mut task = make_create_task(&mut ids, entity, row, &[])?;
            let id = task.id();
            let mut deps = task.dependencies();

            let mut circular = resolver.find_circular_deps(id, &deps);
            if deps.contains(&id) {
                circular.push(id);
            }
            if !circular.is_empty() {
                let mut fields: Vec<String> = Vec::new();
                for column in task.columns_depending_on(&circular) {
                    let field = task.field_name(column)?;
                    if !fields.iter().any(|seen| seen == field) {
                        fields.push(field.to_string());
                    }
                }
                if fields.is_empty() {
                    return Err(CompileError::ProblematicFieldsNotFound(id));
                }
                let columns: Vec<String> = fields
                    .iter()
                    .filter_map(|field| task.field_columns().get(field))
                    .flatten()
                    .cloned()
                    .collect();
                updates.push(task.to_update_task(entity.key_name(), &columns)?);
                tracing::debug!(%id, entity = %entity.name, ?fields, "breaking circular dependency");

                task = make_create_task(&mut ids, entity, row, &fields)?;
                deps = task.dependencies();
            }

            if deps.is_empty() {
                creates.push(task);
                resolver.report(id)?;
            } else {
                resolver.listen(id, deps, task)?;
            }
            resolver.drain(|resolver, ready, task| {
                creates.push(task);
                resolver.report(ready)
            })?;
        }

        if creates.len() != snapshot.len() {
            tracing::debug!(waiting = resolver.pending(), "rows wait on ids missing from the snapshot");
            return Err(CompileError::Uncompilable {
                resolved: creates.len(),
                rows: snapshot.len(),
            });
        }
        tracing::debug!(creates = creates.len(), updates = updates.len(), "snapshot compiled");

        let tasks = creates
            .into_iter()
            .map(Task::Create)
            .chain(updates.into_iter().map(Task::Update))
            .collect();
        Ok(TaskSequence::new(tasks))
    }
}

fn make_create_task(
    ids: &mut IdRegistry,
    entity: &Entity,
    row: &EntityRow,
    forced: &[String],
) -> Result<CreateTask, CompileError> {
    let id = ids.get_id(row.name(), row.key());
    let mut columns = Vec::new();
    let mut values = Vec::new();
    let mut field_columns: IndexMap<String, Vec<String>> = IndexMap::new();
    for field in &entity.fields {
        let force = forced.iter().any(|name| name == field.name());
        let compiled = field.compile(ids, row.fields(), force)?;
        let produced = field_columns.entry(field.name().to_string()).or_default();
        for (column, value) in compiled {
            produced.push(column.clone());
            columns.push(column);
            values.push(value);
        }
    }
    Ok(CreateTask::new(row.name(), id, columns, values, field_columns))
}
