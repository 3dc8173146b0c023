#![forbid(unsafe_code)]

use std::collections::HashMap;

use crate::error::CompileError;
use crate::ids::{IdRegistry, InternalId};
use crate::snapshot::EntityRow;
use crate::task::CreateTask;

/// Orders rows before compilation. Any order compiles; a good one needs fewer
/// circular breaks.
pub trait Sorter {
    fn sort<'a>(
        &self,
        ids: &IdRegistry,
        rows: &'a [EntityRow],
        tasks: &[CreateTask],
    ) -> Result<Vec<&'a EntityRow>, CompileError>;
}

/// Keeps the snapshot order.
#[derive(Clone, Copy, Debug, Default)]
pub struct InputOrder;

impl Sorter for InputOrder {
    fn sort<'a>(
        &self,
        _ids: &IdRegistry,
        rows: &'a [EntityRow],
        _tasks: &[CreateTask],
    ) -> Result<Vec<&'a EntityRow>, CompileError> {
        Ok(rows.iter().collect())
    }
}

/// Rows required by others come first, least required first; rows nobody
/// requires follow in snapshot order.
#[derive(Clone, Copy, Debug, Default)]
pub struct SortByMostRequired;

impl Sorter for SortByMostRequired {
    fn sort<'a>(
        &self,
        ids: &IdRegistry,
        rows: &'a [EntityRow],
        tasks: &[CreateTask],
    ) -> Result<Vec<&'a EntityRow>, CompileError> {
        let mut required: HashMap<InternalId, usize> = HashMap::new();
        for task in tasks {
            for dep in task.dependencies() {
                if dep != task.id() {
                    *required.entry(dep).or_default() += 1;
                }
            }
        }

        let mut needed = Vec::new();
        let mut rest = Vec::new();
        for row in rows {
            let count = ids
                .find_id(row.name(), row.key())
                .and_then(|id| required.get(&id).copied())
                .unwrap_or(0);
            if count > 0 {
                needed.push((count, row));
            } else {
                rest.push(row);
            }
        }
        needed.sort_by_key(|(count, _)| *count);
        Ok(needed.into_iter().map(|(_, row)| row).chain(rest).collect())
    }
}
