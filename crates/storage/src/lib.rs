#![forbid(unsafe_code)]

mod error;
mod extract;
mod sql;

pub use error::StoreError;
pub use sql::SqlRepository;

use rusqlite::Connection;
use serde_json::{Map, Value};
use snap_core::{AliasLookup, Deserializer, Operation, Schema, Serializer, Snapshot, TaskSequence};
use std::path::Path;
use std::time::Duration;

#[derive(Clone, Copy, Debug)]
pub struct ReplayOptions {
    /// Run the whole replay in one transaction, rolled back on the first error.
    pub transaction: bool,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self { transaction: true }
    }
}

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn execute_batch(&self, sql: &str) -> Result<(), StoreError> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    pub fn rows(&self, table: &str) -> Result<Vec<Map<String, Value>>, StoreError> {
        sql::select_all(&self.conn, table)
    }

    pub fn extract(&self, schema: &Schema) -> Result<Snapshot, StoreError> {
        let snapshot = extract::extract(&self.conn, schema)?;
        tracing::info!(entities = schema.entities().len(), rows = snapshot.len(), "snapshot extracted");
        Ok(snapshot)
    }

    pub fn replay(
        &mut self,
        sequence: &TaskSequence,
        options: ReplayOptions,
    ) -> Result<AliasLookup, StoreError> {
        let lookup = if options.transaction {
            let tx = self.conn.transaction()?;
            let lookup = sequence.replay(&mut SqlRepository::new(&tx))?;
            tx.commit()?;
            lookup
        } else {
            sequence.replay(&mut SqlRepository::new(&self.conn))?
        };
        tracing::info!(tasks = sequence.len(), rows = lookup.len(), "task sequence written");
        Ok(lookup)
    }

    /// Adds every row of the given tables to the serializer and compiles them.
    pub fn serialize<'a>(
        &self,
        serializer: &mut Serializer,
        tables: impl IntoIterator<Item = &'a str>,
    ) -> Result<Vec<Operation>, StoreError> {
        for table in tables {
            for row in sql::select_all(&self.conn, table)? {
                serializer.add(table, &row)?;
            }
        }
        let ops = serializer.compile()?;
        tracing::info!(rows = serializer.len(), ops = ops.len(), "tables serialized");
        Ok(ops)
    }

    pub fn deserialize(
        &mut self,
        deserializer: &mut Deserializer,
        ops: &[Operation],
        options: ReplayOptions,
    ) -> Result<(), StoreError> {
        if options.transaction {
            let tx = self.conn.transaction()?;
            deserializer.deserialize(ops, &mut SqlRepository::new(&tx))?;
            tx.commit()?;
        } else {
            deserializer.deserialize(ops, &mut SqlRepository::new(&self.conn))?;
        }
        tracing::info!(ops = ops.len(), rows = deserializer.books().len(), "operations written");
        Ok(())
    }
}
