#![forbid(unsafe_code)]

use std::io::{Read, Write};
use std::path::Path;

use snap_core::{
    CompileOptions, Compiler, Deserializer, Operation, Schema, Serializer, Snapshot, TaskSequence,
    recipes_from_json,
};
use snap_storage::{ReplayOptions, SqliteStore};

use crate::cli::Command;
use crate::error::CliError;

const STDIO: &str = "-";

pub fn run(command: Command, out: &mut dyn Write) -> Result<(), CliError> {
    match command {
        Command::Compile {
            schema,
            snapshot,
            no_presort,
        } => {
            let schema = Schema::from_json(&read_input(&schema.path)?)?;
            let snapshot = Snapshot::from_json(&read_input(&snapshot)?)?;
            let compiler = Compiler::new(CompileOptions {
                presort: !no_presort,
            });
            let sequence = compiler.compile(&schema, &snapshot)?;
            emit(out, &sequence.to_json()?)
        }
        Command::Replay {
            db,
            tasks,
            no_transaction,
        } => {
            let sequence = TaskSequence::from_json(&read_input(&tasks)?)?;
            let mut store = SqliteStore::open(&db.path)?;
            let lookup = store.replay(
                &sequence,
                ReplayOptions {
                    transaction: !no_transaction,
                },
            )?;
            emit(out, &serde_json::to_string(&lookup)?)
        }
        Command::Extract { schema, db } => {
            let schema = Schema::from_json(&read_input(&schema.path)?)?;
            let snapshot = SqliteStore::open(&db.path)?.extract(&schema)?;
            emit(out, &serde_json::to_string(&snapshot)?)
        }
        Command::Serialize { recipes, db, types } => {
            let recipes = recipes_from_json(&read_input(&recipes.path)?)?;
            let types = if types.is_empty() {
                recipes.keys().cloned().collect()
            } else {
                types
            };
            let store = SqliteStore::open(&db.path)?;
            let mut serializer = Serializer::new(recipes);
            let ops = store.serialize(&mut serializer, types.iter().map(String::as_str))?;
            emit(out, &serde_json::to_string(&ops)?)
        }
        Command::Deserialize {
            recipes,
            db,
            ops,
            no_transaction,
        } => {
            let recipes = recipes_from_json(&read_input(&recipes.path)?)?;
            let ops = Operation::list_from_json(&read_input(&ops)?)?;
            let mut store = SqliteStore::open(&db.path)?;
            let mut deserializer = Deserializer::new(recipes);
            store.deserialize(
                &mut deserializer,
                &ops,
                ReplayOptions {
                    transaction: !no_transaction,
                },
            )?;
            Ok(())
        }
    }
}

fn read_input(path: &Path) -> Result<String, CliError> {
    let io_error = |source| CliError::Io {
        path: path.display().to_string(),
        source,
    };
    if path.as_os_str() == STDIO {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text).map_err(io_error)?;
        Ok(text)
    } else {
        std::fs::read_to_string(path).map_err(io_error)
    }
}

fn emit(out: &mut dyn Write, text: &str) -> Result<(), CliError> {
    writeln!(out, "{text}").map_err(|source| CliError::Io {
        path: "<stdout>".to_string(),
        source,
    })
}
