#![forbid(unsafe_code)]

use snap_core::{CompileError, IntegrityError, RecipeError, ReplayError, SchemaError};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("compile: {0}")]
    Compile(#[from] CompileError),
    #[error("schema: {0}")]
    Schema(#[from] SchemaError),
    #[error("replay: {0}")]
    Replay(#[from] ReplayError<rusqlite::Error>),
    #[error("recipe: {0}")]
    Recipe(#[from] RecipeError),
    #[error("integrity: {0}")]
    Integrity(#[from] IntegrityError),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}
