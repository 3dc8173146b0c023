#![forbid(unsafe_code)]

use snap_core::{CompileError, RecipeError, SchemaError};
use snap_storage::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("io (path={path}): {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("schema: {0}")]
    Schema(#[from] SchemaError),
    #[error("recipe: {0}")]
    Recipe(#[from] RecipeError),
    #[error("compile: {0}")]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
