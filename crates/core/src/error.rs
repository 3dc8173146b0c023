#![forbid(unsafe_code)]

use crate::ids::InternalId;
use crate::pattern::PatternError;

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("unknown internal id (id={0})")]
    UnknownInternalId(InternalId),
    #[error("duplicate listener (id={0})")]
    DuplicateListener(InternalId),
    #[error("listening would create a circular dependency (id={id}, circular={circular:?})")]
    CircularListen {
        id: InternalId,
        circular: Vec<InternalId>,
    },
    #[error("unknown listener (id={0})")]
    UnknownListener(InternalId),
    #[error("listener already unregistered (id={0})")]
    DoubleUnregister(InternalId),
    #[error("id already reported (id={0})")]
    DoubleReport(InternalId),
    #[error("couldn't find problematic fields while breaking a circular dependency (id={0})")]
    ProblematicFieldsNotFound(InternalId),
    #[error("unknown column (column={0})")]
    UnknownColumn(String),
    #[error("unknown entity (name={0})")]
    UnknownEntity(String),
    #[error("snapshot uncompilable, can't resolve all dependency trees (resolved={resolved}, rows={rows})")]
    Uncompilable { resolved: usize, rows: usize },
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

#[derive(Debug, thiserror::Error)]
pub enum ValueError {
    #[error("missing value for alias (id={0})")]
    MissingAlias(InternalId),
    #[error("invalid assembly part: {0}")]
    InvalidPart(String),
    #[error("disassembly tokens must be scalars (token={0})")]
    InvalidToken(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("invalid schema json: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error("non-optional field missing its value (field={0})")]
    MissingField(String),
    #[error("invalid field value (field={field}): {message}")]
    InvalidValue { field: String, message: String },
    #[error("invalid relation path (field={field}, path={path})")]
    InvalidPath { field: String, path: String },
    #[error("matcher needs one relation per capture group (expression={expression}, groups={groups}, relations={relations})")]
    MatcherGroups {
        expression: String,
        groups: usize,
        relations: usize,
    },
    #[error(transparent)]
    Value(#[from] ValueError),
}

#[derive(Debug, thiserror::Error)]
pub enum ReplayError<E> {
    #[error(transparent)]
    Value(#[from] ValueError),
    #[error("inserter must return a scalar id (entity={entity})")]
    NonScalarId { entity: String },
    #[error(transparent)]
    Recipe(#[from] RecipeError),
    #[error("repository: {0}")]
    Repository(E),
}

#[derive(Debug, thiserror::Error)]
pub enum RecipeError {
    #[error("unknown type (type={0})")]
    UnknownType(String),
    #[error("invalid ingredient config: {0}")]
    InvalidConfig(String),
    #[error("invalid recipe json: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error("replace template must contain the placeholder (replace={replace}, placeholder={placeholder})")]
    MissingPlaceholder {
        replace: String,
        placeholder: String,
    },
    #[error("row is missing its primary key (type={type_name}, key={key})")]
    MissingPrimaryKey { type_name: String, key: String },
    #[error("invalid json path (path={0})")]
    InvalidPath(String),
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
}

#[derive(Debug, thiserror::Error)]
pub enum IntegrityError {
    #[error("A row ({row}) required a missing row ({missing})")]
    MissingRow { row: String, missing: String },
    #[error("circular dependency between rows (row={0})")]
    CircularRows(String),
    #[error("an id needed to be resolved but wasn't known (id={0})")]
    UnknownId(String),
    #[error("inserter must return the created primary key (type={0})")]
    MissingInsertId(String),
}
