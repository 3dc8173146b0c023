#![forbid(unsafe_code)]

pub mod books;
pub mod compiler;
pub mod deserializer;
pub mod disassemble;
pub mod error;
pub mod ids;
pub mod ops;
pub mod pattern;
pub mod recipe;
pub mod resolver;
pub mod schema;
pub mod sequence;
pub mod serializer;
pub mod snapshot;
pub mod task;
pub mod transform;
pub mod validate;
pub mod value;

mod topo;

pub use books::{BookKeeper, DeserializationBookKeeper, SerializationBookKeeper};
pub use compiler::{CompileOptions, Compiler, InputOrder, SortByMostRequired, Sorter};
pub use deserializer::{Deserializer, DeserializerEvent, RowRepository};
pub use error::{CompileError, IntegrityError, RecipeError, ReplayError, SchemaError, ValueError};
pub use ids::{IdRegistry, InternalId};
pub use ops::{OpKind, Operation};
pub use recipe::{Ingredient, Recipe, recipes_from_json};
pub use resolver::IdResolver;
pub use schema::{Entity, Field, FieldCompiler, FieldTransformer, Schema};
pub use sequence::{Repository, TaskSequence};
pub use serializer::{HookHandle, Serializer, SerializerEvent};
pub use snapshot::{EntityRow, Snapshot};
pub use task::{CreateTask, Task, UpdateTask};
pub use transform::Transformer;
pub use validate::{MissingReference, validate};
pub use value::{AliasLookup, AssembledAlias, AssemblyPart, TaskValue};
