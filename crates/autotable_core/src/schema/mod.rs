//! Record type descriptions and table synchronisation.
//!
//! - [`SchemaBuilder`] / [`TypeDescriptor`] - the static field registry
//! - `sync` - `CREATE TABLE`, restructure and unique index reconciliation
//! - `unique` - persisted bookkeeping of engine-created unique indexes

mod descriptor;
mod sync;
mod unique;

pub use descriptor::{
    Field, FieldDescriptor, FieldOptions, Oversized, SchemaBuilder, SemanticType,
    TypeDescriptor, DEFAULT_STRING_SIZE, ID_FIELD,
};
pub(crate) use sync::{SchemaLocks, SchemaSync};
pub use unique::{UniqueKey, INTERNAL_TABLE_PREFIX, UNIQUE_KEYS_TABLE};
