//! Record traits.
//!
//! A record type is a plain Rust struct with one integer identity and any
//! number of mapped fields. It tells the engine how to reach those fields
//! once, through [`Record::describe`]; the engine keeps the resulting
//! accessors for the lifetime of the [`crate::Database`].

use crate::schema::SchemaBuilder;

/// A type persisted as rows of one table.
///
/// # Example
///
/// ```rust
/// use autotable_core::{Record, SchemaBuilder};
///
/// #[derive(Debug, Clone, Default, PartialEq)]
/// struct Note {
///     id: i32,
///     title: String,
///     pinned: bool,
/// }
///
/// impl Record for Note {
///     fn entity_name() -> &'static str {
///         "Note"
///     }
///     fn id(&self) -> i32 {
///         self.id
///     }
///     fn set_id(&mut self, id: i32) {
///         self.id = id;
///     }
///     fn describe(schema: &mut SchemaBuilder<Self>) {
///         schema.string("Title", |n| n.title.clone(), |n, v| n.title = v).size(80);
///         schema.bool("Pinned", |n| n.pinned, |n, v| n.pinned = v);
///     }
/// }
/// ```
pub trait Record: Default + Clone + Send + Sync + 'static {
    /// Name of the entity; used as the table name unless overridden.
    fn entity_name() -> &'static str;

    /// Returns the identity. Zero means "not stored yet".
    fn id(&self) -> i32;

    /// Sets the identity.
    fn set_id(&mut self, id: i32);

    /// Registers the mapped fields, in column order.
    ///
    /// The identity column `ID` is registered before this is called.
    fn describe(schema: &mut SchemaBuilder<Self>);
}

/// An enum stored as its integer ordinal.
pub trait OrdinalEnum: Sized + Send + Sync + 'static {
    /// Returns the stored ordinal.
    fn ordinal(&self) -> i32;

    /// Rebuilds the variant from a stored ordinal.
    fn from_ordinal(ordinal: i32) -> Option<Self>;
}
