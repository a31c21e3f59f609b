//! Field descriptors and the typed accessor registry.
//!
//! [`SchemaBuilder`] is handed to [`Record::describe`] once per record type.
//! Each registration stores a [`FieldDescriptor`] next to a pair of typed
//! closures, so rows are read and written without any runtime inspection
//! of the record type.

use crate::convert::{self, CoercionError};
use crate::record::{OrdinalEnum, Record};
use autotable_storage::{ColumnDef, ColumnType, Value};
use chrono::NaiveDateTime;
use std::fmt;
use std::sync::Arc;

/// Name of the identity column.
pub const ID_FIELD: &str = "ID";

/// Size of a string column that does not declare one.
pub const DEFAULT_STRING_SIZE: u32 = 250;

/// What a field holds, independent of how it is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemanticType {
    /// 32-bit integer.
    Int,
    /// Bounded string.
    String,
    /// Boolean.
    Bool,
    /// Timestamp stored as a tick count.
    Timestamp,
    /// Floating point number.
    Float,
    /// Enum stored as its ordinal.
    Enum,
}

impl SemanticType {
    /// Maps the semantic type onto a column type.
    pub const fn column_type(self, size: u32, is_key: bool) -> ColumnType {
        match self {
            Self::Int => ColumnType::Int {
                auto_increment: is_key,
            },
            Self::Enum => ColumnType::Int {
                auto_increment: false,
            },
            Self::String => ColumnType::Varchar(size),
            Self::Bool => ColumnType::Bit,
            Self::Timestamp => ColumnType::BigInt,
            Self::Float => ColumnType::Float,
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int => "int",
            Self::String => "string",
            Self::Bool => "bool",
            Self::Timestamp => "timestamp",
            Self::Float => "float",
            Self::Enum => "enum",
        };
        f.write_str(name)
    }
}

/// Metadata for one mapped column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Column name.
    pub name: String,
    /// Semantic type.
    pub semantic: SemanticType,
    /// Declared string length (ignored for other types).
    pub size: u32,
    /// Whether this is the table's key.
    pub is_key: bool,
    /// Whether the column carries a unique index.
    pub is_unique: bool,
    /// Whether the field is left out of the table.
    pub is_ignored: bool,
}

impl FieldDescriptor {
    fn new(name: &str, semantic: SemanticType) -> Self {
        Self {
            name: name.to_string(),
            semantic,
            size: DEFAULT_STRING_SIZE,
            is_key: false,
            is_unique: false,
            is_ignored: false,
        }
    }

    /// Returns the column type for this field.
    pub const fn column_type(&self) -> ColumnType {
        self.semantic.column_type(self.size, self.is_key)
    }

    /// Returns the column definition for this field.
    pub fn column_def(&self) -> ColumnDef {
        ColumnDef::new(self.name.clone(), self.column_type())
    }
}

type Getter<T> = Arc<dyn Fn(&T) -> Result<Value, CoercionError> + Send + Sync>;
type Setter<T> = Arc<dyn Fn(&mut T, &Value) -> Result<(), CoercionError> + Send + Sync>;

/// A descriptor together with its typed accessors.
pub struct Field<T> {
    descriptor: FieldDescriptor,
    get: Getter<T>,
    set: Setter<T>,
}

impl<T> Clone for Field<T> {
    fn clone(&self) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
            get: Arc::clone(&self.get),
            set: Arc::clone(&self.set),
        }
    }
}

impl<T> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Field").field(&self.descriptor).finish()
    }
}

impl<T> Field<T> {
    /// Returns the descriptor.
    pub fn descriptor(&self) -> &FieldDescriptor {
        &self.descriptor
    }

    /// Returns the column name.
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Reads the field as a column value.
    ///
    /// # Errors
    ///
    /// Returns a [`CoercionError`] if the value has no column form.
    pub fn get(&self, record: &T) -> Result<Value, CoercionError> {
        (self.get)(record)
    }

    /// Assigns a column value to the field, coercing it to the field type.
    ///
    /// # Errors
    ///
    /// Returns a [`CoercionError`] if the value does not fit.
    pub fn set(&self, record: &mut T, value: &Value) -> Result<(), CoercionError> {
        (self.set)(record, value)
    }
}

/// Options for the field just registered.
pub struct FieldOptions<'a> {
    descriptor: Option<&'a mut FieldDescriptor>,
}

impl FieldOptions<'_> {
    /// Sets the declared string length.
    pub fn size(self, size: u32) -> Self {
        self.update(|d| d.size = size)
    }

    /// Marks the column unique.
    pub fn unique(self) -> Self {
        self.update(|d| d.is_unique = true)
    }

    /// Marks the column as the table key.
    ///
    /// The identity column already is the key; a second key is a fatal
    /// configuration error reported when the table is built.
    pub fn key(self) -> Self {
        self.update(|d| d.is_key = true)
    }

    /// Keeps the field out of the table entirely.
    pub fn ignore(self) -> Self {
        self.update(|d| d.is_ignored = true)
    }

    fn update(mut self, f: impl FnOnce(&mut FieldDescriptor)) -> Self {
        if let Some(d) = self.descriptor.as_deref_mut() {
            f(d);
        }
        self
    }
}

/// Collects the fields of a record type.
pub struct SchemaBuilder<T> {
    entity: String,
    fields: Vec<Field<T>>,
    problems: Vec<String>,
}

impl<T: Record> SchemaBuilder<T> {
    /// Starts a builder with the identity field registered.
    pub(crate) fn new(entity: &str) -> Self {
        let mut builder = Self {
            entity: entity.to_string(),
            fields: Vec::new(),
            problems: Vec::new(),
        };
        builder
            .register(
                ID_FIELD,
                SemanticType::Int,
                Arc::new(|r: &T| Ok(Value::Int(i64::from(r.id())))),
                Arc::new(|r: &mut T, v: &Value| {
                    r.set_id(convert::int_of(v)?);
                    Ok(())
                }),
            )
            .key();
        builder
    }

    /// Builds the descriptor for `T`.
    pub(crate) fn describe(entity: &str) -> TypeDescriptor<T> {
        let mut builder = Self::new(entity);
        T::describe(&mut builder);
        builder.build()
    }
}

impl<T: 'static> SchemaBuilder<T> {
    /// Registers an `int` field.
    pub fn int(
        &mut self,
        name: &str,
        get: impl Fn(&T) -> i32 + Send + Sync + 'static,
        set: impl Fn(&mut T, i32) + Send + Sync + 'static,
    ) -> FieldOptions<'_> {
        self.register(
            name,
            SemanticType::Int,
            Arc::new(move |r: &T| Ok(Value::Int(i64::from(get(r))))),
            Arc::new(move |r: &mut T, v: &Value| {
                set(r, convert::int_of(v)?);
                Ok(())
            }),
        )
    }

    /// Registers a `string` field (size 250 unless set).
    pub fn string(
        &mut self,
        name: &str,
        get: impl Fn(&T) -> String + Send + Sync + 'static,
        set: impl Fn(&mut T, String) + Send + Sync + 'static,
    ) -> FieldOptions<'_> {
        self.register(
            name,
            SemanticType::String,
            Arc::new(move |r: &T| Ok(Value::Text(get(r)))),
            Arc::new(move |r: &mut T, v: &Value| {
                set(r, convert::text_of(v)?);
                Ok(())
            }),
        )
    }

    /// Registers a `bool` field.
    pub fn bool(
        &mut self,
        name: &str,
        get: impl Fn(&T) -> bool + Send + Sync + 'static,
        set: impl Fn(&mut T, bool) + Send + Sync + 'static,
    ) -> FieldOptions<'_> {
        self.register(
            name,
            SemanticType::Bool,
            Arc::new(move |r: &T| Ok(Value::Bool(get(r)))),
            Arc::new(move |r: &mut T, v: &Value| {
                set(r, convert::bool_of(v)?);
                Ok(())
            }),
        )
    }

    /// Registers a `timestamp` field, stored as a tick count.
    pub fn timestamp(
        &mut self,
        name: &str,
        get: impl Fn(&T) -> NaiveDateTime + Send + Sync + 'static,
        set: impl Fn(&mut T, NaiveDateTime) + Send + Sync + 'static,
    ) -> FieldOptions<'_> {
        self.register(
            name,
            SemanticType::Timestamp,
            Arc::new(move |r: &T| convert::to_ticks(get(r)).map(Value::Int)),
            Arc::new(move |r: &mut T, v: &Value| {
                set(r, convert::timestamp_of(v)?);
                Ok(())
            }),
        )
    }

    /// Registers a `float` field.
    pub fn float(
        &mut self,
        name: &str,
        get: impl Fn(&T) -> f64 + Send + Sync + 'static,
        set: impl Fn(&mut T, f64) + Send + Sync + 'static,
    ) -> FieldOptions<'_> {
        self.register(
            name,
            SemanticType::Float,
            Arc::new(move |r: &T| Ok(Value::Float(get(r)))),
            Arc::new(move |r: &mut T, v: &Value| {
                set(r, convert::float_of(v)?);
                Ok(())
            }),
        )
    }

    /// Registers an `enum` field, stored as its ordinal.
    pub fn enumeration<E: OrdinalEnum>(
        &mut self,
        name: &str,
        get: impl Fn(&T) -> E + Send + Sync + 'static,
        set: impl Fn(&mut T, E) + Send + Sync + 'static,
    ) -> FieldOptions<'_> {
        self.register(
            name,
            SemanticType::Enum,
            Arc::new(move |r: &T| Ok(Value::Int(i64::from(get(r).ordinal())))),
            Arc::new(move |r: &mut T, v: &Value| {
                let ordinal = convert::int_of(v)?;
                let variant =
                    E::from_ordinal(ordinal).ok_or_else(|| CoercionError::new("enum", v))?;
                set(r, variant);
                Ok(())
            }),
        )
    }

    fn register(
        &mut self,
        name: &str,
        semantic: SemanticType,
        get: Getter<T>,
        set: Setter<T>,
    ) -> FieldOptions<'_> {
        if !is_identifier(name) {
            self.problems
                .push(format!("field name {name:?} is not a valid column name"));
            return FieldOptions { descriptor: None };
        }
        if self
            .fields
            .iter()
            .any(|f| f.descriptor.name.eq_ignore_ascii_case(name))
        {
            self.problems
                .push(format!("field {name} is registered more than once"));
            return FieldOptions { descriptor: None };
        }
        self.fields.push(Field {
            descriptor: FieldDescriptor::new(name, semantic),
            get,
            set,
        });
        FieldOptions {
            descriptor: self.fields.last_mut().map(|f| &mut f.descriptor),
        }
    }

    fn build(self) -> TypeDescriptor<T> {
        let fields: Vec<Field<T>> = self
            .fields
            .into_iter()
            .filter(|f| !f.descriptor.is_ignored)
            .collect();
        TypeDescriptor {
            entity: self.entity,
            fields,
            problems: self.problems,
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// A string field that was longer than its column after normalisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Oversized {
    /// Column name.
    pub field: String,
    /// Length in characters.
    pub length: usize,
    /// Declared size.
    pub size: u32,
}

/// Immutable description of a record type: its fields in column order.
pub struct TypeDescriptor<T> {
    entity: String,
    fields: Vec<Field<T>>,
    problems: Vec<String>,
}

impl<T> fmt::Debug for TypeDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("entity", &self.entity)
            .field("fields", &self.fields)
            .finish()
    }
}

impl<T> TypeDescriptor<T> {
    /// Returns the entity name.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Returns the mapped fields, identity first.
    pub fn fields(&self) -> &[Field<T>] {
        &self.fields
    }

    /// Returns the problems found while describing the type.
    pub fn problems(&self) -> &[String] {
        &self.problems
    }

    /// Looks a field up by column name, ignoring case.
    pub fn field(&self, name: &str) -> Option<&Field<T>> {
        self.fields
            .iter()
            .find(|f| f.descriptor.name.eq_ignore_ascii_case(name))
    }

    /// Returns the first key field.
    pub fn key(&self) -> Option<&Field<T>> {
        self.fields.iter().find(|f| f.descriptor.is_key)
    }

    /// Returns how many fields claim to be the key.
    pub fn key_count(&self) -> usize {
        self.fields.iter().filter(|f| f.descriptor.is_key).count()
    }

    /// Returns the non-key columns that carry a unique index.
    pub fn unique_columns(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.descriptor.is_unique && !f.descriptor.is_key)
            .map(|f| f.name())
            .collect()
    }

    /// Returns every column definition.
    pub fn column_defs(&self) -> Vec<ColumnDef> {
        self.fields.iter().map(|f| f.descriptor.column_def()).collect()
    }

    /// Returns `(column, value)` pairs for every non-key field.
    ///
    /// # Errors
    ///
    /// Returns the first [`CoercionError`] of a field with no column form.
    pub fn write_values(&self, record: &T) -> Result<Vec<(String, Value)>, CoercionError> {
        self.fields
            .iter()
            .filter(|f| !f.descriptor.is_key)
            .map(|f| Ok((f.name().to_string(), f.get(record)?)))
            .collect()
    }

    /// Trims and HTML-decodes every string field in place.
    ///
    /// Returns the fields that are still longer than their column.
    pub fn normalize(&self, record: &mut T) -> Vec<Oversized> {
        let mut oversized = Vec::new();
        for field in &self.fields {
            if field.descriptor.semantic != SemanticType::String {
                continue;
            }
            let Ok(Value::Text(raw)) = field.get(record) else {
                continue;
            };
            let clean = convert::normalize_text(&raw);
            let length = clean.chars().count();
            if length > field.descriptor.size as usize {
                oversized.push(Oversized {
                    field: field.name().to_string(),
                    length,
                    size: field.descriptor.size,
                });
            }
            if clean != raw {
                // Text always coerces into a string field.
                let _ = field.set(record, &Value::Text(clean));
            }
        }
        oversized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    enum Mood {
        #[default]
        Calm,
        Loud,
    }

    impl OrdinalEnum for Mood {
        fn ordinal(&self) -> i32 {
            *self as i32
        }
        fn from_ordinal(ordinal: i32) -> Option<Self> {
            match ordinal {
                0 => Some(Self::Calm),
                1 => Some(Self::Loud),
                _ => None,
            }
        }
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Sample {
        id: i32,
        name: String,
        mood: Mood,
        scratch: i32,
        when: NaiveDateTime,
    }

    impl Record for Sample {
        fn entity_name() -> &'static str {
            "Sample"
        }
        fn id(&self) -> i32 {
            self.id
        }
        fn set_id(&mut self, id: i32) {
            self.id = id;
        }
        fn describe(schema: &mut SchemaBuilder<Self>) {
            schema
                .string("Name", |s| s.name.clone(), |s, v| s.name = v)
                .size(10)
                .unique();
            schema.enumeration("Mood", |s| s.mood, |s, v| s.mood = v);
            schema.int("Scratch", |s| s.scratch, |s, v| s.scratch = v).ignore();
            schema.timestamp("When", |s| s.when, |s, v| s.when = v);
            schema.int("bad name", |s| s.scratch, |s, v| s.scratch = v);
            schema.int("name", |s| s.scratch, |s, v| s.scratch = v);
        }
    }

    fn descriptor() -> TypeDescriptor<Sample> {
        SchemaBuilder::<Sample>::describe("Sample")
    }

    #[test]
    fn identity_first_and_ignored_dropped() {
        let d = descriptor();
        let names: Vec<&str> = d.fields().iter().map(Field::name).collect();
        assert_eq!(names, vec!["ID", "Name", "Mood", "When"]);
        assert_eq!(d.key_count(), 1);
        assert_eq!(d.key().map(Field::name), Some("ID"));
    }

    #[test]
    fn problems_are_collected_not_fatal() {
        let d = descriptor();
        assert_eq!(d.problems().len(), 2);
    }

    #[test]
    fn column_contract() {
        let defs = descriptor().column_defs();
        assert_eq!(
            defs[0].ty,
            ColumnType::Int {
                auto_increment: true
            }
        );
        assert_eq!(defs[1].ty, ColumnType::Varchar(10));
        assert_eq!(
            defs[2].ty,
            ColumnType::Int {
                auto_increment: false
            }
        );
        assert_eq!(defs[3].ty, ColumnType::BigInt);
        assert_eq!(descriptor().unique_columns(), vec!["Name"]);
    }

    #[test]
    fn accessors_round_trip() {
        let d = descriptor();
        let mut sample = Sample::default();
        d.field("mood")
            .unwrap()
            .set(&mut sample, &Value::Int(1))
            .unwrap();
        assert_eq!(sample.mood, Mood::Loud);
        assert!(d
            .field("Mood")
            .unwrap()
            .set(&mut sample, &Value::Int(9))
            .is_err());

        d.field("ID").unwrap().set(&mut sample, &Value::Int(4)).unwrap();
        assert_eq!(sample.id, 4);
        let values = d.write_values(&sample).unwrap();
        assert!(values.iter().all(|(c, _)| c != "ID"));
    }

    #[test]
    fn unrepresentable_timestamp_fails_the_write() {
        let d = descriptor();
        let sample = Sample {
            when: NaiveDateTime::MAX,
            ..Sample::default()
        };
        let err = d.write_values(&sample).unwrap_err();
        assert_eq!(err.expected, "timestamp within the tick range");
    }

    #[test]
    fn normalize_reports_oversized() {
        let d = descriptor();
        let mut sample = Sample {
            name: "  a &amp; b  ".into(),
            ..Sample::default()
        };
        assert!(d.normalize(&mut sample).is_empty());
        assert_eq!(sample.name, "a & b");

        sample.name = "far too long a name".into();
        let over = d.normalize(&mut sample);
        assert_eq!(over.len(), 1);
        assert_eq!(over[0].size, 10);
    }

    #[test]
    fn identifiers() {
        assert!(is_identifier("Name_2"));
        assert!(is_identifier("_x"));
        assert!(!is_identifier("2x"));
        assert!(!is_identifier("a-b"));
        assert!(!is_identifier(""));
    }
}
