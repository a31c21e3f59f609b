//! Read query shapes.
//!
//! A [`Query`] names which rows to read, how many and in what order. It is
//! validated against the record's descriptor before any SQL is built, so an
//! unknown field fails fast with [`CoreError::UnknownField`] instead of
//! looking like schema drift.

use crate::error::{CoreError, CoreResult};
use crate::schema::{TypeDescriptor, ID_FIELD};
use autotable_storage::{escape_like, Condition, Direction, Order, Select, Value};

/// How the conditions of one [`Filter`] combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterKind {
    /// Every condition must hold.
    #[default]
    And,
    /// Any condition may hold.
    Or,
}

/// A set of `field = value` conditions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filter {
    kind: FilterKind,
    conditions: Vec<(String, Value)>,
}

impl Filter {
    /// Creates an empty filter.
    pub fn new(kind: FilterKind) -> Self {
        Self {
            kind,
            conditions: Vec::new(),
        }
    }

    /// Creates an empty conjunction.
    pub fn and() -> Self {
        Self::new(FilterKind::And)
    }

    /// Creates an empty disjunction.
    pub fn or() -> Self {
        Self::new(FilterKind::Or)
    }

    /// Adds a condition.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.add_condition(field, value);
        self
    }

    /// Adds a condition in place.
    pub fn add_condition(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.conditions.push((field.into(), value.into()));
    }

    /// Returns the combination kind.
    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    /// Returns the conditions.
    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }
}

/// Result ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// Field to sort on.
    pub field: String,
    /// Direction.
    pub direction: Direction,
}

impl OrderBy {
    /// Ascending on `field`.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    /// Descending on `field`.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }
}

impl Default for OrderBy {
    fn default() -> Self {
        Self::asc(ID_FIELD)
    }
}

/// Which rows a query selects.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Every row.
    All,
    /// Rows whose field equals a value.
    ByField {
        /// Field name.
        field: String,
        /// Wanted value.
        value: Value,
    },
    /// Rows whose field equals any of the values (child id arrays).
    FieldIn {
        /// Field name.
        field: String,
        /// Accepted values.
        values: Vec<Value>,
    },
    /// Rows with any of the ids.
    Ids(Vec<i32>),
    /// Free-text search over one or more fields.
    Search {
        /// Searched fields.
        fields: Vec<String>,
        /// Search text, matched literally.
        text: String,
        /// Match the whole value instead of a substring.
        exact: bool,
    },
    /// Every filter must hold.
    Filters(Vec<Filter>),
}

/// A read request.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    selection: Selection,
    limit: Option<u64>,
    order: OrderBy,
}

impl Default for Query {
    fn default() -> Self {
        Self::all()
    }
}

impl Query {
    /// Selects every row.
    pub fn all() -> Self {
        Self::with_selection(Selection::All)
    }

    /// Selects rows where `field = value`.
    pub fn by_field(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::with_selection(Selection::ByField {
            field: field.into(),
            value: value.into(),
        })
    }

    /// Selects rows where `field` is one of `values`.
    pub fn field_in<V: Into<Value>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::with_selection(Selection::FieldIn {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        })
    }

    /// Selects rows by id.
    pub fn ids(ids: impl IntoIterator<Item = i32>) -> Self {
        Self::with_selection(Selection::Ids(ids.into_iter().collect()))
    }

    /// Selects rows where any of `fields` contains `text`.
    pub fn search<S: Into<String>>(fields: impl IntoIterator<Item = S>, text: impl Into<String>) -> Self {
        Self::with_selection(Selection::Search {
            fields: fields.into_iter().map(Into::into).collect(),
            text: text.into(),
            exact: false,
        })
    }

    /// Selects rows matching every filter.
    pub fn filters(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self::with_selection(Selection::Filters(filters.into_iter().collect()))
    }

    /// Creates a query from a selection.
    pub fn with_selection(selection: Selection) -> Self {
        Self {
            selection,
            limit: None,
            order: OrderBy::default(),
        }
    }

    /// Makes a search match whole values only.
    #[must_use]
    pub fn exact(mut self) -> Self {
        if let Selection::Search { exact, .. } = &mut self.selection {
            *exact = true;
        }
        self
    }

    /// Caps the number of rows. Zero means no cap.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = (limit > 0).then_some(limit);
        self
    }

    /// Sets the ordering.
    #[must_use]
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order = order;
        self
    }

    /// Returns the selection.
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Returns the row cap.
    pub fn row_limit(&self) -> Option<u64> {
        self.limit
    }

    /// Returns the ordering.
    pub fn ordering(&self) -> &OrderBy {
        &self.order
    }

    /// Operation name and arguments identifying this query in the cache.
    pub(crate) fn cache_key(&self) -> (&'static str, Vec<String>) {
        let mut args = Vec::new();
        let op = match &self.selection {
            Selection::All => "GetItems",
            Selection::ByField { field, value } => {
                args.push(field.clone());
                args.push(arg(value));
                "GetItemsByField"
            }
            Selection::FieldIn { field, values } => {
                args.push(field.clone());
                args.extend(values.iter().map(arg));
                "GetItemsByFieldIn"
            }
            Selection::Ids(ids) => {
                args.extend(ids.iter().map(i32::to_string));
                "GetItemsByIds"
            }
            Selection::Search {
                fields,
                text,
                exact,
            } => {
                args.extend(fields.iter().cloned());
                args.push(text.clone());
                args.push(exact.to_string());
                "Search"
            }
            Selection::Filters(filters) => {
                for filter in filters {
                    args.push(format!("{:?}", filter.kind));
                    for (field, value) in &filter.conditions {
                        args.push(field.clone());
                        args.push(arg(value));
                    }
                }
                "GetItemsByFilters"
            }
        };
        args.push(self.limit.unwrap_or(0).to_string());
        args.push(self.order.direction.keyword().to_string());
        args.push(self.order.field.clone());
        (op, args)
    }

    /// The `WHERE` condition, with field names checked and canonicalised.
    pub(crate) fn condition<T>(&self, descriptor: &TypeDescriptor<T>) -> CoreResult<Option<Condition>> {
        let column = |name: &str| resolve(descriptor, name);
        let condition = match &self.selection {
            Selection::All => return Ok(None),
            Selection::ByField { field, value } => Condition::eq(column(field)?, value.clone()),
            Selection::FieldIn { field, values } => {
                let name = column(field)?;
                Condition::Any(
                    values
                        .iter()
                        .map(|v| Condition::eq(name.clone(), v.clone()))
                        .collect(),
                )
            }
            Selection::Ids(ids) => {
                let name = column(ID_FIELD)?;
                Condition::Any(
                    ids.iter()
                        .map(|id| Condition::eq(name.clone(), *id))
                        .collect(),
                )
            }
            Selection::Search {
                fields,
                text,
                exact,
            } => {
                let literal = escape_like(text);
                let pattern = if *exact {
                    literal
                } else {
                    format!("%{literal}%")
                };
                let mut any = Vec::with_capacity(fields.len());
                for field in fields {
                    any.push(Condition::Like {
                        column: column(field)?,
                        pattern: pattern.clone(),
                    });
                }
                Condition::Any(any)
            }
            Selection::Filters(filters) => {
                let mut all = Vec::with_capacity(filters.len());
                for filter in filters {
                    let mut parts = Vec::with_capacity(filter.conditions.len());
                    for (field, value) in &filter.conditions {
                        parts.push(Condition::eq(column(field)?, value.clone()));
                    }
                    all.push(match filter.kind {
                        FilterKind::And => Condition::All(parts),
                        FilterKind::Or => Condition::Any(parts),
                    });
                }
                Condition::All(all)
            }
        };
        Ok(Some(condition))
    }

    /// The full `SELECT` for `table`.
    pub(crate) fn to_select<T>(&self, table: &str, descriptor: &TypeDescriptor<T>) -> CoreResult<Select> {
        Ok(Select {
            table: table.to_string(),
            condition: self.condition(descriptor)?,
            order: Some(Order {
                column: resolve(descriptor, &self.order.field)?,
                direction: self.order.direction,
            }),
            limit: self.limit,
        })
    }
}

fn arg(value: &Value) -> String {
    format!("{}:{value}", value.type_name())
}

fn resolve<T>(descriptor: &TypeDescriptor<T>, name: &str) -> CoreResult<String> {
    descriptor
        .field(name)
        .map(|f| f.name().to_string())
        .ok_or_else(|| CoreError::unknown_field(descriptor.entity(), name))
}
