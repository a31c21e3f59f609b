//! Bookkeeping of the unique indexes the engine has created.
//!
//! One row per `(table, column)` that carries an index named
//! `<column>_UNIQUE`. Reconciliation diffs the wanted unique columns against
//! these rows, so a table that is already right costs one read and no DDL.

use crate::error::{CoreError, CoreResult};
use crate::executor::Executor;
use crate::log::SinkSlot;
use crate::mapper;
use crate::record::Record;
use crate::schema::{SchemaBuilder, TypeDescriptor};
use crate::stats::DatabaseStats;
use autotable_storage::{Condition, ErrorKind, Select, Statement, Value};
use std::sync::Arc;

/// Prefix of every table the engine owns.
pub const INTERNAL_TABLE_PREFIX: &str = "autotable_";

/// Table holding [`UniqueKey`] rows.
pub const UNIQUE_KEYS_TABLE: &str = "autotable_UniqueKeys";

/// A unique index created by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UniqueKey {
    /// Row id.
    pub id: i32,
    /// Indexed table.
    pub table_name: String,
    /// Indexed column.
    pub column_name: String,
    /// Index name.
    pub index_name: String,
}

impl UniqueKey {
    /// The index name used for a unique column.
    pub fn index_for(column: &str) -> String {
        format!("{column}_UNIQUE")
    }
}

impl Record for UniqueKey {
    fn entity_name() -> &'static str {
        "UniqueKey"
    }

    fn id(&self) -> i32 {
        self.id
    }

    fn set_id(&mut self, id: i32) {
        self.id = id;
    }

    fn describe(schema: &mut SchemaBuilder<Self>) {
        schema.string("TableName", |k| k.table_name.clone(), |k, v| k.table_name = v);
        schema.string("ColumnName", |k| k.column_name.clone(), |k, v| k.column_name = v);
        schema.string("IndexName", |k| k.index_name.clone(), |k, v| k.index_name = v);
    }
}

pub(crate) struct UniqueKeyStore {
    executor: Arc<Executor>,
    descriptor: TypeDescriptor<UniqueKey>,
    stats: Arc<DatabaseStats>,
    sink: Arc<SinkSlot>,
}

impl UniqueKeyStore {
    pub(crate) fn new(
        executor: Arc<Executor>,
        stats: Arc<DatabaseStats>,
        sink: Arc<SinkSlot>,
    ) -> Self {
        Self {
            executor,
            descriptor: SchemaBuilder::<UniqueKey>::describe(UniqueKey::entity_name()),
            stats,
            sink,
        }
    }

    /// Keys recorded for `table`.
    pub(crate) fn recorded(&self, table: &str) -> CoreResult<Vec<UniqueKey>> {
        let select = Statement::Select(Select {
            condition: Some(Condition::eq("TableName", table)),
            ..Select::all(UNIQUE_KEYS_TABLE)
        });
        self.with_table(|| {
            let cursor = self.executor.query(&select)?;
            mapper::map_rows(&self.descriptor, cursor, &*self.sink.get(), &self.stats)
        })
    }

    pub(crate) fn insert(&self, table: &str, column: &str) -> CoreResult<()> {
        let key = UniqueKey {
            id: 0,
            table_name: table.to_string(),
            column_name: column.to_string(),
            index_name: UniqueKey::index_for(column),
        };
        let values = self
            .descriptor
            .write_values(&key)
            .map_err(|err| CoreError::invalid_value(UniqueKey::entity_name(), &err))?;
        let insert = Statement::Insert {
            table: UNIQUE_KEYS_TABLE.to_string(),
            values,
        };
        self.with_table(|| self.executor.execute(&insert).map(|_| ()))
    }

    pub(crate) fn remove(&self, key: &UniqueKey) -> CoreResult<()> {
        let delete = Statement::Delete {
            table: UNIQUE_KEYS_TABLE.to_string(),
            condition: Condition::eq("ID", Value::from(key.id)),
        };
        self.with_table(|| self.executor.execute(&delete).map(|_| ()))
    }

    /// Drops every row recorded for `table`.
    pub(crate) fn forget(&self, table: &str) -> CoreResult<()> {
        let delete = Statement::Delete {
            table: UNIQUE_KEYS_TABLE.to_string(),
            condition: Condition::eq("TableName", table),
        };
        self.with_table(|| self.executor.execute(&delete).map(|_| ()))
    }

    /// Runs `op`, creating the bookkeeping table once if it is missing.
    fn with_table<R>(&self, op: impl Fn() -> CoreResult<R>) -> CoreResult<R> {
        match op() {
            Err(err) if err.backend_kind() == Some(ErrorKind::TableMissing) => {
                self.create()?;
                op()
            }
            other => other,
        }
    }

    fn create(&self) -> CoreResult<()> {
        let create = Statement::CreateTable {
            table: UNIQUE_KEYS_TABLE.to_string(),
            columns: self.descriptor.column_defs(),
            primary_key: self.descriptor.key().map(|k| k.name().to_string()),
        };
        self.executor
            .execute(&create)
            .map(|_| ())
            .map_err(|err| match err {
                CoreError::Backend(inner) => {
                    CoreError::schema_repair_failed(UNIQUE_KEYS_TABLE, inner.to_string())
                }
                other => other,
            })
    }
}

impl std::fmt::Debug for UniqueKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UniqueKeyStore").finish_non_exhaustive()
    }
}
