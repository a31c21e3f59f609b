//! Typed persistence operations.

use crate::database::DatabaseInner;
use crate::error::{CoreError, CoreResult};
use crate::log::Severity;
use crate::mapper;
use crate::query::Query;
use crate::record::Record;
use crate::schema::{TypeDescriptor, ID_FIELD};
use autotable_storage::{Condition, ErrorKind, Outcome, Statement, Value};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Per-handler settings.
#[derive(Debug, Clone)]
pub struct HandlerOptions<T> {
    /// Table name. Defaults to the entity name.
    pub table_name: Option<String>,
    /// Report failed operations to the event sink.
    pub log_errors: bool,
    /// Report every successful write at info level.
    pub log_writes: bool,
    /// Cache reads of this handler.
    pub cache_enabled: bool,
    /// Row inserted right after the table is created.
    pub default_record: Option<T>,
}

impl<T> Default for HandlerOptions<T> {
    fn default() -> Self {
        Self {
            table_name: None,
            log_errors: true,
            log_writes: false,
            cache_enabled: true,
            default_record: None,
        }
    }
}

impl<T> HandlerOptions<T> {
    /// Creates options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the table name.
    #[must_use]
    pub fn table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = Some(name.into());
        self
    }

    /// Enables or disables error reporting.
    #[must_use]
    pub fn log_errors(mut self, value: bool) -> Self {
        self.log_errors = value;
        self
    }

    /// Enables or disables write reporting.
    #[must_use]
    pub fn log_writes(mut self, value: bool) -> Self {
        self.log_writes = value;
        self
    }

    /// Enables or disables caching for this handler.
    #[must_use]
    pub fn cache_enabled(mut self, value: bool) -> Self {
        self.cache_enabled = value;
        self
    }

    /// Sets the row inserted into a freshly created table.
    #[must_use]
    pub fn default_record(mut self, record: T) -> Self {
        self.default_record = Some(record);
        self
    }
}

/// CRUD access to the table of one record type.
///
/// Every operation follows the same path: answer from the cache if it can,
/// otherwise build a statement and run it. A missing table is created and a
/// missing column triggers a restructure, after which the statement runs
/// again. Each kind of repair is tried at most once per call. Successful
/// writes drop every cached read of the table.
///
/// # Example
///
/// ```rust,ignore
/// let notes = db.handler::<Note>()?;
/// let note = notes.add(Note { text: "hello".into(), ..Note::default() })?;
/// assert_eq!(notes.get_item(note.id)?, Some(note));
/// ```
pub struct Handler<T: Record> {
    db: Arc<DatabaseInner>,
    descriptor: Arc<TypeDescriptor<T>>,
    table: String,
    options: HandlerOptions<T>,
}

impl<T: Record> Clone for Handler<T> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            descriptor: Arc::clone(&self.descriptor),
            table: self.table.clone(),
            options: self.options.clone(),
        }
    }
}

impl<T: Record> fmt::Debug for Handler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("entity", &T::entity_name())
            .field("table", &self.table)
            .finish()
    }
}

impl<T: Record> Handler<T> {
    pub(crate) fn new(
        db: Arc<DatabaseInner>,
        descriptor: Arc<TypeDescriptor<T>>,
        table: String,
        options: HandlerOptions<T>,
    ) -> Self {
        Self {
            db,
            descriptor,
            table,
            options,
        }
    }

    /// Returns the table name.
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Returns the record descriptor.
    pub fn descriptor(&self) -> &TypeDescriptor<T> {
        &self.descriptor
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Inserts `record` and returns it with its new id.
    ///
    /// # Errors
    ///
    /// [`CoreError::DuplicateEntry`] if a unique column collides.
    pub fn add(&self, mut record: T) -> CoreResult<T> {
        self.prepare(&mut record);
        let insert = self
            .insert_statement(&record)
            .inspect_err(|err| self.report("Add", err))?;
        let outcome = self.run("Add", || self.db.executor.execute(&insert))?;
        record.set_id(inserted_id(&outcome));
        self.after_write(|| format!("{} with id {} has been added", T::entity_name(), record.id()));
        Ok(record)
    }

    /// Writes every field of a stored record.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnsavedRecord`] if the record has no id yet.
    pub fn update(&self, mut record: T) -> CoreResult<T> {
        if record.id() == 0 {
            return Err(CoreError::unsaved_record(T::entity_name()));
        }
        self.prepare(&mut record);
        let update = self
            .update_statement(&record)
            .inspect_err(|err| self.report("Update", err))?;
        self.run("Update", || self.db.executor.execute(&update))?;
        self.after_write(|| format!("{} with id {} has been updated", T::entity_name(), record.id()));
        Ok(record)
    }

    /// Updates many stored records in one round trip.
    pub fn update_many(&self, mut records: Vec<T>) -> CoreResult<Vec<T>> {
        if records.is_empty() {
            return Ok(records);
        }
        if records.iter().any(|r| r.id() == 0) {
            return Err(CoreError::unsaved_record(T::entity_name()));
        }
        for record in &mut records {
            self.prepare(record);
        }
        let batch = records
            .iter()
            .map(|r| self.update_statement(r))
            .collect::<CoreResult<Vec<_>>>()
            .inspect_err(|err| self.report("UpdateMany", err))?;
        let batch = Statement::Batch(batch);
        self.run("UpdateMany", || self.db.executor.execute(&batch))?;
        self.after_write(|| {
            let ids: Vec<String> = records.iter().map(|r| r.id().to_string()).collect();
            format!("{} with ids {} have been updated", T::entity_name(), ids.join(", "))
        });
        Ok(records)
    }

    /// Adds a record without an id, updates one with an id.
    pub fn save(&self, record: T) -> CoreResult<T> {
        if record.id() == 0 {
            self.add(record)
        } else {
            self.update(record)
        }
    }

    /// Saves many records: stored ones in one batch, new ones one by one.
    ///
    /// The result keeps the input order.
    pub fn save_many(&self, records: Vec<T>) -> CoreResult<Vec<T>> {
        let (stored, fresh): (Vec<(usize, T)>, Vec<(usize, T)>) = records
            .into_iter()
            .enumerate()
            .partition(|(_, r)| r.id() != 0);

        let (stored_at, stored): (Vec<usize>, Vec<T>) = stored.into_iter().unzip();
        let mut out: Vec<(usize, T)> = stored_at
            .into_iter()
            .zip(self.update_many(stored)?)
            .collect();
        for (at, record) in fresh {
            out.push((at, self.add(record)?));
        }
        out.sort_by_key(|(at, _)| *at);
        Ok(out.into_iter().map(|(_, r)| r).collect())
    }

    /// Deletes the record with `id`. Returns true if a row went away.
    pub fn delete(&self, id: i32) -> CoreResult<bool> {
        Ok(self.delete_where("Delete", Condition::eq(ID_FIELD, id))? > 0)
    }

    /// Deletes every record in `ids`. Returns the number of rows removed.
    pub fn delete_many(&self, ids: &[i32]) -> CoreResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let condition = Condition::Any(ids.iter().map(|id| Condition::eq(ID_FIELD, *id)).collect());
        self.delete_where("DeleteMany", condition)
    }

    /// Deletes the stored records among `records`.
    pub fn delete_records(&self, records: &[T]) -> CoreResult<u64> {
        let ids: Vec<i32> = records.iter().map(Record::id).filter(|id| *id != 0).collect();
        self.delete_many(&ids)
    }

    /// Runs a full restructure of the table now.
    pub fn restructure(&self) -> CoreResult<()> {
        let result = self.restructure_table();
        if let Err(err) = &result {
            self.report("Restructure", err);
        }
        result
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Returns the record with `id`.
    pub fn get_item(&self, id: i32) -> CoreResult<Option<T>> {
        let select = Query::by_field(ID_FIELD, id).to_select(&self.table, &self.descriptor)?;
        let select = Statement::Select(select);
        self.read(
            "GetItem",
            vec![id.to_string()],
            || Ok(self.fetch(&select)?.into_iter().next()),
            Option::is_some,
        )
    }

    /// Returns the first record matching `query`.
    pub fn get_item_where(&self, query: Query) -> CoreResult<Option<T>> {
        Ok(self.get_items(query.limit(1))?.into_iter().next())
    }

    /// Returns the records matching `query`.
    pub fn get_items(&self, query: Query) -> CoreResult<Vec<T>> {
        let select = Statement::Select(query.to_select(&self.table, &self.descriptor)?);
        let (op, args) = query.cache_key();
        self.read(op, args, || self.fetch(&select), |_| true)
    }

    /// Counts the records matching `query`. Limit and order are ignored.
    pub fn count_items(&self, query: Query) -> CoreResult<u64> {
        let count = Statement::Count {
            table: self.table.clone(),
            condition: query.condition(&self.descriptor)?,
        };
        let (op, mut args) = query.cache_key();
        args.insert(0, op.to_string());
        self.read(
            "CountItems",
            args,
            || Ok(mapper::map_count(self.db.executor.query(&count)?)),
            |_| true,
        )
    }

    /// Every record, in id order.
    pub fn get_all(&self) -> CoreResult<Vec<T>> {
        self.get_items(Query::all())
    }

    /// Records whose `field` equals `value`.
    pub fn get_items_by_field(&self, field: &str, value: impl Into<Value>) -> CoreResult<Vec<T>> {
        self.get_items(Query::by_field(field, value))
    }

    /// Records with the given ids.
    pub fn get_items_by_ids(&self, ids: &[i32]) -> CoreResult<Vec<T>> {
        self.get_items(Query::ids(ids.iter().copied()))
    }

    /// Records where any of `fields` contains `text`.
    pub fn search(&self, fields: &[&str], text: &str) -> CoreResult<Vec<T>> {
        self.get_items(Query::search(fields.iter().copied(), text))
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    fn caching(&self) -> bool {
        self.options.cache_enabled && self.db.cache.is_enabled()
    }

    fn read<V>(
        &self,
        op: &str,
        args: Vec<String>,
        fetch: impl Fn() -> CoreResult<V>,
        cacheable: impl Fn(&V) -> bool,
    ) -> CoreResult<V>
    where
        V: Clone + Send + Sync + 'static,
    {
        let caching = self.caching();
        if caching {
            if let Some(hit) = self.db.cache.get::<V>(&self.table, op, &args) {
                self.db.stats.record_cache_hit();
                return Ok(hit);
            }
            self.db.stats.record_cache_miss();
        }
        let generation = self.db.cache.generation(&self.table);
        let value = self.run(op, fetch)?;
        if caching && cacheable(&value) {
            self.db
                .cache
                .put(&self.table, op, &args, value.clone(), generation);
        }
        Ok(value)
    }

    fn fetch(&self, select: &Statement) -> CoreResult<Vec<T>> {
        let cursor = self.db.executor.query(select)?;
        mapper::map_rows(&self.descriptor, cursor, &*self.db.sink.get(), &self.db.stats)
    }

    /// Runs `op`, repairing the table at most once per kind of drift.
    fn run<R>(&self, name: &str, op: impl Fn() -> CoreResult<R>) -> CoreResult<R> {
        let result = self.run_repairing(op);
        if let Err(err) = &result {
            self.report(name, err);
        }
        result
    }

    fn run_repairing<R>(&self, op: impl Fn() -> CoreResult<R>) -> CoreResult<R> {
        self.force_restructure_once()?;
        let mut created = false;
        let mut restructured = false;
        loop {
            let err = match op() {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            match err.backend_kind() {
                Some(ErrorKind::TableMissing) if !created => {
                    created = true;
                    self.create_table()?;
                }
                Some(ErrorKind::ColumnMissing) if !restructured => {
                    restructured = true;
                    self.restructure_table()?;
                }
                Some(kind) if kind.is_schema_drift() => {
                    return Err(CoreError::schema_repair_failed(&self.table, err.to_string()));
                }
                _ => return Err(err),
            }
        }
    }

    fn force_restructure_once(&self) -> CoreResult<()> {
        if !self.db.config.force_restructure || !self.db.mark_restructured(&self.table) {
            return Ok(());
        }
        self.restructure_table()
    }

    fn create_table(&self) -> CoreResult<()> {
        let lock = self.db.schema_locks.for_table(&self.table);
        let _guard = lock.lock();
        self.db.schema.create_table(&self.table, &self.descriptor)?;
        self.insert_default_record()?;
        self.db.cache.invalidate_all(&self.table);
        Ok(())
    }

    fn restructure_table(&self) -> CoreResult<()> {
        let lock = self.db.schema_locks.for_table(&self.table);
        let _guard = lock.lock();
        self.db.schema.restructure_table(&self.table, &self.descriptor)?;
        self.db.cache.invalidate_all(&self.table);
        Ok(())
    }

    fn insert_default_record(&self) -> CoreResult<()> {
        let Some(default) = &self.options.default_record else {
            return Ok(());
        };
        let count = Statement::Count {
            table: self.table.clone(),
            condition: None,
        };
        if mapper::map_count(self.db.executor.query(&count)?) > 0 {
            return Ok(());
        }
        let mut record = default.clone();
        self.prepare(&mut record);
        self.db.executor.execute(&self.insert_statement(&record)?)?;
        debug!(table = %self.table, "default record inserted");
        Ok(())
    }

    fn write_values(&self, record: &T) -> CoreResult<Vec<(String, Value)>> {
        self.descriptor
            .write_values(record)
            .map_err(|err| CoreError::invalid_value(T::entity_name(), &err))
    }

    fn insert_statement(&self, record: &T) -> CoreResult<Statement> {
        Ok(Statement::Insert {
            table: self.table.clone(),
            values: self.write_values(record)?,
        })
    }

    fn update_statement(&self, record: &T) -> CoreResult<Statement> {
        Ok(Statement::Update {
            table: self.table.clone(),
            values: self.write_values(record)?,
            key_column: ID_FIELD.to_string(),
            key_value: Value::from(record.id()),
        })
    }

    fn delete_where(&self, name: &str, condition: Condition) -> CoreResult<u64> {
        let delete = Statement::Delete {
            table: self.table.clone(),
            condition,
        };
        let outcome = self.run(name, || self.db.executor.execute(&delete))?;
        let removed = outcome.affected_rows();
        self.after_write(|| format!("{removed} {} rows deleted", T::entity_name()));
        Ok(removed)
    }

    /// Normalises strings and warns about ones the column will cut short.
    fn prepare(&self, record: &mut T) {
        for over in self.descriptor.normalize(record) {
            self.db.sink.get().record(
                &self.table,
                &format!(
                    "{} is {} characters long but the column holds {}; \
                     enlarge the field and force a restructure",
                    over.field, over.length, over.size
                ),
                Severity::Warning,
            );
        }
    }

    fn after_write(&self, message: impl FnOnce() -> String) {
        self.db.cache.invalidate_all(&self.table);
        if self.options.log_writes {
            self.db.sink.get().record(&self.table, &message(), Severity::Info);
        }
    }

    fn report(&self, op: &str, err: &CoreError) {
        self.db.stats.record_error();
        if self.options.log_errors {
            let severity = if err.is_fatal() {
                Severity::Critical
            } else {
                Severity::Error
            };
            self.db
                .sink
                .get()
                .record(&self.table, &format!("{op} failed: {err}"), severity);
        }
    }
}

fn inserted_id(outcome: &Outcome) -> i32 {
    match outcome {
        Outcome::Affected { last_insert_id, .. } => i32::try_from(*last_insert_id).unwrap_or(0),
        Outcome::Rows(_) => 0,
    }
}
