//! Table creation and restructuring.

use super::unique::{UniqueKey, UniqueKeyStore, UNIQUE_KEYS_TABLE};
use super::TypeDescriptor;
use crate::error::{CoreError, CoreResult};
use crate::executor::Executor;
use crate::log::{Severity, SinkSlot};
use crate::stats::DatabaseStats;
use autotable_storage::{ErrorKind, Statement};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

const SENDER: &str = "SchemaSync";

/// One lock per table name, serialising DDL on that table.
#[derive(Debug, Default)]
pub(crate) struct SchemaLocks {
    tables: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SchemaLocks {
    pub(crate) fn for_table(&self, table: &str) -> Arc<Mutex<()>> {
        let mut tables = self.tables.lock();
        Arc::clone(tables.entry(table.to_ascii_lowercase()).or_default())
    }
}

/// Makes physical tables match record descriptors.
///
/// Every step is idempotent. Duplicate columns, duplicate key names and an
/// already present primary key count as success, so two callers racing on
/// the same table both end up with the same structure.
#[derive(Debug)]
pub(crate) struct SchemaSync {
    executor: Arc<Executor>,
    unique_keys: UniqueKeyStore,
    stats: Arc<DatabaseStats>,
    sink: Arc<SinkSlot>,
}

impl SchemaSync {
    pub(crate) fn new(
        executor: Arc<Executor>,
        stats: Arc<DatabaseStats>,
        sink: Arc<SinkSlot>,
    ) -> Self {
        Self {
            unique_keys: UniqueKeyStore::new(Arc::clone(&executor), Arc::clone(&stats), Arc::clone(&sink)),
            executor,
            stats,
            sink,
        }
    }

    /// `CREATE TABLE IF NOT EXISTS`, then unique index reconciliation.
    ///
    /// Rows recorded for an earlier incarnation of the table are dropped
    /// first, so every unique column gets its index on the new table.
    pub(crate) fn create_table<T>(&self, table: &str, descriptor: &TypeDescriptor<T>) -> CoreResult<()> {
        check_single_key(table, descriptor)?;
        let create = Statement::CreateTable {
            table: table.to_string(),
            columns: descriptor.column_defs(),
            primary_key: descriptor.key().map(|k| k.name().to_string()),
        };
        match self.executor.execute(&create) {
            Ok(_) => {}
            Err(err) if err.backend_kind() == Some(ErrorKind::MultiplePrimaryKey) => {
                return Err(CoreError::primary_key_conflict(table, err.to_string()));
            }
            Err(err) => return Err(self.failed(table, "create", err)),
        }
        let wanted = descriptor.unique_columns();
        let result = self
            .forget_uniques(table)
            .and_then(|()| self.reconcile_uniques(table, &wanted));
        self.report_unreconciled(table, result);
        self.stats.record_repair();
        debug!(table, "table created");
        Ok(())
    }

    /// Adds or retypes every column, reconciles unique indexes and makes
    /// sure the key column is the primary key.
    ///
    /// Falls back to [`Self::create_table`] if the table does not exist.
    pub(crate) fn restructure_table<T>(
        &self,
        table: &str,
        descriptor: &TypeDescriptor<T>,
    ) -> CoreResult<()> {
        check_single_key(table, descriptor)?;
        for column in descriptor.column_defs() {
            let add = Statement::AddColumn {
                table: table.to_string(),
                column: column.clone(),
            };
            let Err(err) = self.executor.execute(&add) else {
                continue;
            };
            match err.backend_kind() {
                Some(ErrorKind::DuplicateColumn) => {
                    let change = Statement::ChangeColumn {
                        table: table.to_string(),
                        column,
                    };
                    if let Err(err) = self.executor.execute(&change) {
                        return Err(self.failed(table, "change column", err));
                    }
                }
                Some(ErrorKind::MultiplePrimaryKey) => {}
                Some(ErrorKind::TableMissing) => return self.create_table(table, descriptor),
                _ => return Err(self.failed(table, "add column", err)),
            }
        }

        let result = self.reconcile_uniques(table, &descriptor.unique_columns());
        self.report_unreconciled(table, result);

        if let Some(key) = descriptor.key() {
            let primary = Statement::AddPrimaryKey {
                table: table.to_string(),
                column: key.name().to_string(),
            };
            match self.executor.execute(&primary) {
                Ok(_) => {}
                Err(err) if err.backend_kind() == Some(ErrorKind::MultiplePrimaryKey) => {}
                Err(err) => return Err(self.failed(table, "add primary key", err)),
            }
        }
        self.stats.record_repair();
        debug!(table, "table restructured");
        Ok(())
    }

    /// Brings the unique indexes of `table` in line with `wanted`.
    ///
    /// Returns how many DDL statements were issued.
    pub(crate) fn reconcile_uniques(&self, table: &str, wanted: &[&str]) -> CoreResult<usize> {
        if table.eq_ignore_ascii_case(UNIQUE_KEYS_TABLE) {
            return Ok(0);
        }
        let recorded = self.unique_keys.recorded(table)?;
        let mut issued = 0;

        for key in &recorded {
            if wanted.iter().any(|c| c.eq_ignore_ascii_case(&key.column_name)) {
                continue;
            }
            let drop = Statement::DropIndex {
                table: table.to_string(),
                index: key.index_name.clone(),
            };
            issued += 1;
            match self.executor.execute(&drop) {
                Ok(_) => {}
                Err(err) if err.backend_kind() == Some(ErrorKind::MissingIndex) => {}
                Err(err) => return Err(err),
            }
            self.unique_keys.remove(key)?;
        }

        for column in wanted {
            if recorded
                .iter()
                .any(|k| k.column_name.eq_ignore_ascii_case(column))
            {
                continue;
            }
            let add = Statement::AddUniqueIndex {
                table: table.to_string(),
                index: UniqueKey::index_for(column),
                column: (*column).to_string(),
            };
            issued += 1;
            match self.executor.execute(&add) {
                Ok(_) => {}
                Err(err) if err.backend_kind() == Some(ErrorKind::DuplicateKeyName) => {}
                Err(err) => return Err(err),
            }
            self.unique_keys.insert(table, column)?;
        }
        Ok(issued)
    }

    fn forget_uniques(&self, table: &str) -> CoreResult<()> {
        if table.eq_ignore_ascii_case(UNIQUE_KEYS_TABLE) {
            return Ok(());
        }
        self.unique_keys.forget(table)
    }

    /// A reconciliation failure during a repair is reported but does not
    /// fail the repair; it is tried again next time.
    fn report_unreconciled(&self, table: &str, result: CoreResult<usize>) {
        if let Err(err) = result {
            error!(table, %err, "unique index reconciliation failed");
            self.sink.get().record(
                SENDER,
                &format!("unique indexes of {table} not reconciled: {err}"),
                Severity::Error,
            );
        }
    }

    fn failed(&self, table: &str, step: &str, err: CoreError) -> CoreError {
        if err.is_fatal() {
            return err;
        }
        error!(table, step, %err, "schema repair failed");
        self.sink
            .get()
            .record(SENDER, &format!("{step} on {table} failed: {err}"), Severity::Error);
        CoreError::schema_repair_failed(table, format!("{step}: {err}"))
    }
}

fn check_single_key<T>(table: &str, descriptor: &TypeDescriptor<T>) -> CoreResult<()> {
    match descriptor.key_count() {
        0 | 1 => Ok(()),
        n => Err(CoreError::primary_key_conflict(
            table,
            format!("{} declares {n} key fields", descriptor.entity()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::AdmissionController;
    use crate::executor::ExecutorSettings;
    use crate::log::MemorySink;
    use crate::record::Record;
    use crate::schema::SchemaBuilder;
    use autotable_storage::{ColumnDef, ColumnType, InMemoryBackend, SqlBackend, Value};
    use std::time::Duration;

    #[derive(Debug, Clone, Default)]
    struct Account {
        id: i32,
        email: String,
        age: i32,
    }

    impl Record for Account {
        fn entity_name() -> &'static str {
            "Account"
        }
        fn id(&self) -> i32 {
            self.id
        }
        fn set_id(&mut self, id: i32) {
            self.id = id;
        }
        fn describe(schema: &mut SchemaBuilder<Self>) {
            schema
                .string("Email", |a| a.email.clone(), |a, v| a.email = v)
                .size(64)
                .unique();
            schema.int("Age", |a| a.age, |a, v| a.age = v);
        }
    }

    #[derive(Debug, Clone, Default)]
    struct TwoKeys {
        id: i32,
        other: i32,
    }

    impl Record for TwoKeys {
        fn entity_name() -> &'static str {
            "TwoKeys"
        }
        fn id(&self) -> i32 {
            self.id
        }
        fn set_id(&mut self, id: i32) {
            self.id = id;
        }
        fn describe(schema: &mut SchemaBuilder<Self>) {
            schema.int("Other", |t| t.other, |t, v| t.other = v).key();
        }
    }

    fn setup() -> (Arc<InMemoryBackend>, SchemaSync, Arc<MemorySink>) {
        let backend = Arc::new(InMemoryBackend::new());
        let stats = Arc::new(DatabaseStats::new());
        let sink = Arc::new(MemorySink::new());
        let slot = Arc::new(SinkSlot::new(sink.clone()));
        let executor = Arc::new(Executor::new(
            backend.clone(),
            AdmissionController::new(4),
            Arc::clone(&stats),
            Arc::clone(&slot),
            ExecutorSettings {
                acquire_timeout: Duration::from_secs(1),
                max_retries: 7,
                log_queries: false,
            },
        ));
        (backend, SchemaSync::new(executor, stats, slot), sink)
    }

    fn accounts() -> TypeDescriptor<Account> {
        SchemaBuilder::<Account>::describe("Account")
    }

    #[test]
    fn create_builds_columns_and_unique_index() {
        let (backend, sync, _) = setup();
        sync.create_table("Account", &accounts()).unwrap();
        assert_eq!(
            backend.columns("Account").unwrap(),
            vec!["ID".to_string(), "Email".into(), "Age".into()]
        );
        let indexes = backend.indexes("Account").unwrap();
        assert!(indexes.contains(&"ID_UNIQUE".to_string()));
        assert!(indexes.contains(&"Email_UNIQUE".to_string()));
        assert_eq!(backend.row_count(UNIQUE_KEYS_TABLE), Some(1));
    }

    #[test]
    fn two_keys_are_fatal() {
        let (backend, sync, _) = setup();
        let descriptor = SchemaBuilder::<TwoKeys>::describe("TwoKeys");
        let err = sync.create_table("TwoKeys", &descriptor).unwrap_err();
        assert!(matches!(err, CoreError::PrimaryKeyConflict { .. }));
        assert!(err.is_fatal());
        assert!(!backend.has_table("TwoKeys"));
    }

    #[test]
    fn reconcile_twice_issues_no_ddl_the_second_time() {
        let (backend, sync, _) = setup();
        sync.create_table("Account", &accounts()).unwrap();
        backend.reset_log();
        assert_eq!(sync.reconcile_uniques("Account", &["Email"]).unwrap(), 0);
        assert_eq!(backend.ddl_count(), 0);
    }

    #[test]
    fn stale_unique_index_is_dropped() {
        let (backend, sync, _) = setup();
        sync.create_table("Account", &accounts()).unwrap();
        assert_eq!(sync.reconcile_uniques("Account", &[]).unwrap(), 1);
        assert!(!backend
            .indexes("Account")
            .unwrap()
            .contains(&"Email_UNIQUE".to_string()));
        assert_eq!(backend.row_count(UNIQUE_KEYS_TABLE), Some(0));
        assert_eq!(sync.reconcile_uniques("Account", &["Age"]).unwrap(), 1);
        assert_eq!(sync.reconcile_uniques("Account", &["Age"]).unwrap(), 0);
    }

    #[test]
    fn restructure_adds_missing_columns() {
        let (backend, sync, _) = setup();
        backend
            .execute(&Statement::CreateTable {
                table: "Account".into(),
                columns: vec![ColumnDef::new("ID", ColumnType::Int { auto_increment: true })],
                primary_key: Some("ID".into()),
            })
            .unwrap();
        backend
            .execute(&Statement::Insert {
                table: "Account".into(),
                values: Vec::new(),
            })
            .unwrap();
        sync.restructure_table("Account", &accounts()).unwrap();
        assert_eq!(backend.columns("Account").unwrap().len(), 3);
        assert_eq!(backend.row_count("Account"), Some(1));
    }

    #[test]
    fn restructure_of_missing_table_creates_it() {
        let (backend, sync, _) = setup();
        sync.restructure_table("Account", &accounts()).unwrap();
        assert!(backend.has_table("Account"));
    }

    #[test]
    fn restructure_is_repeatable() {
        let (backend, sync, _) = setup();
        sync.create_table("Account", &accounts()).unwrap();
        sync.restructure_table("Account", &accounts()).unwrap();
        sync.restructure_table("Account", &accounts()).unwrap();
        assert_eq!(backend.columns("Account").unwrap().len(), 3);
    }

    #[test]
    fn unique_index_over_duplicates_is_reported_not_fatal() {
        let (backend, sync, sink) = setup();
        backend
            .execute(&Statement::CreateTable {
                table: "Account".into(),
                columns: vec![
                    ColumnDef::new("ID", ColumnType::Int { auto_increment: true }),
                    ColumnDef::new("Email", ColumnType::Varchar(64)),
                ],
                primary_key: Some("ID".into()),
            })
            .unwrap();
        for _ in 0..2 {
            backend
                .execute(&Statement::Insert {
                    table: "Account".into(),
                    values: vec![("Email".into(), Value::from("same"))],
                })
                .unwrap();
        }
        sync.restructure_table("Account", &accounts()).unwrap();
        assert_eq!(sink.at_least(Severity::Error).len(), 1);
        assert_eq!(backend.row_count(UNIQUE_KEYS_TABLE), Some(0));
    }

    #[test]
    fn recreated_table_gets_its_unique_index_back() {
        let (backend, sync, _) = setup();
        sync.create_table("Account", &accounts()).unwrap();
        assert!(backend.drop_table("Account"));

        sync.create_table("Account", &accounts()).unwrap();
        assert!(backend
            .indexes("Account")
            .unwrap()
            .contains(&"Email_UNIQUE".to_string()));
        assert_eq!(backend.row_count(UNIQUE_KEYS_TABLE), Some(1));
    }

    #[test]
    fn locks_are_shared_per_table() {
        let locks = SchemaLocks::default();
        assert!(Arc::ptr_eq(&locks.for_table("Test"), &locks.for_table("TEST")));
        assert!(!Arc::ptr_eq(&locks.for_table("Test"), &locks.for_table("Other")));
    }
}
