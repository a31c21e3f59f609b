//! In-memory SQL backend for testing.

use crate::backend::{Outcome, ResultSet, Row, SqlBackend};
use crate::error::{BackendError, BackendResult, ErrorKind};
use crate::statement::{ColumnDef, ColumnType, Condition, Direction, Select, Statement};
use crate::value::Value;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

const PRIMARY: &str = "PRIMARY";

/// An in-memory backend that behaves like a MySQL server in its default
/// (non-strict) mode, for the subset of SQL the engine emits.
///
/// This backend is suitable for:
/// - Unit and integration tests
/// - Ephemeral databases that don't need a server
///
/// Emulated behaviour includes:
/// - error classification (missing table, unknown column, duplicate
///   column, duplicate key name, duplicate entry, multiple primary key)
/// - case-insensitive text comparison and uniqueness
/// - `FLOAT` columns holding single precision
/// - `VARCHAR` values silently truncated to the column size
/// - zero-filled values for columns added to populated tables
///
/// On top of that it exposes instrumentation for tests: a statement log, a
/// hit counter, injectable latency and injectable failures.
///
/// # Thread Safety
///
/// This backend is thread-safe. Latency is applied outside the data lock,
/// so concurrent calls really overlap.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    tables: Mutex<HashMap<String, Table>>,
    log: Mutex<Vec<Statement>>,
    faults: Mutex<VecDeque<ErrorKind>>,
    latency_micros: AtomicU64,
    hits: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[derive(Debug, Clone)]
struct Index {
    name: String,
    column: String,
}

#[derive(Debug, Clone, Default)]
struct Table {
    columns: Vec<ColumnDef>,
    rows: Vec<Row>,
    indexes: Vec<Index>,
    next_auto: i64,
}

impl InMemoryBackend {
    /// Creates a new empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many statements have reached this backend.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::SeqCst)
    }

    /// Returns a copy of every statement received, in order.
    pub fn statements(&self) -> Vec<Statement> {
        self.log.lock().clone()
    }

    /// Returns the number of DDL statements received (batches flattened).
    pub fn ddl_count(&self) -> usize {
        fn count(stmt: &Statement) -> usize {
            match stmt {
                Statement::Batch(items) => items.iter().map(count).sum(),
                other => usize::from(other.is_ddl()),
            }
        }
        self.log.lock().iter().map(count).sum()
    }

    /// Clears the statement log and the hit counter.
    pub fn reset_log(&self) {
        self.log.lock().clear();
        self.hits.store(0, Ordering::SeqCst);
    }

    /// Delays every subsequent statement by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.latency_micros.store(micros, Ordering::SeqCst);
    }

    /// Makes the next `times` statements fail with `kind`.
    pub fn fail_next(&self, kind: ErrorKind, times: usize) {
        let mut faults = self.faults.lock();
        faults.extend(std::iter::repeat_n(kind, times));
    }

    /// Returns the highest number of statements ever executing at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Returns true if `table` exists.
    pub fn has_table(&self, table: &str) -> bool {
        self.tables.lock().contains_key(table)
    }

    /// Returns the column names of `table` in order.
    pub fn columns(&self, table: &str) -> Option<Vec<String>> {
        self.tables
            .lock()
            .get(table)
            .map(|t| t.columns.iter().map(|c| c.name.clone()).collect())
    }

    /// Returns the index names of `table`.
    pub fn indexes(&self, table: &str) -> Option<Vec<String>> {
        self.tables
            .lock()
            .get(table)
            .map(|t| t.indexes.iter().map(|i| i.name.clone()).collect())
    }

    /// Returns the number of rows in `table`.
    pub fn row_count(&self, table: &str) -> Option<usize> {
        self.tables.lock().get(table).map(|t| t.rows.len())
    }

    /// Drops `table` if it exists.
    pub fn drop_table(&self, table: &str) -> bool {
        self.tables.lock().remove(table).is_some()
    }

    fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlight(&self.in_flight)
    }

    fn apply(tables: &mut HashMap<String, Table>, stmt: &Statement) -> BackendResult<Outcome> {
        match stmt {
            Statement::CreateTable {
                table,
                columns,
                primary_key,
            } => create_table(tables, table, columns, primary_key.as_deref()),
            Statement::AddColumn { table, column } => {
                let t = lookup(tables, table)?;
                t.add_column(column)
            }
            Statement::ChangeColumn { table, column } => {
                let t = lookup(tables, table)?;
                t.change_column(column, table)
            }
            Statement::AddPrimaryKey { table, column } => {
                let t = lookup(tables, table)?;
                t.add_index(PRIMARY, column)
            }
            Statement::AddUniqueIndex {
                table,
                index,
                column,
            } => {
                let t = lookup(tables, table)?;
                t.add_index(index, column)
            }
            Statement::DropIndex { table, index } => {
                let t = lookup(tables, table)?;
                t.drop_index(index)
            }
            Statement::Insert { table, values } => {
                let t = lookup(tables, table)?;
                t.insert(values)
            }
            Statement::Update {
                table,
                values,
                key_column,
                key_value,
            } => {
                let t = lookup(tables, table)?;
                t.update(values, key_column, key_value)
            }
            Statement::Delete { table, condition } => {
                let t = lookup(tables, table)?;
                t.delete(condition)
            }
            Statement::Select(select) => {
                let t = lookup(tables, &select.table)?;
                t.select(select).map(Outcome::Rows)
            }
            Statement::Count { table, condition } => {
                let t = lookup(tables, table)?;
                let matched = t.matching(condition.as_ref())?;
                let set = ResultSet::new(
                    vec!["Count".to_string()],
                    vec![vec![Value::Int(matched.len() as i64)]],
                );
                Ok(Outcome::Rows(set))
            }
            Statement::Batch(items) => {
                let mut total = 0;
                let mut last_id = 0;
                let mut last_rows = None;
                for item in items {
                    match Self::apply(tables, item)? {
                        Outcome::Affected {
                            rows,
                            last_insert_id,
                        } => {
                            total += rows;
                            if last_insert_id != 0 {
                                last_id = last_insert_id;
                            }
                        }
                        Outcome::Rows(set) => last_rows = Some(set),
                    }
                }
                Ok(match last_rows {
                    Some(set) => Outcome::Rows(set),
                    None => Outcome::Affected {
                        rows: total,
                        last_insert_id: last_id,
                    },
                })
            }
        }
    }
}

impl SqlBackend for InMemoryBackend {
    fn execute(&self, statement: &Statement) -> BackendResult<Outcome> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        self.log.lock().push(statement.clone());
        let _flight = self.enter();

        let micros = self.latency_micros.load(Ordering::SeqCst);
        if micros > 0 {
            std::thread::sleep(Duration::from_micros(micros));
        }

        if let Some(kind) = self.faults.lock().pop_front() {
            return Err(BackendError::new(kind, format!("injected {kind} failure")));
        }

        let mut tables = self.tables.lock();
        Self::apply(&mut tables, statement)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn lookup<'a>(tables: &'a mut HashMap<String, Table>, name: &str) -> BackendResult<&'a mut Table> {
    tables
        .get_mut(name)
        .ok_or_else(|| BackendError::table_missing(name))
}

fn affected(rows: usize) -> Outcome {
    Outcome::Affected {
        rows: rows as u64,
        last_insert_id: 0,
    }
}

fn auto_column_error() -> BackendError {
    BackendError::new(
        ErrorKind::Other,
        "Incorrect table definition; there can be only one auto column and it must be defined as a key",
    )
}

fn create_table(
    tables: &mut HashMap<String, Table>,
    name: &str,
    columns: &[ColumnDef],
    primary_key: Option<&str>,
) -> BackendResult<Outcome> {
    if tables.contains_key(name) {
        return Ok(affected(0));
    }
    let mut table = Table {
        next_auto: 1,
        ..Table::default()
    };
    for column in columns {
        if table.position(&column.name).is_some() {
            return Err(BackendError::new(
                ErrorKind::DuplicateColumn,
                format!("Duplicate column name '{}'", column.name),
            ));
        }
        table.columns.push(column.clone());
    }
    if let Some(key) = primary_key {
        if table.position(key).is_none() {
            return Err(BackendError::new(
                ErrorKind::ColumnMissing,
                format!("Key column '{key}' doesn't exist in table"),
            ));
        }
        table.indexes.push(Index {
            name: PRIMARY.to_string(),
            column: key.to_string(),
        });
        table.indexes.push(Index {
            name: format!("{key}_UNIQUE"),
            column: key.to_string(),
        });
    }
    let unkeyed_auto = table
        .columns
        .iter()
        .any(|c| is_auto(c.ty) && !table.is_indexed(&c.name));
    if unkeyed_auto {
        return Err(auto_column_error());
    }
    tables.insert(name.to_string(), table);
    Ok(affected(0))
}

const fn is_auto(ty: ColumnType) -> bool {
    matches!(
        ty,
        ColumnType::Int {
            auto_increment: true
        }
    )
}

impl Table {
    fn position(&self, column: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(column))
    }

    fn require(&self, column: &str, clause: &str) -> BackendResult<usize> {
        self.position(column)
            .ok_or_else(|| BackendError::column_missing(column, clause))
    }

    fn is_indexed(&self, column: &str) -> bool {
        self.indexes
            .iter()
            .any(|i| i.column.eq_ignore_ascii_case(column))
    }

    fn auto_position(&self) -> Option<usize> {
        self.columns.iter().position(|c| is_auto(c.ty))
    }

    fn add_column(&mut self, column: &ColumnDef) -> BackendResult<Outcome> {
        if self.position(&column.name).is_some() {
            return Err(BackendError::new(
                ErrorKind::DuplicateColumn,
                format!("Duplicate column name '{}'", column.name),
            ));
        }
        if is_auto(column.ty) {
            return Err(auto_column_error());
        }
        let zero = column.ty.zero();
        for row in &mut self.rows {
            row.push(zero.clone());
        }
        self.columns.push(column.clone());
        Ok(affected(0))
    }

    fn change_column(&mut self, column: &ColumnDef, table: &str) -> BackendResult<Outcome> {
        let pos = self.require(&column.name, table)?;
        if is_auto(column.ty) && !self.is_indexed(&column.name) {
            return Err(auto_column_error());
        }
        let mut converted = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            converted.push(store(column.ty, &row[pos], &column.name)?);
        }
        for (row, value) in self.rows.iter_mut().zip(converted) {
            row[pos] = value;
        }
        self.columns[pos] = column.clone();
        Ok(affected(self.rows.len()))
    }

    fn add_index(&mut self, name: &str, column: &str) -> BackendResult<Outcome> {
        if name == PRIMARY {
            if self.indexes.iter().any(|i| i.name == PRIMARY) {
                return Err(BackendError::new(
                    ErrorKind::MultiplePrimaryKey,
                    "Multiple primary key defined",
                ));
            }
        } else if self.indexes.iter().any(|i| i.name.eq_ignore_ascii_case(name)) {
            return Err(BackendError::new(
                ErrorKind::DuplicateKeyName,
                format!("Duplicate key name '{name}'"),
            ));
        }
        let pos = self.position(column).ok_or_else(|| {
            BackendError::new(
                ErrorKind::Other,
                format!("Key column '{column}' doesn't exist in table"),
            )
        })?;
        for (i, row) in self.rows.iter().enumerate() {
            if self.rows[..i].iter().any(|other| other[pos].sql_eq(&row[pos])) {
                return Err(BackendError::duplicate_entry(&row[pos].to_string(), name));
            }
        }
        self.indexes.push(Index {
            name: name.to_string(),
            column: self.columns[pos].name.clone(),
        });
        Ok(affected(0))
    }

    fn drop_index(&mut self, name: &str) -> BackendResult<Outcome> {
        let before = self.indexes.len();
        self.indexes.retain(|i| !i.name.eq_ignore_ascii_case(name));
        if self.indexes.len() == before {
            return Err(BackendError::new(
                ErrorKind::MissingIndex,
                format!("Can't DROP '{name}'; check that column/key exists"),
            ));
        }
        Ok(affected(0))
    }

    /// Returns the first index violated by `row`, ignoring row `skip`.
    fn violation(&self, row: &Row, skip: Option<usize>) -> Option<BackendError> {
        for index in &self.indexes {
            let Some(pos) = self.position(&index.column) else {
                continue;
            };
            let clash = self
                .rows
                .iter()
                .enumerate()
                .any(|(i, other)| Some(i) != skip && other[pos].sql_eq(&row[pos]));
            if clash {
                return Some(BackendError::duplicate_entry(
                    &row[pos].to_string(),
                    &index.name,
                ));
            }
        }
        None
    }

    fn insert(&mut self, values: &[(String, Value)]) -> BackendResult<Outcome> {
        let mut row: Row = self.columns.iter().map(|c| c.ty.zero()).collect();
        let mut explicit = vec![false; self.columns.len()];
        for (column, value) in values {
            let pos = self.require(column, "field list")?;
            row[pos] = store(self.columns[pos].ty, value, column)?;
            explicit[pos] = true;
        }

        let mut generated = 0;
        if let Some(pos) = self.auto_position() {
            let given = row[pos].as_int().unwrap_or(0);
            if explicit[pos] && given != 0 {
                self.next_auto = self.next_auto.max(given + 1);
            } else {
                row[pos] = Value::Int(self.next_auto);
                generated = self.next_auto;
                self.next_auto += 1;
            }
        }

        if let Some(err) = self.violation(&row, None) {
            return Err(err);
        }
        self.rows.push(row);
        Ok(Outcome::Affected {
            rows: 1,
            last_insert_id: u64::try_from(generated).unwrap_or(0),
        })
    }

    fn update(
        &mut self,
        values: &[(String, Value)],
        key_column: &str,
        key_value: &Value,
    ) -> BackendResult<Outcome> {
        let key = self.require(key_column, "where clause")?;
        let mut assignments = Vec::with_capacity(values.len());
        for (column, value) in values {
            let pos = self.require(column, "field list")?;
            assignments.push((pos, store(self.columns[pos].ty, value, column)?));
        }

        let targets: Vec<usize> = (0..self.rows.len())
            .filter(|&i| self.rows[i][key].sql_eq(key_value))
            .collect();
        let mut changed = 0;
        for i in targets {
            let mut row = self.rows[i].clone();
            for (pos, value) in &assignments {
                row[*pos] = value.clone();
            }
            if row == self.rows[i] {
                continue;
            }
            if let Some(err) = self.violation(&row, Some(i)) {
                return Err(err);
            }
            self.rows[i] = row;
            changed += 1;
        }
        Ok(affected(changed))
    }

    fn delete(&mut self, condition: &Condition) -> BackendResult<Outcome> {
        let doomed = self.matching(Some(condition))?;
        let mut index = 0;
        self.rows.retain(|_| {
            let keep = !doomed.contains(&index);
            index += 1;
            keep
        });
        Ok(affected(doomed.len()))
    }

    fn matching(&self, condition: Option<&Condition>) -> BackendResult<Vec<usize>> {
        let Some(condition) = condition else {
            return Ok((0..self.rows.len()).collect());
        };
        for column in condition.columns() {
            self.require(column, "where clause")?;
        }
        Ok((0..self.rows.len())
            .filter(|&i| self.eval(condition, &self.rows[i]))
            .collect())
    }

    fn eval(&self, condition: &Condition, row: &Row) -> bool {
        match condition {
            Condition::Eq { column, value } => self
                .position(column)
                .is_some_and(|pos| row[pos].sql_eq(value)),
            Condition::Like { column, pattern } => self
                .position(column)
                .is_some_and(|pos| like(&row[pos].to_string(), pattern)),
            Condition::All(items) => items.iter().all(|c| self.eval(c, row)),
            Condition::Any(items) => items.iter().any(|c| self.eval(c, row)),
        }
    }

    fn select(&self, select: &Select) -> BackendResult<ResultSet> {
        let mut picked = self.matching(select.condition.as_ref())?;
        if let Some(order) = &select.order {
            let pos = self.require(&order.column, "order clause")?;
            picked.sort_by(|&a, &b| {
                let ord = self.rows[a][pos].sql_cmp(&self.rows[b][pos]);
                match order.direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                }
            });
        }
        if let Some(limit) = select.limit {
            picked.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }
        let columns = self.columns.iter().map(|c| c.name.clone()).collect();
        let rows = picked.into_iter().map(|i| self.rows[i].clone()).collect();
        Ok(ResultSet::new(columns, rows))
    }
}

/// Converts `value` into what a column of type `ty` stores.
fn store(ty: ColumnType, value: &Value, column: &str) -> BackendResult<Value> {
    if value.is_null() {
        return Err(BackendError::new(
            ErrorKind::Other,
            format!("Column '{column}' cannot be null"),
        ));
    }
    Ok(match ty {
        ColumnType::Int { .. } => {
            let n = number(value).round();
            Value::Int(n.clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i64)
        }
        ColumnType::BigInt => match value {
            Value::Int(i) => Value::Int(*i),
            other => Value::Int(number(other).round() as i64),
        },
        ColumnType::Bit => Value::Bool(number(value) != 0.0),
        ColumnType::Float => Value::Float(f64::from(number(value) as f32)),
        ColumnType::Varchar(size) => {
            let text = match value {
                Value::Bool(b) => u8::from(*b).to_string(),
                other => other.to_string(),
            };
            Value::Text(text.chars().take(size as usize).collect())
        }
    })
}

fn number(value: &Value) -> f64 {
    match value {
        Value::Int(i) => *i as f64,
        Value::Float(f) => *f,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Text(s) => s.trim().parse().unwrap_or(0.0),
        Value::Bytes(bytes) => bytes.iter().fold(0.0, |acc, b| acc * 256.0 + f64::from(*b)),
        Value::Null => 0.0,
    }
}

#[derive(Clone, Copy, PartialEq)]
enum LikeToken {
    Any,
    One,
    Char(char),
}

/// Case-insensitive `LIKE` with `%` and `_` wildcards and `\` escapes.
fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.to_lowercase().chars().collect();
    let mut tokens = Vec::new();
    let mut chars = pattern.to_lowercase().chars().collect::<Vec<_>>().into_iter();
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '%' => LikeToken::Any,
            '_' => LikeToken::One,
            '\\' => LikeToken::Char(chars.next().unwrap_or('\\')),
            c => LikeToken::Char(c),
        });
    }
    // reachable[j]: text[..i] matches tokens[..j]
    let mut reachable = vec![false; tokens.len() + 1];
    reachable[0] = true;
    for j in 0..tokens.len() {
        reachable[j + 1] = reachable[j] && tokens[j] == LikeToken::Any;
    }
    for &c in &text {
        let mut next = vec![false; tokens.len() + 1];
        for j in 0..tokens.len() {
            next[j + 1] = match tokens[j] {
                LikeToken::Any => next[j] || reachable[j + 1],
                LikeToken::One => reachable[j],
                LikeToken::Char(p) => reachable[j] && p == c,
            };
        }
        reachable = next;
    }
    reachable[tokens.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::Order;

    fn int() -> ColumnType {
        ColumnType::Int {
            auto_increment: false,
        }
    }

    fn people() -> InMemoryBackend {
        let backend = InMemoryBackend::new();
        backend
            .execute(&Statement::CreateTable {
                table: "People".into(),
                columns: vec![
                    ColumnDef::new(
                        "ID",
                        ColumnType::Int {
                            auto_increment: true,
                        },
                    ),
                    ColumnDef::new("Name", ColumnType::Varchar(5)),
                    ColumnDef::new("Age", int()),
                ],
                primary_key: Some("ID".into()),
            })
            .unwrap();
        backend
    }

    fn insert(backend: &InMemoryBackend, name: &str, age: i64) -> BackendResult<Outcome> {
        backend.execute(&Statement::Insert {
            table: "People".into(),
            values: vec![
                ("Name".into(), Value::from(name)),
                ("Age".into(), Value::Int(age)),
            ],
        })
    }

    fn select_all(backend: &InMemoryBackend) -> ResultSet {
        match backend.execute(&Statement::Select(Select::all("People"))).unwrap() {
            Outcome::Rows(set) => set,
            other => panic!("expected rows, got {other:?}"),
        }
    }

    #[test]
    fn missing_table_is_classified() {
        let backend = InMemoryBackend::new();
        let err = backend
            .execute(&Statement::Select(Select::all("Nope")))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::TableMissing);
    }

    #[test]
    fn insert_assigns_increasing_ids() {
        let backend = people();
        let first = insert(&backend, "ann", 30).unwrap();
        let second = insert(&backend, "bob", 40).unwrap();
        assert_eq!(
            first,
            Outcome::Affected {
                rows: 1,
                last_insert_id: 1
            }
        );
        assert_eq!(
            second,
            Outcome::Affected {
                rows: 1,
                last_insert_id: 2
            }
        );
    }

    #[test]
    fn unknown_column_in_select_and_insert() {
        let backend = people();
        let err = backend
            .execute(&Statement::Count {
                table: "People".into(),
                condition: Some(Condition::eq("Height", 1)),
            })
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ColumnMissing);

        let err = backend
            .execute(&Statement::Insert {
                table: "People".into(),
                values: vec![("Height".into(), Value::Int(3))],
            })
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ColumnMissing);
    }

    #[test]
    fn varchar_is_truncated() {
        let backend = people();
        insert(&backend, "alexander", 1).unwrap();
        let row = select_all(&backend).into_rows().next().unwrap();
        assert_eq!(row[1], Value::from("alexa"));
    }

    #[test]
    fn add_column_fills_zero_and_rejects_duplicates() {
        let backend = people();
        insert(&backend, "ann", 30).unwrap();
        let add = Statement::AddColumn {
            table: "People".into(),
            column: ColumnDef::new("Score", ColumnType::Float),
        };
        backend.execute(&add).unwrap();
        assert_eq!(select_all(&backend).into_rows().next().unwrap()[3], Value::Float(0.0));
        assert_eq!(
            backend.execute(&add).unwrap_err().kind,
            ErrorKind::DuplicateColumn
        );
    }

    #[test]
    fn unique_index_lifecycle() {
        let backend = people();
        insert(&backend, "ann", 30).unwrap();
        let add = Statement::AddUniqueIndex {
            table: "People".into(),
            index: "Name_UNIQUE".into(),
            column: "Name".into(),
        };
        backend.execute(&add).unwrap();
        assert_eq!(
            backend.execute(&add).unwrap_err().kind,
            ErrorKind::DuplicateKeyName
        );

        let err = insert(&backend, "ANN", 31).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DuplicateEntry);
        assert_eq!(backend.row_count("People"), Some(1));

        let drop = Statement::DropIndex {
            table: "People".into(),
            index: "Name_UNIQUE".into(),
        };
        backend.execute(&drop).unwrap();
        assert_eq!(
            backend.execute(&drop).unwrap_err().kind,
            ErrorKind::MissingIndex
        );
        insert(&backend, "ANN", 31).unwrap();
    }

    #[test]
    fn second_primary_key_is_rejected() {
        let backend = people();
        let err = backend
            .execute(&Statement::AddPrimaryKey {
                table: "People".into(),
                column: "ID".into(),
            })
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::MultiplePrimaryKey);
    }

    #[test]
    fn select_orders_and_limits() {
        let backend = people();
        for age in [5, 1, 3] {
            insert(&backend, "x", age).unwrap();
        }
        let stmt = Statement::Select(Select {
            table: "People".into(),
            condition: None,
            order: Some(Order {
                column: "Age".into(),
                direction: Direction::Desc,
            }),
            limit: Some(2),
        });
        let Outcome::Rows(set) = backend.execute(&stmt).unwrap() else {
            panic!("expected rows");
        };
        let ages: Vec<Value> = set.into_rows().map(|r| r[2].clone()).collect();
        assert_eq!(ages, vec![Value::Int(5), Value::Int(3)]);
    }

    #[test]
    fn update_and_delete() {
        let backend = people();
        insert(&backend, "ann", 30).unwrap();
        insert(&backend, "bob", 40).unwrap();
        let update = Statement::Update {
            table: "People".into(),
            values: vec![("Age".into(), Value::Int(31))],
            key_column: "ID".into(),
            key_value: Value::Int(1),
        };
        assert_eq!(backend.execute(&update).unwrap().affected_rows(), 1);
        assert_eq!(backend.execute(&update).unwrap().affected_rows(), 0);

        let delete = Statement::Delete {
            table: "People".into(),
            condition: Condition::Like {
                column: "Name".into(),
                pattern: "%O%".into(),
            },
        };
        assert_eq!(backend.execute(&delete).unwrap().affected_rows(), 1);
        assert_eq!(backend.row_count("People"), Some(1));
    }

    #[test]
    fn float_has_single_precision() {
        let backend = InMemoryBackend::new();
        backend
            .execute(&Statement::CreateTable {
                table: "F".into(),
                columns: vec![ColumnDef::new("V", ColumnType::Float)],
                primary_key: None,
            })
            .unwrap();
        backend
            .execute(&Statement::Insert {
                table: "F".into(),
                values: vec![("V".into(), Value::Float(0.1))],
            })
            .unwrap();
        let Outcome::Rows(set) = backend.execute(&Statement::Select(Select::all("F"))).unwrap()
        else {
            panic!("expected rows");
        };
        let stored = set.into_rows().next().unwrap()[0].clone();
        assert_eq!(stored, Value::Float(f64::from(0.1_f32)));
    }

    #[test]
    fn injected_faults_and_log() {
        let backend = people();
        backend.reset_log();
        backend.fail_next(ErrorKind::Transient, 2);
        assert!(insert(&backend, "a", 1).is_err());
        assert!(insert(&backend, "a", 1).is_err());
        assert!(insert(&backend, "a", 1).is_ok());
        assert_eq!(backend.hits(), 3);
        assert_eq!(backend.ddl_count(), 0);
    }

    #[test]
    fn batch_stops_at_first_error() {
        let backend = people();
        let batch = Statement::Batch(vec![
            Statement::Insert {
                table: "People".into(),
                values: vec![("Age".into(), Value::Int(1))],
            },
            Statement::Insert {
                table: "Missing".into(),
                values: vec![],
            },
        ]);
        assert_eq!(
            backend.execute(&batch).unwrap_err().kind,
            ErrorKind::TableMissing
        );
        assert_eq!(backend.row_count("People"), Some(1));
    }

    #[test]
    fn like_wildcards() {
        assert!(like("Hello", "h%"));
        assert!(like("Hello", "%LL%"));
        assert!(like("Hello", "h_llo"));
        assert!(!like("Hello", "h_lo"));
        assert!(like("", "%"));
        assert!(!like("abc", ""));
        assert!(like("50% off", r"50\% off"));
        assert!(!like("500 off", r"50\% off"));
        assert!(like("a_b", r"a\_b"));
        assert!(!like("axb", r"a\_b"));
    }
}
