//! Row materialisation.
//!
//! Turns a [`Cursor`] into records using the accessor closures of a
//! [`TypeDescriptor`]. A row whose values do not coerce is skipped with a
//! warning; the rest of the result is still returned. The cursor is consumed,
//! so its admission ticket is released on every return path.

use crate::error::CoreResult;
use crate::executor::Cursor;
use crate::log::{EventSink, Severity};
use crate::record::Record;
use crate::schema::TypeDescriptor;
use crate::stats::DatabaseStats;
use autotable_storage::{BackendError, Value};

/// Reads every row of `cursor` into a `T`.
///
/// # Errors
///
/// Returns a `ColumnMissing` backend error if a mapped field has no column
/// in the result, which the caller treats as schema drift.
pub(crate) fn map_rows<T: Record>(
    descriptor: &TypeDescriptor<T>,
    cursor: Cursor,
    sink: &dyn EventSink,
    stats: &DatabaseStats,
) -> CoreResult<Vec<T>> {
    let mut positions = Vec::with_capacity(descriptor.fields().len());
    for field in descriptor.fields() {
        match cursor.column_index(field.name()) {
            Some(pos) => positions.push(pos),
            None => return Err(BackendError::column_missing(field.name(), "field list").into()),
        }
    }

    let mut records = Vec::new();
    let mut skipped = 0_u64;
    'rows: for row in cursor {
        let mut record = T::default();
        for (field, &pos) in descriptor.fields().iter().zip(&positions) {
            let value = row.get(pos).unwrap_or(&Value::Null);
            if let Err(err) = field.set(&mut record, value) {
                skipped += 1;
                sink.record(
                    descriptor.entity(),
                    &format!("skipping corrupt row, column {}: {err}", field.name()),
                    Severity::Warning,
                );
                continue 'rows;
            }
        }
        records.push(record);
    }

    if skipped > 0 {
        stats.record_skipped_rows(skipped);
        tracing::warn!(entity = descriptor.entity(), skipped, "rows skipped");
    }
    Ok(records)
}

/// Reads the single `Count` value of a count query.
pub(crate) fn map_count(cursor: Cursor) -> u64 {
    cursor
        .into_iter()
        .next()
        .and_then(|row| row.first().and_then(Value::as_int))
        .and_then(|n| u64::try_from(n).ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::MemorySink;
    use crate::schema::SchemaBuilder;
    use autotable_storage::{ErrorKind, ResultSet};
    use chrono::NaiveDateTime;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Reading {
        id: i32,
        label: String,
        on: bool,
        at: NaiveDateTime,
        level: f64,
    }

    impl Record for Reading {
        fn entity_name() -> &'static str {
            "Reading"
        }
        fn id(&self) -> i32 {
            self.id
        }
        fn set_id(&mut self, id: i32) {
            self.id = id;
        }
        fn describe(schema: &mut SchemaBuilder<Self>) {
            schema.string("Label", |r| r.label.clone(), |r, v| r.label = v);
            schema.bool("On", |r| r.on, |r, v| r.on = v);
            schema.timestamp("At", |r| r.at, |r, v| r.at = v);
            schema.float("Level", |r| r.level, |r, v| r.level = v);
        }
    }

    fn descriptor() -> TypeDescriptor<Reading> {
        SchemaBuilder::<Reading>::describe("Reading")
    }

    fn columns() -> Vec<String> {
        ["ID", "label", "ON", "At", "Level"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn row(id: i64, label: Value) -> Vec<Value> {
        vec![
            Value::Int(id),
            label,
            Value::Bytes(vec![1]),
            Value::Int(crate::convert::UNIX_EPOCH_TICKS),
            Value::Float(0.5),
        ]
    }

    #[test]
    fn rows_become_records() {
        let set = ResultSet::new(columns(), vec![row(1, Value::from("a")), row(2, Value::from("b"))]);
        let sink = MemorySink::new();
        let stats = DatabaseStats::new();
        let out = map_rows(&descriptor(), Cursor::detached(set), &sink, &stats).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].id, 2);
        assert_eq!(out[1].label, "b");
        assert!(out[0].on);
        assert_eq!(out[0].at.and_utc().timestamp(), 0);
        assert!((out[0].level - 0.5).abs() < f64::EPSILON);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn corrupt_rows_are_skipped() {
        let set = ResultSet::new(
            columns(),
            vec![row(1, Value::from("a")), row(2, Value::Null), row(3, Value::from("c"))],
        );
        let sink = MemorySink::new();
        let stats = DatabaseStats::new();
        let out = map_rows(&descriptor(), Cursor::detached(set), &sink, &stats).unwrap();
        let ids: Vec<i32> = out.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(stats.skipped_rows(), 1);
        assert_eq!(sink.at_least(Severity::Warning).len(), 1);
    }

    #[test]
    fn missing_column_is_drift() {
        let set = ResultSet::new(vec!["ID".into(), "Label".into()], Vec::new());
        let err = map_rows(
            &descriptor(),
            Cursor::detached(set),
            &MemorySink::new(),
            &DatabaseStats::new(),
        )
        .unwrap_err();
        assert_eq!(err.backend_kind(), Some(ErrorKind::ColumnMissing));
    }

    #[test]
    fn count_reads_first_cell() {
        let set = ResultSet::new(vec!["Count".into()], vec![vec![Value::Int(12)]]);
        assert_eq!(map_count(Cursor::detached(set)), 12);
        assert_eq!(map_count(Cursor::detached(ResultSet::default())), 0);
    }
}
