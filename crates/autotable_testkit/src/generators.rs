//! Property-based test generators using proptest.

use crate::fixtures::TestRecord;
use proptest::prelude::*;

/// Text that survives normalisation unchanged: no surrounding blanks and
/// no HTML entities.
pub fn plain_text_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9]([a-zA-Z0-9 ]{0,38}[a-zA-Z0-9])?"
}

/// Unsaved [`TestRecord`]s.
pub fn test_record_strategy() -> impl Strategy<Value = TestRecord> {
    (any::<i32>(), plain_text_strategy()).prop_map(|(i, s)| TestRecord::new(i, s))
}

/// Operations applied to a table in sequence.
#[derive(Debug, Clone)]
pub enum TableOp {
    /// Add a record.
    Add(TestRecord),
    /// Update the n-th stored record (modulo the stored count).
    Update(usize, i32),
    /// Delete the n-th stored record (modulo the stored count).
    Delete(usize),
}

/// Random [`TableOp`]s.
pub fn table_op_strategy() -> impl Strategy<Value = TableOp> {
    prop_oneof![
        3 => test_record_strategy().prop_map(TableOp::Add),
        2 => (any::<usize>(), any::<i32>()).prop_map(|(n, v)| TableOp::Update(n, v)),
        1 => any::<usize>().prop_map(TableOp::Delete),
    ]
}

/// Sequences of [`TableOp`]s.
pub fn table_ops_strategy(max_len: usize) -> impl Strategy<Value = Vec<TableOp>> {
    prop::collection::vec(table_op_strategy(), 1..max_len)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of cases.
    pub cases: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self { cases: 64 }
    }
}

impl PropTestConfig {
    /// A small configuration for tests that touch threads or many rows.
    pub fn quick() -> Self {
        Self { cases: 16 }
    }

    /// Converts to proptest config.
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            ..ProptestConfig::default()
        }
    }
}
