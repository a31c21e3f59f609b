//! Property tests over random workloads.

use autotable_core::{Config, OrderBy, Query};
use autotable_testkit::prelude::*;
use proptest::prelude::*;
use std::time::Duration;

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn admission_never_exceeds_the_ceiling(ceiling in 1usize..4, threads in 2usize..6) {
        let t = TestDatabase::with_config(Config::new().max_connections(ceiling));
        t.seed(1);
        t.backend.set_latency(Duration::from_millis(1));

        let result = stress_concurrent_adds(
            &t.tests(),
            &StressConfig { operations: 3, threads },
        );

        prop_assert_eq!(result.failed_ops, 0);
        prop_assert!(t.backend.max_in_flight() <= ceiling);
        prop_assert_eq!(t.connections_in_use(), 0);
    }

    #[test]
    fn cached_reads_match_the_table(ops in table_ops_strategy(24)) {
        let t = TestDatabase::memory();
        let handler = t.tests();
        let mut model: Vec<TestRecord> = Vec::new();

        for op in ops {
            match op {
                TableOp::Add(record) => {
                    model.push(handler.add(record).unwrap());
                }
                TableOp::Update(n, value) if !model.is_empty() => {
                    let at = n % model.len();
                    model[at].int_value = value;
                    handler.update(model[at].clone()).unwrap();
                }
                TableOp::Delete(n) if !model.is_empty() => {
                    let gone = model.remove(n % model.len());
                    prop_assert!(handler.delete(gone.id).unwrap());
                }
                _ => {}
            }

            let newest_first: Vec<TestRecord> = model.iter().rev().cloned().collect();
            prop_assert_eq!(
                handler.get_items(Query::all().order_by(OrderBy::desc("ID"))).unwrap(),
                newest_first
            );
            prop_assert_eq!(handler.count_items(Query::all()).unwrap(), model.len() as u64);
        }
    }
}
