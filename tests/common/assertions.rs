use std::collections::HashMap;

use tsbench::report::RunReport;
use tsbench::types::PartitionLabel;

use super::executors::Execution;
use super::records::seq_of;

/// Assert that every label executed its records in increasing sequence order.
pub fn assert_fifo_per_label(executions: &[Execution]) {
    let mut last: HashMap<&PartitionLabel, i64> = HashMap::new();
    for exec in executions {
        let seq = seq_of(&exec.record);
        if let Some(prev) = last.insert(&exec.label, seq) {
            assert!(
                prev < seq,
                "label {} executed seq {seq} after seq {prev}",
                exec.label
            );
        }
    }
}

/// Assert that each partition key was only ever executed by one label.
pub fn assert_key_affinity(executions: &[Execution]) {
    let mut owner: HashMap<&str, &PartitionLabel> = HashMap::new();
    for exec in executions {
        let key = exec.record.partition_key.as_str();
        let label = owner.entry(key).or_insert(&exec.label);
        assert_eq!(
            *label, &exec.label,
            "key '{key}' executed on both {label} and {}",
            exec.label
        );
    }
}

/// Every dispatched record produced exactly one outcome.
pub fn assert_accounted(report: &RunReport) {
    assert_eq!(
        report.records_dispatched,
        report.successes() + report.query_failures,
        "dispatched records must equal successes + query failures: {report:?}"
    );
    let executed: u64 = report.workers.iter().map(|w| w.executed).sum();
    assert_eq!(executed, report.records_dispatched, "worker totals disagree");
}
