use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, HistogramVec,
    IntCounter, IntCounterVec,
};

lazy_static::lazy_static! {
    pub static ref QUERIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "tsbench_queries_total", "Queries completed successfully", &["label"]
    ).unwrap();
    pub static ref QUERY_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "tsbench_failures_total", "Failures reported to the outcome sink", &["stage"]
    ).unwrap();
    pub static ref QUERY_DURATION: HistogramVec = register_histogram_vec!(
        "tsbench_query_duration_seconds", "Query duration", &["label"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();
    pub static ref RECORDS_DISPATCHED_TOTAL: IntCounter = register_int_counter!(
        "tsbench_records_dispatched_total", "Records handed to a worker"
    ).unwrap();
    pub static ref WORKERS_CREATED_TOTAL: IntCounter = register_int_counter!(
        "tsbench_workers_created_total", "Workers spawned, including lazily created ones"
    ).unwrap();
}

pub fn init() {
    lazy_static::initialize(&QUERIES_TOTAL);
    lazy_static::initialize(&QUERY_FAILURES_TOTAL);
    lazy_static::initialize(&QUERY_DURATION);
    lazy_static::initialize(&RECORDS_DISPATCHED_TOTAL);
    lazy_static::initialize(&WORKERS_CREATED_TOTAL);
}
