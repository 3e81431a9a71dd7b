use prometheus::IntCounterVec;

lazy_static::lazy_static! {
    pub static ref RATE_LIMIT_DECISIONS_TOTAL: IntCounterVec = prometheus::register_int_counter_vec!(
        "rate_limit_decisions_total",
        "Rate limit decisions by endpoint class",
        &["class", "decision"]
    ).unwrap();
}
