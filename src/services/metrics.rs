use lazy_static::lazy_static;
use prometheus::{register_counter_vec, CounterVec};

lazy_static! {
    pub static ref DISPATCHES_COUNTER: CounterVec = register_counter_vec!(
        "leadflow_dispatches_total",
        "Notification dispatches by event type and outcome",
        &["event_type", "outcome"]
    ).unwrap();

    pub static ref EMAILS_COUNTER: CounterVec = register_counter_vec!(
        "leadflow_emails_total",
        "Individual notification emails by recipient role and status",
        &["role", "status"]
    ).unwrap();

    pub static ref DEFAULT_RULES_SEEDED_COUNTER: CounterVec = register_counter_vec!(
        "leadflow_default_rules_seeded_total",
        "Default mapping rules copied into tenant namespaces",
        &["event_type"]
    ).unwrap();
}

pub fn record_dispatch(event_type: &str, outcome: &str) {
    DISPATCHES_COUNTER.with_label_values(&[event_type, outcome]).inc();
}

pub fn record_email(role: &str, sent: bool) {
    let status = if sent { "sent" } else { "failed" };
    EMAILS_COUNTER.with_label_values(&[role, status]).inc();
}

pub fn record_seeded(event_type: &str, rules: u64) {
    if rules > 0 {
        DEFAULT_RULES_SEEDED_COUNTER
            .with_label_values(&[event_type])
            .inc_by(rules as f64);
    }
}
