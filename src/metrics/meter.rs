// Metric name constants
pub const PROVISIONAL_ACCEPTED: &str = "registry_provisional_accepted_total";
pub const PROVISIONAL_REJECTED: &str = "registry_provisional_rejected_total";
pub const PROMOTIONS: &str = "registry_promotions_total";
pub const UNDERPAID: &str = "registry_underpaid_total";
pub const EXPIRED: &str = "registry_expired_total";
pub const GLOBAL_APPS: &str = "registry_global_apps";

pub const SCHEDULER_CYCLES: &str = "scheduler_cycles_total";
pub const SCHEDULER_SKIPS: &str = "scheduler_skips_total";
pub const SCHEDULER_INSTALLS: &str = "scheduler_installs_total";

pub const INSTALLS: &str = "lifecycle_installs_total";
pub const REMOVALS: &str = "lifecycle_removals_total";
pub const LIFECYCLE_FAILURES: &str = "lifecycle_failures_total";
pub const LOCAL_APPS: &str = "lifecycle_local_apps";

pub const PROBES: &str = "prober_probes_total";
pub const DOS_STATE_VALUE: &str = "dos_state_value";
pub const PORTS_NOT_WORKING: &str = "ports_not_working";

pub const GOSSIP_RECEIVED: &str = "gossip_received_total";
pub const LEDGER_HEIGHT: &str = "ledger_height";

/// Registers descriptions once the recorder is installed.
pub fn describe() {
    metrics::describe_counter!(PROMOTIONS, "Specifications promoted to permanent");
    metrics::describe_counter!(UNDERPAID, "Anchored messages rejected for insufficient payment");
    metrics::describe_counter!(SCHEDULER_INSTALLS, "Installs started by the scheduler");
    metrics::describe_counter!(PROBES, "Availability probes by outcome");
    metrics::describe_gauge!(DOS_STATE_VALUE, "Current DOS score, 0 to 100");
    metrics::describe_gauge!(PORTS_NOT_WORKING, "Ports confirmed externally unreachable");
}

pub fn add_provisional(accepted: bool) {
    if accepted {
        metrics::counter!(PROVISIONAL_ACCEPTED).increment(1);
    } else {
        metrics::counter!(PROVISIONAL_REJECTED).increment(1);
    }
}

pub fn add_promotion() {
    metrics::counter!(PROMOTIONS).increment(1);
}

pub fn add_underpaid() {
    metrics::counter!(UNDERPAID).increment(1);
}

pub fn add_expired(count: u64) {
    metrics::counter!(EXPIRED).increment(count);
}

pub fn set_global_apps(count: usize) {
    metrics::gauge!(GLOBAL_APPS).set(count as f64);
}

pub fn add_scheduler_cycle() {
    metrics::counter!(SCHEDULER_CYCLES).increment(1);
}

/// Skips are labelled by reason.
pub fn add_scheduler_skip(reason: &'static str) {
    metrics::counter!(SCHEDULER_SKIPS, "reason" => reason).increment(1);
}

pub fn add_scheduler_install() {
    metrics::counter!(SCHEDULER_INSTALLS).increment(1);
}

pub fn add_install() {
    metrics::counter!(INSTALLS).increment(1);
}

pub fn add_removal() {
    metrics::counter!(REMOVALS).increment(1);
}

pub fn add_lifecycle_failure(op: &'static str) {
    metrics::counter!(LIFECYCLE_FAILURES, "op" => op).increment(1);
}

pub fn set_local_apps(count: usize) {
    metrics::gauge!(LOCAL_APPS).set(count as f64);
}

pub fn add_probe(outcome: &'static str) {
    metrics::counter!(PROBES, "outcome" => outcome).increment(1);
}

pub fn set_dos_state(value: u32, not_working: usize) {
    metrics::gauge!(DOS_STATE_VALUE).set(value as f64);
    metrics::gauge!(PORTS_NOT_WORKING).set(not_working as f64);
}

pub fn add_gossip(kind: &'static str) {
    metrics::counter!(GOSSIP_RECEIVED, "type" => kind).increment(1);
}

pub fn set_ledger_height(height: u64) {
    metrics::gauge!(LEDGER_HEIGHT).set(height as f64);
}
