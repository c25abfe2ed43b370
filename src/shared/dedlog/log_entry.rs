use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::error;

use super::consts;
use super::sanitizer::{Sanitizer, WithCollapseSpaces};

/// A single failure report, folded by (component, reason, sanitised error).
struct LogEntry {
    component: &'static str,
    reason: String,
    err: Option<String>,
}

#[derive(Hash, PartialEq, Eq)]
struct Key {
    component: &'static str,
    reason: String,
    err: Option<String>,
}

static SINK: Lazy<Mutex<Option<mpsc::Sender<LogEntry>>>> = Lazy::new(|| Mutex::new(None));

/// Reports a failure without blocking. Dropped silently if the logger is not
/// running or its queue is full.
pub fn err(component: &'static str, err: Option<&dyn std::fmt::Display>, reason: &str) {
    let tx = match SINK.try_lock() {
        Some(guard) => guard.clone(),
        None => None,
    };
    if let Some(tx) = tx {
        let _ = tx.try_send(LogEntry {
            component,
            reason: reason.to_string(),
            err: err.map(|e| e.to_string()),
        });
    }
}

/// Runs the aggregating logger until `ctx` is cancelled.
pub async fn start_dedup_logger(ctx: CancellationToken) {
    let (tx, mut rx) = mpsc::channel(consts::QUEUE_CAPACITY);
    *SINK.lock() = Some(tx);

    let sanitizer = Sanitizer::new(WithCollapseSpaces(true));
    let mut pending: HashMap<Key, usize> = HashMap::new();
    let mut interval = tokio::time::interval(consts::FLUSH_PERIOD);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ctx.cancelled() => {
                flush(&mut pending);
                break;
            }
            entry = rx.recv() => {
                let Some(entry) = entry else { break };
                let key = Key {
                    component: entry.component,
                    reason: entry.reason,
                    err: entry.err.map(|e| sanitizer.sanitize(&e)),
                };
                *pending.entry(key).or_insert(0) += 1;
            }
            _ = interval.tick() => flush(&mut pending),
        }
    }

    *SINK.lock() = None;
}

fn flush(pending: &mut HashMap<Key, usize>) {
    for (key, count) in pending.drain() {
        match &key.err {
            Some(e) => error!(
                component = key.component,
                source = consts::COMPONENT,
                count,
                error = %e,
                "{}", key.reason
            ),
            None => error!(
                component = key.component,
                source = consts::COMPONENT,
                count,
                "{}", key.reason
            ),
        }
    }
}
