use std::time::Duration;

pub const COMPONENT: &str = "dedlog";

/// How often aggregated entries are flushed.
pub const FLUSH_PERIOD: Duration = Duration::from_secs(5);

/// Reports buffered between flushes before new ones are dropped.
pub const QUEUE_CAPACITY: usize = 1024;
