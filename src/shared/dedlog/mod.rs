//! Deduplicated error logging for the background loops.
//!
//! A probe against a flapping peer or a daemon that stays out of sync would log
//! the same failure every cycle. Loops report through [`err`] instead; identical
//! (component, reason, sanitised error) triples are folded and flushed with a
//! count once per period.

pub mod consts;
pub mod log_entry;
pub mod sanitizer;

pub use log_entry::{err, start_dedup_logger};
