// Node-wide install/removal exclusion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::model::{FleetError, Operation};

/// The two in-progress flags. One instance is shared by the lifecycle manager and every loop
/// that starts installs or removals.
#[derive(Default)]
pub struct OperationFlags {
    install: AtomicBool,
    removal: AtomicBool,
}

impl OperationFlags {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn flag(&self, op: Operation) -> &AtomicBool {
        match op {
            Operation::Install => &self.install,
            Operation::Removal => &self.removal,
        }
    }

    pub fn is_busy(&self, op: Operation) -> bool {
        self.flag(op).load(Ordering::Acquire)
    }

    /// Takes the flag or fails fast with `Busy`. A forced acquire never fails and leaves the
    /// flag to whoever holds it.
    pub fn acquire(self: &Arc<Self>, op: Operation, force: bool) -> Result<OperationGuard, FleetError> {
        let taken = self
            .flag(op)
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if !taken && !force {
            return Err(FleetError::Busy(op));
        }
        Ok(OperationGuard {
            flags: self.clone(),
            op,
            held: taken,
        })
    }
}

/// Clears its flag on drop, on every exit path.
pub struct OperationGuard {
    flags: Arc<OperationFlags>,
    op: Operation,
    held: bool,
}

impl OperationGuard {
    pub fn operation(&self) -> Operation {
        self.op
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        if self.held {
            self.flags.flag(self.op).store(false, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_busy_until_drop() {
        let flags = OperationFlags::new();
        let guard = flags.acquire(Operation::Install, false).unwrap();
        assert!(matches!(
            flags.acquire(Operation::Install, false),
            Err(FleetError::Busy(Operation::Install))
        ));
        // removal is independent
        let _removal = flags.acquire(Operation::Removal, false).unwrap();
        drop(guard);
        assert!(!flags.is_busy(Operation::Install));
        assert!(flags.is_busy(Operation::Removal));
    }

    #[test]
    fn forced_acquire_does_not_release_the_holder() {
        let flags = OperationFlags::new();
        let holder = flags.acquire(Operation::Removal, false).unwrap();
        let forced = flags.acquire(Operation::Removal, true).unwrap();
        assert_eq!(forced.operation(), Operation::Removal);
        drop(forced);
        assert!(flags.is_busy(Operation::Removal));
        drop(holder);
        assert!(!flags.is_busy(Operation::Removal));
    }
}
