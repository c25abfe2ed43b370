use arc_swap::ArcSwap;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Ports the prober confirmed unreachable from outside. Written by the prober only,
/// read by install when vetting declared ports.
pub struct PortBlocklist {
    ports: ArcSwap<BTreeSet<u16>>,
}

impl PortBlocklist {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            ports: ArcSwap::from_pointee(BTreeSet::new()),
        })
    }

    pub fn replace(&self, ports: impl IntoIterator<Item = u16>) {
        self.ports.store(Arc::new(ports.into_iter().collect()));
    }

    pub fn contains(&self, port: u16) -> bool {
        self.ports.load().contains(&port)
    }

    pub fn ports(&self) -> Vec<u16> {
        self.ports.load().iter().copied().collect()
    }
}
