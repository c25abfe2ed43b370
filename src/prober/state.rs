// DOS state of the availability prober and its transitions. Only the prober loop mutates it.

use rand::Rng;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::config::Ports;

/// Score added per qualifying failure.
pub const DOS_STEP: u32 = 4;
/// Score at which the node is considered blocked.
pub const DOS_SATURATION: u32 = 100;
pub const NOT_WORKING_CAP: usize = 100;
/// A success shrinks the not-working set only while it holds more than this many ports.
pub const SHRINK_ABOVE: usize = 80;

/// Which configured interval the loop sleeps next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Delay {
    Short,
    Medium,
    Normal,
    Long,
    Guard,
}

/// Outcome of choosing the port for the next probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortChoice {
    Probe(u16),
    /// The candidate is in use or banned. Not a probe.
    Unusable(u16),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DosState {
    pub testing_port: Option<u16>,
    pub next_testing_port: Option<u16>,
    /// First port of the current failure streak; the walk moves around it.
    pub original_failed_port: Option<u16>,
    /// +1 walks upwards, -1 downwards.
    pub direction: i32,
    pub dos_state_value: u32,
    pub dos_message: Option<String>,
    pub last_upnp_failed: bool,
    pub not_working: BTreeSet<u16>,
}

impl Default for DosState {
    fn default() -> Self {
        Self {
            testing_port: None,
            next_testing_port: None,
            original_failed_port: None,
            direction: 1,
            dos_state_value: 0,
            dos_message: None,
            last_upnp_failed: false,
            not_working: BTreeSet::new(),
        }
    }
}

impl DosState {
    pub fn is_saturated(&self) -> bool {
        self.dos_state_value >= DOS_SATURATION
    }

    fn raise(&mut self, reason: &str) {
        self.dos_state_value = (self.dos_state_value + DOS_STEP).min(DOS_SATURATION);
        if self.is_saturated() {
            self.dos_message = Some(format!(
                "node applications are not reachable from the internet: {reason}"
            ));
        }
    }

    /// Saturated state always backs off to the long interval.
    fn delay(&self, wanted: Delay) -> Delay {
        if self.is_saturated() {
            Delay::Long
        } else {
            wanted
        }
    }

    /// Takes the pending walk candidate, or draws uniformly from the app port range.
    pub fn pick_port<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        range: &Ports,
        unusable: impl Fn(u16) -> bool,
    ) -> PortChoice {
        let port = match self.next_testing_port.take() {
            Some(port) => port,
            None => rng.gen_range(range.min..=range.max),
        };
        if unusable(port) {
            if self.original_failed_port.is_some() {
                self.next_testing_port = Some(self.walk(port, range));
            }
            return PortChoice::Unusable(port);
        }
        self.testing_port = Some(port);
        PortChoice::Probe(port)
    }

    /// Next port adjacent to the failure streak. Steps away from `from` in the current direction
    /// and restarts on the other side of the first failed port at a range bound.
    pub fn walk(&mut self, from: u16, range: &Ports) -> u16 {
        let origin = self.original_failed_port.unwrap_or(from);
        let mut current = from;
        let span = (range.max - range.min) as usize + 1;
        for _ in 0..span {
            let next = current as i32 + self.direction;
            let next = if next < range.min as i32 || next > range.max as i32 {
                self.direction = -self.direction;
                origin as i32 + self.direction
            } else {
                next
            };
            let next = next.clamp(range.min as i32, range.max as i32) as u16;
            if !self.not_working.contains(&next) {
                return next;
            }
            current = next;
        }
        origin
    }

    /// The peer could not be reached. Retries the same port.
    pub fn on_unreachable_peer(&mut self, port: u16) -> Delay {
        self.next_testing_port = Some(port);
        self.delay(Delay::Short)
    }

    /// The peer answered with a status it should not send.
    pub fn on_unknown_status(&mut self, port: u16) -> Delay {
        self.next_testing_port = Some(port);
        self.delay(Delay::Medium)
    }

    /// The listener could not bind. No peer was involved and the set is unchanged.
    pub fn on_bind_failure(&mut self, port: u16, range: &Ports) -> Delay {
        if self.original_failed_port.is_some() {
            self.next_testing_port = Some(self.walk(port, range));
        }
        self.delay(Delay::Short)
    }

    /// UPnP mapping of the probe port failed. Only a failure right after another one counts
    /// against the score.
    pub fn on_upnp_failure(&mut self) -> Delay {
        if self.last_upnp_failed {
            self.raise("UPnP port mapping keeps failing");
        }
        self.last_upnp_failed = true;
        self.delay(Delay::Medium)
    }

    pub fn on_upnp_success(&mut self) {
        self.last_upnp_failed = false;
    }

    /// The peer could not dial the port.
    pub fn on_error(&mut self, port: u16, range: &Ports) -> Delay {
        if self.not_working.len() < NOT_WORKING_CAP {
            self.not_working.insert(port);
        }
        if self.original_failed_port.is_none() {
            self.original_failed_port = Some(port);
        }
        self.next_testing_port = Some(self.walk(port, range));
        if self.not_working.len() >= NOT_WORKING_CAP {
            self.raise("too many application ports are closed");
        }
        self.delay(Delay::Short)
    }

    /// The peer reached the port. A large set shrinks by one and the walk goes on; otherwise
    /// every trace of the failure streak is cleared.
    pub fn on_success(&mut self, port: u16, range: &Ports) -> Delay {
        if self.not_working.len() > SHRINK_ABOVE {
            if let Some(first) = self.not_working.iter().next().copied() {
                self.not_working.remove(&first);
            }
            self.next_testing_port = Some(self.walk(port, range));
            return self.delay(Delay::Short);
        }
        let upnp_failed = self.last_upnp_failed;
        *self = DosState::default();
        self.last_upnp_failed = upnp_failed;
        Delay::Normal
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod state_test;
