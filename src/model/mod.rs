// Package model holds the domain types shared by every subsystem.

pub mod error;
pub mod geo;
pub mod hardware;
pub mod location;
pub mod message;
pub mod node;
pub mod record;
pub mod spec;
pub mod wire;

// Re-export main types
pub use error::{FleetError, Operation, ValidationError};
pub use hardware::{Dimension, Hardware, Resources, Tier, TieredResources};
pub use location::AppLocation;
pub use message::{MessageType, ProvisionalMessage, SpecMessage};
pub use node::{BenchmarkStatus, NodeInfo, NodeStanding, SyncStatus};
pub use record::{ComponentRecord, GlobalSpecRecord, HeightCheckpoint, LocalAppRecord};
pub use spec::{AppSpec, Component, ComposedSpec, FlatSpec, SpecMeta, Target};
pub use wire::{GossipEnvelope, GossipKind, ProbeRequest, ProbeResponse, ProbeStatus};
