//! Specification registry: formatting, verification, pricing and the provisional to permanent
//! promotion of signed specification messages.

pub mod format;
pub mod images;
pub mod price;
#[allow(clippy::module_inception)]
pub mod registry;
pub mod verify;

pub use format::{format, to_value};
pub use images::ImagePolicy;
pub use price::{price, update_price};
pub use registry::{PromoteOutcome, Registry};
pub use verify::verify;
