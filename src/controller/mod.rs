// HTTP API controllers: user API, peer endpoints and node administration.

pub mod apps;
pub mod config;
pub mod controller;
pub mod health;
pub mod metrics;
pub mod node;
pub mod peer;

pub use apps::AppsController;
pub use config::ShowConfigController;
pub use health::HealthController;
pub use metrics::{init_prometheus_exporter, PrometheusMetricsController};
pub use node::NodeController;
pub use peer::PeerController;
