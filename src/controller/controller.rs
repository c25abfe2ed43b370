// HTTP controller trait for route registration.

use axum::Router;

/// A group of node API routes sharing one state.
pub trait Controller: Send + Sync {
    /// Merges this controller's routes, each with its own state, into `router`.
    fn add_route(&self, router: Router) -> Router;
}

