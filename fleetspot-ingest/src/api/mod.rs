//! HTTP handlers for fleetspot-ingest

pub mod health;
pub mod queue;
pub mod webhook;

pub use health::health_routes;
pub use queue::queue_routes;
pub use webhook::webhook_routes;
