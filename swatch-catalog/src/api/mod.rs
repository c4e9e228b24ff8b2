//! HTTP API handlers for swatch-catalog
//!
//! Private routes manage the catalog (load, inspect, enrich); the public
//! route serves color suggestions.

pub mod health;
pub mod products;

pub use health::health_routes;
pub use products::product_routes;
