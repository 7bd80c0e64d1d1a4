//! Dripmail — outbound drip-campaign dispatch engine.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod model;
pub mod relay;
pub mod routes;
pub mod store;
pub mod template;
pub mod vault;
