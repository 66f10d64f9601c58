//! Server binary support: configuration, telemetry, and startup wiring.

pub mod config;
pub mod setup;
pub mod telemetry;
