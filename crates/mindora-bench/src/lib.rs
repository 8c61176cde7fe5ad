pub mod analytics;
pub mod config;
pub mod logging;
pub mod simulate;
pub mod telemetry;
