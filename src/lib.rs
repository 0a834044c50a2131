pub mod api;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod models;
pub mod readiness;
pub mod reporting;
pub mod scan;
pub mod telemetry;
