/// Database configuration and connection management
pub mod database;

/// Operational settings and seed reference data from config.toml
pub mod staffing;
