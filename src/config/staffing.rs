//! Staffing configuration loading from config.toml
//!
//! The configuration file carries two things: operational settings for the
//! service (audit stream capacity, check-in cadence, payroll page size) and the
//! reference data used to seed a fresh database - service roles, installations,
//! guards and the operational posts that tie them together.

use crate::errors::{Error, Result};
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use std::path::Path;

const fn default_audit_channel_capacity() -> usize {
    256
}

const fn default_check_in_interval_minutes() -> u32 {
    60
}

const fn default_overtime_page_size() -> u64 {
    50
}

/// Operational settings
#[derive(Debug, Clone, Deserialize)]
pub struct OperationsConfig {
    /// Buffered audit entries before new ones are dropped
    #[serde(default = "default_audit_channel_capacity")]
    pub audit_channel_capacity: usize,
    /// Minutes between check-in calls on a staffed post
    #[serde(default = "default_check_in_interval_minutes")]
    pub check_in_interval_minutes: u32,
    /// Rows per page when streaming unpaid overtime to payroll
    #[serde(default = "default_overtime_page_size")]
    pub overtime_page_size: u64,
    /// Fill today's open vacancies with free guards on startup
    #[serde(default)]
    pub auto_cover_vacancies: bool,
}

impl Default for OperationsConfig {
    fn default() -> Self {
        Self {
            audit_channel_capacity: default_audit_channel_capacity(),
            check_in_interval_minutes: default_check_in_interval_minutes(),
            overtime_page_size: default_overtime_page_size(),
            auto_cover_vacancies: false,
        }
    }
}

/// A service role to seed
#[derive(Debug, Clone, Deserialize)]
pub struct RoleConfig {
    pub name: String,
    pub shift_start: NaiveTime,
    pub shift_end: NaiveTime,
    pub shift_hours: f64,
    pub hourly_rate: f64,
    pub work_days: i32,
    pub rest_days: i32,
}

/// An installation to seed
#[derive(Debug, Clone, Deserialize)]
pub struct InstallationConfig {
    pub name: String,
}

/// A guard to seed
#[derive(Debug, Clone, Deserialize)]
pub struct GuardConfig {
    pub full_name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

/// An operational post to seed. Installation, role and guard are referenced by name.
#[derive(Debug, Clone, Deserialize)]
pub struct PostConfig {
    pub installation: String,
    pub role: String,
    pub name: String,
    /// Standing guard; absent for a vacancy
    #[serde(default)]
    pub guard: Option<String>,
    pub cycle_start: NaiveDate,
}

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StaffingConfig {
    #[serde(default)]
    pub operations: OperationsConfig,
    #[serde(default)]
    pub roles: Vec<RoleConfig>,
    #[serde(default)]
    pub installations: Vec<InstallationConfig>,
    #[serde(default)]
    pub guards: Vec<GuardConfig>,
    #[serde(default)]
    pub posts: Vec<PostConfig>,
}

/// Loads the staffing configuration from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - Required fields are missing
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<StaffingConfig> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read config file: {e}"),
    })?;

    toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })
}

/// Loads the configuration named by `ROSTER_CONFIG`, falling back to `./config.toml`
pub fn load_default_config() -> Result<StaffingConfig> {
    let path = std::env::var("ROSTER_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    load_config(path)
}
