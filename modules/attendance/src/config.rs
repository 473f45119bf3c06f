use serde::{Deserialize, Serialize};

/// Configuration for the attendance module (`modules.attendance` in the app config).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttendanceConfig {
    /// IANA zone used when neither template, organization nor user names one.
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
    #[serde(default)]
    pub rollcall: RollCallConfig,
    #[serde(default)]
    pub allowances: AllowanceConfig,
    /// Fixed seed for roll-call randomization; entropy-seeded when absent.
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RollCallConfig {
    #[serde(default = "default_rollcalls_per_hour")]
    pub rollcalls_per_hour: u32,
    #[serde(default = "default_min_gap_minutes")]
    pub min_gap_minutes: u32,
    #[serde(default = "default_max_gap_minutes")]
    pub max_gap_minutes: u32,
    #[serde(default = "default_response_window_minutes")]
    pub response_window_minutes: u32,
    #[serde(default = "default_grace_period_seconds")]
    pub grace_period_seconds: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AllowanceConfig {
    #[serde(default = "default_lunch_minutes")]
    pub lunch_minutes: u32,
    #[serde(default = "default_short_break_minutes")]
    pub short_break_minutes: u32,
    #[serde(default = "default_daily_credit_hours")]
    pub daily_credit_hours: f64,
}

impl Default for AttendanceConfig {
    fn default() -> Self {
        Self {
            default_timezone: default_timezone(),
            rollcall: RollCallConfig::default(),
            allowances: AllowanceConfig::default(),
            rng_seed: None,
        }
    }
}

impl Default for RollCallConfig {
    fn default() -> Self {
        Self {
            rollcalls_per_hour: default_rollcalls_per_hour(),
            min_gap_minutes: default_min_gap_minutes(),
            max_gap_minutes: default_max_gap_minutes(),
            response_window_minutes: default_response_window_minutes(),
            grace_period_seconds: default_grace_period_seconds(),
        }
    }
}

impl Default for AllowanceConfig {
    fn default() -> Self {
        Self {
            lunch_minutes: default_lunch_minutes(),
            short_break_minutes: default_short_break_minutes(),
            daily_credit_hours: default_daily_credit_hours(),
        }
    }
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_rollcalls_per_hour() -> u32 {
    5
}

fn default_min_gap_minutes() -> u32 {
    5
}

fn default_max_gap_minutes() -> u32 {
    16
}

fn default_response_window_minutes() -> u32 {
    5
}

fn default_grace_period_seconds() -> u32 {
    300
}

fn default_lunch_minutes() -> u32 {
    60
}

fn default_short_break_minutes() -> u32 {
    30
}

fn default_daily_credit_hours() -> f64 {
    8.0
}
