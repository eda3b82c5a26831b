// src/reset_config.rs
use serde::Deserialize;

use crate::period::MAX_RESET_DAY;

/// Banner lead time for the quincena scheduler. The monthly value is
/// configurable; the biweekly cycle is short enough that two days is fixed.
pub const BIWEEKLY_BANNER_WARNING_DAYS: i64 = 2;

fn default_enabled() -> bool {
    true
}
fn default_reset_day() -> u32 {
    1
}
fn default_preserve_history() -> bool {
    true
}
fn default_show_banner() -> bool {
    true
}
fn default_allow_manual_reset() -> bool {
    true
}
fn default_banner_warning_days() -> i64 {
    3
}
fn default_check_interval_ms() -> u64 {
    60_000
}
fn default_monday_check_interval_ms() -> u64 {
    3_600_000
}

/// Static reset configuration, loaded once at startup from `RESET_*`
/// environment variables. Not editable at runtime.
#[derive(Debug, Clone, Deserialize)]
pub struct ResetConfig {
    /// Master switch for automatic resets. Manual resets stay available.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Day of the month the monthly period rolls over (1 = first day).
    #[serde(default = "default_reset_day")]
    pub reset_day: u32,
    /// Resets only clear local view state; backend history is never touched.
    #[serde(default = "default_preserve_history")]
    pub preserve_history: bool,
    #[serde(default = "default_show_banner")]
    pub show_banner: bool,
    #[serde(default = "default_allow_manual_reset")]
    pub allow_manual_reset: bool,
    /// Days before the next reset at which the warning banner appears.
    #[serde(default = "default_banner_warning_days")]
    pub banner_warning_days: i64,
    /// Boundary poll cadence (1 minute).
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,
    /// Cadence of the coarser reset-Monday check (1 hour).
    #[serde(default = "default_monday_check_interval_ms")]
    pub monday_check_interval_ms: u64,
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            reset_day: default_reset_day(),
            preserve_history: default_preserve_history(),
            show_banner: default_show_banner(),
            allow_manual_reset: default_allow_manual_reset(),
            banner_warning_days: default_banner_warning_days(),
            check_interval_ms: default_check_interval_ms(),
            monday_check_interval_ms: default_monday_check_interval_ms(),
        }
    }
}

impl ResetConfig {
    /// Reads `RESET_ENABLED`, `RESET_RESET_DAY`, `RESET_BANNER_WARNING_DAYS`
    /// and friends; unset variables fall back to the defaults above.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("RESET_")
            .from_env::<ResetConfig>()
            .map(ResetConfig::normalized)
    }

    /// Clamps out-of-range values instead of rejecting them.
    pub fn normalized(mut self) -> Self {
        self.reset_day = self.reset_day.clamp(1, MAX_RESET_DAY);
        if self.banner_warning_days < 0 {
            self.banner_warning_days = 0;
        }
        self
    }

    /// Variant used by the quincena scheduler: same switches and cadences,
    /// shorter banner lead.
    pub fn for_biweekly(&self) -> Self {
        Self {
            banner_warning_days: BIWEEKLY_BANNER_WARNING_DAYS,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_mirror_the_dashboard_config() {
        let config = ResetConfig::default();
        assert!(config.enabled);
        assert_eq!(config.reset_day, 1);
        assert!(config.preserve_history);
        assert!(config.show_banner);
        assert!(config.allow_manual_reset);
        assert_eq!(config.banner_warning_days, 3);
        assert_eq!(config.check_interval_ms, 60_000);
        assert_eq!(config.monday_check_interval_ms, 3_600_000);
    }

    #[test]
    fn normalized_clamps_reset_day() {
        let config = ResetConfig {
            reset_day: 31,
            ..ResetConfig::default()
        }
        .normalized();
        assert_eq!(config.reset_day, MAX_RESET_DAY);

        let config = ResetConfig {
            reset_day: 0,
            ..ResetConfig::default()
        }
        .normalized();
        assert_eq!(config.reset_day, 1);
    }

    #[test]
    fn normalized_floors_banner_days() {
        let config = ResetConfig {
            banner_warning_days: -4,
            ..ResetConfig::default()
        }
        .normalized();
        assert_eq!(config.banner_warning_days, 0);
    }

    #[test]
    fn biweekly_variant_shortens_banner_lead() {
        let config = ResetConfig::default().for_biweekly();
        assert_eq!(config.banner_warning_days, BIWEEKLY_BANNER_WARNING_DAYS);
        assert_eq!(config.check_interval_ms, 60_000);
    }
}
