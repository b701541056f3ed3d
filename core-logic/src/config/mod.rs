//! Typed configuration shared by every chain crate. Values are assembled and
//! validated once at startup and never mutated afterwards.

use crate::error::ConfigError;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Distribution of the global gap between two mutating calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GapMode {
    /// Uniform integer seconds in `[gap_min_secs, gap_max_secs]`.
    Uniform,
    /// Exponential inter-arrival times with mean `gap_mean_secs`.
    Poisson,
}

impl FromStr for GapMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "uniform" => Ok(GapMode::Uniform),
            "poisson" => Ok(GapMode::Poisson),
            other => Err(ConfigError::InvalidValue {
                field: "global_gap_mode".to_string(),
                reason: format!("expected 'uniform' or 'poisson', got '{}'", other),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    pub mode: GapMode,
    pub gap_min_secs: u64,
    pub gap_max_secs: u64,
    pub gap_mean_secs: f64,
    /// Lower bound for poisson gaps.
    pub gap_floor_secs: u64,
    /// Per-acquisition personal jitter, whole seconds.
    pub extra_min_secs: u64,
    pub extra_max_secs: u64,
    /// Sub-second noise added on top of the personal jitter.
    pub noise_max_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            mode: GapMode::Uniform,
            gap_min_secs: 60,
            gap_max_secs: 120,
            gap_mean_secs: 75.0,
            gap_floor_secs: 5,
            extra_min_secs: 10,
            extra_max_secs: 45,
            noise_max_ms: 750,
        }
    }
}

impl PacingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("global_gap", self.gap_min_secs as f64, self.gap_max_secs as f64)?;
        check_range(
            "extra_gap",
            self.extra_min_secs as f64,
            self.extra_max_secs as f64,
        )?;
        if self.mode == GapMode::Poisson && self.gap_mean_secs <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "global_gap_mean_sec".to_string(),
                reason: "mean must be positive".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaveConfig {
    /// Upper bound on concurrently running workers.
    pub concurrency: usize,
    pub batch_min: usize,
    pub batch_max: usize,
    pub duration_min_minutes: f64,
    pub duration_max_minutes: f64,
    pub cooldown_min_minutes: u64,
    pub cooldown_max_minutes: u64,
}

impl Default for WaveConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            batch_min: 2,
            batch_max: 3,
            duration_min_minutes: 12.0,
            duration_max_minutes: 25.0,
            cooldown_min_minutes: 3,
            cooldown_max_minutes: 5,
        }
    }
}

impl WaveConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "concurrency".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        check_range("batch", self.batch_min as f64, self.batch_max as f64)?;
        check_range(
            "wave_minutes",
            self.duration_min_minutes,
            self.duration_max_minutes,
        )?;
        if self.duration_min_minutes < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "wave_min_min".to_string(),
                reason: "must not be negative".to_string(),
            });
        }
        check_range(
            "wave_cooldown_minutes",
            self.cooldown_min_minutes as f64,
            self.cooldown_max_minutes as f64,
        )
    }
}

/// Quiet-hours window in a fixed reference zone. `start == end` means the
/// window is empty.
#[derive(Debug, Clone, Copy)]
pub struct QuietHours {
    pub enabled: bool,
    pub start_hour: u32,
    pub end_hour: u32,
    pub zone: Tz,
}

impl Default for QuietHours {
    fn default() -> Self {
        Self {
            enabled: false,
            start_hour: 0,
            end_hour: 6,
            zone: chrono_tz::Europe::Kyiv,
        }
    }
}

impl QuietHours {
    pub fn new(enabled: bool, start_hour: u32, end_hour: u32, zone: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            enabled,
            start_hour: start_hour % 24,
            end_hour: end_hour % 24,
            zone: parse_zone(zone)?,
        })
    }
}

pub fn parse_zone(zone: &str) -> Result<Tz, ConfigError> {
    zone.parse::<Tz>()
        .map_err(|_| ConfigError::UnknownTimeZone {
            zone: zone.to_string(),
        })
}

pub fn check_range(field: &str, min: f64, max: f64) -> Result<(), ConfigError> {
    if min > max {
        return Err(ConfigError::InvalidRange {
            field: field.to_string(),
            min,
            max,
        });
    }
    Ok(())
}
