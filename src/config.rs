use serde::Deserialize;
use std::path::Path;

use crate::core::tx::{NewBlocklistEntry, NewDeliveryTarget};
use crate::error::{Error, Result};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub scoring: ScoringConfig,
    pub notifications: NotificationConfig,
    pub seed: SeedConfig,
    /// Block/allow rules registered at startup.
    pub blocklist: Vec<NewBlocklistEntry>,
}

/// Heuristic constants of the rule pipeline.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScoringConfig {
    /// Scores at or below this are approved.
    pub approve_threshold: u8,
    /// Scores at or below this (and above `approve_threshold`) go to review.
    pub review_threshold: u8,
    /// A first transaction above this amount carries the higher penalty.
    pub first_transaction_high_amount: f64,
    /// Countries between which cross-border activity is normal.
    pub trusted_region: Vec<String>,
    pub high_risk_countries: Vec<String>,
    pub high_risk_bins: Vec<String>,
    pub prepaid_bins: Vec<String>,
    /// UTC hour range `[start, end)` considered off-hours; wraps midnight when start > end.
    pub off_hours_start: u32,
    pub off_hours_end: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub timeout_seconds: u64,
    pub targets: Vec<NewDeliveryTarget>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SeedConfig {
    pub path: Option<String>,
}

fn codes(list: &[&str]) -> Vec<String> {
    list.iter().map(|c| c.to_string()).collect()
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            approve_threshold: 30,
            review_threshold: 70,
            first_transaction_high_amount: 50.0,
            trusted_region: codes(&[
                "BR", "MX", "AR", "CO", "CL", "PE", "VE", "EC", "BO", "PY", "UY", "CR", "PA",
            ]),
            high_risk_countries: codes(&["RU", "NG", "UA", "CN", "VN", "PK", "KP", "RO", "GH", "TZ"]),
            high_risk_bins: codes(&[
                "400000", "411111", "420000", "490000", "510000", "520000", "552000", "601100",
            ]),
            prepaid_bins: codes(&["472297", "483317", "491528", "523274", "535350", "544107"]),
            off_hours_start: 2,
            off_hours_end: 6,
        }
    }
}

impl ScoringConfig {
    pub fn is_trusted_region(&self, country: &str) -> bool {
        contains_code(&self.trusted_region, country)
    }

    pub fn is_high_risk_country(&self, country: &str) -> bool {
        contains_code(&self.high_risk_countries, country)
    }

    pub fn is_high_risk_bin(&self, bin: &str) -> bool {
        self.high_risk_bins.iter().any(|b| b == bin)
    }

    pub fn is_prepaid_bin(&self, bin: &str) -> bool {
        self.prepaid_bins.iter().any(|b| b == bin)
    }

    /// Whether a UTC hour falls in `[off_hours_start, off_hours_end)`.
    /// A start after the end wraps past midnight; equal bounds mean no window.
    pub fn is_off_hours(&self, hour: u32) -> bool {
        let (start, end) = (self.off_hours_start, self.off_hours_end);
        if start <= end {
            hour >= start && hour < end
        } else {
            hour >= start || hour < end
        }
    }

    /// Settings that parse but can't do what the operator meant.
    fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.approve_threshold > self.review_threshold {
            problems.push(format!(
                "approve_threshold {} is above review_threshold {}, nothing will be reviewed",
                self.approve_threshold, self.review_threshold
            ));
        }
        if self.off_hours_start > 23 || self.off_hours_end > 24 {
            problems.push(format!(
                "off-hours window {}-{} is outside 0-24",
                self.off_hours_start, self.off_hours_end
            ));
        }
        if self.off_hours_start == self.off_hours_end {
            problems.push("off-hours window is empty, the timing rule never fires".to_string());
        }
        problems
    }
}

fn contains_code(list: &[String], country: &str) -> bool {
    !country.is_empty() && list.iter().any(|c| c.eq_ignore_ascii_case(country))
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_seconds: 5,
            targets: Vec::new(),
        }
    }
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            path: Some("data/seed.json".into()),
        }
    }
}

impl Config {
    /// Load config from a TOML file. A missing or unusable file falls back to
    /// defaults; settings that parse but look wrong are logged, not rejected.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("Config file {} not found, using defaults", path.display());
            return Self::default();
        }
        let config = match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{e}, using defaults");
                return Self::default();
            }
        };

        tracing::info!(
            "Config loaded from {}: {} blocklist entries, {} webhook targets, seed {}",
            path.display(),
            config.blocklist.len(),
            config.notifications.targets.len(),
            config.seed.path.as_deref().unwrap_or("disabled")
        );
        for problem in config.scoring.problems() {
            tracing::warn!("[scoring] {problem}");
        }
        config
    }

    /// Strict variant of [`Config::load`]: any read or parse failure is an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| Error::Config {
            path: path.display().to_string(),
            source,
        })
    }
}
