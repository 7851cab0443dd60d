//! # Reconcile Configuration Module
//!
//! This module defines configuration structures for a reconciliation run:
//! reporting thresholds, the price freshness window, unit defaults, severity
//! tiers and the hardcoded conversion fallback.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::conversion::FallbackTable;

// Constants for reconciliation
pub const DEFAULT_FRESHNESS_DAYS: i64 = 90;
pub const DEFAULT_UNIT: &str = "g";
pub const DEFAULT_PRICE_UNIT: &str = "kg";
pub const DEFAULT_THRESHOLD_PERCENT: f64 = 10.0;
pub const DEFAULT_RECIPE_THRESHOLD_PERCENT: f64 = 5.0;
pub const DEFAULT_MIN_ABSOLUTE: f64 = 1.0;
pub const CRITICAL_DEVIATION: f64 = 20.0; // currency units
pub const MODERATE_DEVIATION: f64 = 5.0; // currency units

pub const ENV_THRESHOLD_PERCENT: &str = "RECONCILE_THRESHOLD_PERCENT";
pub const ENV_RECIPE_THRESHOLD_PERCENT: &str = "RECONCILE_RECIPE_THRESHOLD_PERCENT";
pub const ENV_MIN_ABSOLUTE: &str = "RECONCILE_MIN_ABSOLUTE";
pub const ENV_FRESHNESS_DAYS: &str = "RECONCILE_FRESHNESS_DAYS";
pub const ENV_DISABLE_FALLBACK: &str = "RECONCILE_DISABLE_FALLBACK";

/// Reporting gate: a deviation is reported only when both limits are exceeded
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Percentage deviation that must be exceeded
    pub percent: f64,
    /// Absolute deviation (currency units) that must be exceeded
    pub min_absolute: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            percent: DEFAULT_THRESHOLD_PERCENT,
            min_absolute: DEFAULT_MIN_ABSOLUTE,
        }
    }
}

impl Thresholds {
    pub fn new(percent: f64, min_absolute: f64) -> Self {
        Self {
            percent,
            min_absolute,
        }
    }

    /// Both limits must be exceeded (AND, not OR)
    pub fn exceeded_by(&self, percent_deviation: f64, absolute_deviation: f64) -> bool {
        percent_deviation.abs() > self.percent && absolute_deviation.abs() > self.min_absolute
    }
}

/// Configuration structure for a reconciliation run
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Reporting thresholds for the cross-check and specification modes
    pub thresholds: Thresholds,
    /// Reporting thresholds for recipe mode, tighter on the percentage
    pub recipe_thresholds: Thresholds,
    /// Days a last-purchase price stays fresh (inclusive)
    pub freshness_days: i64,
    /// Unit assumed for lines and rules with no unit
    pub default_unit: String,
    /// Unit assumed for products with neither a standard nor a price unit
    pub default_price_unit: String,
    /// Absolute deviation at or above which a pair is critical
    pub critical_deviation: f64,
    /// Absolute deviation at or above which a pair is moderate
    pub moderate_deviation: f64,
    /// Conversions tried after the global table
    pub fallback: FallbackTable,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            recipe_thresholds: Thresholds::new(DEFAULT_RECIPE_THRESHOLD_PERCENT, DEFAULT_MIN_ABSOLUTE),
            freshness_days: DEFAULT_FRESHNESS_DAYS,
            default_unit: DEFAULT_UNIT.to_string(),
            default_price_unit: DEFAULT_PRICE_UNIT.to_string(),
            critical_deviation: CRITICAL_DEVIATION,
            moderate_deviation: MODERATE_DEVIATION,
            fallback: FallbackTable::default(),
        }
    }
}

impl ReconcileConfig {
    /// Build a configuration from process environment variables
    ///
    /// Unset variables keep their defaults; unparsable ones are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any key lookup (used by `from_env` and tests)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(percent) = parse_var::<f64, _>(&lookup, ENV_THRESHOLD_PERCENT) {
            config.thresholds.percent = percent;
        }
        if let Some(percent) = parse_var::<f64, _>(&lookup, ENV_RECIPE_THRESHOLD_PERCENT) {
            config.recipe_thresholds.percent = percent;
        }
        if let Some(min_absolute) = parse_var::<f64, _>(&lookup, ENV_MIN_ABSOLUTE) {
            config.thresholds.min_absolute = min_absolute;
            config.recipe_thresholds.min_absolute = min_absolute;
        }
        if let Some(days) = parse_var::<i64, _>(&lookup, ENV_FRESHNESS_DAYS) {
            config.freshness_days = days;
        }
        if let Some(flag) = lookup(ENV_DISABLE_FALLBACK) {
            if matches!(flag.trim(), "1" | "true" | "yes") {
                debug!("Conversion fallback table disabled by {}", ENV_DISABLE_FALLBACK);
                config.fallback = FallbackTable::empty();
            }
        }

        debug!(
            "Reconcile config: threshold={}%, recipe_threshold={}%, min_absolute={}, freshness_days={}",
            config.thresholds.percent,
            config.recipe_thresholds.percent,
            config.thresholds.min_absolute,
            config.freshness_days
        );
        config
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring unparsable value '{}' for {}", raw, key);
            None
        }
    }
}
