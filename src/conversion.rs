//! # Conversion Resolver
//!
//! Resolves the multiplier that turns a quantity in one canonical unit into
//! the unit a price is quoted in. Lookup order:
//!
//! 1. identity (same unit ⇒ 1)
//! 2. per-product override keyed by `(product, source, target)`
//! 3. global table keyed by `(source, target)`
//! 4. the fallback table passed in as configuration
//!
//! A missing pair is an expected, reportable condition and yields
//! [`Conversion::Unresolvable`], never an error. Inverses are not derived:
//! a `(g, kg)` entry says nothing about `(kg, g)`.

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::reconcile_errors::ReconcileError;
use crate::reconcile_model::{ConversionEntry, ProductConversionEntry};
use crate::unit_normalizer::UnitNormalizer;

/// Which lookup stage produced a multiplier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionSource {
    Identity,
    Product,
    Global,
    Fallback,
}

/// Result of a conversion lookup
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Conversion {
    /// A finite, positive multiplier
    Resolved {
        multiplier: f64,
        source: ConversionSource,
    },
    /// No tabulated conversion exists for the pair
    Unresolvable,
}

impl Conversion {
    pub fn multiplier(&self) -> Option<f64> {
        match self {
            Conversion::Resolved { multiplier, .. } => Some(*multiplier),
            Conversion::Unresolvable => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Conversion::Resolved { .. })
    }
}

fn validate_multiplier(multiplier: f64, what: &str) -> Result<f64, ReconcileError> {
    if multiplier.is_finite() && multiplier > 0.0 {
        Ok(multiplier)
    } else {
        Err(ReconcileError::InvalidConversion(format!(
            "{what} has multiplier {multiplier}"
        )))
    }
}

/// Hardcoded conversions consulted after the global table
///
/// This is a configuration value rather than ambient state; pass
/// [`FallbackTable::empty`] to switch fallback behavior off.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackTable {
    entries: HashMap<(String, String), f64>,
}

impl Default for FallbackTable {
    /// Gram→kilogram and millilitre→litre, including their raw spellings
    fn default() -> Self {
        Self::empty()
            .with_entry("g", "kg", 0.001)
            .with_entry("gr", "kg", 0.001)
            .with_entry("ml", "l", 0.001)
            .with_entry("ml", "lt", 0.001)
    }
}

impl FallbackTable {
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Add an entry; invalid multipliers are logged and skipped
    pub fn with_entry(mut self, source: &str, target: &str, multiplier: f64) -> Self {
        match validate_multiplier(multiplier, &format!("fallback {source}->{target}")) {
            Ok(multiplier) => {
                self.entries
                    .insert((source.to_lowercase(), target.to_lowercase()), multiplier);
            }
            Err(e) => warn!("{}", e),
        }
        self
    }

    pub fn get(&self, source: &str, target: &str) -> Option<f64> {
        self.entries
            .get(&(source.to_string(), target.to_string()))
            .copied()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Global `(source, target) → multiplier` table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversionTable {
    entries: HashMap<(String, String), f64>,
}

impl ConversionTable {
    /// Build the table, normalizing both unit columns
    ///
    /// Later entries for the same pair replace earlier ones.
    pub fn from_entries(
        entries: &[ConversionEntry],
        normalizer: &UnitNormalizer,
    ) -> Result<Self, ReconcileError> {
        let mut table = HashMap::new();
        for entry in entries {
            let source = normalizer.normalize(Some(&entry.source_unit));
            let target = normalizer.normalize(Some(&entry.target_unit));
            let multiplier =
                validate_multiplier(entry.multiplier, &format!("global {source}->{target}"))?;
            table.insert((source, target), multiplier);
        }
        debug!("Loaded {} global conversions", table.len());
        Ok(Self { entries: table })
    }

    pub fn get(&self, source: &str, target: &str) -> Option<f64> {
        self.entries
            .get(&(source.to_string(), target.to_string()))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-product `(product, source, target) → multiplier` overrides
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductConversionTable {
    entries: HashMap<(i64, String, String), f64>,
}

impl ProductConversionTable {
    pub fn from_entries(
        entries: &[ProductConversionEntry],
        normalizer: &UnitNormalizer,
    ) -> Result<Self, ReconcileError> {
        let mut table = HashMap::new();
        for entry in entries {
            let source = normalizer.normalize(Some(&entry.source_unit));
            let target = normalizer.normalize(Some(&entry.target_unit));
            let multiplier = validate_multiplier(
                entry.multiplier,
                &format!("product {} {source}->{target}", entry.product_id),
            )?;
            table.insert((entry.product_id, source, target), multiplier);
        }
        debug!("Loaded {} per-product conversions", table.len());
        Ok(Self { entries: table })
    }

    pub fn get(&self, product_id: i64, source: &str, target: &str) -> Option<f64> {
        self.entries
            .get(&(product_id, source.to_string(), target.to_string()))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Layered conversion lookup
#[derive(Debug, Clone, Default)]
pub struct ConversionResolver {
    product: ProductConversionTable,
    global: ConversionTable,
    fallback: FallbackTable,
}

impl ConversionResolver {
    pub fn new(
        product: ProductConversionTable,
        global: ConversionTable,
        fallback: FallbackTable,
    ) -> Self {
        Self {
            product,
            global,
            fallback,
        }
    }

    /// Resolve the multiplier from `source` to `target` (both canonical)
    pub fn resolve(&self, source: &str, target: &str, product_id: Option<i64>) -> Conversion {
        if source == target {
            return Conversion::Resolved {
                multiplier: 1.0,
                source: ConversionSource::Identity,
            };
        }

        let found = product_id
            .and_then(|id| self.product.get(id, source, target))
            .map(|m| (m, ConversionSource::Product))
            .or_else(|| {
                self.global
                    .get(source, target)
                    .map(|m| (m, ConversionSource::Global))
            })
            .or_else(|| {
                self.fallback
                    .get(source, target)
                    .map(|m| (m, ConversionSource::Fallback))
            });

        match found {
            Some((multiplier, stage)) => {
                trace!(
                    "Conversion {}->{} (product {:?}) = {} via {:?}",
                    source,
                    target,
                    product_id,
                    multiplier,
                    stage
                );
                Conversion::Resolved {
                    multiplier,
                    source: stage,
                }
            }
            None => {
                debug!(
                    "No conversion {}->{} (product {:?})",
                    source, target, product_id
                );
                Conversion::Unresolvable
            }
        }
    }
}
