//! # Unit Normalizer
//!
//! Maps raw unit tokens ("GR", " Lt ", "Kilogram") to canonical unit strings
//! using a synonym table. Normalization is best-effort: unknown tokens pass
//! through lower-cased and trimmed, and a missing or blank token becomes the
//! default unit (`"g"` unless configured otherwise).
//!
//! ```rust
//! use recipe_reconciler::unit_normalizer::UnitNormalizer;
//!
//! let normalizer = UnitNormalizer::default();
//! assert_eq!(normalizer.normalize(Some("GR")), "g");
//! assert_eq!(normalizer.normalize(Some(" Paket ")), "paket");
//! assert_eq!(normalizer.normalize(None), "g");
//! ```

use lazy_static::lazy_static;
use log::trace;
use std::collections::HashMap;

use crate::reconcile_config::DEFAULT_UNIT;

lazy_static! {
    /// Common spellings seen in purchasing data
    static ref BUILTIN_SYNONYMS: HashMap<&'static str, &'static str> = {
        let mut map = HashMap::new();

        // Weight units
        map.insert("gr", "g");
        map.insert("gram", "g");
        map.insert("gramm", "g");
        map.insert("grams", "g");
        map.insert("kilo", "kg");
        map.insert("kilogram", "kg");
        map.insert("kgs", "kg");

        // Volume units
        map.insert("lt", "l");
        map.insert("litre", "l");
        map.insert("liter", "l");
        map.insert("mililitre", "ml");
        map.insert("mililiter", "ml");
        map.insert("millilitre", "ml");
        map.insert("milliliter", "ml");

        // Count units
        map.insert("ad", "adet");
        map.insert("tane", "adet");
        map.insert("piece", "adet");

        map
    };
}

/// Synonym-table based unit normalizer
#[derive(Debug, Clone)]
pub struct UnitNormalizer {
    synonyms: HashMap<String, String>,
    default_unit: String,
}

impl Default for UnitNormalizer {
    /// Built-in synonyms, defaulting missing units to grams
    fn default() -> Self {
        let synonyms = BUILTIN_SYNONYMS
            .iter()
            .map(|(variant, standard)| (variant.to_string(), standard.to_string()))
            .collect();
        Self {
            synonyms,
            default_unit: DEFAULT_UNIT.to_string(),
        }
    }
}

impl UnitNormalizer {
    /// Create a normalizer with no synonyms at all
    pub fn empty(default_unit: &str) -> Self {
        Self {
            synonyms: HashMap::new(),
            default_unit: default_unit.trim().to_lowercase(),
        }
    }

    /// Add caller-supplied `(variant, standard)` pairs, overriding built-ins
    pub fn with_synonyms<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (variant, standard) in pairs {
            self.synonyms.insert(
                variant.as_ref().trim().to_lowercase(),
                standard.as_ref().trim().to_lowercase(),
            );
        }
        self
    }

    /// Replace the unit assumed for missing or blank tokens
    pub fn with_default_unit(mut self, unit: &str) -> Self {
        let unit = unit.trim().to_lowercase();
        if !unit.is_empty() {
            self.default_unit = unit;
        }
        self
    }

    /// The unit returned for missing or blank tokens
    pub fn default_unit(&self) -> &str {
        &self.default_unit
    }

    /// Normalize a raw unit token; never returns an empty string
    pub fn normalize(&self, raw: Option<&str>) -> String {
        let token = match raw.map(|r| r.trim().to_lowercase()) {
            Some(token) if !token.is_empty() => token,
            _ => return self.default_unit.clone(),
        };

        match self.synonyms.get(&token) {
            Some(standard) => {
                trace!("Unit '{}' normalized to '{}'", token, standard);
                standard.clone()
            }
            None => token,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_synonyms() {
        let normalizer = UnitNormalizer::default();
        assert_eq!(normalizer.normalize(Some("GR")), "g");
        assert_eq!(normalizer.normalize(Some("Kilogram")), "kg");
        assert_eq!(normalizer.normalize(Some("Lt")), "l");
        assert_eq!(normalizer.normalize(Some("tane")), "adet");
    }

    #[test]
    fn test_unknown_token_passes_through() {
        let normalizer = UnitNormalizer::default();
        assert_eq!(normalizer.normalize(Some("  Demet ")), "demet");
        assert_eq!(normalizer.normalize(Some("kg")), "kg");
    }

    #[test]
    fn test_missing_unit_defaults_to_grams() {
        let normalizer = UnitNormalizer::default();
        assert_eq!(normalizer.normalize(None), "g");
        assert_eq!(normalizer.normalize(Some("")), "g");
        assert_eq!(normalizer.normalize(Some("   ")), "g");
    }

    #[test]
    fn test_caller_synonyms_override_builtins() {
        let normalizer = UnitNormalizer::default().with_synonyms([("LT", "lt"), ("Porsiyon", "adet")]);
        assert_eq!(normalizer.normalize(Some("lt")), "lt");
        assert_eq!(normalizer.normalize(Some("porsiyon")), "adet");
    }

    #[test]
    fn test_empty_normalizer() {
        let normalizer = UnitNormalizer::empty("ML");
        assert_eq!(normalizer.normalize(Some("GR")), "gr");
        assert_eq!(normalizer.normalize(None), "ml");
        assert_eq!(normalizer.default_unit(), "ml");
    }
}
