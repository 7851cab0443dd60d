//! # Snapshot Module
//!
//! The read-only input bundle for one reconciliation run: recipes with their
//! lines and linked product cards, specifications and their rules, conversion
//! tables, the keyword dictionary and extra unit synonyms. Snapshots are JSON
//! files exported from the relational store.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use crate::conversion::{ConversionResolver, ConversionTable, ProductConversionTable};
use crate::costing::{CostEngine, SeverityTiers};
use crate::ingredient_matcher::IngredientMatcher;
use crate::price_resolver::PriceResolver;
use crate::reconcile_config::ReconcileConfig;
use crate::reconcile_errors::ReconcileError;
use crate::reconcile_model::{
    ConversionEntry, KeywordEntry, ProductConversionEntry, Recipe, Specification,
    SpecificationRule,
};
use crate::unit_normalizer::UnitNormalizer;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileSnapshot {
    pub recipes: Vec<Recipe>,
    pub specifications: Vec<Specification>,
    pub rules: Vec<SpecificationRule>,
    pub conversions: Vec<ConversionEntry>,
    pub product_conversions: Vec<ProductConversionEntry>,
    pub keywords: Vec<KeywordEntry>,
    /// Extra `variant -> standard` unit spellings
    pub unit_synonyms: BTreeMap<String, String>,
}

impl ReconcileSnapshot {
    /// Parse a snapshot from JSON text and validate it
    pub fn from_json(text: &str) -> Result<Self> {
        let snapshot: Self = serde_json::from_str(text).context("Failed to parse snapshot JSON")?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Read and validate a snapshot file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        let snapshot = Self::from_json(&text)
            .with_context(|| format!("Invalid snapshot {}", path.display()))?;
        info!(
            "Loaded snapshot {}: {} recipes, {} specifications, {} rules",
            path.display(),
            snapshot.recipes.len(),
            snapshot.specifications.len(),
            snapshot.rules.len()
        );
        Ok(snapshot)
    }

    /// Reject duplicate ids; rules of unknown specifications are only logged
    pub fn validate(&self) -> Result<(), ReconcileError> {
        let mut recipe_ids = HashSet::new();
        for recipe in &self.recipes {
            if !recipe_ids.insert(recipe.id) {
                return Err(ReconcileError::Snapshot(format!(
                    "duplicate recipe id {}",
                    recipe.id
                )));
            }
        }

        let mut spec_ids = HashSet::new();
        for spec in &self.specifications {
            if !spec_ids.insert(spec.id) {
                return Err(ReconcileError::Snapshot(format!(
                    "duplicate specification id {}",
                    spec.id
                )));
            }
        }

        let orphans = self
            .rules
            .iter()
            .filter(|r| !spec_ids.contains(&r.specification_id))
            .count();
        if orphans > 0 {
            warn!("{} rules reference unknown specifications", orphans);
        }

        Ok(())
    }

    pub fn specification(&self, id: i64) -> Option<&Specification> {
        self.specifications.iter().find(|s| s.id == id)
    }

    /// Specifications in id order
    pub fn specifications_by_id(&self) -> Vec<&Specification> {
        let mut specs: Vec<&Specification> = self.specifications.iter().collect();
        specs.sort_by_key(|s| s.id);
        specs
    }

    pub fn rules_for(&self, specification_id: i64) -> Vec<SpecificationRule> {
        crate::reports::rules_for_specification(&self.rules, specification_id)
    }

    /// Normalizer with the built-in synonyms, this snapshot's extras and the configured default unit
    pub fn normalizer(&self, config: &ReconcileConfig) -> UnitNormalizer {
        UnitNormalizer::default()
            .with_synonyms(self.unit_synonyms.iter())
            .with_default_unit(&config.default_unit)
    }

    /// Assemble the costing engine for this snapshot
    ///
    /// Fails when a conversion entry carries an unusable multiplier.
    pub fn build_engine(
        &self,
        config: &ReconcileConfig,
        today: NaiveDate,
    ) -> Result<CostEngine, ReconcileError> {
        let normalizer = self.normalizer(config);
        let global = ConversionTable::from_entries(&self.conversions, &normalizer)?;
        let product = ProductConversionTable::from_entries(&self.product_conversions, &normalizer)?;
        debug!(
            "Conversion tables: {} global, {} per-product, {} fallback",
            global.len(),
            product.len(),
            config.fallback.len()
        );

        Ok(CostEngine::new(
            normalizer,
            ConversionResolver::new(product, global, config.fallback.clone()),
            PriceResolver::from_config(config, today),
            IngredientMatcher::new(self.keywords.clone()),
            SeverityTiers::from_config(config),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "recipes": [
            {
                "id": 1,
                "name": "Tavuk Sote",
                "subtype_id": 3,
                "lines": [
                    {
                        "id": 10,
                        "ingredient_name": "tavuk göğsü",
                        "quantity": 200,
                        "unit": "GR",
                        "product": { "id": 7, "standard_unit": "kg", "active_price": 50 }
                    }
                ]
            }
        ],
        "specifications": [ { "id": 1, "code": "KYK" } ],
        "rules": [
            { "id": 100, "specification_id": 1, "subtype_id": 3, "material_type": "Tavuk", "allocation": 150, "unit": "g" },
            { "id": 101, "specification_id": 9, "material_type": "Un", "allocation": 20 }
        ],
        "conversions": [ { "source_unit": "Gram", "target_unit": "Kilo", "multiplier": 0.001 } ],
        "keywords": [ { "material_type": "Tavuk", "keywords": ["tavuk"] } ],
        "unit_synonyms": { "porsiyon": "adet" }
    }"#;

    #[test]
    fn test_parse_sample() {
        let snapshot = ReconcileSnapshot::from_json(SAMPLE).unwrap();
        assert_eq!(snapshot.recipes.len(), 1);
        assert_eq!(snapshot.recipes[0].lines[0].quantity, Some(200.0));
        assert_eq!(snapshot.rules_for(1).len(), 1);
        assert!(snapshot.product_conversions.is_empty());
        assert_eq!(snapshot.specification(1).map(|s| s.code.as_str()), Some("KYK"));
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let snapshot = ReconcileSnapshot::from_json("{}").unwrap();
        assert!(snapshot.recipes.is_empty());
        assert!(snapshot.unit_synonyms.is_empty());
    }

    #[test]
    fn test_duplicate_recipe_ids_rejected() {
        let text = r#"{ "recipes": [ { "id": 1, "name": "a" }, { "id": 1, "name": "b" } ] }"#;
        let err = ReconcileSnapshot::from_json(text).unwrap_err();
        assert!(format!("{err:#}").contains("duplicate recipe id 1"));
    }

    #[test]
    fn test_build_engine() {
        let snapshot = ReconcileSnapshot::from_json(SAMPLE).unwrap();
        let config = ReconcileConfig::default();
        let engine = snapshot
            .build_engine(&config, NaiveDate::from_ymd_opt(2026, 3, 1).unwrap())
            .unwrap();

        assert_eq!(engine.normalizer().normalize(Some("Porsiyon")), "adet");
        assert_eq!(engine.conversions().resolve("g", "kg", None).multiplier(), Some(0.001));

        let spec = snapshot.specification(1).unwrap();
        let eval = engine
            .evaluate_pair(&snapshot.recipes[0], spec, &snapshot.rules_for(1))
            .unwrap();
        assert_eq!(eval.recipe_total, 10.0);
        assert_eq!(eval.spec_total, 7.5);
    }

    #[test]
    fn test_invalid_conversion_fails_engine() {
        let text = r#"{ "conversions": [ { "source_unit": "g", "target_unit": "kg", "multiplier": 0 } ] }"#;
        let snapshot = ReconcileSnapshot::from_json(text).unwrap();
        let result = snapshot.build_engine(
            &ReconcileConfig::default(),
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
        );
        assert!(matches!(result, Err(ReconcileError::InvalidConversion(_))));
    }
}
