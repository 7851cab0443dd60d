//! # Reconciliation Data Model
//!
//! This module defines the read-only records the engine works on: recipes and
//! their material lines, the product cards those lines are linked to,
//! specification rules with their gram allocations, conversion entries and the
//! keyword dictionary used for fuzzy matching.
//!
//! ## Core Concepts
//!
//! - **MaterialLine**: one ingredient usage inside a recipe
//! - **ProductCard**: a purchasable product carrying up to six price sources
//! - **SpecificationRule**: a required allocation for a material type, optionally
//!   scoped to a recipe subtype
//! - **KeywordEntry**: keywords proposing a material type for a free-text name
//!
//! ## Usage
//!
//! ```rust
//! use recipe_reconciler::reconcile_model::{MaterialLine, ProductCard};
//!
//! let chicken = MaterialLine::new(1, "tavuk göğsü")
//!     .with_quantity(200.0, "g")
//!     .with_product(ProductCard::new(7).with_standard_unit("kg").with_active_price(50.0));
//!
//! assert_eq!(chicken.active_quantity(), 200.0);
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which of the two recorded quantities of a line is in effect
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantityMode {
    /// The quantity declared when the recipe was written
    #[default]
    Declared,
    /// The chef override quantity, when one is recorded
    Chef,
}

/// A purchasable product record shared by many material lines
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductCard {
    /// Product identifier, also the key of per-product conversions
    pub id: i64,

    /// Display name of the product
    #[serde(default)]
    pub name: Option<String>,

    /// Standard unit the product is priced in
    #[serde(default)]
    pub standard_unit: Option<String>,

    /// Unit used when no standard unit is recorded
    #[serde(default)]
    pub price_unit: Option<String>,

    /// Currently active price
    #[serde(default)]
    pub active_price: Option<f64>,

    /// Price paid at the last purchase
    #[serde(default)]
    pub last_purchase_price: Option<f64>,

    /// Date of the last purchase
    #[serde(default)]
    pub last_purchase_date: Option<NaiveDate>,

    /// Market average price
    #[serde(default)]
    pub market_price: Option<f64>,

    /// Unit the market average is quoted in
    #[serde(default)]
    pub market_unit: Option<String>,

    /// Manually entered price
    #[serde(default)]
    pub manual_price: Option<f64>,

    /// Price of the cheapest known variant
    #[serde(default)]
    pub variant_price: Option<f64>,
}

/// One ingredient usage inside one recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialLine {
    pub id: i64,

    /// Free-text ingredient name as typed in the recipe
    pub ingredient_name: String,

    /// Declared quantity
    #[serde(default)]
    pub quantity: Option<f64>,

    /// Chef override quantity
    #[serde(default)]
    pub chef_quantity: Option<f64>,

    #[serde(default)]
    pub quantity_mode: QuantityMode,

    /// Raw unit token, before normalization
    #[serde(default)]
    pub unit: Option<String>,

    /// Linked product card; `None` is the "missing card" condition
    #[serde(default)]
    pub product: Option<ProductCard>,
}

/// A recipe with its ordered material lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub category: Option<String>,

    /// Subtype classification scoping specification rules
    #[serde(default)]
    pub subtype_id: Option<i64>,

    #[serde(default)]
    pub lines: Vec<MaterialLine>,

    /// Previously stored estimated cost, used by the recipe-level report only
    #[serde(default)]
    pub estimated_cost: Option<f64>,
}

/// A purchasing specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Specification {
    pub id: i64,
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// A required allocation of one material type inside a specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecificationRule {
    pub id: i64,
    pub specification_id: i64,

    /// Subtype the rule is scoped to; `None` for rules that apply to every subtype
    #[serde(default)]
    pub subtype_id: Option<i64>,

    /// Material-type label (e.g. "Tavuk Göğsü")
    pub material_type: String,

    /// Required gram/unit allocation
    pub allocation: f64,

    /// Unit of the allocation; `None` defaults to grams
    #[serde(default)]
    pub unit: Option<String>,
}

/// A global unit conversion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionEntry {
    pub source_unit: String,
    pub target_unit: String,
    pub multiplier: f64,
}

/// A unit conversion that only applies to one product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductConversionEntry {
    pub product_id: i64,
    pub source_unit: String,
    pub target_unit: String,
    pub multiplier: f64,
}

/// Keywords proposing a material type for free-text ingredient names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordEntry {
    pub material_type: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl ProductCard {
    /// Create a product card with no prices
    pub fn new(id: i64) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_standard_unit(mut self, unit: &str) -> Self {
        self.standard_unit = Some(unit.to_string());
        self
    }

    pub fn with_price_unit(mut self, unit: &str) -> Self {
        self.price_unit = Some(unit.to_string());
        self
    }

    pub fn with_active_price(mut self, price: f64) -> Self {
        self.active_price = Some(price);
        self
    }

    pub fn with_last_purchase(mut self, price: f64, date: NaiveDate) -> Self {
        self.last_purchase_price = Some(price);
        self.last_purchase_date = Some(date);
        self
    }

    pub fn with_market_price(mut self, price: f64, unit: Option<&str>) -> Self {
        self.market_price = Some(price);
        self.market_unit = unit.map(str::to_string);
        self
    }

    pub fn with_manual_price(mut self, price: f64) -> Self {
        self.manual_price = Some(price);
        self
    }

    pub fn with_variant_price(mut self, price: f64) -> Self {
        self.variant_price = Some(price);
        self
    }

    /// Every raw price field, named, for validation
    pub(crate) fn price_fields(&self) -> [(&'static str, Option<f64>); 5] {
        [
            ("active_price", self.active_price),
            ("last_purchase_price", self.last_purchase_price),
            ("market_price", self.market_price),
            ("manual_price", self.manual_price),
            ("variant_price", self.variant_price),
        ]
    }
}

impl MaterialLine {
    /// Create a material line with just an ingredient name
    pub fn new(id: i64, ingredient_name: &str) -> Self {
        Self {
            id,
            ingredient_name: ingredient_name.to_string(),
            quantity: None,
            chef_quantity: None,
            quantity_mode: QuantityMode::Declared,
            unit: None,
            product: None,
        }
    }

    /// Set the declared quantity and its raw unit
    pub fn with_quantity(mut self, quantity: f64, unit: &str) -> Self {
        self.quantity = Some(quantity);
        self.unit = Some(unit.to_string());
        self
    }

    /// Record a chef override and make it the active quantity
    pub fn with_chef_quantity(mut self, quantity: f64) -> Self {
        self.chef_quantity = Some(quantity);
        self.quantity_mode = QuantityMode::Chef;
        self
    }

    pub fn with_product(mut self, product: ProductCard) -> Self {
        self.product = Some(product);
        self
    }

    /// The quantity in effect, never negative
    ///
    /// The chef quantity wins when the line is in chef mode and one is recorded;
    /// otherwise the declared quantity is used. Absent quantities count as 0.
    pub fn active_quantity(&self) -> f64 {
        let raw = match (self.quantity_mode, self.chef_quantity) {
            (QuantityMode::Chef, Some(chef)) => chef,
            _ => self.quantity.unwrap_or(0.0),
        };
        if raw > 0.0 {
            raw
        } else {
            0.0
        }
    }
}

impl Recipe {
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            code: None,
            category: None,
            subtype_id: None,
            lines: Vec::new(),
            estimated_cost: None,
        }
    }

    pub fn with_subtype(mut self, subtype_id: i64) -> Self {
        self.subtype_id = Some(subtype_id);
        self
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    pub fn with_estimated_cost(mut self, cost: f64) -> Self {
        self.estimated_cost = Some(cost);
        self
    }

    pub fn with_line(mut self, line: MaterialLine) -> Self {
        self.lines.push(line);
        self
    }
}

impl SpecificationRule {
    pub fn new(id: i64, specification_id: i64, material_type: &str, allocation: f64) -> Self {
        Self {
            id,
            specification_id,
            subtype_id: None,
            material_type: material_type.to_string(),
            allocation,
            unit: None,
        }
    }

    pub fn with_subtype(mut self, subtype_id: i64) -> Self {
        self.subtype_id = Some(subtype_id);
        self
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }
}

impl KeywordEntry {
    pub fn new(material_type: &str, keywords: &[&str]) -> Self {
        Self {
            material_type: material_type.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl fmt::Display for MaterialLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let quantity = self.active_quantity();
        if quantity.fract() == 0.0 {
            write!(f, "{}", quantity as i64)?;
        } else {
            write!(f, "{}", quantity)?;
        }
        if let Some(unit) = &self.unit {
            write!(f, " {}", unit)?;
        }
        write!(f, " {}", self.ingredient_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_quantity_declared() {
        let line = MaterialLine::new(1, "pirinç").with_quantity(80.0, "g");
        assert_eq!(line.active_quantity(), 80.0);
    }

    #[test]
    fn test_active_quantity_chef_override() {
        let line = MaterialLine::new(1, "pirinç")
            .with_quantity(80.0, "g")
            .with_chef_quantity(95.0);
        assert_eq!(line.active_quantity(), 95.0);
    }

    #[test]
    fn test_active_quantity_chef_mode_without_value() {
        let mut line = MaterialLine::new(1, "pirinç").with_quantity(80.0, "g");
        line.quantity_mode = QuantityMode::Chef;
        assert_eq!(line.active_quantity(), 80.0);
    }

    #[test]
    fn test_active_quantity_defaults_to_zero() {
        let line = MaterialLine::new(1, "tuz");
        assert_eq!(line.active_quantity(), 0.0);

        let negative = MaterialLine::new(2, "tuz").with_quantity(-3.0, "g");
        assert_eq!(negative.active_quantity(), 0.0);
    }

    #[test]
    fn test_material_line_display() {
        let line = MaterialLine::new(1, "tavuk göğsü").with_quantity(200.0, "g");
        assert_eq!(format!("{}", line), "200 g tavuk göğsü");

        let line = MaterialLine::new(2, "zeytinyağı").with_quantity(12.5, "ml");
        assert_eq!(format!("{}", line), "12.5 ml zeytinyağı");
    }

    #[test]
    fn test_product_card_deserializes_with_missing_fields() {
        let card: ProductCard = serde_json::from_str(r#"{"id": 7, "active_price": 50.0}"#).unwrap();
        assert_eq!(card.id, 7);
        assert_eq!(card.active_price, Some(50.0));
        assert!(card.last_purchase_date.is_none());
    }

    #[test]
    fn test_quantity_mode_serde() {
        let line: MaterialLine = serde_json::from_str(
            r#"{"id": 3, "ingredient_name": "un", "quantity": 10, "chef_quantity": 12, "quantity_mode": "chef"}"#,
        )
        .unwrap();
        assert_eq!(line.quantity_mode, QuantityMode::Chef);
        assert_eq!(line.active_quantity(), 12.0);
    }
}
