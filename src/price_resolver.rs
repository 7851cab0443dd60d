//! # Price Resolver
//!
//! Picks one price for a product card out of up to six candidate sources.
//! The precedence order is an explicit list of [`PriceRule`]s evaluated in
//! sequence; the first rule whose source holds a positive value wins.
//!
//! | # | Source | Condition |
//! |---|--------|-----------|
//! | 1 | `active` | active price > 0 |
//! | 2 | `last_purchase` | last-purchase price > 0 and bought within the freshness window |
//! | 3 | `market` | market average > 0 (quoted in its own unit when known) |
//! | 4 | `stale_last_purchase` | last-purchase price > 0, any age |
//! | 5 | `manual` | manual price > 0 |
//! | 6 | `variant` | best-variant price > 0 |
//!
//! When nothing matches the result is a zero price tagged `none`.
//!
//! The freshness window is inclusive on both ends and measured against an
//! explicit reference date, so results never depend on the wall clock.

use chrono::NaiveDate;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::reconcile_config::{ReconcileConfig, DEFAULT_FRESHNESS_DAYS, DEFAULT_PRICE_UNIT};
use crate::reconcile_errors::ReconcileError;
use crate::reconcile_model::ProductCard;

/// Provenance of a resolved price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    Active,
    LastPurchase,
    Market,
    StaleLastPurchase,
    Manual,
    Variant,
    None,
}

impl PriceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceSource::Active => "active",
            PriceSource::LastPurchase => "last_purchase",
            PriceSource::Market => "market",
            PriceSource::StaleLastPurchase => "stale_last_purchase",
            PriceSource::Manual => "manual",
            PriceSource::Variant => "variant",
            PriceSource::None => "none",
        }
    }
}

impl fmt::Display for PriceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The price picked for one product card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedPrice {
    /// Unit price; 0 only when `source` is `none`
    pub price: f64,
    /// Unit the price is quoted in, lower-cased
    pub unit: String,
    pub source: PriceSource,
    /// Age of the last purchase in days, for last-purchase picks
    pub age_days: Option<i64>,
}

impl ResolvedPrice {
    pub fn is_zero(&self) -> bool {
        self.source == PriceSource::None
    }

    pub fn is_stale(&self) -> bool {
        self.source == PriceSource::StaleLastPurchase
    }
}

/// Everything a rule needs to look at, computed once per card
pub struct PriceContext<'a> {
    pub card: &'a ProductCard,
    /// Product standard unit, else price unit, else the configured default
    pub product_unit: String,
    /// Days since the last purchase, negative for future-dated purchases
    pub age_days: Option<i64>,
    /// Whether the last purchase falls inside the freshness window
    pub fresh: bool,
}

/// One precedence step: a source tag plus the predicate that selects it
pub struct PriceRule {
    pub source: PriceSource,
    /// Returns the price and, when it differs from the product unit, its unit
    select: fn(&PriceContext<'_>) -> Option<(f64, Option<String>)>,
}

impl PriceRule {
    pub fn apply(&self, ctx: &PriceContext<'_>) -> Option<(f64, Option<String>)> {
        (self.select)(ctx)
    }
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v > 0.0)
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
}

/// Precedence order, first match wins
static PRICE_RULES: [PriceRule; 6] = [
    PriceRule {
        source: PriceSource::Active,
        select: |ctx| positive(ctx.card.active_price).map(|p| (p, None)),
    },
    PriceRule {
        source: PriceSource::LastPurchase,
        select: |ctx| {
            if ctx.fresh {
                positive(ctx.card.last_purchase_price).map(|p| (p, None))
            } else {
                None
            }
        },
    },
    PriceRule {
        source: PriceSource::Market,
        select: |ctx| {
            positive(ctx.card.market_price)
                .map(|p| (p, non_blank(ctx.card.market_unit.as_deref())))
        },
    },
    PriceRule {
        source: PriceSource::StaleLastPurchase,
        select: |ctx| positive(ctx.card.last_purchase_price).map(|p| (p, None)),
    },
    PriceRule {
        source: PriceSource::Manual,
        select: |ctx| positive(ctx.card.manual_price).map(|p| (p, None)),
    },
    PriceRule {
        source: PriceSource::Variant,
        select: |ctx| positive(ctx.card.variant_price).map(|p| (p, None)),
    },
];

/// The precedence list, in evaluation order
pub fn price_rules() -> &'static [PriceRule] {
    &PRICE_RULES
}

/// Resolves product prices against a fixed reference date
#[derive(Debug, Clone)]
pub struct PriceResolver {
    today: NaiveDate,
    freshness_days: i64,
    default_price_unit: String,
}

impl PriceResolver {
    /// Create a resolver with the default 90-day window
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today,
            freshness_days: DEFAULT_FRESHNESS_DAYS,
            default_price_unit: DEFAULT_PRICE_UNIT.to_string(),
        }
    }

    pub fn from_config(config: &ReconcileConfig, today: NaiveDate) -> Self {
        Self {
            today,
            freshness_days: config.freshness_days,
            default_price_unit: config.default_price_unit.to_lowercase(),
        }
    }

    pub fn with_freshness_days(mut self, days: i64) -> Self {
        self.freshness_days = days;
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// Days since the purchase date, measured against the reference date
    pub fn age_in_days(&self, date: NaiveDate) -> i64 {
        (self.today - date).num_days()
    }

    /// Whether a purchase on `date` is still fresh (0 ≤ age ≤ window)
    pub fn is_fresh(&self, date: NaiveDate) -> bool {
        let age = self.age_in_days(date);
        age >= 0 && age <= self.freshness_days
    }

    fn context<'a>(&self, card: &'a ProductCard) -> PriceContext<'a> {
        let product_unit = non_blank(card.standard_unit.as_deref())
            .or_else(|| non_blank(card.price_unit.as_deref()))
            .unwrap_or_else(|| self.default_price_unit.clone());
        let age_days = card.last_purchase_date.map(|d| self.age_in_days(d));
        let fresh = card
            .last_purchase_date
            .map(|d| self.is_fresh(d))
            .unwrap_or(false);

        PriceContext {
            card,
            product_unit,
            age_days,
            fresh,
        }
    }

    /// Resolve the best available price for a card
    ///
    /// Returns an error only when a raw price field is not a finite number.
    pub fn resolve(&self, card: &ProductCard) -> Result<ResolvedPrice, ReconcileError> {
        for (field, value) in card.price_fields() {
            if let Some(v) = value {
                if !v.is_finite() {
                    return Err(ReconcileError::MalformedProduct(format!(
                        "product {} has non-finite {field}",
                        card.id
                    )));
                }
            }
        }

        let ctx = self.context(card);

        for rule in price_rules() {
            if let Some((price, unit)) = rule.apply(&ctx) {
                let age_days = match rule.source {
                    PriceSource::LastPurchase | PriceSource::StaleLastPurchase => ctx.age_days,
                    _ => None,
                };
                if rule.source == PriceSource::StaleLastPurchase {
                    warn!(
                        "Product {} priced from a stale purchase ({} days old)",
                        card.id,
                        age_days.map_or_else(|| "unknown".to_string(), |d| d.to_string())
                    );
                }
                debug!(
                    "Product {} resolved to {} via {}",
                    card.id, price, rule.source
                );
                return Ok(ResolvedPrice {
                    price,
                    unit: unit.unwrap_or(ctx.product_unit),
                    source: rule.source,
                    age_days,
                });
            }
        }

        debug!("Product {} has no usable price", card.id);
        Ok(ResolvedPrice {
            price: 0.0,
            unit: ctx.product_unit,
            source: PriceSource::None,
            age_days: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    fn days_ago(days: i64) -> NaiveDate {
        today() - Duration::days(days)
    }

    #[test]
    fn test_rule_order() {
        let order: Vec<PriceSource> = price_rules().iter().map(|r| r.source).collect();
        assert_eq!(
            order,
            vec![
                PriceSource::Active,
                PriceSource::LastPurchase,
                PriceSource::Market,
                PriceSource::StaleLastPurchase,
                PriceSource::Manual,
                PriceSource::Variant,
            ]
        );
    }

    #[test]
    fn test_active_beats_fresh_last_purchase() {
        let card = ProductCard::new(1)
            .with_standard_unit("kg")
            .with_active_price(10.0)
            .with_last_purchase(5.0, days_ago(3));
        let price = PriceResolver::new(today()).resolve(&card).unwrap();
        assert_eq!(price.price, 10.0);
        assert_eq!(price.source, PriceSource::Active);
        assert_eq!(price.age_days, None);
    }

    #[test]
    fn test_fresh_last_purchase() {
        let card = ProductCard::new(1)
            .with_active_price(0.0)
            .with_last_purchase(5.0, days_ago(45));
        let price = PriceResolver::new(today()).resolve(&card).unwrap();
        assert_eq!(price.price, 5.0);
        assert_eq!(price.source, PriceSource::LastPurchase);
        assert_eq!(price.age_days, Some(45));
    }

    #[test]
    fn test_stale_last_purchase() {
        let card = ProductCard::new(1).with_last_purchase(5.0, days_ago(120));
        let price = PriceResolver::new(today()).resolve(&card).unwrap();
        assert_eq!(price.source, PriceSource::StaleLastPurchase);
        assert_eq!(price.age_days, Some(120));
        assert!(price.is_stale());
    }

    #[test]
    fn test_freshness_window_boundaries() {
        let resolver = PriceResolver::new(today());
        assert!(resolver.is_fresh(today()));
        assert!(resolver.is_fresh(days_ago(90)));
        assert!(!resolver.is_fresh(days_ago(91)));
        // future-dated purchase is not fresh
        assert!(!resolver.is_fresh(today() + Duration::days(1)));

        let card = ProductCard::new(1).with_last_purchase(5.0, today() + Duration::days(2));
        let price = resolver.resolve(&card).unwrap();
        assert_eq!(price.source, PriceSource::StaleLastPurchase);
        assert_eq!(price.age_days, Some(-2));
    }

    #[test]
    fn test_market_beats_stale_purchase_and_uses_own_unit() {
        let card = ProductCard::new(1)
            .with_standard_unit("KG")
            .with_last_purchase(5.0, days_ago(200))
            .with_market_price(4.0, Some("Lt"));
        let price = PriceResolver::new(today()).resolve(&card).unwrap();
        assert_eq!(price.source, PriceSource::Market);
        assert_eq!(price.price, 4.0);
        assert_eq!(price.unit, "lt");

        let card = ProductCard::new(1)
            .with_standard_unit("KG")
            .with_market_price(4.0, None);
        let price = PriceResolver::new(today()).resolve(&card).unwrap();
        assert_eq!(price.unit, "kg");
    }

    #[test]
    fn test_manual_then_variant() {
        let card = ProductCard::new(1).with_manual_price(7.0).with_variant_price(6.0);
        let price = PriceResolver::new(today()).resolve(&card).unwrap();
        assert_eq!(price.source, PriceSource::Manual);

        let card = ProductCard::new(1).with_manual_price(-1.0).with_variant_price(6.0);
        let price = PriceResolver::new(today()).resolve(&card).unwrap();
        assert_eq!(price.source, PriceSource::Variant);
        assert_eq!(price.price, 6.0);
    }

    #[test]
    fn test_no_price() {
        let card = ProductCard::new(1).with_price_unit("Adet");
        let price = PriceResolver::new(today()).resolve(&card).unwrap();
        assert_eq!(price.price, 0.0);
        assert_eq!(price.source, PriceSource::None);
        assert_eq!(price.unit, "adet");
        assert!(price.is_zero());
    }

    #[test]
    fn test_unit_defaults() {
        let card = ProductCard::new(1).with_active_price(3.0);
        let price = PriceResolver::new(today()).resolve(&card).unwrap();
        assert_eq!(price.unit, "kg");

        let card = ProductCard::new(1)
            .with_standard_unit("  ")
            .with_price_unit("L")
            .with_active_price(3.0);
        let price = PriceResolver::new(today()).resolve(&card).unwrap();
        assert_eq!(price.unit, "l");
    }

    #[test]
    fn test_custom_window() {
        let card = ProductCard::new(1).with_last_purchase(5.0, days_ago(45));
        let price = PriceResolver::new(today())
            .with_freshness_days(30)
            .resolve(&card)
            .unwrap();
        assert_eq!(price.source, PriceSource::StaleLastPurchase);
    }

    #[test]
    fn test_non_finite_price_is_a_fault() {
        let card = ProductCard::new(9).with_manual_price(f64::INFINITY);
        let err = PriceResolver::new(today()).resolve(&card).unwrap_err();
        assert!(matches!(err, ReconcileError::MalformedProduct(_)));
    }
}
