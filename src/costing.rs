//! # Cost Aggregator & Classifier
//!
//! Turns material lines into costs and compares recipe-actual cost with
//! specification-expected cost.
//!
//! ## Per line
//!
//! `actual = active_quantity × conv(line unit → price unit) × price`
//!
//! When the line binds to a specification rule:
//! `expected = allocation × conv(rule unit → price unit) × price`.
//! Unbound lines, and bound lines whose rule unit cannot be converted,
//! contribute their actual cost to the specification side so a material is
//! never dropped from it.
//!
//! Lines without a product card, without a usable price, or whose own unit
//! cannot be converted are excluded from both totals and reported as issues.
//!
//! ## Per pair
//!
//! Totals are rounded to cents. `deviation = recipe − spec`, the percentage is
//! taken against the larger total, and severity is tiered on the absolute
//! deviation in currency units.

use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};

use crate::conversion::{Conversion, ConversionResolver};
use crate::ingredient_matcher::{IngredientMatcher, MatchScope};
use crate::price_resolver::{PriceResolver, ResolvedPrice};
use crate::reconcile_config::{ReconcileConfig, Thresholds, CRITICAL_DEVIATION, MODERATE_DEVIATION};
use crate::reconcile_errors::ReconcileError;
use crate::reconcile_model::{MaterialLine, Recipe, Specification, SpecificationRule};
use crate::unit_normalizer::UnitNormalizer;

/// Round to two decimal places (cents)
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Severity tier of a deviation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Moderate,
    Critical,
}

/// Absolute-deviation limits for each severity tier
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeverityTiers {
    pub critical: f64,
    pub moderate: f64,
}

impl Default for SeverityTiers {
    fn default() -> Self {
        Self {
            critical: CRITICAL_DEVIATION,
            moderate: MODERATE_DEVIATION,
        }
    }
}

impl SeverityTiers {
    pub fn from_config(config: &ReconcileConfig) -> Self {
        Self {
            critical: config.critical_deviation,
            moderate: config.moderate_deviation,
        }
    }

    /// `critical` at or above 20, `moderate` at or above 5, else `low`
    pub fn classify(&self, deviation: f64) -> Severity {
        let magnitude = deviation.abs();
        if magnitude >= self.critical {
            Severity::Critical
        } else if magnitude >= self.moderate {
            Severity::Moderate
        } else {
            Severity::Low
        }
    }
}

/// Signed deviation between an actual and an expected amount
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Deviation {
    /// Signed difference in currency units
    pub absolute: f64,
    /// Signed percentage of the reference amount
    pub percent: f64,
    pub severity: Severity,
}

impl Deviation {
    pub fn new(absolute: f64, percent: f64, tiers: &SeverityTiers) -> Self {
        Self {
            absolute,
            percent,
            severity: tiers.classify(absolute),
        }
    }

    /// Deviation of `actual` from `expected`, relative to the larger of the two
    ///
    /// # Examples
    ///
    /// ```rust
    /// use recipe_reconciler::costing::{Deviation, Severity, SeverityTiers};
    ///
    /// let deviation = Deviation::between(10.0, 7.5, &SeverityTiers::default());
    /// assert_eq!(deviation.absolute, 2.5);
    /// assert_eq!(deviation.percent, 25.0);
    /// assert_eq!(deviation.severity, Severity::Low);
    /// ```
    pub fn between(actual: f64, expected: f64, tiers: &SeverityTiers) -> Self {
        let absolute = round2(actual - expected);
        let reference = actual.max(expected);
        let percent = if reference > 0.0 {
            absolute / reference * 100.0
        } else {
            0.0
        };
        Self::new(absolute, percent, tiers)
    }

    /// Deviation of a stored estimate from a freshly computed cost
    ///
    /// The percentage is taken against the computed cost; it is 100 when only
    /// the estimate is non-zero, and there is no deviation when both are zero.
    pub fn from_estimate(stored: f64, computed: f64, tiers: &SeverityTiers) -> Option<Self> {
        let absolute = round2(stored - computed);
        let percent = if computed > 0.0 {
            absolute / computed * 100.0
        } else if stored > 0.0 {
            100.0
        } else {
            return None;
        };
        Some(Self::new(absolute, percent, tiers))
    }

    /// Whether both reporting limits are exceeded
    pub fn is_reportable(&self, thresholds: &Thresholds) -> bool {
        thresholds.exceeded_by(self.percent, self.absolute)
    }
}

/// Which side of the comparison a conversion failed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostSide {
    Recipe,
    Specification,
}

/// A reportable data condition found on one line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IssueKind {
    /// The line is not linked to a product card
    MissingCard,
    /// No price source holds a positive value
    ZeroPrice,
    /// No conversion from the quantity unit to the price unit
    UnitError {
        source_unit: String,
        target_unit: String,
        side: CostSide,
    },
    /// Priced from a last purchase outside the freshness window
    StalePrice { age_days: Option<i64> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineIssue {
    pub line_id: i64,
    pub ingredient_name: String,
    pub product_name: Option<String>,
    #[serde(flatten)]
    pub kind: IssueKind,
}

/// How far a line got through pricing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStatus {
    Costed,
    MissingCard,
    ZeroPrice,
    UnitError,
}

/// A line priced against its product card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricedLine {
    pub line_id: i64,
    pub ingredient_name: String,
    pub product_id: Option<i64>,
    pub product_name: Option<String>,
    /// Active quantity, never negative
    pub quantity: f64,
    /// Normalized quantity unit
    pub unit: String,
    pub price: Option<ResolvedPrice>,
    /// Normalized unit of the resolved price
    pub price_unit: Option<String>,
    /// Multiplier from `unit` to `price_unit`
    pub multiplier: Option<f64>,
    pub status: LineStatus,
    /// Contribution to the recipe total; 0 unless `status` is `costed`
    pub actual_cost: f64,
    pub issues: Vec<LineIssue>,
}

impl PricedLine {
    pub fn is_costed(&self) -> bool {
        self.status == LineStatus::Costed
    }
}

/// The specification allocation a line was bound to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedAllocation {
    pub rule_id: i64,
    pub material_type: String,
    pub allocation: f64,
    /// Normalized allocation unit
    pub unit: String,
    pub scope: MatchScope,
}

/// A line evaluated against one specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineEvaluation {
    pub priced: PricedLine,
    pub expected: Option<ExpectedAllocation>,
    /// Specification-expected cost; `None` when unbound, unpriced or unconvertible
    pub expected_cost: Option<f64>,
    /// Contribution to the specification total
    pub spec_contribution: f64,
    pub issues: Vec<LineIssue>,
}

/// One (recipe, specification) comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairEvaluation {
    pub specification_id: i64,
    pub specification_code: String,
    pub recipe_id: i64,
    pub recipe_name: String,
    pub category: Option<String>,
    pub recipe_total: f64,
    pub spec_total: f64,
    pub deviation: Deviation,
    pub lines: Vec<LineEvaluation>,
    pub issues: Vec<LineIssue>,
    /// Ingredient names no specification rule governs
    pub unmatched: Vec<String>,
}

impl PairEvaluation {
    /// Both totals are zero: nothing could be compared
    pub fn is_empty(&self) -> bool {
        self.recipe_total == 0.0 && self.spec_total == 0.0
    }
}

/// A recipe costed from current prices, without a specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeCosting {
    pub recipe_id: i64,
    pub recipe_name: String,
    pub category: Option<String>,
    pub computed_total: f64,
    pub lines: Vec<PricedLine>,
    pub issues: Vec<LineIssue>,
}

fn check_quantities(line: &MaterialLine) -> Result<(), ReconcileError> {
    for (field, value) in [("quantity", line.quantity), ("chef_quantity", line.chef_quantity)] {
        if let Some(v) = value {
            if !v.is_finite() {
                return Err(ReconcileError::MalformedLine(format!(
                    "line {} ('{}') has non-finite {field}",
                    line.id, line.ingredient_name
                )));
            }
        }
    }
    Ok(())
}

fn check_rule(rule: &SpecificationRule, specification: &Specification) -> Result<(), ReconcileError> {
    if rule.specification_id != specification.id {
        return Err(ReconcileError::MalformedRule(format!(
            "rule {} belongs to specification {}, not {}",
            rule.id, rule.specification_id, specification.id
        )));
    }
    if !rule.allocation.is_finite() || rule.allocation < 0.0 {
        return Err(ReconcileError::MalformedRule(format!(
            "rule {} ('{}') has allocation {}",
            rule.id, rule.material_type, rule.allocation
        )));
    }
    Ok(())
}

/// The shared costing engine behind every report mode
#[derive(Debug, Clone)]
pub struct CostEngine {
    normalizer: UnitNormalizer,
    conversions: ConversionResolver,
    prices: PriceResolver,
    matcher: IngredientMatcher,
    tiers: SeverityTiers,
}

impl CostEngine {
    pub fn new(
        normalizer: UnitNormalizer,
        conversions: ConversionResolver,
        prices: PriceResolver,
        matcher: IngredientMatcher,
        tiers: SeverityTiers,
    ) -> Self {
        info!(
            "Creating CostEngine: reference date {}, {} keyword entries",
            prices.today(),
            matcher.dictionary().len()
        );
        Self {
            normalizer,
            conversions,
            prices,
            matcher,
            tiers,
        }
    }

    pub fn normalizer(&self) -> &UnitNormalizer {
        &self.normalizer
    }

    pub fn conversions(&self) -> &ConversionResolver {
        &self.conversions
    }

    pub fn prices(&self) -> &PriceResolver {
        &self.prices
    }

    pub fn matcher(&self) -> &IngredientMatcher {
        &self.matcher
    }

    pub fn tiers(&self) -> &SeverityTiers {
        &self.tiers
    }

    /// Price one line against its product card
    ///
    /// Data gaps come back as issues on the line; only malformed numbers fail.
    pub fn price_line(&self, line: &MaterialLine) -> Result<PricedLine, ReconcileError> {
        check_quantities(line)?;

        let quantity = line.active_quantity();
        let unit = self.normalizer.normalize(line.unit.as_deref());
        trace!("Pricing line {}: {} {} {}", line.id, quantity, unit, line.ingredient_name);

        let mut priced = PricedLine {
            line_id: line.id,
            ingredient_name: line.ingredient_name.clone(),
            product_id: line.product.as_ref().map(|p| p.id),
            product_name: line.product.as_ref().and_then(|p| p.name.clone()),
            quantity,
            unit,
            price: None,
            price_unit: None,
            multiplier: None,
            status: LineStatus::MissingCard,
            actual_cost: 0.0,
            issues: Vec::new(),
        };

        let product = match &line.product {
            Some(product) => product,
            None => {
                warn!("Line {} ('{}') has no product card", line.id, line.ingredient_name);
                let issue = self.issue(&priced, IssueKind::MissingCard);
                priced.issues.push(issue);
                return Ok(priced);
            }
        };

        let price = self.prices.resolve(product)?;
        if price.is_stale() {
            let issue = self.issue(
                &priced,
                IssueKind::StalePrice {
                    age_days: price.age_days,
                },
            );
            priced.issues.push(issue);
        }

        if price.is_zero() {
            warn!(
                "Line {} ('{}') has no price in any source",
                line.id, line.ingredient_name
            );
            priced.status = LineStatus::ZeroPrice;
            let issue = self.issue(&priced, IssueKind::ZeroPrice);
            priced.issues.push(issue);
            priced.price = Some(price);
            return Ok(priced);
        }

        let price_unit = self.normalizer.normalize(Some(&price.unit));
        let conversion = self
            .conversions
            .resolve(&priced.unit, &price_unit, Some(product.id));
        priced.price_unit = Some(price_unit.clone());

        match conversion.multiplier() {
            Some(multiplier) => {
                priced.multiplier = Some(multiplier);
                priced.status = LineStatus::Costed;
                priced.actual_cost = if quantity > 0.0 {
                    quantity * multiplier * price.price
                } else {
                    0.0
                };
            }
            None => {
                warn!(
                    "Line {} ('{}'): no conversion {} -> {}",
                    line.id, line.ingredient_name, priced.unit, price_unit
                );
                priced.status = LineStatus::UnitError;
                let kind = IssueKind::UnitError {
                    source_unit: priced.unit.clone(),
                    target_unit: price_unit,
                    side: CostSide::Recipe,
                };
                let issue = self.issue(&priced, kind);
                priced.issues.push(issue);
            }
        }

        priced.price = Some(price);
        Ok(priced)
    }

    fn issue(&self, priced: &PricedLine, kind: IssueKind) -> LineIssue {
        LineIssue {
            line_id: priced.line_id,
            ingredient_name: priced.ingredient_name.clone(),
            product_name: priced.product_name.clone(),
            kind,
        }
    }

    /// Evaluate one line against the rules of a specification
    pub fn evaluate_line(
        &self,
        line: &MaterialLine,
        subtype_rules: &[&SpecificationRule],
        all_rules: &[&SpecificationRule],
    ) -> Result<LineEvaluation, ReconcileError> {
        let priced = self.price_line(line)?;

        let expected = self
            .matcher
            .find_rule(&line.ingredient_name, subtype_rules, all_rules)
            .map(|m| ExpectedAllocation {
                rule_id: m.rule.id,
                material_type: m.rule.material_type.clone(),
                allocation: m.rule.allocation,
                unit: self.normalizer.normalize(m.rule.unit.as_deref()),
                scope: m.scope,
            });

        let mut evaluation = LineEvaluation {
            issues: priced.issues.clone(),
            spec_contribution: priced.actual_cost,
            expected_cost: None,
            expected,
            priced,
        };

        if !evaluation.priced.is_costed() {
            evaluation.spec_contribution = 0.0;
            return Ok(evaluation);
        }

        if let (Some(expected), Some(price), Some(price_unit)) = (
            evaluation.expected.as_ref(),
            evaluation.priced.price.as_ref(),
            evaluation.priced.price_unit.as_ref(),
        ) {
            match self
                .conversions
                .resolve(&expected.unit, price_unit, evaluation.priced.product_id)
            {
                Conversion::Resolved { multiplier, .. } => {
                    let cost = expected.allocation * multiplier * price.price;
                    evaluation.expected_cost = Some(cost);
                    evaluation.spec_contribution = cost;
                }
                Conversion::Unresolvable => {
                    debug!(
                        "Rule {} unit {} not convertible to {}, using recipe cost for '{}'",
                        expected.rule_id, expected.unit, price_unit, line.ingredient_name
                    );
                    let kind = IssueKind::UnitError {
                        source_unit: expected.unit.clone(),
                        target_unit: price_unit.clone(),
                        side: CostSide::Specification,
                    };
                    let issue = self.issue(&evaluation.priced, kind);
                    evaluation.issues.push(issue);
                }
            }
        }

        Ok(evaluation)
    }

    /// Compare a recipe's actual cost with what a specification allows
    ///
    /// `rules` must all belong to `specification`; rules scoped to the
    /// recipe's subtype are preferred over the rest.
    pub fn evaluate_pair(
        &self,
        recipe: &Recipe,
        specification: &Specification,
        rules: &[SpecificationRule],
    ) -> Result<PairEvaluation, ReconcileError> {
        for rule in rules {
            check_rule(rule, specification)?;
        }

        let all_rules: Vec<&SpecificationRule> = rules.iter().collect();
        let subtype_rules: Vec<&SpecificationRule> = match recipe.subtype_id {
            Some(subtype) => rules
                .iter()
                .filter(|r| r.subtype_id == Some(subtype))
                .collect(),
            None => Vec::new(),
        };

        let mut recipe_total = 0.0;
        let mut spec_total = 0.0;
        let mut lines = Vec::with_capacity(recipe.lines.len());
        let mut issues = Vec::new();
        let mut unmatched = Vec::new();

        for line in &recipe.lines {
            let evaluation = self.evaluate_line(line, &subtype_rules, &all_rules)?;
            recipe_total += evaluation.priced.actual_cost;
            spec_total += evaluation.spec_contribution;
            if evaluation.expected.is_none() {
                unmatched.push(line.ingredient_name.clone());
            }
            issues.extend(evaluation.issues.iter().cloned());
            lines.push(evaluation);
        }

        let recipe_total = round2(recipe_total);
        let spec_total = round2(spec_total);
        let deviation = Deviation::between(recipe_total, spec_total, &self.tiers);

        debug!(
            "Recipe {} vs specification {}: recipe={:.2} spec={:.2} deviation={:.2} ({:.1}%)",
            recipe.id,
            specification.code,
            recipe_total,
            spec_total,
            deviation.absolute,
            deviation.percent
        );

        Ok(PairEvaluation {
            specification_id: specification.id,
            specification_code: specification.code.clone(),
            recipe_id: recipe.id,
            recipe_name: recipe.name.clone(),
            category: recipe.category.clone(),
            recipe_total,
            spec_total,
            deviation,
            lines,
            issues,
            unmatched,
        })
    }

    /// Cost a recipe from current prices alone
    pub fn cost_recipe(&self, recipe: &Recipe) -> Result<RecipeCosting, ReconcileError> {
        let mut total = 0.0;
        let mut lines = Vec::with_capacity(recipe.lines.len());
        let mut issues = Vec::new();

        for line in &recipe.lines {
            let priced = self.price_line(line)?;
            total += priced.actual_cost;
            issues.extend(priced.issues.iter().cloned());
            lines.push(priced);
        }

        Ok(RecipeCosting {
            recipe_id: recipe.id,
            recipe_name: recipe.name.clone(),
            category: recipe.category.clone(),
            computed_total: round2(total),
            lines,
            issues,
        })
    }
}
