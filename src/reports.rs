//! # Reconciliation Reports
//!
//! The three report modes built on [`CostEngine`]:
//!
//! - **cross-check**: every specification against every recipe with a subtype,
//!   plus line-level data problems across all recipes
//! - **recipe**: each recipe recomputed from current prices and compared with
//!   its stored estimate
//! - **specification**: every recipe against one specification, with a
//!   per-material breakdown
//!
//! A fault on one recipe or pair is recorded as a [`PairFailure`] and the
//! batch carries on.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::costing::{
    round2, CostEngine, Deviation, IssueKind, LineIssue, PairEvaluation, Severity,
};
use crate::ingredient_matcher::MatchScope;
use crate::reconcile_config::Thresholds;
use crate::reconcile_errors::ReconcileError;
use crate::reconcile_model::{Recipe, Specification, SpecificationRule};

/// A recipe or pair whose evaluation hit a fault
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairFailure {
    /// `None` when the fault happened while pricing the recipe on its own
    pub specification_id: Option<i64>,
    pub recipe_id: i64,
    pub reason: String,
}

impl PairFailure {
    fn new(specification_id: Option<i64>, recipe_id: i64, err: &ReconcileError) -> Self {
        Self {
            specification_id,
            recipe_id,
            reason: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeRef {
    pub recipe_id: i64,
    pub recipe_name: String,
    pub category: Option<String>,
}

impl From<&Recipe> for RecipeRef {
    fn from(recipe: &Recipe) -> Self {
        Self {
            recipe_id: recipe.id,
            recipe_name: recipe.name.clone(),
            category: recipe.category.clone(),
        }
    }
}

/// A line issue with the recipe it was found in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineFinding {
    pub recipe_id: i64,
    pub recipe_name: String,
    #[serde(flatten)]
    pub issue: LineIssue,
}

/// Unit errors sharing the same `source->target` pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitErrorGroup {
    pub pair: String,
    pub source_unit: String,
    pub target_unit: String,
    pub lines: Vec<LineFinding>,
}

/// A reportable (recipe, specification) deviation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairFinding {
    pub specification_id: i64,
    pub specification_code: String,
    pub recipe_id: i64,
    pub recipe_name: String,
    pub category: Option<String>,
    pub recipe_total: f64,
    pub spec_total: f64,
    pub deviation: Deviation,
    pub unmatched_count: usize,
}

impl From<&PairEvaluation> for PairFinding {
    fn from(eval: &PairEvaluation) -> Self {
        Self {
            specification_id: eval.specification_id,
            specification_code: eval.specification_code.clone(),
            recipe_id: eval.recipe_id,
            recipe_name: eval.recipe_name.clone(),
            category: eval.category.clone(),
            recipe_total: eval.recipe_total,
            spec_total: eval.spec_total,
            deviation: eval.deviation,
            unmatched_count: eval.unmatched.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmatchedCount {
    pub ingredient_name: String,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub moderate: usize,
    pub low: usize,
}

impl SeverityCounts {
    pub fn record(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::Moderate => self.moderate += 1,
            Severity::Low => self.low += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.critical + self.moderate + self.low
    }
}

/// Rules of one specification, in input order
pub fn rules_for_specification(
    rules: &[SpecificationRule],
    specification_id: i64,
) -> Vec<SpecificationRule> {
    rules
        .iter()
        .filter(|r| r.specification_id == specification_id)
        .cloned()
        .collect()
}

fn tally_unmatched<'a, I>(names: I) -> Vec<UnmatchedCount>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut tally: BTreeMap<&str, usize> = BTreeMap::new();
    for name in names {
        *tally.entry(name.as_str()).or_insert(0) += 1;
    }
    tally
        .into_iter()
        .map(|(name, count)| UnmatchedCount {
            ingredient_name: name.to_string(),
            count,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Cross-check
// ---------------------------------------------------------------------------

/// Line-level data problems across all recipes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineAudit {
    pub zero_price: Vec<LineFinding>,
    pub missing_card: Vec<LineFinding>,
    pub unit_errors: Vec<UnitErrorGroup>,
    pub stale_prices: Vec<LineFinding>,
    pub failures: Vec<PairFailure>,
}

impl LineAudit {
    pub fn unit_error_count(&self) -> usize {
        self.unit_errors.iter().map(|g| g.lines.len()).sum()
    }
}

/// Price every line of every recipe and sort out the data problems
pub fn audit_lines(engine: &CostEngine, recipes: &[Recipe]) -> LineAudit {
    let mut audit = LineAudit::default();
    let mut group_index: HashMap<String, usize> = HashMap::new();

    for recipe in recipes {
        let costing = match engine.cost_recipe(recipe) {
            Ok(costing) => costing,
            Err(e) => {
                error!(recipe_id = recipe.id, error = %e, "Failed to price recipe");
                audit.failures.push(PairFailure::new(None, recipe.id, &e));
                continue;
            }
        };

        for issue in costing.issues {
            let finding = LineFinding {
                recipe_id: recipe.id,
                recipe_name: recipe.name.clone(),
                issue,
            };
            match finding.issue.kind.clone() {
                IssueKind::MissingCard => audit.missing_card.push(finding),
                IssueKind::ZeroPrice => audit.zero_price.push(finding),
                IssueKind::StalePrice { .. } => audit.stale_prices.push(finding),
                IssueKind::UnitError {
                    source_unit,
                    target_unit,
                    ..
                } => {
                    let pair = format!("{source_unit}->{target_unit}");
                    let idx = match group_index.get(&pair) {
                        Some(idx) => *idx,
                        None => {
                            audit.unit_errors.push(UnitErrorGroup {
                                pair: pair.clone(),
                                source_unit,
                                target_unit,
                                lines: Vec::new(),
                            });
                            group_index.insert(pair, audit.unit_errors.len() - 1);
                            audit.unit_errors.len() - 1
                        }
                    };
                    audit.unit_errors[idx].lines.push(finding);
                }
            }
        }
    }

    info!(
        recipes = recipes.len(),
        zero_price = audit.zero_price.len(),
        missing_card = audit.missing_card.len(),
        unit_errors = audit.unit_error_count(),
        stale_prices = audit.stale_prices.len(),
        "Line audit finished"
    );
    audit
}

/// Result of checking every eligible recipe against one specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecificationPass {
    pub specification_id: i64,
    pub specification_code: String,
    /// The specification had no rules and was not evaluated
    pub skipped_no_rules: bool,
    pub pairs_evaluated: usize,
    /// Pairs whose totals were both zero
    pub pairs_skipped: usize,
    pub findings: Vec<PairFinding>,
    pub unmatched: Vec<String>,
    pub failures: Vec<PairFailure>,
}

/// Evaluate one specification against every recipe that has a subtype and lines
pub fn check_specification(
    engine: &CostEngine,
    thresholds: &Thresholds,
    specification: &Specification,
    rules: &[SpecificationRule],
    recipes: &[Recipe],
) -> SpecificationPass {
    let mut pass = SpecificationPass {
        specification_id: specification.id,
        specification_code: specification.code.clone(),
        skipped_no_rules: rules.is_empty(),
        pairs_evaluated: 0,
        pairs_skipped: 0,
        findings: Vec::new(),
        unmatched: Vec::new(),
        failures: Vec::new(),
    };

    if rules.is_empty() {
        info!(specification = %specification.code, "Specification has no rules, skipping");
        return pass;
    }

    let eligible = recipes
        .iter()
        .filter(|r| r.subtype_id.is_some() && !r.lines.is_empty());

    for recipe in eligible {
        let eval = match engine.evaluate_pair(recipe, specification, rules) {
            Ok(eval) => eval,
            Err(e) => {
                error!(
                    specification_id = specification.id,
                    recipe_id = recipe.id,
                    error = %e,
                    "Pair evaluation aborted"
                );
                pass.failures
                    .push(PairFailure::new(Some(specification.id), recipe.id, &e));
                continue;
            }
        };

        if eval.is_empty() {
            pass.pairs_skipped += 1;
            continue;
        }

        pass.pairs_evaluated += 1;
        pass.unmatched.extend(eval.unmatched.iter().cloned());
        if eval.deviation.is_reportable(thresholds) {
            warn!(
                specification = %specification.code,
                recipe = %recipe.name,
                deviation = eval.deviation.absolute,
                percent = eval.deviation.percent,
                severity = ?eval.deviation.severity,
                "Recipe deviates from specification"
            );
            pass.findings.push(PairFinding::from(&eval));
        }
    }

    info!(
        specification = %specification.code,
        evaluated = pass.pairs_evaluated,
        skipped = pass.pairs_skipped,
        reportable = pass.findings.len(),
        "Specification checked"
    );
    pass
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrossCheckSummary {
    pub recipes: usize,
    pub specifications: usize,
    pub specifications_without_rules: usize,
    pub pairs_evaluated: usize,
    pub pairs_skipped: usize,
    pub reportable_pairs: usize,
    pub severity: SeverityCounts,
    pub zero_price: usize,
    pub missing_card: usize,
    pub unit_errors: usize,
    pub stale_prices: usize,
    pub recipes_without_subtype: usize,
    pub failures: usize,
    /// Everything except stale-price warnings
    pub total_issues: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossCheckReport {
    pub reference_date: NaiveDate,
    pub thresholds: Thresholds,
    pub zero_price: Vec<LineFinding>,
    pub missing_card: Vec<LineFinding>,
    pub unit_errors: Vec<UnitErrorGroup>,
    pub stale_prices: Vec<LineFinding>,
    pub deviations: Vec<PairFinding>,
    pub recipes_without_subtype: Vec<RecipeRef>,
    pub unmatched: Vec<UnmatchedCount>,
    pub failures: Vec<PairFailure>,
    pub summary: CrossCheckSummary,
}

impl CrossCheckReport {
    /// Merge a line audit and per-specification passes into one report
    ///
    /// Passes are ordered by specification id whatever order they arrive in.
    pub fn assemble(
        reference_date: NaiveDate,
        thresholds: Thresholds,
        recipes: &[Recipe],
        audit: LineAudit,
        mut passes: Vec<SpecificationPass>,
    ) -> Self {
        passes.sort_by_key(|p| p.specification_id);

        let recipes_without_subtype: Vec<RecipeRef> = recipes
            .iter()
            .filter(|r| r.subtype_id.is_none())
            .map(RecipeRef::from)
            .collect();

        let mut deviations = Vec::new();
        let mut failures = audit.failures.clone();
        let mut summary = CrossCheckSummary {
            recipes: recipes.len(),
            specifications: passes.len(),
            ..Default::default()
        };

        for pass in &passes {
            if pass.skipped_no_rules {
                summary.specifications_without_rules += 1;
            }
            summary.pairs_evaluated += pass.pairs_evaluated;
            summary.pairs_skipped += pass.pairs_skipped;
            deviations.extend(pass.findings.iter().cloned());
            failures.extend(pass.failures.iter().cloned());
        }

        for finding in &deviations {
            summary.severity.record(finding.deviation.severity);
        }

        let unmatched = tally_unmatched(passes.iter().flat_map(|p| p.unmatched.iter()));

        summary.reportable_pairs = deviations.len();
        summary.zero_price = audit.zero_price.len();
        summary.missing_card = audit.missing_card.len();
        summary.unit_errors = audit.unit_error_count();
        summary.stale_prices = audit.stale_prices.len();
        summary.recipes_without_subtype = recipes_without_subtype.len();
        summary.failures = failures.len();
        summary.total_issues = summary.zero_price
            + summary.missing_card
            + summary.unit_errors
            + summary.reportable_pairs
            + summary.recipes_without_subtype
            + summary.failures;

        if summary.total_issues > 0 {
            warn!(total_issues = summary.total_issues, "Cross-check found issues");
        } else {
            info!("Cross-check found no issues");
        }

        Self {
            reference_date,
            thresholds,
            zero_price: audit.zero_price,
            missing_card: audit.missing_card,
            unit_errors: audit.unit_errors,
            stale_prices: audit.stale_prices,
            deviations,
            recipes_without_subtype,
            unmatched,
            failures,
            summary,
        }
    }

    pub fn has_issues(&self) -> bool {
        self.summary.total_issues > 0
    }
}

/// Run the whole cross-check on the calling thread
pub fn cross_check(
    engine: &CostEngine,
    thresholds: &Thresholds,
    recipes: &[Recipe],
    specifications: &[Specification],
    rules: &[SpecificationRule],
) -> CrossCheckReport {
    info!(
        recipes = recipes.len(),
        specifications = specifications.len(),
        "Starting cross-check"
    );
    let audit = audit_lines(engine, recipes);
    let passes = specifications
        .iter()
        .map(|spec| {
            let spec_rules = rules_for_specification(rules, spec.id);
            check_specification(engine, thresholds, spec, &spec_rules, recipes)
        })
        .collect();

    CrossCheckReport::assemble(engine.prices().today(), *thresholds, recipes, audit, passes)
}

// ---------------------------------------------------------------------------
// Recipe-level
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeFinding {
    pub recipe_id: i64,
    pub recipe_name: String,
    pub category: Option<String>,
    pub computed_total: f64,
    pub stored_estimate: f64,
    pub deviation: Option<Deviation>,
    pub reportable: bool,
    pub issues: Vec<LineIssue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipeSummary {
    pub recipes_checked: usize,
    pub reportable: usize,
    pub severity: SeverityCounts,
    pub missing_card: usize,
    pub zero_price: usize,
    pub unit_errors: usize,
    pub stale_prices: usize,
    pub failures: usize,
    pub total_issues: usize,
}

impl RecipeSummary {
    fn count_issue(&mut self, issue: &LineIssue) {
        match issue.kind {
            IssueKind::MissingCard => self.missing_card += 1,
            IssueKind::ZeroPrice => self.zero_price += 1,
            IssueKind::UnitError { .. } => self.unit_errors += 1,
            IssueKind::StalePrice { .. } => self.stale_prices += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeReport {
    pub reference_date: NaiveDate,
    pub thresholds: Thresholds,
    /// Recipes with a reportable deviation or at least one line issue
    pub recipes: Vec<RecipeFinding>,
    pub failures: Vec<PairFailure>,
    pub summary: RecipeSummary,
}

impl RecipeReport {
    pub fn has_issues(&self) -> bool {
        self.summary.total_issues > 0
    }
}

/// Compare each recipe's stored estimate with its cost at current prices
pub fn recipe_report(
    engine: &CostEngine,
    thresholds: &Thresholds,
    recipes: &[Recipe],
) -> RecipeReport {
    info!(recipes = recipes.len(), "Starting recipe-level check");

    let mut findings = Vec::new();
    let mut failures = Vec::new();
    let mut summary = RecipeSummary::default();

    for recipe in recipes.iter().filter(|r| !r.lines.is_empty()) {
        let costing = match engine.cost_recipe(recipe) {
            Ok(costing) => costing,
            Err(e) => {
                error!(recipe_id = recipe.id, error = %e, "Failed to price recipe");
                failures.push(PairFailure::new(None, recipe.id, &e));
                continue;
            }
        };
        summary.recipes_checked += 1;

        let stored = recipe.estimated_cost.unwrap_or(0.0);
        let deviation = Deviation::from_estimate(stored, costing.computed_total, engine.tiers());
        let reportable = deviation.map_or(false, |d| d.is_reportable(thresholds));

        for issue in &costing.issues {
            summary.count_issue(issue);
        }
        if let (true, Some(d)) = (reportable, deviation) {
            summary.reportable += 1;
            summary.severity.record(d.severity);
            warn!(
                recipe = %recipe.name,
                stored = stored,
                computed = costing.computed_total,
                percent = d.percent,
                "Stored estimate deviates from current cost"
            );
        }

        if reportable || !costing.issues.is_empty() {
            findings.push(RecipeFinding {
                recipe_id: recipe.id,
                recipe_name: recipe.name.clone(),
                category: recipe.category.clone(),
                computed_total: costing.computed_total,
                stored_estimate: round2(stored),
                deviation,
                reportable,
                issues: costing.issues,
            });
        }
    }

    summary.failures = failures.len();
    summary.total_issues = summary.reportable
        + summary.missing_card
        + summary.zero_price
        + summary.unit_errors
        + summary.failures;

    info!(
        checked = summary.recipes_checked,
        reportable = summary.reportable,
        total_issues = summary.total_issues,
        "Recipe-level check finished"
    );

    RecipeReport {
        reference_date: engine.prices().today(),
        thresholds: *thresholds,
        recipes: findings,
        failures,
        summary,
    }
}

// ---------------------------------------------------------------------------
// Specification-level
// ---------------------------------------------------------------------------

/// One bound material whose cost deviates from its allocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialDeviation {
    pub ingredient_name: String,
    pub material_type: String,
    pub scope: MatchScope,
    pub expected_quantity: f64,
    pub expected_unit: String,
    pub actual_quantity: f64,
    pub actual_unit: String,
    pub expected_cost: f64,
    pub actual_cost: f64,
    pub deviation: Deviation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeAgainstSpecification {
    pub recipe_id: i64,
    pub recipe_name: String,
    pub category: Option<String>,
    pub recipe_total: f64,
    pub spec_total: f64,
    pub deviation: Deviation,
    pub reportable: bool,
    /// Materials passing the reporting gate on their own
    pub materials: Vec<MaterialDeviation>,
    pub issues: Vec<LineIssue>,
    pub unmatched: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpecificationSummary {
    pub rules: usize,
    pub recipes_evaluated: usize,
    pub recipes_skipped: usize,
    pub reportable: usize,
    pub severity: SeverityCounts,
    pub materials_flagged: usize,
    pub line_issues: usize,
    pub failures: usize,
    pub total_issues: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecificationReport {
    pub reference_date: NaiveDate,
    pub thresholds: Thresholds,
    pub specification: Specification,
    pub recipes: Vec<RecipeAgainstSpecification>,
    pub unmatched: Vec<UnmatchedCount>,
    pub failures: Vec<PairFailure>,
    pub summary: SpecificationSummary,
}

impl SpecificationReport {
    pub fn has_issues(&self) -> bool {
        self.summary.total_issues > 0
    }
}

/// Per-material deviations of one pair that pass the reporting gate
pub fn material_breakdown(
    eval: &PairEvaluation,
    thresholds: &Thresholds,
    engine: &CostEngine,
) -> Vec<MaterialDeviation> {
    eval.lines
        .iter()
        .filter_map(|line| {
            let expected = line.expected.as_ref()?;
            let expected_cost = line.expected_cost?;
            if !line.priced.is_costed() || expected_cost <= 0.0 {
                return None;
            }
            let actual_cost = line.priced.actual_cost;
            let absolute = round2(actual_cost - expected_cost);
            let percent = absolute / expected_cost * 100.0;
            let deviation = Deviation::new(absolute, percent, engine.tiers());
            if !deviation.is_reportable(thresholds) {
                return None;
            }
            Some(MaterialDeviation {
                ingredient_name: line.priced.ingredient_name.clone(),
                material_type: expected.material_type.clone(),
                scope: expected.scope,
                expected_quantity: expected.allocation,
                expected_unit: expected.unit.clone(),
                actual_quantity: line.priced.quantity,
                actual_unit: line.priced.unit.clone(),
                expected_cost: round2(expected_cost),
                actual_cost: round2(actual_cost),
                deviation,
            })
        })
        .collect()
}

/// Check every recipe with a subtype against one specification
pub fn specification_report(
    engine: &CostEngine,
    thresholds: &Thresholds,
    specification_id: i64,
    specifications: &[Specification],
    rules: &[SpecificationRule],
    recipes: &[Recipe],
) -> Result<SpecificationReport, ReconcileError> {
    let specification = specifications
        .iter()
        .find(|s| s.id == specification_id)
        .ok_or(ReconcileError::UnknownSpecification(specification_id))?;
    let spec_rules = rules_for_specification(rules, specification_id);

    info!(
        specification = %specification.code,
        rules = spec_rules.len(),
        "Starting specification-level check"
    );

    let mut summary = SpecificationSummary {
        rules: spec_rules.len(),
        ..Default::default()
    };
    let mut results = Vec::new();
    let mut unmatched = Vec::new();
    let mut failures = Vec::new();

    let eligible = recipes
        .iter()
        .filter(|r| r.subtype_id.is_some() && !r.lines.is_empty());

    for recipe in eligible {
        let eval = match engine.evaluate_pair(recipe, specification, &spec_rules) {
            Ok(eval) => eval,
            Err(e) => {
                error!(
                    specification_id = specification.id,
                    recipe_id = recipe.id,
                    error = %e,
                    "Pair evaluation aborted"
                );
                failures.push(PairFailure::new(Some(specification.id), recipe.id, &e));
                continue;
            }
        };

        // Nothing comparable: keep the line issues, skip deviation and breakdown
        let comparable = !eval.is_empty();
        let (reportable, materials) = if comparable {
            summary.recipes_evaluated += 1;
            (
                eval.deviation.is_reportable(thresholds),
                material_breakdown(&eval, thresholds, engine),
            )
        } else {
            summary.recipes_skipped += 1;
            (false, Vec::new())
        };
        if reportable {
            summary.reportable += 1;
            summary.severity.record(eval.deviation.severity);
        }
        summary.materials_flagged += materials.len();
        summary.line_issues += eval
            .issues
            .iter()
            .filter(|i| !matches!(i.kind, IssueKind::StalePrice { .. }))
            .count();
        unmatched.extend(eval.unmatched.iter().cloned());

        if reportable || !materials.is_empty() || !eval.issues.is_empty() {
            results.push(RecipeAgainstSpecification {
                recipe_id: eval.recipe_id,
                recipe_name: eval.recipe_name,
                category: eval.category,
                recipe_total: eval.recipe_total,
                spec_total: eval.spec_total,
                deviation: eval.deviation,
                reportable,
                materials,
                issues: eval.issues,
                unmatched: eval.unmatched,
            });
        }
    }

    summary.failures = failures.len();
    summary.total_issues =
        summary.reportable + summary.materials_flagged + summary.line_issues + summary.failures;

    info!(
        specification = %specification.code,
        evaluated = summary.recipes_evaluated,
        reportable = summary.reportable,
        materials = summary.materials_flagged,
        "Specification-level check finished"
    );

    Ok(SpecificationReport {
        reference_date: engine.prices().today(),
        thresholds: *thresholds,
        specification: specification.clone(),
        recipes: results,
        unmatched: tally_unmatched(unmatched.iter()),
        failures,
        summary,
    })
}
