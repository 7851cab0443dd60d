//! # Recipe Reconciler
//!
//! Cost reconciliation for institutional catering: resolves product prices,
//! converts units, binds free-text ingredients to purchasing-specification
//! rules and reports where recipes deviate from what a specification allows.

pub mod conversion;
pub mod costing;
pub mod ingredient_matcher;
pub mod price_resolver;
pub mod reconcile_config;
pub mod reconcile_errors;
pub mod reconcile_model;
pub mod reports;
pub mod snapshot;
pub mod unit_normalizer;
