//! # Reconcile Error Types Module
//!
//! This module defines the fault kinds of the reconciliation engine.
//! Expected data gaps (missing card, zero price, unresolvable unit) are never
//! errors; they are reported as line issues. Only malformed input and caller
//! misuse end up here, and they abort a single (recipe, specification) pair.

/// Custom error types for reconciliation faults
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileError {
    /// A material line carries a non-finite quantity
    MalformedLine(String),
    /// A product card carries a non-finite price
    MalformedProduct(String),
    /// A specification rule carries a negative or non-finite allocation
    MalformedRule(String),
    /// A conversion entry has a zero, negative or non-finite multiplier
    InvalidConversion(String),
    /// The caller asked for a specification that is not in the snapshot
    UnknownSpecification(i64),
    /// Snapshot loading or validation failed
    Snapshot(String),
}

impl std::fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileError::MalformedLine(msg) => write!(f, "Malformed material line: {msg}"),
            ReconcileError::MalformedProduct(msg) => write!(f, "Malformed product card: {msg}"),
            ReconcileError::MalformedRule(msg) => write!(f, "Malformed specification rule: {msg}"),
            ReconcileError::InvalidConversion(msg) => write!(f, "Invalid conversion entry: {msg}"),
            ReconcileError::UnknownSpecification(id) => write!(f, "Unknown specification: {id}"),
            ReconcileError::Snapshot(msg) => write!(f, "Snapshot error: {msg}"),
        }
    }
}

impl std::error::Error for ReconcileError {}

impl From<anyhow::Error> for ReconcileError {
    fn from(err: anyhow::Error) -> Self {
        ReconcileError::Snapshot(err.to_string())
    }
}
