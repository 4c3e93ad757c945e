use crate::validate::Violation;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BudgetError {
    #[error("Sheet not found for statement '{statement}' (tried: {tried:?})")]
    SheetNotFound {
        statement: String,
        tried: Vec<String>,
    },

    #[error("Ambiguous sheet match for statement '{statement}': {candidates:?}")]
    AmbiguousSheet {
        statement: String,
        candidates: Vec<String>,
    },

    #[error("Line item '{item}' not found in sheet '{sheet}' (tried patterns: {patterns:?})")]
    LineItemNotFound {
        sheet: String,
        item: String,
        patterns: Vec<String>,
    },

    #[error("Line item '{item}' matched more than one row in sheet '{sheet}' (rows {rows:?})")]
    DuplicateLineItem {
        sheet: String,
        item: String,
        rows: Vec<usize>,
    },

    #[error("Malformed cell in sheet '{sheet}' at row {row}, column {column}: {detail}")]
    MalformedCell {
        sheet: String,
        row: usize,
        column: String,
        detail: String,
    },

    #[error("Period mismatch in sheet '{sheet}': {detail}")]
    PeriodMismatch { sheet: String, detail: String },

    #[error("Consumption column '{activity}' in sheet '{sheet}' matches no declared activity")]
    UnknownActivity { sheet: String, activity: String },

    #[error("Model reconciliation failed with {} violation(s): {}", .violations.len(), join_violations(.violations))]
    ModelValidation { violations: Vec<Violation> },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, BudgetError>;
