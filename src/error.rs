//! Error types for expressions, matching and evaluation

use thiserror::Error;

/// Result type for prop-shape operations
pub type Result<T> = std::result::Result<T, ShapeError>;

/// Prop-shape errors
///
/// Structural errors (`InvalidExpression`, `InvalidRequirement`,
/// `UnsupportedSchema`, `InvalidIndex`, `Unknown*`) indicate a catalog or
/// schema inconsistency and abort the current operation. `TypeMismatch` and
/// `MissingRequiredValue` are the two domain kinds callers may recover from.
#[derive(Error, Debug)]
pub enum ShapeError {
    #[error("Missing required value for expression {expression}")]
    MissingRequiredValue { expression: String },

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("Invalid expression: {0}")]
    InvalidExpression(String),

    #[error("Invalid shape requirement: {0}")]
    InvalidRequirement(String),

    #[error("Unsupported schema: {0}")]
    UnsupportedSchema(String),

    #[error("Invalid index {index} for field {field} with cardinality {cardinality}")]
    InvalidIndex {
        field: String,
        index: usize,
        cardinality: String,
    },

    #[error("Unknown record type: {0}")]
    UnknownRecordType(String),

    #[error("Unknown field: {record_type}.{field}")]
    UnknownField { record_type: String, field: String },

    #[error("Unknown field type: {0}")]
    UnknownFieldType(String),

    #[error("Unknown property {property} on field type {field_type}")]
    UnknownProperty { field_type: String, property: String },

    #[error("Unknown component: {0}")]
    UnknownComponent(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

impl ShapeError {
    /// Build a type mismatch from anything displayable
    pub fn mismatch(expected: impl ToString, actual: impl ToString) -> Self {
        Self::TypeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// True for "no data" failures
    pub fn is_missing_value(&self) -> bool {
        matches!(self, Self::MissingRequiredValue { .. })
    }

    /// True for "wrong shape" failures
    pub fn is_mismatch(&self) -> bool {
        matches!(self, Self::TypeMismatch { .. })
    }
}
