// weiser-core/src/domain/error.rs

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum DomainError {
    // A check descriptor cannot be compiled into SQL for a specific leaf.
    // Other leaves keep running; this one is recorded as failed.
    #[error("Compile error in check '{check}': {reason}")]
    #[diagnostic(
        code(weiser::domain::compile),
        help("Fix the check definition in your configuration.")
    )]
    Compile { check: String, reason: String },

    // Declared configuration violates an engine invariant.
    #[error("Invalid check '{check}': {reason}")]
    #[diagnostic(code(weiser::domain::invalid_check))]
    InvalidCheck { check: String, reason: String },

    #[error("Unknown datasource '{datasource}' referenced by check '{check}'")]
    #[diagnostic(
        code(weiser::domain::unknown_datasource),
        help("Declare the datasource under `datasources:` or fix the reference.")
    )]
    UnknownDatasource { check: String, datasource: String },

    #[error("Condition '{condition}' expects {expected}, got {got}")]
    #[diagnostic(code(weiser::domain::threshold_shape))]
    ThresholdShape {
        condition: String,
        expected: &'static str,
        got: String,
    },

    #[error("Anomaly analysis failed: {0}")]
    #[diagnostic(code(weiser::domain::anomaly))]
    Anomaly(String),
}
