// weiser-core/src/ports/driver.rs

// The driver port: what the runner needs from a data source, without knowing
// which wire protocol sits behind it. Every driver normalizes its native
// types down to `Scalar` so the evaluator only ever sees one value model.

use crate::domain::sql::SqlDialect;
use crate::error::WeiserError;
use async_trait::async_trait;
use chrono::NaiveDateTime;

/// Driver-normalized value set. Anything a check query can return collapses
/// into one of these six shapes before it reaches the evaluator.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl Scalar {
    /// Numeric view of the value, when one exists.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(v) => Some(*v as f64),
            Scalar::Float(v) => Some(*v),
            Scalar::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            Scalar::Text(s) => s.parse::<f64>().ok(),
            Scalar::Timestamp(_) | Scalar::Null => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Scalar::Timestamp(ts) => Some(*ts),
            Scalar::Text(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").ok(),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Display form used for dimension values and record-name suffixes.
    pub fn to_label(&self) -> String {
        match self {
            Scalar::Null => "null".to_string(),
            Scalar::Int(v) => v.to_string(),
            Scalar::Float(v) => {
                // Integral floats label as integers (group keys like 1.0 read as "1")
                if v.fract() == 0.0 && v.is_finite() {
                    format!("{}", *v as i64)
                } else {
                    v.to_string()
                }
            }
            Scalar::Bool(v) => v.to_string(),
            Scalar::Text(s) => s.clone(),
            Scalar::Timestamp(ts) => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

pub type Row = Vec<Scalar>;

#[async_trait]
pub trait SourceDriver: Send + Sync {
    /// Execute a composed SQL statement and return all rows, normalized.
    async fn execute(&self, sql: &str) -> Result<Vec<Row>, WeiserError>;

    /// Cheap connectivity probe, called once at pre-run.
    async fn probe(&self) -> Result<(), WeiserError>;

    /// The dialect the composer must emit for this source.
    fn dialect(&self) -> SqlDialect;

    /// Declared datasource name (for logging and record assembly).
    fn name(&self) -> &str;

    /// Per-leaf query timeout.
    fn query_timeout(&self) -> std::time::Duration;
}
