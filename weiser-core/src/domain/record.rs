// weiser-core/src/domain/record.rs

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::domain::check::{CheckType, Condition};

/// One evaluation outcome, as persisted in the metric store.
/// `success` and `fail` are exclusive and exhaustive for every row.
#[derive(Debug, Clone, Serialize)]
pub struct MetricRecord {
    pub check_id: String,
    pub run_id: String,
    pub name: String,
    pub datasource: String,
    pub dataset: String,
    pub check_type: CheckType,
    pub condition: Condition,
    /// Scalar threshold; NULL for `between` conditions.
    pub threshold: Option<f64>,
    /// `[lo, hi]` for `between`; empty otherwise.
    pub threshold_list: Vec<f64>,
    pub actual_value: Option<f64>,
    pub success: bool,
    pub fail: bool,
    pub run_time: NaiveDateTime,
    /// Stringified dimension values, positionally aligned with the
    /// declared dimensions. Empty for ungrouped checks.
    pub dimensions: Vec<String>,
    /// Set only when the check aggregates over a time dimension.
    pub time_bucket: Option<NaiveDateTime>,
}
