// weiser-core/src/domain/check/descriptor.rs

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::error::DomainError;
use crate::domain::sql::Granularity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckType {
    RowCount,
    Sum,
    Min,
    Max,
    #[default]
    Numeric,
    Measure,
    NotEmpty,
    NotEmptyPct,
    Anomaly,
}

impl CheckType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckType::RowCount => "row_count",
            CheckType::Sum => "sum",
            CheckType::Min => "min",
            CheckType::Max => "max",
            CheckType::Numeric => "numeric",
            CheckType::Measure => "measure",
            CheckType::NotEmpty => "not_empty",
            CheckType::NotEmptyPct => "not_empty_pct",
            CheckType::Anomaly => "anomaly",
        }
    }

    /// Completeness checks treat dimensions as the tested columns,
    /// not as group-by keys.
    pub fn is_completeness(&self) -> bool {
        matches!(self, CheckType::NotEmpty | CheckType::NotEmptyPct)
    }

    fn requires_measure(&self) -> bool {
        matches!(
            self,
            CheckType::Sum | CheckType::Min | CheckType::Max | CheckType::Numeric | CheckType::Measure
        )
    }
}

impl fmt::Display for CheckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Neq,
    Between,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::Gt => "gt",
            Condition::Ge => "ge",
            Condition::Lt => "lt",
            Condition::Le => "le",
            Condition::Eq => "eq",
            Condition::Neq => "neq",
            Condition::Between => "between",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scalar for unary conditions, ordered `[lo, hi]` pair for `between`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Threshold {
    Scalar(f64),
    Range(Vec<f64>),
}

impl Threshold {
    pub fn scalar(&self) -> Option<f64> {
        match self {
            Threshold::Scalar(v) => Some(*v),
            Threshold::Range(_) => None,
        }
    }

    pub fn pair(&self) -> Option<(f64, f64)> {
        match self {
            Threshold::Range(values) if values.len() == 2 => Some((values[0], values[1])),
            _ => None,
        }
    }
}

/// A single table, a list of tables (one leaf each), or a raw SELECT.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Dataset {
    One(String),
    Many(Vec<String>),
}

impl Dataset {
    pub fn entries(&self) -> Vec<&str> {
        match self {
            Dataset::One(s) => vec![s.as_str()],
            Dataset::Many(items) => items.iter().map(String::as_str).collect(),
        }
    }
}

/// String or list of strings, AND-combined into one WHERE predicate.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Filter {
    One(String),
    Many(Vec<String>),
}

impl Filter {
    pub fn combined(&self) -> String {
        match self {
            Filter::One(s) => s.clone(),
            Filter::Many(items) => items.join(" AND "),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TimeDimension {
    pub name: String,
    pub granularity: Granularity,
}

impl TimeDimension {
    /// Column alias for the bucket expression, e.g. `created_at_month`.
    pub fn alias(&self) -> String {
        format!("{}_{}", self.name, self.granularity)
    }
}

fn default_datasource() -> String {
    "default".to_string()
}

/// A declared assertion about data, as written by the operator.
/// Immutable during a run.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CheckDescriptor {
    pub name: String,
    #[serde(default = "default_datasource")]
    pub datasource: String,
    pub dataset: Dataset,
    #[serde(rename = "type", default)]
    pub check_type: CheckType,
    pub condition: Condition,
    pub threshold: Threshold,
    #[serde(default)]
    pub measure: Option<String>,
    #[serde(default)]
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub time_dimension: Option<TimeDimension>,
    #[serde(default)]
    pub filter: Option<Filter>,
    /// Anomaly checks only: the checkId whose history is analyzed.
    #[serde(default)]
    pub check_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl CheckDescriptor {
    /// Structural validation, run at configuration load. Everything caught
    /// here aborts the run before any query executes.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::InvalidCheck {
                check: "<unnamed>".into(),
                reason: "check name must be non-empty".into(),
            });
        }
        if self.dataset.entries().is_empty()
            || self.dataset.entries().iter().any(|d| d.trim().is_empty())
        {
            return Err(DomainError::InvalidCheck {
                check: self.name.clone(),
                reason: "dataset must name at least one non-empty table or query".into(),
            });
        }

        // Threshold shape must match the condition.
        match self.condition {
            Condition::Between => {
                let pair = self.threshold.pair().ok_or_else(|| DomainError::ThresholdShape {
                    condition: self.condition.to_string(),
                    expected: "an ordered [lo, hi] pair",
                    got: format!("{:?}", self.threshold),
                })?;
                if pair.0 > pair.1 {
                    return Err(DomainError::InvalidCheck {
                        check: self.name.clone(),
                        reason: format!("between threshold is not ordered: [{}, {}]", pair.0, pair.1),
                    });
                }
            }
            _ => {
                if self.threshold.scalar().is_none() {
                    return Err(DomainError::ThresholdShape {
                        condition: self.condition.to_string(),
                        expected: "a single scalar",
                        got: format!("{:?}", self.threshold),
                    });
                }
            }
        }

        match self.check_type {
            t if t.requires_measure() && self.measure.is_none() => {
                Err(DomainError::InvalidCheck {
                    check: self.name.clone(),
                    reason: format!("type '{t}' requires a `measure`"),
                })
            }
            t if t.is_completeness() && self.dimensions.is_empty() => {
                Err(DomainError::InvalidCheck {
                    check: self.name.clone(),
                    reason: format!("type '{t}' requires at least one entry in `dimensions`"),
                })
            }
            CheckType::Anomaly if self.check_id.is_none() && self.filter.is_none() => {
                Err(DomainError::InvalidCheck {
                    check: self.name.clone(),
                    reason: "anomaly checks need a `check_id`, a `filter`, or both".into(),
                })
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_check() -> CheckDescriptor {
        CheckDescriptor {
            name: "orders_count".into(),
            datasource: "default".into(),
            dataset: Dataset::One("orders".into()),
            check_type: CheckType::RowCount,
            condition: Condition::Gt,
            threshold: Threshold::Scalar(0.0),
            measure: None,
            dimensions: Vec::new(),
            time_dimension: None,
            filter: None,
            check_id: None,
            description: None,
        }
    }

    #[test]
    fn test_valid_row_count() {
        assert!(base_check().validate().is_ok());
    }

    #[test]
    fn test_between_requires_pair() {
        let mut check = base_check();
        check.condition = Condition::Between;
        assert!(matches!(
            check.validate(),
            Err(DomainError::ThresholdShape { .. })
        ));

        check.threshold = Threshold::Range(vec![1.0, 2.0]);
        assert!(check.validate().is_ok());
    }

    #[test]
    fn test_between_rejects_unordered_pair() {
        let mut check = base_check();
        check.condition = Condition::Between;
        check.threshold = Threshold::Range(vec![5.0, 1.0]);
        assert!(matches!(
            check.validate(),
            Err(DomainError::InvalidCheck { .. })
        ));
    }

    #[test]
    fn test_sum_requires_measure() {
        let mut check = base_check();
        check.check_type = CheckType::Sum;
        assert!(matches!(
            check.validate(),
            Err(DomainError::InvalidCheck { .. })
        ));
        check.measure = Some("amount".into());
        assert!(check.validate().is_ok());
    }

    #[test]
    fn test_not_empty_requires_dimensions() {
        let mut check = base_check();
        check.check_type = CheckType::NotEmpty;
        check.condition = Condition::Le;
        assert!(matches!(
            check.validate(),
            Err(DomainError::InvalidCheck { .. })
        ));
        check.dimensions = vec!["email".into()];
        assert!(check.validate().is_ok());
    }

    #[test]
    fn test_anomaly_needs_target_or_filter() {
        let mut check = base_check();
        check.check_type = CheckType::Anomaly;
        check.condition = Condition::Between;
        check.threshold = Threshold::Range(vec![-3.5, 3.5]);
        check.dataset = Dataset::One("metrics".into());
        assert!(matches!(
            check.validate(),
            Err(DomainError::InvalidCheck { .. })
        ));

        check.check_id = Some("abc".into());
        assert!(check.validate().is_ok());

        check.check_id = None;
        check.filter = Some(Filter::One("name = 'orders_count'".into()));
        assert!(check.validate().is_ok());
    }

    #[test]
    fn test_yaml_shapes_deserialize() {
        let yaml = r#"
name: budget
dataset: [orders, vendors]
type: numeric
measure: sum(budgeted_amount)
condition: between
threshold: [1000, 2000]
filter:
  - status = 'open'
  - amount > 0
"#;
        let check: CheckDescriptor = serde_yaml::from_str(yaml).expect("yaml parses");
        assert_eq!(check.dataset.entries(), vec!["orders", "vendors"]);
        assert_eq!(check.threshold.pair(), Some((1000.0, 2000.0)));
        assert_eq!(
            check.filter.as_ref().map(|f| f.combined()),
            Some("status = 'open' AND amount > 0".to_string())
        );
        assert_eq!(check.datasource, "default");
    }
}
