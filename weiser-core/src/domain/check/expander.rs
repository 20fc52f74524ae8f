// weiser-core/src/domain/check/expander.rs

// Expansion of one declared check into its concrete leaves.
// Fan-out order is deterministic: dataset list first, then (for the
// completeness types) one leaf per declared dimension. Grouped numeric
// checks keep a single statement; their per-row fan-out happens at
// evaluation time when the partitions are known.

use sqlparser::ast::{Query, SetExpr, Statement, TableFactor};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::domain::check::descriptor::{CheckDescriptor, CheckType, Condition, Threshold};
use crate::domain::check::fingerprint;
use crate::domain::error::DomainError;
use crate::domain::sql::composer::{self, ResultShape};
use crate::domain::sql::SqlDialect;

/// One `dataset` entry, classified. A raw SELECT is wrapped as a derived
/// table by the composer; a table name is referenced directly.
#[derive(Debug, Clone, PartialEq)]
pub enum DatasetRef {
    Table(String),
    Query(String),
}

impl DatasetRef {
    /// A bare identifier fails to parse as a statement; a SELECT (or WITH)
    /// parses into a query.
    pub fn classify(raw: &str) -> DatasetRef {
        match Parser::parse_sql(&GenericDialect {}, raw) {
            Ok(statements) if matches!(statements.first(), Some(Statement::Query(_))) => {
                DatasetRef::Query(raw.trim().to_string())
            }
            _ => DatasetRef::Table(raw.trim().to_string()),
        }
    }

    /// Canonical text recorded in the `dataset` column.
    pub fn canonical_text(&self) -> &str {
        match self {
            DatasetRef::Table(name) | DatasetRef::Query(name) => name,
        }
    }

    /// Identifier hashed into the checkId: the table name, or for a raw
    /// SELECT the `_`-join of referenced tables (raw text when none parse).
    pub fn fingerprint_identifier(&self) -> String {
        match self {
            DatasetRef::Table(name) => name.clone(),
            DatasetRef::Query(raw) => {
                let tables = referenced_tables(raw);
                if tables.is_empty() {
                    raw.clone()
                } else {
                    tables.join("_")
                }
            }
        }
    }
}

fn referenced_tables(raw: &str) -> Vec<String> {
    let Ok(statements) = Parser::parse_sql(&GenericDialect {}, raw) else {
        return Vec::new();
    };
    let mut tables = Vec::new();
    for statement in &statements {
        if let Statement::Query(query) = statement {
            walk_query(query, &mut tables);
        }
    }
    tables
}

fn walk_query(query: &Query, out: &mut Vec<String>) {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            walk_query(&cte.query, out);
        }
    }
    walk_set_expr(&query.body, out);
}

fn walk_set_expr(set_expr: &SetExpr, out: &mut Vec<String>) {
    match set_expr {
        SetExpr::Select(select) => {
            for table in &select.from {
                walk_table_factor(&table.relation, out);
                for join in &table.joins {
                    walk_table_factor(&join.relation, out);
                }
            }
        }
        SetExpr::SetOperation { left, right, .. } => {
            walk_set_expr(left, out);
            walk_set_expr(right, out);
        }
        SetExpr::Query(subquery) => walk_query(subquery, out),
        _ => {}
    }
}

fn walk_table_factor(table_factor: &TableFactor, out: &mut Vec<String>) {
    match table_factor {
        TableFactor::Table { name, .. } => out.push(name.to_string()),
        TableFactor::Derived { subquery, .. } => walk_query(subquery, out),
        _ => {}
    }
}

/// Where one leaf reads from: a configured source, or (anomaly type)
/// the metric store itself.
#[derive(Debug, Clone)]
pub enum LeafTarget {
    Source { sql: String, shape: ResultShape },
    Store {
        target_check_id: Option<String>,
        predicate: Option<String>,
    },
}

/// One concrete sub-check. Yields one numeric observation per run
/// (or one per partition row for grouped statements).
#[derive(Debug, Clone)]
pub struct LeafCheck {
    pub check_id: String,
    pub name: String,
    pub datasource: String,
    pub dataset: String,
    pub check_type: CheckType,
    pub condition: Condition,
    pub threshold: Threshold,
    pub target: LeafTarget,
}

/// Expand a declared check into leaves for the given source dialect.
pub fn expand(check: &CheckDescriptor, dialect: SqlDialect) -> Result<Vec<LeafCheck>, DomainError> {
    let mut leaves = Vec::new();

    for entry in check.dataset.entries() {
        let dataset = DatasetRef::classify(entry);
        let dataset_id = dataset.fingerprint_identifier();

        match check.check_type {
            CheckType::Anomaly => {
                leaves.push(LeafCheck {
                    check_id: fingerprint::check_id(&check.datasource, &check.name, &dataset_id),
                    name: check.name.clone(),
                    datasource: check.datasource.clone(),
                    dataset: dataset.canonical_text().to_string(),
                    check_type: check.check_type,
                    condition: check.condition,
                    threshold: check.threshold.clone(),
                    target: LeafTarget::Store {
                        target_check_id: check.check_id.clone(),
                        predicate: check.filter.as_ref().map(|f| f.combined()),
                    },
                });
            }
            CheckType::NotEmpty | CheckType::NotEmptyPct => {
                let suffix = if check.check_type == CheckType::NotEmpty {
                    "not_empty"
                } else {
                    "not_empty_pct"
                };
                for dim in &check.dimensions {
                    let leaf_name = format!("{}_{}_{}", check.name, dim, suffix);
                    let composed = composer::compose(check, &dataset, Some(dim), dialect)?;
                    leaves.push(LeafCheck {
                        check_id: fingerprint::check_id(&check.datasource, &leaf_name, &dataset_id),
                        name: leaf_name,
                        datasource: check.datasource.clone(),
                        dataset: dataset.canonical_text().to_string(),
                        check_type: check.check_type,
                        condition: check.condition,
                        threshold: check.threshold.clone(),
                        target: LeafTarget::Source {
                            sql: composed.sql,
                            shape: composed.shape,
                        },
                    });
                }
            }
            _ => {
                let composed = composer::compose(check, &dataset, None, dialect)?;
                leaves.push(LeafCheck {
                    check_id: fingerprint::check_id(&check.datasource, &check.name, &dataset_id),
                    name: check.name.clone(),
                    datasource: check.datasource.clone(),
                    dataset: dataset.canonical_text().to_string(),
                    check_type: check.check_type,
                    condition: check.condition,
                    threshold: check.threshold.clone(),
                    target: LeafTarget::Source {
                        sql: composed.sql,
                        shape: composed.shape,
                    },
                });
            }
        }
    }

    Ok(leaves)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::check::descriptor::{Dataset, Filter};

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
    fn test_classify_table_vs_query() {
        assert_eq!(
            DatasetRef::classify("orders"),
            DatasetRef::Table("orders".into())
        );
        assert_eq!(
            DatasetRef::classify("analytics.orders"),
            DatasetRef::Table("analytics.orders".into())
        );
        assert!(matches!(
            DatasetRef::classify("select * from orders"),
            DatasetRef::Query(_)
        ));
    }

    #[test]
    fn test_fingerprint_identifier_joins_tables() {
        let dataset = DatasetRef::classify("select * from orders o join vendors v on o.vendor_id = v.id");
        assert_eq!(dataset.fingerprint_identifier(), "orders_vendors");
    }

    #[test]
    fn test_dataset_list_fans_out_with_distinct_check_ids() {
        let mut check = base_check();
        check.dataset = Dataset::Many(vec!["orders".into(), "vendors".into()]);
        let leaves = expand(&check, SqlDialect::DuckDb).expect("expands");
        assert_eq!(leaves.len(), 2);
        assert_eq!(leaves[0].name, leaves[1].name);
        assert_ne!(leaves[0].check_id, leaves[1].check_id);
        assert_eq!(leaves[0].dataset, "orders");
        assert_eq!(leaves[1].dataset, "vendors");
    }

    #[test]
    fn test_not_empty_one_leaf_per_dimension() {
        let mut check = base_check();
        check.name = "customers_complete".into();
        check.check_type = CheckType::NotEmpty;
        check.condition = Condition::Le;
        check.dataset = Dataset::One("customers".into());
        check.dimensions = vec!["email".into(), "phone".into()];
        let leaves = expand(&check, SqlDialect::DuckDb).expect("expands");
        assert_eq!(leaves.len(), 2);
        assert_eq!(leaves[0].name, "customers_complete_email_not_empty");
        assert_eq!(leaves[1].name, "customers_complete_phone_not_empty");
        assert_ne!(leaves[0].check_id, leaves[1].check_id);
    }

    #[test]
    fn test_not_empty_pct_suffix() {
        let mut check = base_check();
        check.check_type = CheckType::NotEmptyPct;
        check.condition = Condition::Le;
        check.dimensions = vec!["email".into()];
        let leaves = expand(&check, SqlDialect::DuckDb).expect("expands");
        assert_eq!(leaves[0].name, "orders_count_email_not_empty_pct");
    }

    #[test]
    fn test_check_id_ignores_threshold_and_filter() {
        let mut a = base_check();
        let mut b = base_check();
        a.threshold = Threshold::Scalar(0.0);
        b.threshold = Threshold::Scalar(9000.0);
        b.filter = Some(Filter::One("status = 'open'".into()));
        let la = expand(&a, SqlDialect::DuckDb).expect("expands");
        let lb = expand(&b, SqlDialect::DuckDb).expect("expands");
        assert_eq!(la[0].check_id, lb[0].check_id);
    }

    #[test]
    fn test_anomaly_leaf_targets_store() {
        let mut check = base_check();
        check.check_type = CheckType::Anomaly;
        check.condition = Condition::Between;
        check.threshold = Threshold::Range(vec![-3.5, 3.5]);
        check.dataset = Dataset::One("metrics".into());
        check.check_id = Some("deadbeef".into());
        check.filter = Some(Filter::One("datasource = 'default'".into()));
        let leaves = expand(&check, SqlDialect::DuckDb).expect("expands");
        assert_eq!(leaves.len(), 1);
        match &leaves[0].target {
            LeafTarget::Store {
                target_check_id,
                predicate,
            } => {
                assert_eq!(target_check_id.as_deref(), Some("deadbeef"));
                assert_eq!(predicate.as_deref(), Some("datasource = 'default'"));
            }
            other => panic!("expected store target, got {other:?}"),
        }
    }
}
