// weiser-core/src/domain/sql/composer.rs

use crate::domain::check::descriptor::{CheckDescriptor, CheckType};
use crate::domain::check::expander::DatasetRef;
use crate::domain::error::DomainError;
use crate::domain::sql::ast::{AggFunc, Expr, Relation, SelectBuilder};
use crate::domain::sql::dialect::SqlDialect;

/// How the runner must read the rows a composed statement returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultShape {
    /// One row, one column: the measured value.
    Scalar,
    /// One row per partition: the named dimension columns lead, then the
    /// aliased time bucket when present, then the measured value last.
    Grouped {
        dimensions: Vec<String>,
        time_alias: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct ComposedSql {
    pub sql: String,
    pub shape: ResultShape,
}

/// Translate one check (for one dataset entry) into a dialect-specific
/// statement. `completeness_dim` names the NULL-tested column for
/// `not_empty` / `not_empty_pct` leaves and must be absent otherwise.
pub fn compose(
    check: &CheckDescriptor,
    dataset: &DatasetRef,
    completeness_dim: Option<&str>,
    dialect: SqlDialect,
) -> Result<ComposedSql, DomainError> {
    let compile_err = |reason: String| DomainError::Compile {
        check: check.name.clone(),
        reason,
    };

    let measured = match check.check_type {
        CheckType::RowCount => Expr::CountStar,
        CheckType::Sum | CheckType::Min | CheckType::Max => {
            let func = match check.check_type {
                CheckType::Sum => AggFunc::Sum,
                CheckType::Min => AggFunc::Min,
                _ => AggFunc::Max,
            };
            let measure = check
                .measure
                .clone()
                .ok_or_else(|| compile_err(format!("type '{}' requires a `measure`", check.check_type)))?;
            Expr::Agg {
                func,
                arg: Box::new(Expr::Raw(measure)),
            }
        }
        // Verbatim outer select expression: any aggregate or scalar.
        CheckType::Numeric => Expr::Raw(
            check
                .measure
                .clone()
                .ok_or_else(|| compile_err("type 'numeric' requires a `measure`".into()))?,
        ),
        // Semantic-layer passthrough: a bare measure identifier.
        CheckType::Measure => Expr::Column(
            check
                .measure
                .clone()
                .ok_or_else(|| compile_err("type 'measure' requires a `measure`".into()))?,
        ),
        CheckType::NotEmpty | CheckType::NotEmptyPct => {
            let dim = completeness_dim.ok_or_else(|| {
                compile_err(format!(
                    "type '{}' composes per dimension; none was selected",
                    check.check_type
                ))
            })?;
            if check.check_type == CheckType::NotEmpty {
                Expr::NullCount(dim.to_string())
            } else {
                Expr::NullRatio(dim.to_string())
            }
        }
        CheckType::Anomaly => {
            return Err(compile_err(
                "anomaly checks read the metric store and emit no source SQL".into(),
            ))
        }
    };

    let relation = match dataset {
        DatasetRef::Table(name) => Relation::Table(name.clone()),
        DatasetRef::Query(raw) => Relation::Subquery(raw.clone()),
    };
    let mut builder = SelectBuilder::from(relation);

    // Dimensions group numeric measurements; completeness checks consume
    // them as target columns instead, one leaf each.
    let grouped = !check.check_type.is_completeness()
        && (!check.dimensions.is_empty() || check.time_dimension.is_some());

    let mut dimension_names = Vec::new();
    let mut time_alias = None;
    if grouped {
        for dim in &check.dimensions {
            builder = builder
                .select(Expr::Column(dim.clone()))
                .group_by(Expr::Column(dim.clone()));
            dimension_names.push(dim.clone());
        }
        if let Some(td) = &check.time_dimension {
            let bucket = Expr::DateTrunc {
                granularity: td.granularity,
                column: td.name.clone(),
            };
            builder = builder
                .select(bucket.clone().aliased(td.alias()))
                .group_by(bucket);
            time_alias = Some(td.alias());
        }
    }

    builder = builder.select(measured);

    if let Some(filter) = &check.filter {
        builder = builder.and_where(filter.combined());
    }

    let shape = if grouped {
        ResultShape::Grouped {
            dimensions: dimension_names,
            time_alias,
        }
    } else {
        builder = builder.limit(1);
        ResultShape::Scalar
    };

    Ok(ComposedSql {
        sql: builder.render(dialect),
        shape,
    })
}
