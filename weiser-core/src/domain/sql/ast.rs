// weiser-core/src/domain/sql/ast.rs

use crate::domain::sql::dialect::{Granularity, SqlDialect};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    Sum,
    Min,
    Max,
}

impl AggFunc {
    fn keyword(&self) -> &'static str {
        match self {
            AggFunc::Sum => "SUM",
            AggFunc::Min => "MIN",
            AggFunc::Max => "MAX",
        }
    }
}

/// Select-list expression. Deliberately small: only the shapes the check
/// types of this engine can emit. `Raw` carries operator-authored SQL
/// fragments (measures, filters) verbatim.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(String),
    Raw(String),
    CountStar,
    Agg { func: AggFunc, arg: Box<Expr> },
    /// `SUM(CASE WHEN col IS NULL THEN 1 ELSE 0 END)`
    NullCount(String),
    /// Null count divided by total count, cast to the dialect's float type.
    NullRatio(String),
    DateTrunc { granularity: Granularity, column: String },
    Alias { expr: Box<Expr>, alias: String },
}

impl Expr {
    pub fn aliased(self, alias: impl Into<String>) -> Expr {
        Expr::Alias {
            expr: Box::new(self),
            alias: alias.into(),
        }
    }

    pub fn render(&self, dialect: SqlDialect) -> String {
        match self {
            Expr::Column(name) => dialect.quote_qualified(name),
            Expr::Raw(sql) => sql.clone(),
            Expr::CountStar => "COUNT(*)".to_string(),
            Expr::Agg { func, arg } => {
                format!("{}({})", func.keyword(), arg.render(dialect))
            }
            Expr::NullCount(column) => format!(
                "SUM(CASE WHEN {} IS NULL THEN 1 ELSE 0 END)",
                dialect.quote_qualified(column)
            ),
            Expr::NullRatio(column) => {
                let nulls = Expr::NullCount(column.clone()).render(dialect);
                format!(
                    "{} / {}",
                    dialect.cast_double(&nulls),
                    dialect.cast_double("COUNT(*)")
                )
            }
            Expr::DateTrunc {
                granularity,
                column,
            } => dialect.date_trunc(*granularity, &dialect.quote_qualified(column)),
            Expr::Alias { expr, alias } => {
                format!("{} AS {}", expr.render(dialect), dialect.quote_ident(alias))
            }
        }
    }
}

/// The FROM target: a (possibly qualified) table or an operator-supplied
/// SELECT wrapped as a derived table.
#[derive(Debug, Clone, PartialEq)]
pub enum Relation {
    Table(String),
    Subquery(String),
}

impl Relation {
    fn render(&self, dialect: SqlDialect) -> String {
        match self {
            Relation::Table(name) => dialect.quote_qualified(name),
            Relation::Subquery(raw) => format!("({raw}) AS {}", dialect.quote_ident("d")),
        }
    }
}

/// Minimal single-statement SELECT builder. Rendering is deterministic:
/// the same builder and dialect always yield byte-identical SQL.
#[derive(Debug, Clone)]
pub struct SelectBuilder {
    projection: Vec<Expr>,
    from: Relation,
    filters: Vec<String>,
    group_by: Vec<Expr>,
    order_by: Vec<(String, bool)>,
    limit: Option<usize>,
}

impl SelectBuilder {
    pub fn from(relation: Relation) -> Self {
        Self {
            projection: Vec::new(),
            from: relation,
            filters: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    pub fn select(mut self, expr: Expr) -> Self {
        self.projection.push(expr);
        self
    }

    /// Predicates accumulate and are AND-combined.
    pub fn and_where(mut self, predicate: impl Into<String>) -> Self {
        self.filters.push(predicate.into());
        self
    }

    pub fn group_by(mut self, expr: Expr) -> Self {
        self.group_by.push(expr);
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order_by.push((column.into(), ascending));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn render(&self, dialect: SqlDialect) -> String {
        let projection = self
            .projection
            .iter()
            .map(|e| e.render(dialect))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!("SELECT {projection} FROM {}", self.from.render(dialect));

        if !self.filters.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.filters.join(" AND "));
        }
        if !self.group_by.is_empty() {
            let keys = self
                .group_by
                .iter()
                .map(|e| e.render(dialect))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(" GROUP BY ");
            sql.push_str(&keys);
        }
        if !self.order_by.is_empty() {
            let keys = self
                .order_by
                .iter()
                .map(|(col, asc)| {
                    format!(
                        "{} {}",
                        dialect.quote_qualified(col),
                        if *asc { "ASC" } else { "DESC" }
                    )
                })
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(" ORDER BY ");
            sql.push_str(&keys);
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_scalar_count() {
        let sql = SelectBuilder::from(Relation::Table("orders".into()))
            .select(Expr::CountStar)
            .limit(1)
            .render(SqlDialect::Postgres);
        assert_eq!(sql, "SELECT COUNT(*) FROM \"orders\" LIMIT 1");
    }

    #[test]
    fn test_render_grouped_with_filters() {
        let sql = SelectBuilder::from(Relation::Table("vendors".into()))
            .select(Expr::Column("tenant_id".into()))
            .select(Expr::CountStar)
            .and_where("active = TRUE")
            .and_where("deleted_at IS NULL")
            .group_by(Expr::Column("tenant_id".into()))
            .render(SqlDialect::DuckDb);
        assert_eq!(
            sql,
            "SELECT \"tenant_id\", COUNT(*) FROM \"vendors\" \
             WHERE active = TRUE AND deleted_at IS NULL GROUP BY \"tenant_id\""
        );
    }

    #[test]
    fn test_render_subquery_relation() {
        let sql = SelectBuilder::from(Relation::Subquery("select * from orders".into()))
            .select(Expr::CountStar)
            .limit(1)
            .render(SqlDialect::Postgres);
        assert_eq!(sql, "SELECT COUNT(*) FROM (select * from orders) AS \"d\" LIMIT 1");
    }

    #[test]
    fn test_render_null_ratio_casts() {
        let expr = Expr::NullRatio("email".into());
        assert_eq!(
            expr.render(SqlDialect::DuckDb),
            "CAST(SUM(CASE WHEN \"email\" IS NULL THEN 1 ELSE 0 END) AS DOUBLE) \
             / CAST(COUNT(*) AS DOUBLE)"
        );
    }

    #[test]
    fn test_render_is_deterministic() {
        let build = || {
            SelectBuilder::from(Relation::Table("t".into()))
                .select(Expr::Agg {
                    func: AggFunc::Sum,
                    arg: Box::new(Expr::Raw("amount".into())),
                })
                .and_where("amount > 0")
                .limit(1)
                .render(SqlDialect::Snowflake)
        };
        assert_eq!(build(), build());
    }
}
