// weiser-core/src/domain/sql/dialect.rs

use serde::{Deserialize, Serialize};
use std::fmt;

/// Time-bucket granularities accepted by `time_dimension`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Millennium,
    Century,
    Decade,
    Year,
    Quarter,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Millennium => "millennium",
            Granularity::Century => "century",
            Granularity::Decade => "decade",
            Granularity::Year => "year",
            Granularity::Quarter => "quarter",
            Granularity::Month => "month",
            Granularity::Week => "week",
            Granularity::Day => "day",
            Granularity::Hour => "hour",
            Granularity::Minute => "minute",
            Granularity::Second => "second",
        }
    }

    /// Years covered by one bucket, for engines without a native keyword.
    fn year_span(&self) -> Option<i32> {
        match self {
            Granularity::Millennium => Some(1000),
            Granularity::Century => Some(100),
            Granularity::Decade => Some(10),
            _ => None,
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target SQL dialect tag. Selected per datasource; every serializer
/// decision lives here so the composer stays dialect-agnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlDialect {
    Postgres,
    MySql,
    Snowflake,
    Databricks,
    BigQuery,
    DuckDb,
}

impl SqlDialect {
    fn quote_char(&self) -> char {
        match self {
            SqlDialect::Postgres | SqlDialect::Snowflake | SqlDialect::DuckDb => '"',
            SqlDialect::MySql | SqlDialect::BigQuery | SqlDialect::Databricks => '`',
        }
    }

    /// Quote a single identifier part, doubling embedded quote chars.
    pub fn quote_ident(&self, ident: &str) -> String {
        let q = self.quote_char();
        let escaped = ident.replace(q, &format!("{q}{q}"));
        format!("{q}{escaped}{q}")
    }

    /// Quote a possibly catalog/schema-qualified name part by part.
    pub fn quote_qualified(&self, name: &str) -> String {
        name.split('.')
            .map(|part| self.quote_ident(part))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Cast syntax for the completeness ratio (and other float coercions).
    pub fn cast_double(&self, expr: &str) -> String {
        let ty = match self {
            SqlDialect::Postgres => "DOUBLE PRECISION",
            SqlDialect::BigQuery => "FLOAT64",
            _ => "DOUBLE",
        };
        format!("CAST({expr} AS {ty})")
    }

    pub fn bool_literal(&self, value: bool) -> &'static str {
        // TRUE/FALSE parse on every supported engine, MySQL included.
        if value {
            "TRUE"
        } else {
            "FALSE"
        }
    }

    /// Dialect-specific `date_trunc`. `column` arrives already quoted.
    pub fn date_trunc(&self, granularity: Granularity, column: &str) -> String {
        match self {
            SqlDialect::Postgres
            | SqlDialect::Snowflake
            | SqlDialect::Databricks
            | SqlDialect::DuckDb => {
                format!("DATE_TRUNC('{}', {column})", granularity.as_str())
            }
            SqlDialect::BigQuery => match granularity.year_span() {
                // No MILLENNIUM/CENTURY/DECADE keyword: floor the year by hand.
                Some(span) => format!(
                    "TIMESTAMP(DATE(DIV(EXTRACT(YEAR FROM {column}), {span}) * {span}, 1, 1))"
                ),
                None => format!(
                    "TIMESTAMP_TRUNC({column}, {})",
                    granularity.as_str().to_uppercase()
                ),
            },
            SqlDialect::MySql => self.mysql_date_trunc(granularity, column),
        }
    }

    // MySQL has no DATE_TRUNC; emulate with DATE_FORMAT / MAKEDATE.
    fn mysql_date_trunc(&self, granularity: Granularity, column: &str) -> String {
        match granularity {
            Granularity::Millennium | Granularity::Century | Granularity::Decade => {
                // year_span is Some for exactly these three
                let span = granularity.year_span().unwrap_or(1);
                format!("MAKEDATE(YEAR({column}) - (YEAR({column}) % {span}), 1)")
            }
            Granularity::Year => format!("DATE_FORMAT({column}, '%Y-01-01 00:00:00')"),
            Granularity::Quarter => format!(
                "MAKEDATE(YEAR({column}), 1) + INTERVAL (QUARTER({column}) - 1) QUARTER"
            ),
            Granularity::Month => format!("DATE_FORMAT({column}, '%Y-%m-01 00:00:00')"),
            Granularity::Week => {
                format!("DATE_SUB(DATE({column}), INTERVAL WEEKDAY({column}) DAY)")
            }
            Granularity::Day => format!("DATE_FORMAT({column}, '%Y-%m-%d 00:00:00')"),
            Granularity::Hour => format!("DATE_FORMAT({column}, '%Y-%m-%d %H:00:00')"),
            Granularity::Minute => format!("DATE_FORMAT({column}, '%Y-%m-%d %H:%i:00')"),
            Granularity::Second => format!("DATE_FORMAT({column}, '%Y-%m-%d %H:%i:%s')"),
        }
    }
}
