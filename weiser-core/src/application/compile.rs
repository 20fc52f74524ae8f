// weiser-core/src/application/compile.rs

// Compile-only path: expand every declared check and surface each leaf's
// SQL without touching any source. Dialects come from the declared
// datasource types, so no connection is needed.

use std::collections::HashMap;

use crate::domain::check::{expander, LeafTarget};
use crate::domain::sql::SqlDialect;
use crate::error::WeiserError;
use crate::infrastructure::config::BaseConfig;

#[derive(Debug, Clone)]
pub struct CompiledLeaf {
    pub check: String,
    pub leaf: String,
    pub datasource: String,
    /// None for anomaly leaves, which read the metric store instead.
    pub sql: Option<String>,
}

/// Expand and compose every check. Any compile failure aborts with the
/// offending check named — this is the `compile` command's contract.
pub fn compile_all(config: &BaseConfig) -> Result<Vec<CompiledLeaf>, WeiserError> {
    config.validate()?;

    let dialects: HashMap<&str, SqlDialect> = config
        .datasources
        .iter()
        .map(|d| (d.name.as_str(), d.dialect()))
        .collect();

    let mut compiled = Vec::new();
    for check in &config.checks {
        let dialect = dialects
            .get(check.datasource.as_str())
            .copied()
            .unwrap_or(SqlDialect::DuckDb);
        for leaf in expander::expand(check, dialect)? {
            compiled.push(CompiledLeaf {
                check: check.name.clone(),
                leaf: leaf.name,
                datasource: leaf.datasource,
                sql: match leaf.target {
                    LeafTarget::Source { sql, .. } => Some(sql),
                    LeafTarget::Store { .. } => None,
                },
            });
        }
    }
    Ok(compiled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_yaml() -> BaseConfig {
        serde_yaml::from_str(
            r#"
version: 1
datasources:
  - name: default
    type: duckdb
connections:
  - type: metricstore
    db_type: duckdb
checks:
  - name: orders_count
    dataset: [orders, vendors]
    type: row_count
    condition: gt
    threshold: 0
  - name: customers_complete
    dataset: customers
    type: not_empty
    dimensions: [email, phone]
    condition: le
    threshold: 0
"#,
        )
        .expect("yaml parses")
    }

    #[test]
    fn test_compile_all_emits_every_leaf() {
        let compiled = compile_all(&config_yaml()).expect("compiles");
        assert_eq!(compiled.len(), 4);
        assert!(compiled.iter().all(|leaf| leaf.sql.is_some()));
        assert_eq!(compiled[0].leaf, "orders_count");
        assert_eq!(compiled[2].leaf, "customers_complete_email_not_empty");
    }

    #[test]
    fn test_compile_failure_names_the_check() {
        let mut config = config_yaml();
        config.checks[0].check_type = crate::domain::check::CheckType::Sum;
        let err = compile_all(&config).expect_err("must fail");
        assert!(err.to_string().contains("orders_count"));
    }
}
