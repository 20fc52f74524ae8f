// weiser-core/src/infrastructure/store/migrations.rs

// Custom migration ledger for the embedded store. DuckDB has no standard
// migration tooling, so applied versions are tracked in a
// `migrations(version, description, applied_at)` table — the same columns
// a standard tool keeps, to ease future consolidation. Scripts are
// compiled in from `migrations/duckdb/` and applied in version-ascending
// order inside a transaction each. Downgrades are operator-invoked.

use duckdb::Connection;
use std::collections::HashSet;
use tracing::info;

use crate::infrastructure::error::{DatabaseError, InfrastructureError};

#[derive(Debug, Clone, Copy)]
pub struct EmbeddedMigration {
    pub version: &'static str,
    pub description: &'static str,
    pub up: &'static str,
    pub down: &'static str,
}

pub const MIGRATIONS: &[EmbeddedMigration] = &[
    EmbeddedMigration {
        version: "0001",
        description: "initial metrics table",
        up: include_str!("../../../migrations/duckdb/0001_initial_metrics_table.up.sql"),
        down: include_str!("../../../migrations/duckdb/0001_initial_metrics_table.down.sql"),
    },
    EmbeddedMigration {
        version: "0002",
        description: "add dimensions and time_bucket",
        up: include_str!("../../../migrations/duckdb/0002_add_dimensions_and_time_bucket.up.sql"),
        down: include_str!("../../../migrations/duckdb/0002_add_dimensions_and_time_bucket.down.sql"),
    },
];

fn ensure_ledger(conn: &Connection) -> Result<(), InfrastructureError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS migrations (
            version VARCHAR PRIMARY KEY,
            description VARCHAR NOT NULL,
            applied_at TIMESTAMP NOT NULL
        )",
    )?;
    Ok(())
}

pub fn applied_versions(conn: &Connection) -> Result<HashSet<String>, InfrastructureError> {
    ensure_ledger(conn)?;
    let mut stmt = conn.prepare("SELECT version FROM migrations ORDER BY version")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut versions = HashSet::new();
    for row in rows {
        versions.insert(row?);
    }
    Ok(versions)
}

/// Apply every unapplied script, version-ascending, one transaction per
/// script. A failure aborts that transaction and surfaces the error.
pub fn apply_pending(conn: &Connection) -> Result<usize, InfrastructureError> {
    let applied = applied_versions(conn)?;
    let mut count = 0;
    for migration in MIGRATIONS {
        if applied.contains(migration.version) {
            continue;
        }
        run_in_transaction(conn, migration.version, &format!(
            "{}\nINSERT INTO migrations (version, description, applied_at) VALUES ('{}', '{}', CURRENT_TIMESTAMP);",
            migration.up,
            migration.version,
            migration.description.replace('\'', "''"),
        ))?;
        info!(
            version = migration.version,
            description = migration.description,
            "Applied metric-store migration"
        );
        count += 1;
    }
    Ok(count)
}

/// Revert every migration above `target_version`, newest first.
/// Operator-invoked only; never part of `initialize()`.
pub fn migrate_down(conn: &Connection, target_version: &str) -> Result<usize, InfrastructureError> {
    let applied = applied_versions(conn)?;
    let mut count = 0;
    for migration in MIGRATIONS.iter().rev() {
        if migration.version <= target_version || !applied.contains(migration.version) {
            continue;
        }
        run_in_transaction(conn, migration.version, &format!(
            "{}\nDELETE FROM migrations WHERE version = '{}';",
            migration.down, migration.version,
        ))?;
        info!(version = migration.version, "Reverted metric-store migration");
        count += 1;
    }
    Ok(count)
}

fn run_in_transaction(
    conn: &Connection,
    version: &str,
    script: &str,
) -> Result<(), InfrastructureError> {
    let batch = format!("BEGIN TRANSACTION;\n{script}\nCOMMIT;");
    if let Err(e) = conn.execute_batch(&batch) {
        // Leave the connection usable for the caller's error handling.
        let _ = conn.execute_batch("ROLLBACK;");
        return Err(InfrastructureError::Database(DatabaseError::Migration(
            format!("migration {version} failed: {e}"),
        )));
    }
    Ok(())
}
