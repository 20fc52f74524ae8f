// weiser-core/src/ports/store.rs

use crate::domain::record::MetricRecord;
use crate::error::WeiserError;
use async_trait::async_trait;
use chrono::NaiveDateTime;

/// One historical observation for a check, as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryPoint {
    pub run_time: NaiveDateTime,
    pub value: f64,
}

/// Pass/fail counts for one run, read back from the store.
#[derive(Debug, Clone, Default)]
pub struct StoreSummary {
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
}

/// Append-only persistence of evaluation records. Also the data source for
/// anomaly checks, which read prior runs instead of a configured source.
#[async_trait]
pub trait MetricStore: Send + Sync {
    /// Ensure the schema exists and all pending migrations are applied.
    /// Safe to call repeatedly; a no-op at head version.
    async fn initialize(&self) -> Result<(), WeiserError>;

    /// Append one evaluation record. Never updates in place.
    async fn write(&self, record: &MetricRecord) -> Result<(), WeiserError>;

    /// Recorded values ordered by run_time ascending. At least one of
    /// `check_id` / `predicate` is present: `predicate` alone selects by a
    /// free-form filter over stored columns, together it narrows the
    /// check's history.
    async fn history(
        &self,
        check_id: Option<&str>,
        predicate: Option<&str>,
    ) -> Result<Vec<HistoryPoint>, WeiserError>;

    /// Convenience over `history`.
    async fn last_value(&self, check_id: &str) -> Result<Option<f64>, WeiserError> {
        Ok(self
            .history(Some(check_id), None)
            .await?
            .last()
            .map(|p| p.value))
    }

    /// Pass/fail counts for one run id.
    async fn run_summary(&self, run_id: &str) -> Result<StoreSummary, WeiserError>;

    /// Flush run results to the configured mirror (S3 parquet on the
    /// embedded store). No-op for backends without a mirror.
    async fn flush(&self, run_id: &str) -> Result<(), WeiserError>;
}
