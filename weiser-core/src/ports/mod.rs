// weiser-core/src/ports/mod.rs

pub mod driver;
pub mod store;

pub use driver::{Row, Scalar, SourceDriver};
pub use store::{HistoryPoint, MetricStore, StoreSummary};
