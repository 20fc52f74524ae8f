// weiser-core/src/infrastructure/config/mod.rs

pub mod loader;
pub mod model;
pub mod template;

pub use loader::{load_config, LoadOptions};
pub use model::{BaseConfig, ConnectionConfig, Datasource, DbType, MetricStoreBackend, S3UrlStyle};
