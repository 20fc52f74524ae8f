// weiser-core/src/domain/check/mod.rs

pub mod condition;
pub mod descriptor;
pub mod expander;
pub mod fingerprint;

pub use condition::passes;
pub use descriptor::{
    CheckDescriptor, CheckType, Condition, Dataset, Filter, Threshold, TimeDimension,
};
pub use expander::{expand, DatasetRef, LeafCheck, LeafTarget};
pub use fingerprint::check_id;
