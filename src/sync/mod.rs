//! Divergence detection and bulk transfer between the two stores.

pub mod batch;
pub mod conflict;
pub mod report;
pub mod status;

pub use batch::{BatchSummary, Direction};
pub use conflict::Resolution;
pub use report::FileSyncRecord;
