//! Safety-checked catalog diffing.
//!
//! Given two [`larder::Catalog`] snapshots, [`diff`] computes the command
//! log that transforms the first into the second, and classifies every
//! difference by whether it can be applied to a live system: outright safe,
//! safe only while named tables hold no rows, or requiring a restart. The
//! verdicts land in the returned [`DiffResult`]; the command log itself
//! always records every difference, even rejected ones, so audit tooling
//! sees the full delta.
//!
//! The [`dr`] module carries the cross-cluster variant: a filtered
//! serialization of the replication contract, and a per-table
//! compatibility comparison between a master's catalog and a replica's.

mod coverage;
mod engine;
mod policy;
mod report;
mod result;
mod widening;

pub mod dr;

pub use coverage::index_covers;
pub use engine::diff;
pub use report::{ChangeRecord, ChangeSet, DiffClass, ModifiedRecord};
pub use result::{DiffResult, EmptyTableRequirement, SideEffectFlags};
pub use widening::{
    check_column_shape_change, ColumnShape, ColumnType, MAX_BYTES_PER_UTF8_CHAR,
};
