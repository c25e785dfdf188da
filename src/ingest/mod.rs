//! Delimited source -> store ingestion

mod mapping;
mod pipeline;

pub use mapping::ColumnMapping;
pub use pipeline::{import_batch, import_file};

use serde::Deserialize;
use std::fmt;

use crate::parser::IntegerPolicy;

/// How to treat foreign-key values without a parent record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityMode {
    /// Insert the row anyway; counted and logged as an orphan
    #[default]
    Permissive,
    /// Reject the row; counted as skipped
    Strict,
}

/// Per-batch import settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    pub integer_policy: IntegerPolicy,
    pub integrity: IntegrityMode,
}

/// Outcome counters of one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportResult {
    /// Rows added to the store
    pub inserted: u64,
    /// Rows rejected: malformed, failed coercion, or strict integrity
    pub skipped: u64,
    /// Rows ignored because their primary key already existed
    pub duplicates: u64,
    /// Inserted rows whose foreign key had no parent (permissive mode)
    pub orphans: u64,
    /// Integer fields replaced by 0
    pub defaulted: u64,
}

impl fmt::Display for ImportResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} inserted, {} skipped, {} duplicates",
            self.inserted, self.skipped, self.duplicates
        )?;
        if self.orphans > 0 {
            write!(f, ", {} orphans", self.orphans)?;
        }
        if self.defaulted > 0 {
            write!(f, ", {} defaulted", self.defaulted)?;
        }
        Ok(())
    }
}
