pub mod batch;
pub mod processed;

use crate::feed::types::Project;
use chrono::NaiveDate;

pub use batch::BatchStore;
pub use processed::ProcessedIndex;

/// Projects persisted together under one calendar date.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub date: NaiveDate,
    pub projects: Vec<Project>,
}
