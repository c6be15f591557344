//! Progress and completion statistics

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::types::{Item, PassResult};

/// Percentage of the pass done. An empty collection counts as fully done.
pub fn progress_percent(offset: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    offset as f64 / total as f64 * 100.0
}

/// Average items handled per reload, if the pass needed any reloads.
pub fn average_items_per_slice(total: u64, reload_count: u64) -> Option<f64> {
    if reload_count == 0 {
        return None;
    }
    Some(total as f64 / reload_count as f64)
}

/// Snapshot shown while a pass is running.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub current: Option<Item>,
    pub offset: u64,
    pub total: u64,
    pub percent: f64,
}

impl Progress {
    pub fn from_result(result: &PassResult) -> Self {
        Self {
            current: result.last_processed.clone(),
            offset: result.new_offset,
            total: result.total,
            percent: progress_percent(result.new_offset, result.total),
        }
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Page {} of {} ({:.1}%)",
            self.offset, self.total, self.percent
        )?;
        if let Some(current) = &self.current {
            write!(f, ", current page: {}", current)?;
        }
        Ok(())
    }
}

/// Summary reported to the operator once a pass has finished.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompletionReport {
    pub total: u64,
    pub reload_count: u64,
    #[serde(serialize_with = "serialize_secs")]
    pub budget: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_items_per_slice: Option<f64>,
}

impl CompletionReport {
    pub fn new(total: u64, reload_count: u64, budget: Duration) -> Self {
        Self {
            total,
            reload_count,
            budget,
            average_items_per_slice: average_items_per_slice(total, reload_count),
        }
    }
}

impl fmt::Display for CompletionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Batch processing completed!")?;
        writeln!(f, "  total number of pages:              {}", self.total)?;
        writeln!(f, "  timeout setting [s]:                {}", self.budget.as_secs_f64())?;
        writeln!(f, "  webpage reloads:                    {}", self.reload_count)?;
        match self.average_items_per_slice {
            Some(avg) => write!(f, "  pages scanned per reload interval:  {:.1}", avg),
            None => write!(f, "  pages scanned per reload interval:  all in a single slice"),
        }
    }
}

fn serialize_secs<S: serde::Serializer>(
    budget: &Duration,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(budget.as_secs_f64())
}
