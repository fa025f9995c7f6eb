//! Offset pagination result

use serde::{Deserialize, Serialize};

/// One page of records plus the totals for the filter that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult<T> {
    /// 1-based page number
    pub page_current: u64,
    pub page_size: u64,
    /// Rows matching the filter, independent of the window
    pub row_count: u64,
    pub page_count: u64,
    pub records: Vec<T>,
}

impl<T> PageResult<T> {
    pub fn new(page_current: u64, page_size: u64, row_count: u64, records: Vec<T>) -> Self {
        Self {
            page_current,
            page_size,
            row_count,
            page_count: page_count(row_count, page_size),
            records,
        }
    }
}

/// Number of pages needed to hold `row_count` rows
pub fn page_count(row_count: u64, page_size: u64) -> u64 {
    if page_size == 0 {
        return 0;
    }
    row_count.div_ceil(page_size)
}

/// Rows to skip before the given 1-based page
pub fn page_offset(page_current: u64, page_size: u64) -> u64 {
    page_current.saturating_sub(1).saturating_mul(page_size)
}
