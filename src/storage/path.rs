//! Object key generation for partitioned output files
//!
//! Data files land under a month-partitioned layout:
//! `{prefix}/{kind}/month={MM}/{kind}_{item_id}_{timestamp}.parquet`,
//! with an extra `_{index}` suffix for the second and later result tables
//! of a multi-table payload.

use crate::SubResourceKind;
use chrono::{Datelike, NaiveDate};

/// Year and month of a game date, used for partitioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct YearMonth {
    /// Year (e.g., 2024)
    pub year: i32,
    /// Month (1-12)
    pub month: u32,
}

impl YearMonth {
    /// Extract year and month from a game date.
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Hive-style partition segment, `month=MM`.
    pub fn partition_segment(&self) -> String {
        format!("month={:02}", self.month)
    }
}

impl std::fmt::Display for YearMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Build the object key for one output parquet file.
///
/// `table_index` 0 produces the bare spec key; later tables of the same
/// payload append their index so files written in the same millisecond
/// cannot collide.
pub fn data_object_key(
    prefix: &str,
    kind: SubResourceKind,
    item_id: &str,
    date: NaiveDate,
    timestamp_ms: i64,
    table_index: usize,
) -> String {
    let partition = YearMonth::from_date(date).partition_segment();
    if table_index == 0 {
        format!("{prefix}/{kind}/{partition}/{kind}_{item_id}_{timestamp_ms}.parquet")
    } else {
        format!(
            "{prefix}/{kind}/{partition}/{kind}_{item_id}_{timestamp_ms}_{table_index}.parquet"
        )
    }
}
