//! `ScanOptions`, `DMLOptions`, and `DMLResult` (spec.md §3).

use crate::codec::ticket::{Ticket, TimePoint};
use arrow::record_batch::RecordBatch;
use futures::stream::BoxStream;

/// Options passed to `Table::scan` / table-function execution. The
/// `columns` projection is a hint only: implementations must still return
/// their full schema (spec.md §3 "ScanOptions").
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub columns: Option<Vec<String>>,
    pub filter: Option<Vec<u8>>,
    pub limit: Option<i64>,
    pub batch_size: Option<usize>,
    pub time_point: Option<TimePoint>,
}

impl Ticket {
    /// Pure conversion from a decoded ticket into `ScanOptions`. Sets
    /// `time_point` iff both `time_point_unit` and `time_point_value` are
    /// present (spec.md §8 round-trip law).
    #[must_use]
    pub fn to_scan_options(&self) -> ScanOptions {
        ScanOptions {
            columns: self.columns.clone(),
            filter: self.filters.clone(),
            limit: None,
            batch_size: None,
            time_point: self.time_point(),
        }
    }
}

/// Options controlling a DML call (spec.md §3 "DMLOptions").
#[derive(Debug, Clone, Default)]
pub struct DmlOptions {
    pub returning: bool,
    pub returning_columns: Vec<String>,
}

/// A stream of record batches, the common reader shape threaded through
/// scans, table functions, and DML `RETURNING` data.
pub type BatchStream = BoxStream<'static, Result<RecordBatch, arrow_schema::ArrowError>>;

/// Result of an `Insert`/`Update`/`Delete` call (spec.md §3 "DMLResult").
/// The affected-row count is tallied by the engine, not returned here.
pub struct DmlResult {
    pub returning_data: Option<BatchStream>,
}

/// Column statistics reply shape (spec.md §4.4).
#[derive(Debug, Clone)]
pub struct ColumnStats {
    pub has_not_null: bool,
    pub has_null: bool,
    pub distinct_count: u64,
    pub min: rmpv::Value,
    pub max: rmpv::Value,
    pub max_string_length: u64,
    pub contains_unicode: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_options_sets_time_point_only_when_both_halves_present() {
        let mut t = Ticket {
            schema: "main".into(),
            table: Some("t".into()),
            ..Default::default()
        };
        assert!(t.to_scan_options().time_point.is_none());
        t.time_point_unit = Some("version".into());
        t.time_point_value = Some("3".into());
        assert!(t.to_scan_options().time_point.is_some());
    }
}
