//! `.xlsx` persistence for [`MemoryWorkbook`](crate::estimate::tables::backend::MemoryWorkbook).
//!
//! Table declarations live on a metadata sheet, one row per sheet and one row
//! per table:
//!
//! | kind  | sheet   | sheet_id | table   | table_id | start_row | end_row | start_col | end_col |
//! |-------|---------|----------|---------|----------|-----------|---------|-----------|---------|
//! | sheet | Members | 0        |         |          |           |         |           |         |
//! | table | Members |          | Members | t-1      | 0         | 4       | 0         | 2       |
//!
//! Bounds are zero-based and end-exclusive. A blank bound is kept blank and
//! surfaces as a malformed rectangle when the table is looked up.

pub mod excel_read;
pub mod excel_write;

pub(crate) const SHEET_KIND: &str = "sheet";
pub(crate) const TABLE_KIND: &str = "table";

pub(crate) const METADATA_COLUMNS: [&str; 9] = [
    "kind",
    "sheet",
    "sheet_id",
    "table",
    "table_id",
    "start_row",
    "end_row",
    "start_col",
    "end_col",
];
