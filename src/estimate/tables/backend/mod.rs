//! Access to the spreadsheet holding the structured tables.
//!
//! Every call is blocking and the engine issues them strictly in sequence:
//! row indices computed for one mutation are only valid once the previous
//! mutation has completed.

pub mod memory;

pub use memory::{MAX_ROWS, MemoryCell, MemorySheet, MemoryWorkbook};

use crate::estimate::tables::error::Result;
use crate::estimate::tables::model::{CellValue, InputMode, SheetTables, StructuralOp};

/// Operations the table engine needs from a spreadsheet service.
pub trait SpreadsheetBackend {
    /// Lists every sheet with the tables declared on it.
    fn list_sheets(&self) -> Result<Vec<SheetTables>>;

    /// Reads the cells covered by `address` as display strings, one inner
    /// vector per row.
    fn read_range(&self, address: &str) -> Result<Vec<Vec<String>>>;

    /// Writes `values` starting at the top-left cell of `address`.
    fn write_range(&mut self, address: &str, values: &[Vec<CellValue>], mode: InputMode)
    -> Result<()>;

    /// Applies `ops` in order. When an op fails the ones before it stay
    /// applied.
    fn batch_update(&mut self, ops: &[StructuralOp]) -> Result<()>;
}
