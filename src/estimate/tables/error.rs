use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, TableError>;

/// Structural mutation step that was being applied when a reconciliation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileStep {
    InsertRows,
    DeleteRows,
    UpdateRange,
}

impl fmt::Display for ReconcileStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileStep::InsertRows => write!(f, "insert-rows"),
            ReconcileStep::DeleteRows => write!(f, "delete-rows"),
            ReconcileStep::UpdateRange => write!(f, "update-table-range"),
        }
    }
}

/// Error type covering table discovery, addressing, reconciliation, and the
/// workbook adapters underneath them.
///
/// Every variant is fatal to the operation that raised it. Nothing in the
/// crate retries, because a partially applied reconciliation cannot be told
/// apart from a fresh one.
#[derive(Debug, Error)]
pub enum TableError {
    /// Raised when no sheet declares a table with the requested name.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// Raised when a header lookup names a column absent from the first row.
    #[error("header '{column}' not found in table {table}")]
    HeaderNotFound { table: String, column: String },

    /// Raised when a declared table range is missing a bound or is empty.
    #[error("malformed rectangle for table {0}")]
    MalformedRectangle(String),

    /// Raised when a table has no readable header row.
    #[error("table {0} has no header row")]
    EmptyTable(String),

    /// Raised when the backend rejects one step of a reconciliation. Steps
    /// applied before the failing one are left in place.
    #[error("structural mutation failed for table {table} during {step}: {reason}")]
    StructuralMutationFailed {
        table: String,
        step: ReconcileStep,
        reason: String,
    },

    /// Raised when resizing a table would push a row index past `u32::MAX`.
    #[error("table {table} cannot be resized to {target} data rows")]
    RowLimitExceeded { table: String, target: u32 },

    /// Raised when an A1-style address cannot be parsed or encoded.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Raised by spreadsheet backends when a call is rejected.
    #[error("backend error: {0}")]
    Backend(String),

    /// Raised when a record cannot be built from a row or a JSON payload.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// Raised when a workbook does not follow the expected conventions.
    #[error("invalid workbook structure: {0}")]
    InvalidWorkbook(String),

    /// Wrapper for IO failures such as reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON parsing or serialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors bubbled up from the Excel writer implementation.
    #[error("Excel write error: {0}")]
    ExcelWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Errors bubbled up from the Excel reader implementation.
    #[error("Excel read error: {0}")]
    ExcelRead(#[from] calamine::XlsxError),

    /// Raised when the user provides a path that does not exist.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}
