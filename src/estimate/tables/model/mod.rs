use serde::{Deserialize, Serialize};

use crate::estimate::tables::error::{Result, TableError};

/// Backend-assigned identifier of a sheet.
pub type SheetId = u32;

/// Zero-based, end-exclusive cell region.
///
/// A `Rectangle` always satisfies `end_row > start_row` and
/// `end_col > start_col`; build one through [`Rectangle::new`] or by
/// validating a [`GridRange`]. Deserialization enforces the same check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RectangleBounds", into = "RectangleBounds")]
pub struct Rectangle {
    start_row: u32,
    end_row: u32,
    start_col: u32,
    end_col: u32,
}

impl Rectangle {
    /// Creates a rectangle, returning `None` when either span is empty.
    pub fn new(start_row: u32, end_row: u32, start_col: u32, end_col: u32) -> Option<Self> {
        (end_row > start_row && end_col > start_col).then_some(Self {
            start_row,
            end_row,
            start_col,
            end_col,
        })
    }

    pub fn start_row(&self) -> u32 {
        self.start_row
    }

    pub fn end_row(&self) -> u32 {
        self.end_row
    }

    pub fn start_col(&self) -> u32 {
        self.start_col
    }

    pub fn end_col(&self) -> u32 {
        self.end_col
    }

    pub fn row_count(&self) -> u32 {
        self.end_row - self.start_row
    }

    pub fn col_count(&self) -> u32 {
        self.end_col - self.start_col
    }

    /// The first row of the rectangle as a one-row rectangle.
    pub fn header_row(&self) -> Rectangle {
        Rectangle {
            end_row: self.start_row + 1,
            ..*self
        }
    }

    /// Rows below the header, or `None` for a header-only region.
    pub fn data_rows(&self) -> Option<Rectangle> {
        Rectangle::new(self.start_row + 1, self.end_row, self.start_col, self.end_col)
    }

    /// Same columns, header plus `data_rows` rows. `None` when the last row
    /// would not fit in a `u32`.
    pub fn with_data_rows(&self, data_rows: u32) -> Option<Rectangle> {
        let end_row = self.start_row.checked_add(1)?.checked_add(data_rows)?;
        Some(Rectangle { end_row, ..*self })
    }
}

/// Serialized form of a [`Rectangle`], checked on the way in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RectangleBounds {
    start_row: u32,
    end_row: u32,
    start_col: u32,
    end_col: u32,
}

impl TryFrom<RectangleBounds> for Rectangle {
    type Error = String;

    fn try_from(bounds: RectangleBounds) -> std::result::Result<Self, Self::Error> {
        Rectangle::new(bounds.start_row, bounds.end_row, bounds.start_col, bounds.end_col)
            .ok_or_else(|| format!("empty rectangle {bounds:?}"))
    }
}

impl From<Rectangle> for RectangleBounds {
    fn from(rect: Rectangle) -> Self {
        RectangleBounds {
            start_row: rect.start_row,
            end_row: rect.end_row,
            start_col: rect.start_col,
            end_col: rect.end_col,
        }
    }
}

impl From<Rectangle> for GridRange {
    fn from(rect: Rectangle) -> Self {
        GridRange {
            start_row: Some(rect.start_row),
            end_row: Some(rect.end_row),
            start_col: Some(rect.start_col),
            end_col: Some(rect.end_col),
        }
    }
}

/// Range as reported by a backend. Any bound may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridRange {
    pub start_row: Option<u32>,
    pub end_row: Option<u32>,
    pub start_col: Option<u32>,
    pub end_col: Option<u32>,
}

impl GridRange {
    /// Validates every bound. A missing bound is never defaulted: a wrong
    /// guess would point writes at unrelated rows.
    pub fn to_rectangle(&self, table_id: &str) -> Result<Rectangle> {
        let malformed = || TableError::MalformedRectangle(table_id.to_string());
        let (Some(start_row), Some(end_row), Some(start_col), Some(end_col)) =
            (self.start_row, self.end_row, self.start_col, self.end_col)
        else {
            return Err(malformed());
        };
        Rectangle::new(start_row, end_row, start_col, end_col).ok_or_else(malformed)
    }
}

/// One named structured region as declared by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclaredTable {
    pub name: String,
    pub id: String,
    pub range: GridRange,
}

/// A sheet together with the tables declared on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetTables {
    pub sheet_id: SheetId,
    pub sheet_title: String,
    pub tables: Vec<DeclaredTable>,
}

/// Resolved location of a named table.
///
/// Descriptors go stale as soon as rows are inserted or deleted anywhere on
/// their sheet; re-resolve before a second mutating pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub id: String,
    pub name: String,
    pub sheet_id: SheetId,
    pub sheet_title: String,
    pub rectangle: Rectangle,
}

impl TableDescriptor {
    pub fn data_row_count(&self) -> u32 {
        self.rectangle.row_count() - 1
    }
}

/// Value written into a cell. Formulas are opaque text evaluated by the
/// spreadsheet engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum CellValue {
    Literal(String),
    Formula(String),
}

impl CellValue {
    pub fn empty() -> Self {
        CellValue::Literal(String::new())
    }

    pub fn as_str(&self) -> &str {
        match self {
            CellValue::Literal(value) | CellValue::Formula(value) => value,
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Literal(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Literal(value)
    }
}

/// How written values are interpreted by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    /// Store every value verbatim, including strings starting with `=`.
    Raw,
    /// Parse values as if typed by a user; formulas are evaluated.
    #[default]
    UserEntered,
}

/// Formatting applied to the characters starting at `start_index` up to the
/// next run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TextFormatRun {
    pub start_index: usize,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub link: Option<String>,
}

/// Ordered structural mutation understood by [`batch_update`].
///
/// Row indices are zero-based and `end` is exclusive.
///
/// [`batch_update`]: crate::estimate::tables::backend::SpreadsheetBackend::batch_update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StructuralOp {
    InsertRows {
        sheet_id: SheetId,
        start: u32,
        end: u32,
        inherit_from_before: bool,
    },
    DeleteRows {
        sheet_id: SheetId,
        start: u32,
        end: u32,
    },
    UpdateTableRange {
        table_id: String,
        range: GridRange,
    },
    UpdateRichText {
        sheet_id: SheetId,
        range: Rectangle,
        value: String,
        runs: Vec<TextFormatRun>,
    },
}
