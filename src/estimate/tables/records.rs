use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::estimate::tables::address;
use crate::estimate::tables::backend::SpreadsheetBackend;
use crate::estimate::tables::error::{Result, TableError};
use crate::estimate::tables::headers::{HeaderIndex, resolve_headers};
use crate::estimate::tables::model::{
    CellValue, InputMode, Rectangle, SheetId, StructuralOp, TableDescriptor, TextFormatRun,
};
use crate::estimate::tables::reconcile::reconcile;

/// A typed view over a fixed set of table columns.
///
/// `fields` names the header cells the record reads and writes; values are
/// exchanged in that order.
pub trait TableRecord: Sized {
    fn fields() -> &'static [&'static str];

    fn from_fields(values: Vec<String>) -> Result<Self>;

    fn to_fields(&self) -> Vec<String>;
}

/// A project member as listed in the members table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub display_name: String,
    pub email: String,
}

impl Member {
    pub const DISPLAY_NAME: &'static str = "表示名";
    pub const EMAIL: &'static str = "メールアドレス";
}

impl TableRecord for Member {
    fn fields() -> &'static [&'static str] {
        &[Member::DISPLAY_NAME, Member::EMAIL]
    }

    fn from_fields(values: Vec<String>) -> Result<Self> {
        let [display_name, email]: [String; 2] = values
            .try_into()
            .map_err(|_| TableError::InvalidRecord("member rows need two fields".into()))?;
        Ok(Self {
            display_name: display_name.trim().to_string(),
            email: email.trim().to_string(),
        })
    }

    fn to_fields(&self) -> Vec<String> {
        vec![self.display_name.clone(), self.email.clone()]
    }
}

/// Header name → cell text, for tables without a typed record.
pub type RowMap = BTreeMap<String, String>;

/// A formula placed verbatim into one data cell during a write. `row` is the
/// zero-based data row, `column` a header name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormulaCell {
    pub row: usize,
    pub column: String,
    pub formula: String,
}

/// Reads the whole table, header row first.
pub fn read_rows<B: SpreadsheetBackend + ?Sized>(
    backend: &B,
    table: &TableDescriptor,
) -> Result<Vec<Vec<String>>> {
    let rows = backend.read_range(&address::to_address(&table.rectangle, &table.sheet_title))?;
    if rows.is_empty() {
        return Err(TableError::EmptyTable(table.name.clone()));
    }
    Ok(rows)
}

/// Reads `table` into typed records, skipping rows whose tracked fields are
/// all blank.
#[instrument(level = "debug", skip_all, fields(table = %table.name))]
pub fn load_records<B, R>(backend: &B, table: &TableDescriptor) -> Result<Vec<R>>
where
    B: SpreadsheetBackend + ?Sized,
    R: TableRecord,
{
    let rows = read_rows(backend, table)?;
    let headers = resolve_headers(backend, table, Some(rows.as_slice()))?;
    records_from_rows(&headers, &rows[1..])
}

/// Converts data rows (header excluded) into typed records.
pub fn records_from_rows<R: TableRecord>(
    headers: &HeaderIndex,
    rows: &[Vec<String>],
) -> Result<Vec<R>> {
    let columns = headers.column_map(R::fields())?;
    rows.iter()
        .map(|row| columns.extract(row))
        .filter(|values| values.iter().any(|value| !value.trim().is_empty()))
        .map(R::from_fields)
        .collect()
}

/// Converts data rows into header-keyed maps, skipping blank rows.
pub fn maps_from_rows(headers: &HeaderIndex, rows: &[Vec<String>]) -> Vec<RowMap> {
    rows.iter()
        .filter(|row| row.iter().any(|value| !value.trim().is_empty()))
        .map(|row| {
            headers
                .column_names()
                .iter()
                .enumerate()
                .filter(|(_, name)| !name.is_empty())
                .map(|(offset, name)| (name.clone(), row.get(offset).cloned().unwrap_or_default()))
                .collect()
        })
        .collect()
}

/// Replaces the table body with `records` and returns the resized
/// descriptor. Columns outside the record's fields are cleared unless a
/// formula targets them.
pub fn write_records<B, R>(
    backend: &mut B,
    table: &TableDescriptor,
    records: &[R],
    formulas: &[FormulaCell],
    inherit_from_before: bool,
) -> Result<TableDescriptor>
where
    B: SpreadsheetBackend + ?Sized,
    R: TableRecord,
{
    let headers = resolve_headers(&*backend, table, None)?;
    let columns = headers.column_map(R::fields())?;
    let width = headers.width();

    let rows = records
        .iter()
        .map(|record| {
            let mut row = vec![CellValue::empty(); width];
            for (offset, value) in columns.offsets().iter().zip(record.to_fields()) {
                if let Some(cell) = row.get_mut(*offset) {
                    *cell = CellValue::Literal(value);
                }
            }
            row
        })
        .collect();

    write_rows(backend, table, &headers, rows, formulas, inherit_from_before)
}

/// Like [`write_records`] for header-keyed maps. Unknown keys fail with
/// `HeaderNotFound`.
pub fn write_maps<B: SpreadsheetBackend + ?Sized>(
    backend: &mut B,
    table: &TableDescriptor,
    maps: &[RowMap],
    formulas: &[FormulaCell],
    inherit_from_before: bool,
) -> Result<TableDescriptor> {
    let headers = resolve_headers(&*backend, table, None)?;
    let width = headers.width();

    let rows = maps
        .iter()
        .map(|map| {
            let mut row = vec![CellValue::empty(); width];
            for (name, value) in map {
                let offset = headers.offset(name)?;
                if let Some(cell) = row.get_mut(offset) {
                    *cell = CellValue::Literal(value.clone());
                }
            }
            Ok(row)
        })
        .collect::<Result<Vec<_>>>()?;

    write_rows(backend, table, &headers, rows, formulas, inherit_from_before)
}

/// Resizes the table to `rows.len()` data rows, then writes every cell of the
/// new body in a single call.
#[instrument(
    level = "info",
    skip_all,
    fields(table = %table.name, rows = rows.len(), formulas = formulas.len())
)]
pub fn write_rows<B: SpreadsheetBackend + ?Sized>(
    backend: &mut B,
    table: &TableDescriptor,
    headers: &HeaderIndex,
    mut rows: Vec<Vec<CellValue>>,
    formulas: &[FormulaCell],
    inherit_from_before: bool,
) -> Result<TableDescriptor> {
    // Formulas are placed before any mutation so a bad target aborts cleanly.
    let written = rows.len();
    for formula in formulas {
        let offset = headers.offset(&formula.column)?;
        let cell = rows
            .get_mut(formula.row)
            .and_then(|row| row.get_mut(offset))
            .ok_or_else(|| {
                TableError::InvalidRecord(format!(
                    "formula for {}[{}] is outside the {written} rows written",
                    formula.column, formula.row
                ))
            })?;
        *cell = CellValue::Formula(formula.formula.clone());
    }

    let row_count = u32::try_from(rows.len())
        .map_err(|_| TableError::InvalidRecord("too many rows for one table".into()))?;
    let updated = reconcile(backend, table, row_count, inherit_from_before)?;

    if let Some(body) = updated.rectangle.data_rows() {
        let body_address = address::to_address(&body, &updated.sheet_title);
        debug!(address = %body_address, "writing table body");
        backend.write_range(&body_address, &rows, InputMode::UserEntered)?;
    }

    Ok(updated)
}

/// Replaces the text of the top-left cell of `range` with rich text.
pub fn write_rich_text<B: SpreadsheetBackend + ?Sized>(
    backend: &mut B,
    sheet_id: SheetId,
    range: Rectangle,
    value: &str,
    runs: Vec<TextFormatRun>,
) -> Result<()> {
    backend.batch_update(&[StructuralOp::UpdateRichText {
        sheet_id,
        range,
        value: value.to_string(),
        runs,
    }])
}
