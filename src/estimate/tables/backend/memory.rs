use std::collections::HashSet;

use tracing::{debug, trace};

use crate::estimate::tables::address;
use crate::estimate::tables::backend::SpreadsheetBackend;
use crate::estimate::tables::error::{Result, TableError};
use crate::estimate::tables::model::{
    CellValue, DeclaredTable, GridRange, InputMode, Rectangle, SheetId, SheetTables,
    StructuralOp, TextFormatRun,
};

/// Rows a sheet may hold, matching the `.xlsx` worksheet limit.
pub const MAX_ROWS: u32 = 1_048_576;

/// A single stored cell.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemoryCell {
    pub value: Option<CellValue>,
    pub runs: Vec<TextFormatRun>,
}

impl MemoryCell {
    /// Display text: formulas are reported by their source text since this
    /// backend does not evaluate them.
    pub fn text(&self) -> &str {
        self.value.as_ref().map(CellValue::as_str).unwrap_or("")
    }
}

/// Sheet contents kept as ragged rows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MemorySheet {
    pub id: SheetId,
    pub title: String,
    pub rows: Vec<Vec<MemoryCell>>,
    pub tables: Vec<DeclaredTable>,
}

impl MemorySheet {
    pub fn cell(&self, row: u32, col: u32) -> Option<&MemoryCell> {
        self.rows.get(row as usize)?.get(col as usize)
    }

    fn cell_mut(&mut self, row: u32, col: u32) -> &mut MemoryCell {
        let (row, col) = (row as usize, col as usize);
        if self.rows.len() <= row {
            self.rows.resize_with(row + 1, Vec::new);
        }
        let cells = &mut self.rows[row];
        if cells.len() <= col {
            cells.resize_with(col + 1, MemoryCell::default);
        }
        &mut cells[col]
    }

    /// Number of rows holding at least one stored cell slot.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn insert_rows(&mut self, start: u32, count: u32) {
        let at = start as usize;
        if self.rows.len() < at {
            self.rows.resize_with(at, Vec::new);
        }
        self.rows
            .splice(at..at, (0..count).map(|_| Vec::new()))
            .for_each(drop);

        for table in &mut self.tables {
            let range = &mut table.range;
            let (Some(start_row), Some(end_row)) = (range.start_row, range.end_row) else {
                continue;
            };
            if start_row >= start {
                range.start_row = Some(start_row + count);
                range.end_row = Some(end_row + count);
            } else if end_row > start {
                range.end_row = Some(end_row + count);
            }
        }
    }

    fn delete_rows(&mut self, start: u32, end: u32) {
        let len = self.rows.len();
        let from = (start as usize).min(len);
        let to = (end as usize).min(len);
        self.rows.drain(from..to);

        let count = end - start;
        let shift = |row: u32| {
            if row <= start {
                row
            } else if row >= end {
                row - count
            } else {
                start
            }
        };

        self.tables.retain_mut(|table| {
            let range = &mut table.range;
            let (Some(start_row), Some(end_row)) = (range.start_row, range.end_row) else {
                return true;
            };
            let (new_start, new_end) = (shift(start_row), shift(end_row));
            range.start_row = Some(new_start);
            range.end_row = Some(new_end);
            new_end > new_start
        });
    }
}

/// In-process spreadsheet implementing the backend contract, including the
/// shifting of every table below an inserted or deleted block.
#[derive(Debug, Clone, Default)]
pub struct MemoryWorkbook {
    sheets: Vec<MemorySheet>,
    rejected_ops: HashSet<&'static str>,
}

impl MemoryWorkbook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an empty sheet and returns its id, one above the highest id in
    /// use.
    pub fn add_sheet(&mut self, title: impl Into<String>) -> SheetId {
        let id = self.sheets.iter().map(|sheet| sheet.id + 1).max().unwrap_or(0);
        self.insert_sheet(id, title.into());
        id
    }

    /// Adds an empty sheet with an explicit id. Fails when the id or the
    /// title is already taken.
    pub fn push_sheet(&mut self, id: SheetId, title: impl Into<String>) -> Result<SheetId> {
        let title = title.into();
        if let Some(existing) = self
            .sheets
            .iter()
            .find(|sheet| sheet.id == id || sheet.title == title)
        {
            return Err(TableError::InvalidWorkbook(format!(
                "sheet '{title}' (id {id}) collides with sheet '{}' (id {})",
                existing.title, existing.id
            )));
        }
        self.insert_sheet(id, title);
        Ok(id)
    }

    fn insert_sheet(&mut self, id: SheetId, title: String) {
        self.sheets.push(MemorySheet {
            id,
            title,
            ..MemorySheet::default()
        });
    }

    /// Declares a named table on a sheet.
    pub fn add_table(
        &mut self,
        sheet_id: SheetId,
        name: impl Into<String>,
        id: impl Into<String>,
        range: GridRange,
    ) -> Result<()> {
        let sheet = self.sheet_by_id_mut(sheet_id)?;
        sheet.tables.push(DeclaredTable {
            name: name.into(),
            id: id.into(),
            range,
        });
        Ok(())
    }

    /// Stores literal values with their top-left corner at `(row, col)`.
    pub fn set_values<S: AsRef<str>>(
        &mut self,
        sheet_id: SheetId,
        row: u32,
        col: u32,
        values: &[Vec<S>],
    ) -> Result<()> {
        let sheet = self.sheet_by_id_mut(sheet_id)?;
        for (row_offset, cells) in values.iter().enumerate() {
            for (col_offset, value) in cells.iter().enumerate() {
                let cell = sheet.cell_mut(row + row_offset as u32, col + col_offset as u32);
                cell.value = Some(CellValue::Literal(value.as_ref().to_string()));
                cell.runs.clear();
            }
        }
        Ok(())
    }

    /// Stores a single cell value verbatim.
    pub fn set_cell(&mut self, sheet_id: SheetId, row: u32, col: u32, value: CellValue) -> Result<()> {
        let sheet = self.sheet_by_id_mut(sheet_id)?;
        let cell = sheet.cell_mut(row, col);
        cell.value = Some(value);
        cell.runs.clear();
        Ok(())
    }

    pub fn sheets(&self) -> &[MemorySheet] {
        &self.sheets
    }

    pub fn sheet(&self, title: &str) -> Option<&MemorySheet> {
        self.sheets.iter().find(|sheet| sheet.title == title)
    }

    /// Makes every subsequent op of the given kind fail, leaving earlier ops
    /// in the same batch applied. Kinds: `insert_rows`, `delete_rows`,
    /// `update_table_range`, `update_rich_text`.
    pub fn reject_ops(&mut self, kind: &'static str) {
        self.rejected_ops.insert(kind);
    }

    fn sheet_by_id_mut(&mut self, sheet_id: SheetId) -> Result<&mut MemorySheet> {
        self.sheets
            .iter_mut()
            .find(|sheet| sheet.id == sheet_id)
            .ok_or_else(|| TableError::Backend(format!("unknown sheet id {sheet_id}")))
    }

    fn resolve(&self, address: &str) -> Result<(usize, Rectangle)> {
        let (title, rect) = address::to_rectangle(address)?;
        let index = self
            .sheets
            .iter()
            .position(|sheet| sheet.title == title)
            .ok_or_else(|| TableError::Backend(format!("unknown sheet '{title}'")))?;
        Ok((index, rect))
    }

    fn apply(&mut self, op: &StructuralOp) -> Result<()> {
        let kind = op_kind(op);
        if self.rejected_ops.contains(kind) {
            return Err(TableError::Backend(format!("{kind} rejected")));
        }

        match op {
            StructuralOp::InsertRows { sheet_id, start, end, .. } => {
                let count = checked_span(*start, *end)?;
                let sheet = self.sheet_by_id_mut(*sheet_id)?;
                let last_row = sheet
                    .tables
                    .iter()
                    .filter_map(|table| table.range.end_row)
                    .chain([*start, sheet.row_count() as u32])
                    .max()
                    .unwrap_or(0);
                if u64::from(last_row) + u64::from(count) > u64::from(MAX_ROWS) {
                    return Err(TableError::Backend(format!(
                        "inserting {count} rows would exceed {MAX_ROWS} rows on '{}'",
                        sheet.title
                    )));
                }
                sheet.insert_rows(*start, count);
            }
            StructuralOp::DeleteRows { sheet_id, start, end } => {
                checked_span(*start, *end)?;
                self.sheet_by_id_mut(*sheet_id)?.delete_rows(*start, *end);
            }
            StructuralOp::UpdateTableRange { table_id, range } => {
                range
                    .to_rectangle(table_id)
                    .map_err(|err| TableError::Backend(err.to_string()))?;
                let table = self
                    .sheets
                    .iter_mut()
                    .flat_map(|sheet| sheet.tables.iter_mut())
                    .find(|table| &table.id == table_id)
                    .ok_or_else(|| TableError::Backend(format!("unknown table id {table_id}")))?;
                table.range = *range;
            }
            StructuralOp::UpdateRichText { sheet_id, range, value, runs } => {
                let length = value.chars().count();
                if runs.iter().any(|run| run.start_index > length) {
                    return Err(TableError::Backend(format!(
                        "text format run past end of '{value}'"
                    )));
                }
                let sheet = self.sheet_by_id_mut(*sheet_id)?;
                let cell = sheet.cell_mut(range.start_row(), range.start_col());
                cell.value = Some(CellValue::Literal(value.clone()));
                cell.runs = runs.clone();
            }
        }
        Ok(())
    }
}

fn op_kind(op: &StructuralOp) -> &'static str {
    match op {
        StructuralOp::InsertRows { .. } => "insert_rows",
        StructuralOp::DeleteRows { .. } => "delete_rows",
        StructuralOp::UpdateTableRange { .. } => "update_table_range",
        StructuralOp::UpdateRichText { .. } => "update_rich_text",
    }
}

fn checked_span(start: u32, end: u32) -> Result<u32> {
    end.checked_sub(start)
        .filter(|count| *count > 0)
        .ok_or_else(|| TableError::Backend(format!("empty row span {start}..{end}")))
}

impl SpreadsheetBackend for MemoryWorkbook {
    fn list_sheets(&self) -> Result<Vec<SheetTables>> {
        Ok(self
            .sheets
            .iter()
            .map(|sheet| SheetTables {
                sheet_id: sheet.id,
                sheet_title: sheet.title.clone(),
                tables: sheet.tables.clone(),
            })
            .collect())
    }

    fn read_range(&self, address: &str) -> Result<Vec<Vec<String>>> {
        let (index, rect) = self.resolve(address)?;
        let sheet = &self.sheets[index];
        trace!(address, "reading range");

        let rows = (rect.start_row()..rect.end_row())
            .map(|row| {
                (rect.start_col()..rect.end_col())
                    .map(|col| {
                        sheet
                            .cell(row, col)
                            .map(|cell| cell.text().to_string())
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .collect();
        Ok(rows)
    }

    fn write_range(
        &mut self,
        address: &str,
        values: &[Vec<CellValue>],
        mode: InputMode,
    ) -> Result<()> {
        let (index, rect) = self.resolve(address)?;
        let sheet = &mut self.sheets[index];
        debug!(address, rows = values.len(), ?mode, "writing range");

        for (row_offset, cells) in values.iter().enumerate() {
            for (col_offset, value) in cells.iter().enumerate() {
                let stored = match (mode, value) {
                    (InputMode::Raw, value) => CellValue::Literal(value.as_str().to_string()),
                    (InputMode::UserEntered, CellValue::Literal(text)) if text.starts_with('=') => {
                        CellValue::Formula(text.clone())
                    }
                    (InputMode::UserEntered, value) => value.clone(),
                };
                let cell = sheet.cell_mut(
                    rect.start_row() + row_offset as u32,
                    rect.start_col() + col_offset as u32,
                );
                cell.value = Some(stored);
                cell.runs.clear();
            }
        }
        Ok(())
    }

    fn batch_update(&mut self, ops: &[StructuralOp]) -> Result<()> {
        for op in ops {
            debug!(?op, "applying structural op");
            self.apply(op)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start_row: u32, end_row: u32, start_col: u32, end_col: u32) -> GridRange {
        Rectangle::new(start_row, end_row, start_col, end_col)
            .expect("valid rectangle")
            .into()
    }

    fn workbook_with_two_tables() -> (MemoryWorkbook, SheetId) {
        let mut workbook = MemoryWorkbook::new();
        let sheet = workbook.add_sheet("Data");
        workbook.add_table(sheet, "Upper", "t-upper", range(0, 3, 0, 2)).unwrap();
        workbook.add_table(sheet, "Lower", "t-lower", range(5, 7, 0, 2)).unwrap();
        (workbook, sheet)
    }

    fn declared(workbook: &MemoryWorkbook, name: &str) -> GridRange {
        workbook.sheets()[0]
            .tables
            .iter()
            .find(|table| table.name == name)
            .map(|table| table.range)
            .expect("table declared")
    }

    #[test]
    fn insert_shifts_tables_below_and_grows_spanning_tables() {
        let (mut workbook, sheet) = workbook_with_two_tables();
        workbook
            .batch_update(&[StructuralOp::InsertRows {
                sheet_id: sheet,
                start: 1,
                end: 3,
                inherit_from_before: false,
            }])
            .unwrap();

        assert_eq!(declared(&workbook, "Upper"), range(0, 5, 0, 2));
        assert_eq!(declared(&workbook, "Lower"), range(7, 9, 0, 2));
    }

    #[test]
    fn delete_shrinks_and_shifts_tables() {
        let (mut workbook, sheet) = workbook_with_two_tables();
        workbook
            .batch_update(&[StructuralOp::DeleteRows { sheet_id: sheet, start: 1, end: 3 }])
            .unwrap();

        assert_eq!(declared(&workbook, "Upper"), range(0, 1, 0, 2));
        assert_eq!(declared(&workbook, "Lower"), range(3, 5, 0, 2));
    }

    #[test]
    fn deleting_a_whole_table_drops_it() {
        let (mut workbook, sheet) = workbook_with_two_tables();
        workbook
            .batch_update(&[StructuralOp::DeleteRows { sheet_id: sheet, start: 4, end: 8 }])
            .unwrap();
        assert_eq!(workbook.sheets()[0].tables.len(), 1);
    }

    #[test]
    fn user_entered_mode_turns_equals_prefix_into_formula() {
        let mut workbook = MemoryWorkbook::new();
        workbook.add_sheet("Calc");
        workbook
            .write_range(
                "Calc!A1:B1",
                &[vec!["=1+1".into(), "plain".into()]],
                InputMode::UserEntered,
            )
            .unwrap();
        let sheet = workbook.sheet("Calc").unwrap();
        assert_eq!(sheet.cell(0, 0).unwrap().value, Some(CellValue::Formula("=1+1".into())));

        workbook
            .write_range("Calc!A2", &[vec![CellValue::Formula("=2".into())]], InputMode::Raw)
            .unwrap();
        let sheet = workbook.sheet("Calc").unwrap();
        assert_eq!(sheet.cell(1, 0).unwrap().value, Some(CellValue::Literal("=2".into())));
    }

    #[test]
    fn read_pads_missing_cells_with_empty_strings() {
        let mut workbook = MemoryWorkbook::new();
        let sheet = workbook.add_sheet("Sparse");
        workbook.set_values(sheet, 1, 1, &[vec!["x"]]).unwrap();
        let rows = workbook.read_range("Sparse!A1:C2").unwrap();
        assert_eq!(rows, vec![vec!["", "", ""], vec!["", "x", ""]]);
    }

    #[test]
    fn rejected_op_leaves_earlier_ops_applied() {
        let (mut workbook, sheet) = workbook_with_two_tables();
        workbook.reject_ops("delete_rows");
        let result = workbook.batch_update(&[
            StructuralOp::InsertRows {
                sheet_id: sheet,
                start: 1,
                end: 2,
                inherit_from_before: false,
            },
            StructuralOp::DeleteRows { sheet_id: sheet, start: 2, end: 3 },
        ]);
        assert!(result.is_err());
        assert_eq!(declared(&workbook, "Upper"), range(0, 4, 0, 2));
    }

    #[test]
    fn rich_text_runs_must_fit_the_value() {
        let mut workbook = MemoryWorkbook::new();
        let sheet = workbook.add_sheet("Notes");
        let cell = Rectangle::new(0, 1, 0, 1).unwrap();
        let run = TextFormatRun {
            start_index: 10,
            ..TextFormatRun::default()
        };
        let op = StructuralOp::UpdateRichText {
            sheet_id: sheet,
            range: cell,
            value: "short".into(),
            runs: vec![run],
        };
        assert!(workbook.batch_update(&[op]).is_err());
    }

    #[test]
    fn push_sheet_rejects_taken_ids_and_titles() {
        let mut workbook = MemoryWorkbook::new();
        workbook.push_sheet(3, "Plan").unwrap();
        assert!(matches!(workbook.push_sheet(3, "Other"), Err(TableError::InvalidWorkbook(_))));
        assert!(matches!(workbook.push_sheet(4, "Plan"), Err(TableError::InvalidWorkbook(_))));
        assert_eq!(workbook.add_sheet("Next"), 4);
        assert_eq!(workbook.sheets().len(), 2);
    }

    #[test]
    fn inserts_past_the_sheet_limit_are_rejected() {
        let (mut workbook, sheet) = workbook_with_two_tables();
        let op = StructuralOp::InsertRows {
            sheet_id: sheet,
            start: 1,
            end: MAX_ROWS,
            inherit_from_before: false,
        };
        assert!(matches!(workbook.batch_update(&[op]), Err(TableError::Backend(_))));
        assert_eq!(declared(&workbook, "Lower"), range(5, 7, 0, 2));
    }
}
