use std::collections::HashMap;
use std::path::Path;

use calamine::{DataType, Reader, Xlsx, open_workbook};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::estimate::tables::backend::MemoryWorkbook;
use crate::estimate::tables::error::{Result, TableError};
use crate::estimate::tables::io::{METADATA_COLUMNS, SHEET_KIND, TABLE_KIND};
use crate::estimate::tables::model::{CellValue, GridRange, SheetId};

/// A table row of the metadata sheet.
#[derive(Debug, Clone, PartialEq)]
struct TableEntry {
    sheet_title: String,
    name: String,
    id: String,
    range: GridRange,
}

/// Loads an `.xlsx` workbook written by [`excel_write`](super::excel_write)
/// (or prepared by hand following the same metadata convention).
///
/// Formula cells come back as formulas, not as their cached results.
pub fn read_workbook(path: &Path, metadata_sheet: &str) -> Result<MemoryWorkbook> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;

    let metadata_range = read_required_sheet(&mut workbook, metadata_sheet)?;
    let (sheet_ids, tables) = parse_metadata(&metadata_range)?;

    let mut memory = MemoryWorkbook::new();
    let mut ids_by_title: HashMap<String, SheetId> = HashMap::new();
    // Sheets without a metadata row are numbered above every declared id.
    let mut next_free_id = sheet_ids.values().map(|id| u64::from(*id) + 1).max().unwrap_or(0);

    let sheet_names = workbook.sheet_names().to_vec();
    for title in sheet_names {
        if title == metadata_sheet {
            continue;
        }
        let id = match sheet_ids.get(&title) {
            Some(id) => *id,
            None => {
                let id = SheetId::try_from(next_free_id).map_err(|_| {
                    TableError::InvalidWorkbook(format!("no sheet id left for '{title}'"))
                })?;
                next_free_id += 1;
                id
            }
        };
        memory.push_sheet(id, title.clone())?;
        ids_by_title.insert(title.clone(), id);

        let range = read_required_sheet(&mut workbook, &title)?;
        load_values(&mut memory, id, &range)?;

        if let Some(formulas) = workbook.worksheet_formula(&title) {
            load_formulas(&mut memory, id, &formulas?)?;
        }
    }

    for table in tables {
        let sheet_id = *ids_by_title.get(&table.sheet_title).ok_or_else(|| {
            TableError::InvalidWorkbook(format!(
                "table '{}' declared on missing sheet '{}'",
                table.name, table.sheet_title
            ))
        })?;
        memory.add_table(sheet_id, table.name, table.id, table.range)?;
    }

    debug!(
        path = %path.display(),
        sheet_count = memory.sheets().len(),
        "workbook loaded"
    );
    Ok(memory)
}

fn read_required_sheet<R: std::io::Read + std::io::Seek>(
    workbook: &mut Xlsx<R>,
    name: &str,
) -> Result<calamine::Range<DataType>> {
    let range_result = workbook
        .worksheet_range(name)
        .ok_or_else(|| TableError::InvalidWorkbook(format!("missing sheet '{name}'")))?;
    let range = range_result.map_err(TableError::from)?;
    Ok(range)
}

fn parse_metadata(
    range: &calamine::Range<DataType>,
) -> Result<(HashMap<String, SheetId>, Vec<TableEntry>)> {
    let mut sheet_ids = HashMap::new();
    let mut tables = Vec::new();

    let header_width = range.rows().next().map(|row| row.len()).unwrap_or(0);
    if header_width < METADATA_COLUMNS.len() {
        return Err(TableError::InvalidWorkbook(format!(
            "metadata sheet needs {} columns, found {header_width}",
            METADATA_COLUMNS.len()
        )));
    }

    for row in range.rows().skip(1) {
        let kind = cell_to_string(row.first());
        if kind.is_empty() {
            continue;
        }
        let sheet_title = cell_to_string(row.get(1));

        match kind.as_str() {
            SHEET_KIND => {
                let id = parse_bound(row.get(2)).ok_or_else(|| {
                    TableError::InvalidWorkbook(format!("sheet '{sheet_title}' has no id"))
                })?;
                if sheet_ids.insert(sheet_title.clone(), id).is_some() {
                    return Err(TableError::InvalidWorkbook(format!(
                        "sheet '{sheet_title}' is declared twice"
                    )));
                }
            }
            TABLE_KIND => {
                let name = cell_to_string(row.get(3));
                if name.is_empty() {
                    return Err(TableError::InvalidWorkbook(format!(
                        "unnamed table on sheet '{sheet_title}'"
                    )));
                }
                let id = match cell_to_string(row.get(4)) {
                    id if id.is_empty() => derive_table_id(&sheet_title, &name),
                    id => id,
                };
                let range = GridRange {
                    start_row: parse_bound(row.get(5)),
                    end_row: parse_bound(row.get(6)),
                    start_col: parse_bound(row.get(7)),
                    end_col: parse_bound(row.get(8)),
                };
                tables.push(TableEntry {
                    sheet_title,
                    name,
                    id,
                    range,
                });
            }
            other => {
                return Err(TableError::InvalidWorkbook(format!(
                    "unknown metadata kind '{other}'"
                )));
            }
        }
    }

    Ok((sheet_ids, tables))
}

fn load_values(
    memory: &mut MemoryWorkbook,
    sheet_id: SheetId,
    range: &calamine::Range<DataType>,
) -> Result<()> {
    let Some((row_start, col_start)) = range.start() else {
        return Ok(());
    };

    for (row_idx, row) in range.rows().enumerate() {
        for (col_idx, cell) in row.iter().enumerate() {
            let value = cell_to_string(Some(cell));
            if value.is_empty() {
                continue;
            }
            memory.set_cell(
                sheet_id,
                row_start + row_idx as u32,
                col_start + col_idx as u32,
                CellValue::Literal(value),
            )?;
        }
    }
    Ok(())
}

fn load_formulas(
    memory: &mut MemoryWorkbook,
    sheet_id: SheetId,
    range: &calamine::Range<String>,
) -> Result<()> {
    let Some((row_start, col_start)) = range.start() else {
        return Ok(());
    };

    for (row_idx, row) in range.rows().enumerate() {
        for (col_idx, formula) in row.iter().enumerate() {
            if formula.is_empty() {
                continue;
            }
            let formula = if formula.starts_with('=') {
                formula.clone()
            } else {
                format!("={formula}")
            };
            memory.set_cell(
                sheet_id,
                row_start + row_idx as u32,
                col_start + col_idx as u32,
                CellValue::Formula(formula),
            )?;
        }
    }
    Ok(())
}

/// Stable id for a table declared without one.
fn derive_table_id(sheet_title: &str, name: &str) -> String {
    let uuid = Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("{sheet_title}/{name}").as_bytes());
    warn!(table = %name, id = %uuid, "table declared without id; derived one");
    uuid.to_string()
}

fn parse_bound(cell: Option<&DataType>) -> Option<u32> {
    let value = cell_to_string(cell);
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<u32>().ok().or_else(|| {
        trimmed
            .parse::<f64>()
            .ok()
            .filter(|value| value.fract() == 0.0 && *value >= 0.0)
            .map(|value| value as u32)
    })
}

fn cell_to_string(cell: Option<&DataType>) -> String {
    match cell {
        Some(DataType::String(value)) => value.clone(),
        Some(DataType::Float(value)) => value.to_string(),
        Some(DataType::Int(value)) => value.to_string(),
        Some(DataType::Bool(value)) => value.to_string(),
        Some(DataType::Empty) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_accept_integral_floats_only() {
        assert_eq!(parse_bound(Some(&DataType::Float(4.0))), Some(4));
        assert_eq!(parse_bound(Some(&DataType::String(" 7 ".into()))), Some(7));
        assert_eq!(parse_bound(Some(&DataType::Float(1.5))), None);
        assert_eq!(parse_bound(Some(&DataType::Empty)), None);
        assert_eq!(parse_bound(None), None);
    }

    #[test]
    fn derived_ids_are_stable() {
        assert_eq!(derive_table_id("Members", "Members"), derive_table_id("Members", "Members"));
        assert_ne!(derive_table_id("Members", "Members"), derive_table_id("Tasks", "Members"));
    }
}
