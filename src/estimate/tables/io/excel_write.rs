use std::collections::HashSet;
use std::path::Path;

use rust_xlsxwriter::{Format, FormatUnderline, Table, Workbook, Worksheet};
use tracing::debug;

use crate::estimate::tables::backend::{MemoryCell, MemorySheet, MemoryWorkbook};
use crate::estimate::tables::error::Result;
use crate::estimate::tables::io::{METADATA_COLUMNS, SHEET_KIND, TABLE_KIND};
use crate::estimate::tables::model::{CellValue, Rectangle, TextFormatRun};

/// Writes every sheet of `memory` plus the metadata sheet to `path`.
pub fn write_workbook(path: &Path, memory: &MemoryWorkbook, metadata_sheet: &str) -> Result<()> {
    let mut workbook_writer = Workbook::new();

    for sheet in memory.sheets() {
        let worksheet = workbook_writer.add_worksheet();
        worksheet.set_name(&sheet.title)?;
        write_cells(worksheet, sheet)?;
        add_native_tables(worksheet, sheet)?;
    }

    let metadata = workbook_writer.add_worksheet();
    metadata.set_name(metadata_sheet)?;
    write_metadata(metadata, memory)?;

    workbook_writer.save(path)?;
    debug!(path = %path.display(), sheet_count = memory.sheets().len(), "workbook saved");
    Ok(())
}

fn write_cells(worksheet: &mut Worksheet, sheet: &MemorySheet) -> Result<()> {
    for (row_idx, cells) in sheet.rows.iter().enumerate() {
        for (col_idx, cell) in cells.iter().enumerate() {
            let (row, col) = (row_idx as u32, col_idx as u16);
            match &cell.value {
                None => {}
                Some(CellValue::Formula(formula)) => {
                    worksheet.write_formula(row, col, formula.as_str())?;
                }
                Some(CellValue::Literal(text)) if !cell.runs.is_empty() => {
                    write_rich_text(worksheet, row, col, text, &cell.runs)?;
                }
                Some(CellValue::Literal(text)) => {
                    worksheet.write_string(row, col, text)?;
                }
            }
        }
    }
    Ok(())
}

/// Emits an Excel table over every declared region that has at least one
/// data row and a header Excel accepts as column names. Other regions stay
/// plain cells; the metadata sheet remains the source of truth for their
/// extent.
fn add_native_tables(worksheet: &mut Worksheet, sheet: &MemorySheet) -> Result<()> {
    for table in &sheet.tables {
        let Ok(rect) = table.range.to_rectangle(&table.id) else {
            continue;
        };
        if rect.row_count() < 2 {
            continue;
        }
        if !has_column_names(sheet, &rect) {
            debug!(table = %table.name, "header cannot name Excel columns; table left as cells");
            continue;
        }

        let mut excel_table = Table::new();
        excel_table.set_autofilter(true);
        worksheet.add_table(
            rect.start_row(),
            rect.start_col() as u16,
            rect.end_row() - 1,
            (rect.end_col() - 1) as u16,
            &excel_table,
        )?;
    }
    Ok(())
}

/// Excel rewrites a table's header row from its column names, so only plain
/// text headers that are non-blank and distinct ignoring case survive as-is.
fn has_column_names(sheet: &MemorySheet, rect: &Rectangle) -> bool {
    let mut seen = HashSet::new();
    (rect.start_col()..rect.end_col()).all(|col| {
        match sheet.cell(rect.start_row(), col) {
            Some(MemoryCell {
                value: Some(CellValue::Literal(name)),
                runs,
            }) if runs.is_empty() && !name.trim().is_empty() => seen.insert(name.to_lowercase()),
            _ => false,
        }
    })
}

fn write_metadata(worksheet: &mut Worksheet, memory: &MemoryWorkbook) -> Result<()> {
    for (col_idx, header) in METADATA_COLUMNS.iter().enumerate() {
        worksheet.write_string(0, col_idx as u16, *header)?;
    }

    let mut row = 1u32;
    for sheet in memory.sheets() {
        worksheet.write_string(row, 0, SHEET_KIND)?;
        worksheet.write_string(row, 1, &sheet.title)?;
        worksheet.write_number(row, 2, sheet.id as f64)?;
        row += 1;
    }

    for sheet in memory.sheets() {
        for table in &sheet.tables {
            worksheet.write_string(row, 0, TABLE_KIND)?;
            worksheet.write_string(row, 1, &sheet.title)?;
            worksheet.write_string(row, 3, &table.name)?;
            worksheet.write_string(row, 4, &table.id)?;
            let bounds = [
                table.range.start_row,
                table.range.end_row,
                table.range.start_col,
                table.range.end_col,
            ];
            for (offset, bound) in bounds.into_iter().enumerate() {
                if let Some(bound) = bound {
                    worksheet.write_number(row, 5 + offset as u16, bound as f64)?;
                }
            }
            row += 1;
        }
    }
    Ok(())
}

/// Rich text keeps bold runs; linked runs are rendered underlined since cell
/// rich text cannot carry per-run hyperlinks.
fn write_rich_text(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    text: &str,
    runs: &[TextFormatRun],
) -> Result<()> {
    let segments = rich_segments(text, runs);
    match segments.as_slice() {
        [] => {
            worksheet.write_string(row, col, text)?;
        }
        [(format, segment)] => {
            worksheet.write_string_with_format(row, col, segment, format)?;
        }
        _ => {
            let borrowed: Vec<(&Format, &str)> = segments
                .iter()
                .map(|(format, segment)| (format, segment.as_str()))
                .collect();
            worksheet.write_rich_string(row, col, &borrowed)?;
        }
    }
    Ok(())
}

fn rich_segments(text: &str, runs: &[TextFormatRun]) -> Vec<(Format, String)> {
    let chars: Vec<char> = text.chars().collect();
    let mut runs: Vec<&TextFormatRun> = runs.iter().collect();
    runs.sort_by_key(|run| run.start_index);

    let mut boundaries: Vec<(usize, Format)> = vec![(0, Format::new())];
    for run in runs {
        let mut format = Format::new();
        if run.bold {
            format = format.set_bold();
        }
        if run.link.is_some() {
            format = format.set_underline(FormatUnderline::Single);
        }
        let start = run.start_index.min(chars.len());
        match boundaries.last_mut() {
            Some(last) if last.0 == start => last.1 = format,
            _ => boundaries.push((start, format)),
        }
    }

    let mut segments = Vec::with_capacity(boundaries.len());
    for (idx, (start, format)) in boundaries.iter().enumerate() {
        let end = boundaries.get(idx + 1).map(|next| next.0).unwrap_or(chars.len());
        if end > *start {
            segments.push((format.clone(), chars[*start..end].iter().collect()));
        }
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_split_at_run_boundaries() {
        let runs = vec![
            TextFormatRun {
                start_index: 6,
                bold: true,
                link: None,
            },
            TextFormatRun {
                start_index: 10,
                ..TextFormatRun::default()
            },
        ];
        let texts: Vec<String> = rich_segments("Hello 見積もり!", &runs)
            .into_iter()
            .map(|(_, text)| text)
            .collect();
        assert_eq!(texts, vec!["Hello ", "見積もり", "!"]);
    }

    #[test]
    fn run_at_zero_replaces_default_segment() {
        let runs = vec![TextFormatRun {
            start_index: 0,
            bold: true,
            link: None,
        }];
        assert_eq!(rich_segments("all bold", &runs).len(), 1);
    }
}
