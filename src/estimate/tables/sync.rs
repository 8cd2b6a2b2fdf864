use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument};

use crate::estimate::tables::address;
use crate::estimate::tables::backend::MemoryWorkbook;
use crate::estimate::tables::config::Settings;
use crate::estimate::tables::error::{Result, TableError};
use crate::estimate::tables::io::{excel_read, excel_write};
use crate::estimate::tables::model::TableDescriptor;
use crate::estimate::tables::records::{FormulaCell, RowMap};
use crate::estimate::tables::session::Session;

/// One line of the table listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSummary {
    pub name: String,
    pub id: String,
    pub sheet: String,
    pub address: String,
    pub data_rows: u32,
}

impl From<&TableDescriptor> for TableSummary {
    fn from(table: &TableDescriptor) -> Self {
        Self {
            name: table.name.clone(),
            id: table.id.clone(),
            sheet: table.sheet_title.clone(),
            address: address::to_address(&table.rectangle, &table.sheet_title),
            data_rows: table.data_row_count(),
        }
    }
}

/// Rows to write, either as a bare array or together with formulas.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RecordsPayload {
    Rows(Vec<BTreeMap<String, Value>>),
    WithFormulas {
        rows: Vec<BTreeMap<String, Value>>,
        #[serde(default)]
        formulas: Vec<FormulaCell>,
    },
}

/// Opens an `.xlsx` workbook as a fresh session.
pub fn open_session(input: &Path, settings: &Settings) -> Result<Session<MemoryWorkbook>> {
    if !input.exists() {
        return Err(TableError::MissingInput(input.to_path_buf()));
    }
    let workbook = excel_read::read_workbook(input, &settings.metadata_sheet)?;
    Ok(Session::new(workbook, settings.clone()))
}

/// Saves the session's workbook, consuming the session.
pub fn save_session(session: Session<MemoryWorkbook>, output: &Path) -> Result<()> {
    let metadata_sheet = session.settings().metadata_sheet.clone();
    excel_write::write_workbook(output, &session.into_backend(), &metadata_sheet)
}

/// Lists every declared table in the workbook.
#[instrument(level = "info", skip_all, fields(input = %input.display()))]
pub fn list_tables(input: &Path, settings: &Settings) -> Result<Vec<TableSummary>> {
    let mut session = open_session(input, settings)?;
    let tables = session.list_tables()?;
    info!(table_count = tables.len(), "listed tables");
    Ok(tables.values().map(TableSummary::from).collect())
}

/// Reads a table as header-keyed rows.
#[instrument(level = "info", skip_all, fields(input = %input.display(), table = name))]
pub fn read_table(input: &Path, name: &str, settings: &Settings) -> Result<Vec<RowMap>> {
    let mut session = open_session(input, settings)?;
    let rows = session.load_maps(name)?;
    info!(row_count = rows.len(), "read table rows");
    Ok(rows)
}

/// Replaces a table's rows with the JSON records at `records` and saves the
/// workbook to `output`.
#[instrument(
    level = "info",
    skip_all,
    fields(input = %input.display(), output = %output.display(), table = name)
)]
pub fn write_table(
    input: &Path,
    output: &Path,
    name: &str,
    records: &Path,
    settings: &Settings,
) -> Result<TableSummary> {
    if !records.exists() {
        return Err(TableError::MissingInput(records.to_path_buf()));
    }
    let source = fs::read_to_string(records)?;
    let (rows, formulas) = parse_records(&source)?;

    let mut session = open_session(input, settings)?;
    let updated = session.write_maps(name, &rows, &formulas)?;
    info!(row_count = rows.len(), "table rows written");

    let summary = TableSummary::from(&updated);
    save_session(session, output)?;
    Ok(summary)
}

/// Resizes a table to `rows` data rows without writing values.
#[instrument(
    level = "info",
    skip_all,
    fields(input = %input.display(), output = %output.display(), table = name, rows = rows)
)]
pub fn resize_table(
    input: &Path,
    output: &Path,
    name: &str,
    rows: u32,
    settings: &Settings,
) -> Result<TableSummary> {
    let mut session = open_session(input, settings)?;
    let table = session.get_table(name)?;
    let updated = session.reconcile(&table, rows)?;

    let summary = TableSummary::from(&updated);
    save_session(session, output)?;
    Ok(summary)
}

fn parse_records(source: &str) -> Result<(Vec<RowMap>, Vec<FormulaCell>)> {
    let (rows, formulas) = match serde_json::from_str::<RecordsPayload>(source)? {
        RecordsPayload::Rows(rows) => (rows, Vec::new()),
        RecordsPayload::WithFormulas { rows, formulas } => (rows, formulas),
    };

    let rows = rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|(key, value)| Ok((key, value_to_cell(value)?)))
                .collect::<Result<RowMap>>()
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((rows, formulas))
}

fn value_to_cell(value: Value) -> Result<String> {
    Ok(match value {
        Value::Null => String::new(),
        Value::Bool(value) => value.to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(value) => value,
        other => {
            return Err(TableError::InvalidRecord(format!(
                "nested value {other} cannot be written to a cell"
            )));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_arrays_and_formula_payloads_parse() {
        let (rows, formulas) = parse_records(r#"[{"Task": "Design", "Points": 3, "Done": null}]"#)
            .expect("bare array");
        assert_eq!(rows[0]["Points"], "3");
        assert_eq!(rows[0]["Done"], "");
        assert!(formulas.is_empty());

        let (rows, formulas) = parse_records(
            r#"{"rows": [{"Task": "Build"}], "formulas": [{"row": 0, "column": "Points", "formula": "=1+2"}]}"#,
        )
        .expect("payload with formulas");
        assert_eq!(rows.len(), 1);
        assert_eq!(formulas[0].formula, "=1+2");
    }

    #[test]
    fn nested_values_are_rejected() {
        assert!(matches!(
            parse_records(r#"[{"Task": ["a", "b"]}]"#),
            Err(TableError::InvalidRecord(_))
        ));
    }
}
