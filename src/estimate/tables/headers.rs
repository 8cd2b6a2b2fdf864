use std::collections::HashMap;

use tracing::trace;

use crate::estimate::tables::address;
use crate::estimate::tables::backend::SpreadsheetBackend;
use crate::estimate::tables::error::{Result, TableError};
use crate::estimate::tables::model::TableDescriptor;

/// Column names from a table's first row and their offsets relative to the
/// table's first column.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderIndex {
    table_name: String,
    column_names: Vec<String>,
    lookup: HashMap<String, usize>,
}

impl HeaderIndex {
    /// Builds the index from a header row. Names are trimmed; when a name
    /// repeats, its first column is used.
    pub fn from_row(table_name: &str, row: &[String]) -> Result<Self> {
        let column_names: Vec<String> = row.iter().map(|cell| cell.trim().to_string()).collect();
        if column_names.iter().all(String::is_empty) {
            return Err(TableError::EmptyTable(table_name.to_string()));
        }

        let mut lookup = HashMap::with_capacity(column_names.len());
        for (offset, name) in column_names.iter().enumerate() {
            if !name.is_empty() {
                lookup.entry(name.clone()).or_insert(offset);
            }
        }

        Ok(Self {
            table_name: table_name.to_string(),
            column_names,
            lookup,
        })
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Number of columns covered by the header row.
    pub fn width(&self) -> usize {
        self.column_names.len()
    }

    /// Offset of `name` within the table. Exact and case-sensitive.
    pub fn offset(&self, name: &str) -> Result<usize> {
        self.lookup
            .get(name)
            .copied()
            .ok_or_else(|| TableError::HeaderNotFound {
                table: self.table_name.clone(),
                column: name.to_string(),
            })
    }

    /// Resolves every field up front so row access never hits an unknown
    /// column.
    pub fn column_map(&self, fields: &[&str]) -> Result<ColumnMap> {
        let offsets = fields
            .iter()
            .map(|field| self.offset(field))
            .collect::<Result<Vec<_>>>()?;
        Ok(ColumnMap { offsets })
    }
}

/// Offsets of a fixed field list, in field order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    offsets: Vec<usize>,
}

impl ColumnMap {
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Picks the tracked fields out of a raw row. Short rows yield empty
    /// strings for the missing cells.
    pub fn extract(&self, row: &[String]) -> Vec<String> {
        self.offsets
            .iter()
            .map(|offset| row.get(*offset).cloned().unwrap_or_default())
            .collect()
    }
}

/// Builds the header index for `table`, reusing `prefetched` rows (header
/// first) when the caller has already read the table.
pub fn resolve_headers<B: SpreadsheetBackend + ?Sized>(
    backend: &B,
    table: &TableDescriptor,
    prefetched: Option<&[Vec<String>]>,
) -> Result<HeaderIndex> {
    if let Some(header) = prefetched.and_then(|rows| rows.first()) {
        return HeaderIndex::from_row(&table.name, header);
    }

    let header_address = address::to_address(&table.rectangle.header_row(), &table.sheet_title);
    trace!(table = %table.name, address = %header_address, "reading header row");
    let rows = backend.read_range(&header_address)?;
    let header = rows
        .first()
        .ok_or_else(|| TableError::EmptyTable(table.name.clone()))?;
    HeaderIndex::from_row(&table.name, header)
}
