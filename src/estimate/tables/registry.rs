use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::estimate::tables::backend::SpreadsheetBackend;
use crate::estimate::tables::error::{Result, TableError};
use crate::estimate::tables::model::{GridRange, SheetId, SheetTables, TableDescriptor};

/// A table as found while scanning, before its range is validated.
#[derive(Debug, Clone, PartialEq)]
struct ScannedTable {
    id: String,
    name: String,
    sheet_id: SheetId,
    sheet_title: String,
    range: GridRange,
}

impl ScannedTable {
    fn descriptor(&self) -> Result<TableDescriptor> {
        Ok(TableDescriptor {
            id: self.id.clone(),
            name: self.name.clone(),
            sheet_id: self.sheet_id,
            sheet_title: self.sheet_title.clone(),
            rectangle: self.range.to_rectangle(&self.id)?,
        })
    }
}

/// Name → table lookup, built from one scan of the backend and then reused
/// for the lifetime of the owning session.
///
/// The memo is never refreshed on its own. After rows are inserted or
/// deleted on a sheet, descriptors of the other tables on that sheet are
/// stale until [`TableRegistry::invalidate`] is called.
#[derive(Debug, Clone, Default)]
pub struct TableRegistry {
    tables: Option<BTreeMap<String, ScannedTable>>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every table keyed by name. Fails on the first table whose
    /// declared range is malformed.
    pub fn list_tables<B: SpreadsheetBackend + ?Sized>(
        &mut self,
        backend: &B,
    ) -> Result<BTreeMap<String, TableDescriptor>> {
        self.scanned(backend)?
            .iter()
            .map(|(name, table)| Ok((name.clone(), table.descriptor()?)))
            .collect()
    }

    /// Looks up a single table by its declared name.
    pub fn get_table<B: SpreadsheetBackend + ?Sized>(
        &mut self,
        backend: &B,
        name: &str,
    ) -> Result<TableDescriptor> {
        self.scanned(backend)?
            .get(name)
            .ok_or_else(|| TableError::TableNotFound(name.to_string()))?
            .descriptor()
    }

    /// Replaces the memoized entry for a table whose range the caller just
    /// corrected.
    pub fn record(&mut self, descriptor: &TableDescriptor) {
        if let Some(tables) = self.tables.as_mut() {
            tables.insert(
                descriptor.name.clone(),
                ScannedTable {
                    id: descriptor.id.clone(),
                    name: descriptor.name.clone(),
                    sheet_id: descriptor.sheet_id,
                    sheet_title: descriptor.sheet_title.clone(),
                    range: descriptor.rectangle.into(),
                },
            );
        }
    }

    /// Drops the memo so the next lookup rescans the backend.
    pub fn invalidate(&mut self) {
        self.tables = None;
    }

    fn scanned<B: SpreadsheetBackend + ?Sized>(
        &mut self,
        backend: &B,
    ) -> Result<&BTreeMap<String, ScannedTable>> {
        if self.tables.is_none() {
            let sheets = backend.list_sheets()?;
            self.tables = Some(scan(&sheets));
        }
        Ok(self.tables.get_or_insert_with(BTreeMap::new))
    }
}

/// Indexes declared tables by name. A duplicated name keeps the last table
/// scanned.
fn scan(sheets: &[SheetTables]) -> BTreeMap<String, ScannedTable> {
    let mut tables = BTreeMap::new();

    for sheet in sheets {
        for table in &sheet.tables {
            let scanned = ScannedTable {
                id: table.id.clone(),
                name: table.name.clone(),
                sheet_id: sheet.sheet_id,
                sheet_title: sheet.sheet_title.clone(),
                range: table.range,
            };
            if let Some(previous) = tables.insert(table.name.clone(), scanned) {
                warn!(
                    table = %table.name,
                    kept = %table.id,
                    dropped = %previous.id,
                    "duplicate table name; keeping the last one scanned"
                );
            }
        }
    }

    debug!(table_count = tables.len(), "table registry built");
    tables
}
