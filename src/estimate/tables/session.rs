use std::collections::BTreeMap;

use tracing::debug;

use crate::estimate::tables::backend::SpreadsheetBackend;
use crate::estimate::tables::config::Settings;
use crate::estimate::tables::error::Result;
use crate::estimate::tables::headers::{HeaderIndex, resolve_headers};
use crate::estimate::tables::model::{Rectangle, SheetId, TableDescriptor, TextFormatRun};
use crate::estimate::tables::records::{self, FormulaCell, RowMap, TableRecord};
use crate::estimate::tables::reconcile;
use crate::estimate::tables::registry::TableRegistry;

/// State for one execution against one spreadsheet: the backend, the table
/// memo, and the settings.
///
/// Every mutating call takes `&mut self`, so a session is the single writer
/// of its backend. The memo is only updated for the table a call resized;
/// other tables on the same sheet need [`Session::refresh_tables`] before
/// they are trusted again.
#[derive(Debug)]
pub struct Session<B> {
    backend: B,
    registry: TableRegistry,
    settings: Settings,
}

impl<B: SpreadsheetBackend> Session<B> {
    pub fn new(backend: B, settings: Settings) -> Self {
        Self {
            backend,
            registry: TableRegistry::new(),
            settings,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    pub fn list_tables(&mut self) -> Result<BTreeMap<String, TableDescriptor>> {
        self.registry.list_tables(&self.backend)
    }

    pub fn get_table(&mut self, name: &str) -> Result<TableDescriptor> {
        self.registry.get_table(&self.backend, name)
    }

    /// Forgets every memoized descriptor.
    pub fn refresh_tables(&mut self) {
        debug!("table registry invalidated");
        self.registry.invalidate();
    }

    pub fn headers(&mut self, name: &str) -> Result<HeaderIndex> {
        let table = self.get_table(name)?;
        resolve_headers(&self.backend, &table, None)
    }

    /// Resizes `table` to `target_row_count` data rows.
    pub fn reconcile(
        &mut self,
        table: &TableDescriptor,
        target_row_count: u32,
    ) -> Result<TableDescriptor> {
        let updated = reconcile::reconcile(
            &mut self.backend,
            table,
            target_row_count,
            self.settings.inherit_from_before,
        )?;
        self.registry.record(&updated);
        Ok(updated)
    }

    /// Reads the named table, header row first.
    pub fn read_rows(&mut self, name: &str) -> Result<Vec<Vec<String>>> {
        let table = self.get_table(name)?;
        records::read_rows(&self.backend, &table)
    }

    pub fn load_records<R: TableRecord>(&mut self, name: &str) -> Result<Vec<R>> {
        let table = self.get_table(name)?;
        records::load_records(&self.backend, &table)
    }

    pub fn load_maps(&mut self, name: &str) -> Result<Vec<RowMap>> {
        let table = self.get_table(name)?;
        let rows = records::read_rows(&self.backend, &table)?;
        let headers = resolve_headers(&self.backend, &table, Some(rows.as_slice()))?;
        Ok(records::maps_from_rows(&headers, &rows[1..]))
    }

    pub fn write_records<R: TableRecord>(
        &mut self,
        name: &str,
        rows: &[R],
        formulas: &[FormulaCell],
    ) -> Result<TableDescriptor> {
        let table = self.get_table(name)?;
        let updated = records::write_records(
            &mut self.backend,
            &table,
            rows,
            formulas,
            self.settings.inherit_from_before,
        )?;
        self.registry.record(&updated);
        Ok(updated)
    }

    pub fn write_maps(
        &mut self,
        name: &str,
        rows: &[RowMap],
        formulas: &[FormulaCell],
    ) -> Result<TableDescriptor> {
        let table = self.get_table(name)?;
        let updated = records::write_maps(
            &mut self.backend,
            &table,
            rows,
            formulas,
            self.settings.inherit_from_before,
        )?;
        self.registry.record(&updated);
        Ok(updated)
    }

    pub fn write_rich_text(
        &mut self,
        sheet_id: SheetId,
        range: Rectangle,
        value: &str,
        runs: Vec<TextFormatRun>,
    ) -> Result<()> {
        records::write_rich_text(&mut self.backend, sheet_id, range, value, runs)
    }
}
