use tracing::{debug, info, instrument};

use crate::estimate::tables::backend::SpreadsheetBackend;
use crate::estimate::tables::error::{ReconcileStep, Result, TableError};
use crate::estimate::tables::model::{StructuralOp, TableDescriptor};

/// Row arithmetic for resizing one table, derived from its current
/// descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconciliationPlan {
    /// First row below the single header row.
    pub data_start_row: u32,
    pub current_row_count: u32,
    pub target_row_count: u32,
    pub rows_to_insert: u32,
    pub rows_to_delete: u32,
}

impl ReconciliationPlan {
    pub fn new(table: &TableDescriptor, target_row_count: u32) -> Self {
        let current_row_count = table.data_row_count();
        Self {
            // A rectangle's start row is below its exclusive end, so this fits.
            data_start_row: table.rectangle.start_row() + 1,
            current_row_count,
            target_row_count,
            rows_to_insert: target_row_count,
            rows_to_delete: current_row_count,
        }
    }

    /// Ordered steps. New rows go in before the old ones are removed, so the
    /// table is never transiently empty while formulas reference it.
    ///
    /// Fails with `RowLimitExceeded` when any row index of the plan would not
    /// fit in a `u32`; nothing has been applied at that point.
    pub fn operations(
        &self,
        table: &TableDescriptor,
        inherit_from_before: bool,
    ) -> Result<Vec<(ReconcileStep, StructuralOp)>> {
        let too_large = || TableError::RowLimitExceeded {
            table: table.name.clone(),
            target: self.target_row_count,
        };
        let insert_end = self
            .data_start_row
            .checked_add(self.rows_to_insert)
            .ok_or_else(too_large)?;
        let delete_end = insert_end
            .checked_add(self.rows_to_delete)
            .ok_or_else(too_large)?;
        let resized = table
            .rectangle
            .with_data_rows(self.target_row_count)
            .ok_or_else(too_large)?;

        let mut steps = Vec::with_capacity(3);

        if self.rows_to_insert > 0 {
            steps.push((
                ReconcileStep::InsertRows,
                StructuralOp::InsertRows {
                    sheet_id: table.sheet_id,
                    start: self.data_start_row,
                    end: insert_end,
                    inherit_from_before,
                },
            ));
        }

        if self.rows_to_delete > 0 {
            // The old data now sits directly below the freshly inserted block.
            steps.push((
                ReconcileStep::DeleteRows,
                StructuralOp::DeleteRows {
                    sheet_id: table.sheet_id,
                    start: insert_end,
                    end: delete_end,
                },
            ));
        }

        steps.push((
            ReconcileStep::UpdateRange,
            StructuralOp::UpdateTableRange {
                table_id: table.id.clone(),
                range: resized.into(),
            },
        ));

        Ok(steps)
    }
}

/// Resizes the data region of `table` to exactly `target_row_count` rows and
/// returns the corrected descriptor.
///
/// This is a full replace: previous rows are discarded and the caller writes
/// the new values into the returned region. Each step is a separate backend
/// call; when one fails the earlier steps stay applied and the error names
/// the failing step. Retrying after such a failure would insert the rows a
/// second time.
#[instrument(
    level = "info",
    skip_all,
    fields(table = %table.name, target = target_row_count)
)]
pub fn reconcile<B: SpreadsheetBackend + ?Sized>(
    backend: &mut B,
    table: &TableDescriptor,
    target_row_count: u32,
    inherit_from_before: bool,
) -> Result<TableDescriptor> {
    let plan = ReconciliationPlan::new(table, target_row_count);
    let steps = plan.operations(table, inherit_from_before)?;
    info!(
        current = plan.current_row_count,
        insert = plan.rows_to_insert,
        delete = plan.rows_to_delete,
        "reconciling table rows"
    );

    let mut resized = table.rectangle;
    for (step, op) in steps {
        debug!(%step, ?op, "applying reconciliation step");
        backend
            .batch_update(std::slice::from_ref(&op))
            .map_err(|err| TableError::StructuralMutationFailed {
                table: table.name.clone(),
                step,
                reason: err.to_string(),
            })?;
        if let StructuralOp::UpdateTableRange { range, .. } = &op {
            resized = range.to_rectangle(&table.id)?;
        }
    }

    Ok(TableDescriptor {
        rectangle: resized,
        ..table.clone()
    })
}
