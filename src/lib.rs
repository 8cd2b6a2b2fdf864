//! Core library for the estimate-tables command line application.
//!
//! The library owns the structured-table engine behind the estimation
//! workflow: addresses live in [`estimate::tables::address`], table lookup in
//! [`estimate::tables::registry`], header resolution in
//! [`estimate::tables::headers`], row-count reconciliation in
//! [`estimate::tables::reconcile`], and typed reads and writes in
//! [`estimate::tables::records`]. Backends implement
//! [`estimate::tables::backend::SpreadsheetBackend`]; a [`Session`] ties one
//! backend to the per-execution table memo.

pub mod estimate;

pub use estimate::tables::session::Session;
pub use estimate::tables::{
    Result, TableError, address, backend, config, error, headers, io, model, reconcile, records,
    registry, session, sync,
};
