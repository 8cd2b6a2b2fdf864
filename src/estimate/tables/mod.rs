pub mod address;
pub mod backend;
pub mod config;
pub mod error;
pub mod headers;
pub mod io;
pub mod model;
pub mod reconcile;
pub mod records;
pub mod registry;
pub mod session;
pub mod sync;

pub use error::{Result, TableError};
