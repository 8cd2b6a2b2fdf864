use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::estimate::tables::error::{Result, TableError};

/// Sheet that stores table declarations inside `.xlsx` workbooks.
pub const DEFAULT_METADATA_SHEET: &str = "_tables";

/// Settings shared by one execution. Every field has a default, so a JSON
/// settings file only needs the keys it overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Name of the sheet holding table declarations in `.xlsx` files.
    pub metadata_sheet: String,
    /// Whether rows inserted during a reconciliation take their formatting
    /// from the header row instead of the first data row.
    pub inherit_from_before: bool,
    /// Default `tracing` filter directive, overridden by `RUST_LOG`.
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            metadata_sheet: DEFAULT_METADATA_SHEET.to_string(),
            inherit_from_before: false,
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Loads settings from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TableError::MissingInput(path.to_path_buf()));
        }
        let source = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&source)?;
        if settings.metadata_sheet.trim().is_empty() {
            return Err(TableError::InvalidWorkbook(
                "metadata sheet name must not be empty".to_string(),
            ));
        }
        debug!(path = %path.display(), ?settings, "settings loaded");
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"log_level": "debug"}"#).unwrap();
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.metadata_sheet, DEFAULT_METADATA_SHEET);
        assert!(!settings.inherit_from_before);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(serde_json::from_str::<Settings>(r#"{"metadata": "x"}"#).is_err());
    }
}
