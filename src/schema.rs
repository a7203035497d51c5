//! Database schema description used as prompt context.
//!
//! The description is loaded once at start-up and shared read-only by the
//! question corrector and the SQL generator. Two sources are supported:
//!
//! - a CSV file with table, column and data type columns (headers are
//!   detected by case-insensitive substring: "table", "column", "type")
//! - any other file, read verbatim as plain text

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while loading a schema description.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Schema file not found: {0}")]
    NotFound(PathBuf),

    #[error("Could not detect Table/Column/Datatype columns. Found columns: {0:?}")]
    MissingColumns(Vec<String>),

    #[error("Schema CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Schema I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// Schema Description
// ============================================================================

/// Static text describing tables, columns and types.
///
/// Cheap to clone; the text is shared.
#[derive(Debug, Clone)]
pub struct SchemaDescription {
    text: Arc<str>,
}

impl SchemaDescription {
    /// Wrap an already-rendered description.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: Arc::from(text.into()),
        }
    }

    /// Load a description from disk, choosing the parser by file extension.
    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        if !path.exists() {
            return Err(SchemaError::NotFound(path.to_path_buf()));
        }

        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));

        if is_csv {
            let file = std::fs::File::open(path)?;
            Self::from_csv_reader(file)
        } else {
            Ok(Self::from_text(std::fs::read_to_string(path)?))
        }
    }

    /// Render a `table, column, type` CSV into grouped prompt text.
    ///
    /// Tables appear in first-seen order; columns keep file order.
    pub fn from_csv_reader<R: std::io::Read>(reader: R) -> Result<Self, SchemaError> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

        let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
        let find = |needle: &str| {
            headers
                .iter()
                .position(|h| h.to_lowercase().contains(needle))
        };

        let (Some(table_idx), Some(column_idx), Some(type_idx)) =
            (find("table"), find("column"), find("type"))
        else {
            return Err(SchemaError::MissingColumns(headers));
        };

        let mut tables: IndexMap<String, Vec<(String, String)>> = IndexMap::new();
        for record in rdr.records() {
            let record = record?;
            let field = |i: usize| record.get(i).unwrap_or_default().to_string();
            tables
                .entry(field(table_idx))
                .or_default()
                .push((field(column_idx), field(type_idx)));
        }

        let mut text = String::new();
        for (table, columns) in &tables {
            text.push_str(&format!("\n\nTable: {table}\nColumns:\n"));
            for (column, data_type) in columns {
                text.push_str(&format!("  - {column} ({data_type})\n"));
            }
        }

        Ok(Self::from_text(text.trim()))
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for SchemaDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

// ============================================================================
// Tests
// ============================================================================
