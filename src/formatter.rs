//! Result cleaning and CSV persistence.
//!
//! Tables get normalized column names and light numeric cleaning: a text
//! column whose values are mostly numbers once currency signs, units and
//! thousands separators are stripped is coerced to floats. Free text is
//! converted to a two-column table by the model first.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::llm::{LlmClient, LlmError, strip_markdown_fences};
use crate::tabular::{Cell, TabularResult};

/// Default artifact path, relative to the working directory.
pub const DEFAULT_OUTPUT_PATH: &str = "formatted_output.csv";

/// A column is coerced to numeric when strictly more than this share of its
/// values look numeric after stripping.
pub const NUMERIC_RATIO_THRESHOLD: f64 = 0.6;

static NON_NUMERIC_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\d.]").expect("valid regex"));
static NUMERIC_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(\.\d+)?$").expect("valid regex"));

const TEXT_TO_CSV_PROMPT: &str = r#"You are a data parser. Convert raw text about items and quantities
into clean 2-column CSV format with headers:
ITEMNAME, TotalQuantity
Keep item names as text exactly; parse only numeric values as quantities.
Do NOT include markdown or explanations. Output only CSV."#;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("Unsupported input type: {0}. Expected text or an array of row objects.")]
    UnsupportedInput(String),

    #[error("Could not parse model output as CSV: {0}")]
    Parse(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Llm(#[from] LlmError),
}

// ============================================================================
// Input
// ============================================================================

/// What the formatter accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum FormatInput {
    Table(TabularResult),
    Text(String),
}

impl FormatInput {
    /// Accept a JSON string (raw text) or an array of row objects (a table).
    ///
    /// Anything else is rejected with [`FormatError::UnsupportedInput`]
    /// naming the JSON type.
    pub fn from_json(value: Value) -> Result<Self, FormatError> {
        match value {
            Value::String(text) => Ok(Self::Text(text)),
            Value::Array(items) => {
                if let Some(bad) = items.iter().find(|v| !v.is_object()) {
                    return Err(FormatError::UnsupportedInput(format!(
                        "array of {}",
                        json_type_name(bad)
                    )));
                }
                let rows: Vec<IndexMap<String, Value>> =
                    serde_json::from_value(Value::Array(items))
                        .map_err(|e| FormatError::UnsupportedInput(e.to_string()))?;
                Ok(Self::Table(TabularResult::from_json_rows(&rows)))
            }
            other => Err(FormatError::UnsupportedInput(
                json_type_name(&other).to_string(),
            )),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// Formatter
// ============================================================================

/// Cleans tables, persists them as CSV, and returns the cleaned copy.
#[derive(Clone)]
pub struct ResultFormatter {
    llm: Arc<dyn LlmClient>,
    output_path: PathBuf,
}

impl ResultFormatter {
    pub fn new(llm: Arc<dyn LlmClient>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            llm,
            output_path: output_path.into(),
        }
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Clean or convert `input`, overwrite the CSV artifact, and return its
    /// path together with the in-memory table.
    pub async fn format(&self, input: FormatInput) -> Result<(PathBuf, TabularResult), FormatError> {
        match input {
            FormatInput::Table(table) => self.format_table(&table),
            FormatInput::Text(text) => self.format_text(&text).await,
        }
    }

    pub fn format_table(
        &self,
        table: &TabularResult,
    ) -> Result<(PathBuf, TabularResult), FormatError> {
        let cleaned = clean_table(table);
        self.persist(&cleaned)?;
        Ok((self.output_path.clone(), cleaned))
    }

    /// Ask the model to turn free text into `ITEMNAME,TotalQuantity` CSV.
    ///
    /// The model's answer is parsed strictly: ragged rows or a missing header
    /// are reported as [`FormatError::Parse`].
    pub async fn format_text(&self, text: &str) -> Result<(PathBuf, TabularResult), FormatError> {
        let completion = self.llm.complete(TEXT_TO_CSV_PROMPT, text).await?;
        let csv_text = strip_markdown_fences(&completion.text);

        let table = TabularResult::read_csv(csv_text.as_bytes())
            .map_err(|e| FormatError::Parse(e.to_string()))?;
        if table.num_columns() == 0 {
            return Err(FormatError::Parse("no header row".into()));
        }
        if table.num_columns() != 2 {
            warn!(
                columns = table.num_columns(),
                "Model returned an unexpected number of columns"
            );
        }

        self.persist(&table)?;
        info!(path = %self.output_path.display(), "Raw text parsed and saved");
        Ok((self.output_path.clone(), table))
    }

    fn persist(&self, table: &TabularResult) -> Result<(), FormatError> {
        if let Some(parent) = self.output_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        table.write_csv_path(&self.output_path)?;
        Ok(())
    }
}

// ============================================================================
// Cleaning
// ============================================================================

/// Trim, replace spaces with underscores, upper-case.
pub fn normalize_column_name(name: &str) -> String {
    name.trim().replace(' ', "_").to_uppercase()
}

/// Return a cleaned copy of `table`.
///
/// Non-numeric columns are coerced to floats when more than
/// [`NUMERIC_RATIO_THRESHOLD`] of their values match `digits[.digits]` after
/// removing every character that is not a digit or `.`. Values that end up
/// empty or unparsable become nulls. Other columns are left as they are.
/// Rows that are entirely null are dropped afterwards.
pub fn clean_table(table: &TabularResult) -> TabularResult {
    let mut cleaned = table.clone();

    for column in &mut cleaned.columns {
        column.name = normalize_column_name(&column.name);

        if column.cells.is_empty() || column.is_numeric() {
            continue;
        }

        let stripped: Vec<String> = column
            .cells
            .iter()
            .map(|c| NON_NUMERIC_CHARS.replace_all(&c.to_string(), "").into_owned())
            .collect();

        let numeric_like = stripped.iter().filter(|s| NUMERIC_VALUE.is_match(s)).count();
        let ratio = numeric_like as f64 / column.cells.len() as f64;

        if ratio > NUMERIC_RATIO_THRESHOLD {
            column.cells = stripped
                .iter()
                .map(|s| s.parse::<f64>().map_or(Cell::Null, Cell::Float))
                .collect();
        }
    }

    cleaned.retain_rows(|row| !row.iter().all(|c| c.is_null()));
    cleaned
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use serde_json::json;

    fn text(values: &[&str]) -> Vec<Cell> {
        values.iter().map(|v| Cell::Text(v.to_string())).collect()
    }

    fn formatter(dir: &tempfile::TempDir, responses: Vec<String>) -> ResultFormatter {
        ResultFormatter::new(
            Arc::new(MockLlmClient::new(responses)),
            dir.path().join("formatted_output.csv"),
        )
    }

    #[test]
    fn test_normalize_column_name() {
        assert_eq!(normalize_column_name("  unit price "), "UNIT_PRICE");
        assert_eq!(normalize_column_name("Total Meters Processed"), "TOTAL_METERS_PROCESSED");
    }

    #[test]
    fn test_mostly_numeric_column_is_coerced() {
        let table = TabularResult::empty()
            .with_column("item", text(&["bolts", "nuts", "washers"]))
            .with_column("price", text(&["$12.50", "$8", "n/a"]));

        let cleaned = clean_table(&table);

        assert_eq!(cleaned.num_rows(), 3);
        assert_eq!(
            cleaned.column("PRICE").unwrap().cells,
            vec![Cell::Float(12.5), Cell::Float(8.0), Cell::Null]
        );
    }

    #[test]
    fn test_unparsable_residue_becomes_null() {
        let table = TabularResult::empty()
            .with_column("id", text(&["a", "b", "c", "d", "e"]))
            .with_column("v", text(&["1.2.3", "4", "5 kg", "6", "7"]));

        let cleaned = clean_table(&table);

        assert_eq!(
            cleaned.column("V").unwrap().cells,
            vec![
                Cell::Null,
                Cell::Float(4.0),
                Cell::Float(5.0),
                Cell::Float(6.0),
                Cell::Float(7.0)
            ]
        );
    }

    #[test]
    fn test_threshold_is_strict() {
        // 3 of 5 numeric-looking = 0.6, not above the threshold.
        let values = text(&["1", "2", "3", "north", "south"]);
        let table = TabularResult::empty().with_column("region", values.clone());

        let cleaned = clean_table(&table);

        assert_eq!(cleaned.column("REGION").unwrap().cells, values);
    }

    #[test]
    fn test_text_column_left_unchanged() {
        let values = text(&["Asda", "Tesco 2", "Lidl"]);
        let table = TabularResult::empty().with_column("customer", values.clone());

        assert_eq!(clean_table(&table).columns[0].cells, values);
    }

    #[test]
    fn test_numeric_column_left_unchanged() {
        let cells = vec![Cell::Int(3), Cell::Null, Cell::Float(1.5)];
        let table = TabularResult::empty()
            .with_column("qty", cells.clone())
            .with_column("name", text(&["a", "b", "c"]));

        assert_eq!(clean_table(&table).columns[0].cells, cells);
    }

    #[test]
    fn test_all_null_rows_are_dropped() {
        let table = TabularResult::empty()
            .with_column("qty", text(&["1", "", "3"]))
            .with_column("note", vec![Cell::Text("x".into()), Cell::Null, Cell::Null]);

        let cleaned = clean_table(&table);

        assert_eq!(cleaned.num_rows(), 2);
        assert_eq!(cleaned.column("QTY").unwrap().cells, vec![Cell::Float(1.0), Cell::Float(3.0)]);
        assert_eq!(cleaned.column("NOTE").unwrap().cells, vec![Cell::Text("x".into()), Cell::Null]);
    }

    #[test]
    fn test_format_table_persists_readable_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let formatter = formatter(&dir, vec![]);
        let table = TabularResult::empty()
            .with_column("item name", text(&["bolts", "nuts"]))
            .with_column("total", text(&["1,200", "35"]));

        let (path, cleaned) = formatter.format_table(&table).unwrap();

        assert_eq!(path, dir.path().join("formatted_output.csv"));
        let back = TabularResult::read_csv_path(&path).unwrap();
        assert_eq!(back.column_names(), vec!["ITEM_NAME", "TOTAL"]);
        assert_eq!(back, cleaned);
        assert_eq!(
            cleaned.column("TOTAL").unwrap().cells,
            vec![Cell::Float(1200.0), Cell::Float(35.0)]
        );
    }

    #[tokio::test]
    async fn test_format_text_parses_model_csv() {
        let dir = tempfile::tempdir().unwrap();
        let formatter = formatter(
            &dir,
            vec!["```csv\nITEMNAME,TotalQuantity\nBolts M6,120\nWashers,35\n```".into()],
        );

        let (path, table) = formatter
            .format(FormatInput::Text("120 bolts m6 and 35 washers".into()))
            .await
            .unwrap();

        assert_eq!(table.column_names(), vec!["ITEMNAME", "TotalQuantity"]);
        assert_eq!(
            table.column("TotalQuantity").unwrap().cells,
            vec![Cell::Int(120), Cell::Int(35)]
        );
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_format_text_rejects_ragged_csv() {
        let dir = tempfile::tempdir().unwrap();
        let formatter = formatter(
            &dir,
            vec!["Sure! Here is your data:\nITEMNAME,TotalQuantity\nBolts,1".into()],
        );

        let err = formatter
            .format(FormatInput::Text("bolts".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, FormatError::Parse(_)));
    }

    #[test]
    fn test_from_json_accepts_text_and_rows() {
        assert_eq!(
            FormatInput::from_json(json!("raw text")).unwrap(),
            FormatInput::Text("raw text".into())
        );

        let input = FormatInput::from_json(json!([{"a": 1}, {"a": 2}])).unwrap();
        let FormatInput::Table(table) = input else {
            panic!("expected a table");
        };
        assert_eq!(table.num_rows(), 2);
    }

    #[test]
    fn test_from_json_rejects_other_types() {
        for (value, name) in [
            (json!(42), "number"),
            (json!(true), "boolean"),
            (json!({"a": 1}), "object"),
            (json!(null), "null"),
            (json!([1, 2]), "array of number"),
        ] {
            match FormatInput::from_json(value) {
                Err(FormatError::UnsupportedInput(found)) => assert_eq!(found, name),
                other => panic!("expected UnsupportedInput, got {other:?}"),
            }
        }
    }
}
