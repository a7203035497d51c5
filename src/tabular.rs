//! In-memory tables of named, row-aligned columns.

use std::fmt;
use std::io::{Read, Write};
use std::path::Path;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

/// A single value in a [`TabularResult`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }

    /// Map a JSON scalar onto a cell. Nested values are kept as JSON text.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Text(b.to_string()),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => n.as_f64().map_or(Self::Null, Self::Float),
            },
            Value::String(s) => Self::Text(s.clone()),
            other => Self::Text(other.to_string()),
        }
    }
}

impl fmt::Display for Cell {
    /// Null renders as the empty string.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => f.write_str(&format_float(*x)),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Integral floats keep a trailing `.0` so they read back as floats.
fn format_float(x: f64) -> String {
    if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e15 {
        format!("{x:.1}")
    } else {
        x.to_string()
    }
}

/// A named column of cells.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub cells: Vec<Cell>,
}

impl Column {
    pub fn new(name: impl Into<String>, cells: Vec<Cell>) -> Self {
        Self {
            name: name.into(),
            cells,
        }
    }

    /// True when the column holds at least one number and nothing but numbers
    /// and nulls.
    pub fn is_numeric(&self) -> bool {
        self.cells.iter().any(Cell::is_numeric)
            && self.cells.iter().all(|c| c.is_null() || c.is_numeric())
    }
}

/// An ordered set of named, row-aligned columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TabularResult {
    pub columns: Vec<Column>,
}

impl TabularResult {
    /// A table with no columns and no rows.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builder-style column append.
    pub fn with_column(mut self, name: impl Into<String>, cells: Vec<Cell>) -> Self {
        self.columns.push(Column::new(name, cells));
        self
    }

    /// Build from a header row and row-major cells. Short rows are padded
    /// with nulls.
    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let mut columns: Vec<Column> = headers
            .into_iter()
            .map(|name| Column::new(name, Vec::with_capacity(rows.len())))
            .collect();

        for row in rows {
            let mut row = row.into_iter();
            for column in &mut columns {
                column.cells.push(row.next().unwrap_or(Cell::Null));
            }
        }

        Self { columns }
    }

    /// Build from JSON row objects. Columns appear in first-seen order and
    /// keys missing from a row become nulls.
    pub fn from_json_rows(rows: &[IndexMap<String, Value>]) -> Self {
        let mut headers: Vec<String> = Vec::new();
        for row in rows {
            for key in row.keys() {
                if !headers.contains(key) {
                    headers.push(key.clone());
                }
            }
        }

        let cells = rows
            .iter()
            .map(|row| {
                headers
                    .iter()
                    .map(|h| row.get(h).map_or(Cell::Null, Cell::from_json))
                    .collect()
            })
            .collect();

        Self::from_rows(headers, cells)
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, |c| c.cells.len())
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn row(&self, index: usize) -> Vec<&Cell> {
        self.columns.iter().map(|c| &c.cells[index]).collect()
    }

    /// Keep only the rows for which `keep` returns true.
    pub fn retain_rows<F>(&mut self, mut keep: F)
    where
        F: FnMut(&[&Cell]) -> bool,
    {
        let mask: Vec<bool> = (0..self.num_rows()).map(|i| keep(&self.row(i))).collect();
        for column in &mut self.columns {
            let mut flags = mask.iter();
            column.cells.retain(|_| *flags.next().unwrap_or(&true));
        }
    }

    // ------------------------------------------------------------------------
    // CSV
    // ------------------------------------------------------------------------

    /// Write the table as CSV with a header row. Nulls are empty fields.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(self.column_names())?;
        for i in 0..self.num_rows() {
            wtr.write_record(self.row(i).iter().map(|c| c.to_string()))?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn write_csv_path(&self, path: &Path) -> Result<(), csv::Error> {
        let file = std::fs::File::create(path)?;
        self.write_csv(file)
    }

    /// Read CSV with a header row, typing each column by its contents.
    ///
    /// Rows with a different field count than the header are an error.
    pub fn read_csv<R: Read>(reader: R) -> Result<Self, csv::Error> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();

        let mut raw: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
        for record in rdr.records() {
            let record = record?;
            for (column, field) in raw.iter_mut().zip(record.iter()) {
                column.push(field.to_string());
            }
        }

        let columns = headers
            .into_iter()
            .zip(raw)
            .map(|(name, values)| Column::new(name, infer_cells(values)))
            .collect();

        Ok(Self { columns })
    }

    pub fn read_csv_path(path: &Path) -> Result<Self, csv::Error> {
        let file = std::fs::File::open(path)?;
        Self::read_csv(file)
    }

    // ------------------------------------------------------------------------
    // Text rendering
    // ------------------------------------------------------------------------

    /// Render as a right-aligned plain-text table without an index column.
    pub fn render(&self) -> String {
        if self.columns.is_empty() {
            return "(no columns)".to_string();
        }

        let rendered: Vec<Vec<String>> = self
            .columns
            .iter()
            .map(|c| c.cells.iter().map(Cell::to_string).collect())
            .collect();

        let widths: Vec<usize> = self
            .columns
            .iter()
            .zip(&rendered)
            .map(|(col, cells)| {
                cells
                    .iter()
                    .map(|s| s.chars().count())
                    .chain(std::iter::once(col.name.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let line = |values: Vec<&str>| -> String {
            values
                .iter()
                .zip(&widths)
                .map(|(v, &w)| format!("{v:>w$}"))
                .collect::<Vec<_>>()
                .join(" ")
        };

        let mut lines = vec![line(self.column_names())];
        for i in 0..self.num_rows() {
            lines.push(line(rendered.iter().map(|c| c[i].as_str()).collect()));
        }
        if self.is_empty() {
            lines.push("(no rows)".to_string());
        }
        lines.join("\n")
    }
}

impl fmt::Display for TabularResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Type raw text values: all integers → Int, all numbers → Float, otherwise
/// Text. Empty values are null in every case.
fn infer_cells(values: Vec<String>) -> Vec<Cell> {
    let non_empty = || values.iter().filter(|v| !v.is_empty());

    if non_empty().all(|v| v.parse::<i64>().is_ok()) {
        return values
            .iter()
            .map(|v| v.parse().map_or(Cell::Null, Cell::Int))
            .collect();
    }
    if non_empty().all(|v| v.parse::<f64>().is_ok() && v.bytes().any(|b| b.is_ascii_digit())) {
        return values
            .iter()
            .map(|v| v.parse().map_or(Cell::Null, Cell::Float))
            .collect();
    }

    values
        .into_iter()
        .map(|v| if v.is_empty() { Cell::Null } else { Cell::Text(v) })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> TabularResult {
        TabularResult::empty()
            .with_column(
                "ITEM",
                vec![
                    Cell::Text("bolts".into()),
                    Cell::Text("nuts".into()),
                    Cell::Null,
                ],
            )
            .with_column("QTY", vec![Cell::Int(12), Cell::Null, Cell::Null])
            .with_column("PRICE", vec![Cell::Float(2.5), Cell::Float(8.0), Cell::Null])
    }

    #[test]
    fn test_shape() {
        let table = sample();
        assert_eq!(table.num_columns(), 3);
        assert_eq!(table.num_rows(), 3);
        assert!(!table.is_empty());
        assert!(TabularResult::empty().is_empty());
    }

    #[test]
    fn test_column_is_numeric() {
        let table = sample();
        assert!(!table.column("ITEM").unwrap().is_numeric());
        assert!(table.column("QTY").unwrap().is_numeric());
        assert!(!Column::new("X", vec![Cell::Null]).is_numeric());
    }

    #[test]
    fn test_retain_rows() {
        let mut table = sample();
        table.retain_rows(|row| !row.iter().all(|c| c.is_null()));
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.column("PRICE").unwrap().cells[1], Cell::Float(8.0));
    }

    #[test]
    fn test_csv_round_trip() {
        let table = sample();
        let mut buf = Vec::new();
        table.write_csv(&mut buf).unwrap();

        let text = String::from_utf8(buf.clone()).unwrap();
        assert_eq!(text, "ITEM,QTY,PRICE\nbolts,12,2.5\nnuts,,8.0\n,,\n");

        let back = TabularResult::read_csv(buf.as_slice()).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn test_read_csv_rejects_ragged_rows() {
        let result = TabularResult::read_csv("a,b\n1,2\n3\n".as_bytes());
        assert!(result.is_err());
    }

    #[test]
    fn test_read_csv_infers_types() {
        let table = TabularResult::read_csv("name,n,x\nwidget,1,1\ngizmo,2,2.5\n".as_bytes()).unwrap();
        assert_eq!(table.column("n").unwrap().cells, vec![Cell::Int(1), Cell::Int(2)]);
        assert_eq!(
            table.column("x").unwrap().cells,
            vec![Cell::Float(1.0), Cell::Float(2.5)]
        );
        assert_eq!(table.column("name").unwrap().cells[0], Cell::Text("widget".into()));
    }

    #[test]
    fn test_from_json_rows_unions_keys() {
        let rows: Vec<IndexMap<String, Value>> = serde_json::from_value(json!([
            {"item": "bolts", "qty": 3},
            {"qty": 1.5, "note": true}
        ]))
        .unwrap();

        let table = TabularResult::from_json_rows(&rows);
        assert_eq!(table.column_names(), vec!["item", "qty", "note"]);
        assert_eq!(table.column("item").unwrap().cells[1], Cell::Null);
        assert_eq!(table.column("qty").unwrap().cells, vec![Cell::Int(3), Cell::Float(1.5)]);
        assert_eq!(table.column("note").unwrap().cells[1], Cell::Text("true".into()));
    }

    #[test]
    fn test_render_aligns_columns() {
        let table = TabularResult::empty()
            .with_column("NAME", vec![Cell::Text("a".into()), Cell::Text("long".into())])
            .with_column("N", vec![Cell::Int(1), Cell::Int(100)]);
        assert_eq!(table.render(), "NAME   N\n   a   1\nlong 100");
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(TabularResult::empty().render(), "(no columns)");
        let no_rows = TabularResult::empty().with_column("A", vec![]);
        assert_eq!(no_rows.render(), "A\n(no rows)");
    }

    #[test]
    fn test_cell_serializes_untagged() {
        let json = serde_json::to_value(vec![
            Cell::Null,
            Cell::Int(1),
            Cell::Float(1.5),
            Cell::Text("x".into()),
        ])
        .unwrap();
        assert_eq!(json, json!([null, 1, 1.5, "x"]));
    }
}
