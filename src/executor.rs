//! SQL execution against the configured database.
//!
//! The URL scheme selects the driver (SQLite, Postgres or MySQL). Each
//! driver decodes its own column types, so numeric, decimal and date
//! columns all reach the table. A fresh connection is opened per statement.

use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::types::Decimal;
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::{Column as _, Connection, MySqlConnection, PgConnection, Row, SqliteConnection};
use tracing::{error, info, warn};

use crate::dialect::Dialect;
use crate::tabular::{Cell, TabularResult};

/// Connect with one driver, run `sql`, close, and decode every row.
macro_rules! fetch {
    ($conn:ty, $url:expr, $sql:expr, $decode:path) => {{
        let mut conn = <$conn>::connect($url).await?;
        let rows = sqlx::query($sql).fetch_all(&mut conn).await;

        if let Err(e) = conn.close().await {
            warn!("Failed to close database connection: {e}");
        }

        Ok(rows_to_table(&rows?, $decode))
    }};
}

/// Return the first listed type that decodes, mapped to a cell. SQL NULL is
/// [`Cell::Null`]; a value no listed type accepts is also `Null`.
macro_rules! decode_first {
    ($row:expr, $index:expr, $( $ty:ty => $into:expr ),+ $(,)?) => {{
        $(
            if let Ok(value) = $row.try_get::<Option<$ty>, _>($index) {
                return value.map_or(Cell::Null, $into);
            }
        )+
        Cell::Null
    }};
}

/// Result of running one statement.
///
/// `Empty` and `Failed` are kept apart so callers can tell "no rows" from
/// "the query did not run".
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Rows(TabularResult),
    Empty,
    Failed(String),
}

impl QueryOutcome {
    /// Collapse into a table: `Empty` and `Failed` both become an empty table.
    pub fn into_table(self) -> TabularResult {
        match self {
            Self::Rows(table) => table,
            Self::Empty | Self::Failed(_) => TabularResult::empty(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Runs SQL text and materializes every row.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    database_url: String,
}

impl QueryExecutor {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
        }
    }

    /// Dialect of the configured URL, if it names a supported driver.
    pub fn dialect(&self) -> Option<Dialect> {
        Dialect::from_url(&self.database_url)
    }

    /// Execute `sql`. Connection and execution errors are logged and returned
    /// as [`QueryOutcome::Failed`], never propagated.
    pub async fn run(&self, sql: &str) -> QueryOutcome {
        match self.fetch_table(sql).await {
            Ok(table) if table.is_empty() => QueryOutcome::Empty,
            Ok(table) => {
                info!(rows = table.num_rows(), "query returned rows");
                QueryOutcome::Rows(table)
            }
            Err(e) => {
                error!("Error executing query: {e}");
                QueryOutcome::Failed(e.to_string())
            }
        }
    }

    async fn fetch_table(&self, sql: &str) -> Result<TabularResult, sqlx::Error> {
        let Some(dialect) = self.dialect() else {
            return Err(sqlx::Error::Configuration(
                format!("unsupported database URL scheme: {}", redact(&self.database_url)).into(),
            ));
        };

        match dialect {
            Dialect::Sqlite => fetch!(SqliteConnection, &self.database_url, sql, decode_sqlite),
            Dialect::Postgres => fetch!(PgConnection, &self.database_url, sql, decode_postgres),
            Dialect::MySql => fetch!(MySqlConnection, &self.database_url, sql, decode_mysql),
        }
    }
}

fn rows_to_table<R: Row>(rows: &[R], decode: fn(&R, usize) -> Cell) -> TabularResult {
    let Some(first) = rows.first() else {
        return TabularResult::empty();
    };

    let headers = first
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();

    let cells = rows
        .iter()
        .map(|row| (0..row.len()).map(|i| decode(row, i)).collect())
        .collect();

    TabularResult::from_rows(headers, cells)
}

fn decode_sqlite(row: &SqliteRow, index: usize) -> Cell {
    decode_first!(row, index,
        i64 => Cell::Int,
        f64 => Cell::Float,
        String => Cell::Text,
        bool => text,
    )
}

fn decode_postgres(row: &PgRow, index: usize) -> Cell {
    decode_first!(row, index,
        i64 => Cell::Int,
        i32 => |v: i32| Cell::Int(v.into()),
        i16 => |v: i16| Cell::Int(v.into()),
        f64 => Cell::Float,
        f32 => |v: f32| Cell::Float(v.into()),
        Decimal => decimal_cell,
        String => Cell::Text,
        bool => text,
        NaiveDate => text,
        NaiveDateTime => text,
        DateTime<Utc> => text,
        NaiveTime => text,
    )
}

fn decode_mysql(row: &MySqlRow, index: usize) -> Cell {
    decode_first!(row, index,
        i64 => Cell::Int,
        u64 => unsigned_cell,
        f64 => Cell::Float,
        f32 => |v: f32| Cell::Float(v.into()),
        Decimal => decimal_cell,
        String => Cell::Text,
        bool => text,
        NaiveDate => text,
        NaiveDateTime => text,
        DateTime<Utc> => text,
        NaiveTime => text,
    )
}

fn text<T: ToString>(value: T) -> Cell {
    Cell::Text(value.to_string())
}

/// Whole decimals (`SUM` over integers) become `Int`, the rest `Float`.
fn decimal_cell(value: Decimal) -> Cell {
    let text = value.to_string();
    if let Ok(v) = text.parse::<i64>() {
        return Cell::Int(v);
    }
    text.parse::<f64>().map_or(Cell::Text(text), Cell::Float)
}

fn unsigned_cell(value: u64) -> Cell {
    i64::try_from(value).map_or(Cell::Float(value as f64), Cell::Int)
}

/// Scheme only, so credentials never reach the logs.
fn redact(url: &str) -> &str {
    url.split_once(':').map_or(url, |(scheme, _)| scheme)
}
