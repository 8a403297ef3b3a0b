//! A typed, dynamic row representation.
//!
//! Query results flow through the router as `Vec<Row>` regardless of the
//! query's actual column shape. `Cell` is a closed enum rather than a
//! `serde_json::Value` so that caching a row and reading it back cannot
//! silently change a cell's type (a naive `Value` round trip would, for
//! example, let an integer and a float become indistinguishable).

use serde::{Deserialize, Serialize};
use sqlx::Column;
use sqlx::postgres::PgRow;
use sqlx::{Row as _, TypeInfo, ValueRef};

use crate::error::RouterError;

/// A single column value, tagged with its original type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// A single result row: an ordered sequence of cells.
pub type Row = Vec<Cell>;

/// Convert a `sqlx` row into our dynamic, cacheable representation.
///
/// Columns are decoded by their reported Postgres type name rather than by
/// trial-and-error, so the mapping is deterministic and each cell keeps
/// the width (integer vs. floating point vs. text) it had in the
/// database.
pub fn row_to_cells(row: &PgRow) -> Result<Row, RouterError> {
    let mut cells = Vec::with_capacity(row.columns().len());
    for column in row.columns() {
        let raw = row
            .try_get_raw(column.ordinal())
            .map_err(RouterError::QueryFailed)?;

        if raw.is_null() {
            cells.push(Cell::Null);
            continue;
        }

        let type_name = column.type_info().name();
        let cell = match type_name {
            "BOOL" => row
                .try_get::<bool, _>(column.ordinal())
                .map(Cell::Bool)
                .map_err(RouterError::QueryFailed)?,
            "INT2" | "INT4" | "INT8" => row
                .try_get::<i64, _>(column.ordinal())
                .map(Cell::Int)
                .map_err(RouterError::QueryFailed)?,
            "FLOAT4" | "FLOAT8" | "NUMERIC" => row
                .try_get::<f64, _>(column.ordinal())
                .map(Cell::Float)
                .map_err(RouterError::QueryFailed)?,
            _ => row
                .try_get::<String, _>(column.ordinal())
                .map(Cell::Text)
                .map_err(RouterError::QueryFailed)?,
        };
        cells.push(cell);
    }
    Ok(cells)
}

/// Serialize rows for the cache. Kept as a thin wrapper so the router
/// never has to reason about the underlying cache wire format directly.
pub fn encode_rows(rows: &[Row]) -> Result<String, serde_json::Error> {
    serde_json::to_string(rows)
}

/// Deserialize rows previously produced by [`encode_rows`].
pub fn decode_rows(payload: &str) -> Result<Vec<Row>, serde_json::Error> {
    serde_json::from_str(payload)
}
