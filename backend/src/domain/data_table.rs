//! Tabular breakdown of the data behind a rendered map.
//!
//! The renderer decides which indicators appear; the core only guarantees the
//! table is rectangular. Column labels conventionally read `"{label} ({code})"`
//! so clients can show the human label and still trace the source indicator.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A single table column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableColumn {
    /// Machine-readable key, for example `ALRAT`.
    pub key: String,
    /// Display label, for example `Agricultural land share (%) (ALRAT)`.
    pub label: String,
}

/// Structural problems in a data table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataTableError {
    /// The table declares no columns.
    #[error("data table must declare at least one column")]
    NoColumns,
    /// Two columns share a key.
    #[error("duplicate column key {key}")]
    DuplicateColumn {
        /// Repeated key.
        key: String,
    },
    /// A row has the wrong number of cells.
    #[error("row {row} has {actual} cells, expected {expected}")]
    RaggedRow {
        /// Zero-based row index.
        row: usize,
        /// Column count.
        expected: usize,
        /// Cell count in the row.
        actual: usize,
    },
}

/// Rectangular table of JSON scalar cells.
///
/// # Examples
/// ```
/// use choropleth::domain::{DataTable, TableColumn};
/// use serde_json::json;
///
/// let table = DataTable::new(
///     vec![TableColumn { key: "NAME".into(), label: "Municipality (NAME)".into() }],
///     vec![vec![json!("Devín")]],
/// )
/// .expect("table is rectangular");
/// assert_eq!(table.row_count(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDataTable")]
pub struct DataTable {
    columns: Vec<TableColumn>,
    rows: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
struct RawDataTable {
    columns: Vec<TableColumn>,
    rows: Vec<Vec<Value>>,
}

impl TryFrom<RawDataTable> for DataTable {
    type Error = DataTableError;

    fn try_from(value: RawDataTable) -> Result<Self, Self::Error> {
        Self::new(value.columns, value.rows)
    }
}

impl DataTable {
    /// Build a table, checking column keys are unique and rows rectangular.
    ///
    /// # Errors
    /// Returns [`DataTableError`] describing the first structural problem.
    pub fn new(columns: Vec<TableColumn>, rows: Vec<Vec<Value>>) -> Result<Self, DataTableError> {
        if columns.is_empty() {
            return Err(DataTableError::NoColumns);
        }
        for (index, column) in columns.iter().enumerate() {
            if columns
                .iter()
                .skip(index + 1)
                .any(|other| other.key == column.key)
            {
                return Err(DataTableError::DuplicateColumn {
                    key: column.key.clone(),
                });
            }
        }
        let expected = columns.len();
        if let Some((row, cells)) = rows
            .iter()
            .enumerate()
            .find(|(_, cells)| cells.len() != expected)
        {
            return Err(DataTableError::RaggedRow {
                row,
                expected,
                actual: cells.len(),
            });
        }
        Ok(Self { columns, rows })
    }

    /// Column definitions in display order.
    #[must_use]
    pub fn columns(&self) -> &[TableColumn] {
        &self.columns
    }

    /// Rows in display order, one cell per column.
    #[must_use]
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Number of rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}
