// src/table/mod.rs
pub mod date;

use std::collections::HashMap;

use tracing::debug;

use crate::error::{PullError, Result};

pub use date::{parse_date, sort_rows_by_date};

/// A decoded source table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    /// Column names, taken from the first row of the source.
    pub headers: Vec<String>,
    /// Every following row, one String per cell, in source order.
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Split decoded rows into header + data. Returns `None` when there are no rows at all.
    pub fn from_rows(rows: Vec<Vec<String>>) -> Option<Self> {
        let mut rows = rows.into_iter();
        let headers = rows.next()?;
        Some(Self {
            headers,
            rows: rows.collect(),
        })
    }

    /// Build the name → position lookup for this table's header.
    pub fn column_index(&self, context: &str) -> ColumnIndex {
        ColumnIndex::from_header(&self.headers, context)
    }

    /// Sort data rows newest-first by the date in column `column`.
    pub fn sort_by_date(&mut self, column: usize) {
        sort_rows_by_date(&mut self.rows, column);
    }

    /// Re-encode header + rows as comma-delimited text.
    pub fn to_csv(&self) -> Result<String> {
        let mut wtr = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(Vec::new());
        for row in std::iter::once(&self.headers).chain(self.rows.iter()) {
            wtr.write_record(row)
                .map_err(|e| PullError::decode("csv", e))?;
        }
        let bytes = wtr
            .into_inner()
            .map_err(|e| PullError::decode("csv", e.error()))?;
        String::from_utf8(bytes).map_err(|e| PullError::decode("csv", e))
    }
}

/// Trim whitespace + strip outer quotes if present.
pub fn clean_str(raw: &str) -> &str {
    let trimmed = raw.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].trim()
    } else {
        trimmed
    }
}

/// Header name → column position, derived once from a header row.
#[derive(Debug, Clone)]
pub struct ColumnIndex {
    positions: HashMap<String, usize>,
    context: String,
}

impl ColumnIndex {
    /// Duplicate names resolve to their first occurrence.
    pub fn from_header(header: &[String], context: &str) -> Self {
        let mut positions = HashMap::with_capacity(header.len());
        for (idx, name) in header.iter().enumerate() {
            positions.entry(clean_str(name).to_string()).or_insert(idx);
        }
        debug!(context, ?header, "built column index");
        Self {
            positions,
            context: context.to_string(),
        }
    }

    pub fn lookup(&self, name: &str) -> Result<usize> {
        self.positions
            .get(clean_str(name))
            .copied()
            .ok_or_else(|| PullError::ColumnNotFound {
                name: name.to_string(),
                context: self.context.clone(),
            })
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
