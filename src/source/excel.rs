// src/source/excel.rs
use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use tracing::debug;

use super::{into_table, SourceFormat, TableSource};
use crate::{
    error::{PullError, Result},
    fetch::RawDocument,
    table::Table,
};

/// A single worksheet of any workbook calamine can open (xlsx, xlsb, xls, ods).
#[derive(Debug, Clone, Copy)]
pub struct ExcelSource {
    sheet_index: usize,
}

impl ExcelSource {
    pub fn new(sheet_index: usize) -> Self {
        Self { sheet_index }
    }
}

impl TableSource for ExcelSource {
    fn format(&self) -> SourceFormat {
        SourceFormat::Excel
    }

    fn decode(&self, doc: RawDocument) -> Result<Table> {
        let url = doc.url;
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(doc.bytes))
            .map_err(|e| PullError::decode("excel", e))?;
        debug!(sheets = ?workbook.sheet_names(), index = self.sheet_index, "opened workbook");

        let range = workbook
            .worksheet_range_at(self.sheet_index)
            .ok_or_else(|| {
                PullError::decode("excel", format!("no worksheet at index {}", self.sheet_index))
            })?
            .map_err(|e| PullError::decode("excel", e))?;

        let rows = range
            .rows()
            .map(|row| row.iter().map(cell_text).collect())
            .collect();
        into_table(&url, rows)
    }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| cell.to_string()),
        other => other.to_string(),
    }
}
