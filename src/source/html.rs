// src/source/html.rs
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::{into_table, SourceFormat, TableSource};
use crate::{
    error::{PullError, Result},
    fetch::RawDocument,
    table::Table,
};

/// One `<table>` out of an HTML page.
#[derive(Debug, Clone, Copy)]
pub struct HtmlSource {
    table_index: usize,
}

impl HtmlSource {
    pub fn new(table_index: usize) -> Self {
        Self { table_index }
    }
}

impl TableSource for HtmlSource {
    fn format(&self) -> SourceFormat {
        SourceFormat::Html
    }

    fn decode(&self, doc: RawDocument) -> Result<Table> {
        let html = String::from_utf8_lossy(&doc.bytes);
        let document = Html::parse_document(&html);

        let table_sel = Selector::parse("table").expect("selector should parse");
        let row_sel = Selector::parse("tr").expect("selector should parse");
        let cell_sel = Selector::parse("th, td").expect("selector should parse");

        let tables: Vec<ElementRef> = document.select(&table_sel).collect();
        debug!(found = tables.len(), index = self.table_index, "html tables");
        let table = tables.get(self.table_index).ok_or_else(|| {
            PullError::decode(
                "html",
                format!(
                    "no table at index {} ({} found)",
                    self.table_index,
                    tables.len()
                ),
            )
        })?;

        let rows = table
            .select(&row_sel)
            .map(|tr| {
                tr.select(&cell_sel)
                    .map(|cell| cell_text(&cell))
                    .collect::<Vec<_>>()
            })
            .filter(|cells| !cells.is_empty())
            .collect();

        into_table(&doc.url, rows)
    }
}

fn cell_text(cell: &ElementRef) -> String {
    cell.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
