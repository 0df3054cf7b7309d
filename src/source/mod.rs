//! Source decoders.
//!
//! Every supported input format implements [`TableSource`] and yields the same
//! [`Table`] shape, so the rest of a pull never cares where rows came from.

pub mod csv;
pub mod excel;
pub mod html;
pub mod pdf;

use std::{fmt, str::FromStr};

use tracing::{debug, instrument};

use crate::{
    error::{PullError, Result},
    fetch::{Fetcher, RawDocument},
    table::Table,
};

pub use self::csv::CsvSource;
pub use excel::ExcelSource;
pub use html::HtmlSource;
pub use pdf::{CommandExtractor, PageRange, PdfSource, TableExtractor};

/// Input formats selectable on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SourceFormat {
    Csv,
    Pdf,
    Excel,
    Html,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::Csv => "csv",
            SourceFormat::Pdf => "pdf",
            SourceFormat::Excel => "excel",
            SourceFormat::Html => "html",
        }
    }
}

impl FromStr for SourceFormat {
    type Err = PullError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(SourceFormat::Csv),
            "pdf" => Ok(SourceFormat::Pdf),
            "excel" | "xlsx" | "xls" | "ods" => Ok(SourceFormat::Excel),
            "html" | "htm" => Ok(SourceFormat::Html),
            other => Err(PullError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decodes a fetched payload into a table.
pub trait TableSource {
    fn format(&self) -> SourceFormat;

    fn decode(&self, doc: RawDocument) -> Result<Table>;
}

/// Knobs only some decoders look at.
#[derive(Debug, Clone)]
pub struct SourceOptions {
    /// Page range handed to the PDF extractor.
    pub pages: PageRange,
    /// PDF extraction program and flavor.
    pub extractor: String,
    pub flavor: String,
    /// Which `<table>` (html) or worksheet (excel) to read.
    pub table_index: usize,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            pages: PageRange::first(),
            extractor: "camelot".to_string(),
            flavor: "lattice".to_string(),
            table_index: 0,
        }
    }
}

/// Pick the decoder for `format`.
pub fn for_format(format: SourceFormat, options: &SourceOptions) -> Box<dyn TableSource> {
    match format {
        SourceFormat::Csv => Box::new(CsvSource),
        SourceFormat::Pdf => Box::new(PdfSource::new(
            options.pages.clone(),
            Box::new(CommandExtractor::new(&options.extractor, &options.flavor)),
        )),
        SourceFormat::Excel => Box::new(ExcelSource::new(options.table_index)),
        SourceFormat::Html => Box::new(HtmlSource::new(options.table_index)),
    }
}

/// Fetch `url` and decode it.
#[instrument(level = "info", skip(fetcher, source), fields(format = %source.format()))]
pub fn load(fetcher: &dyn Fetcher, url: &str, source: &dyn TableSource) -> Result<Table> {
    let doc = fetcher.fetch(url)?;
    let table = source.decode(doc)?;
    debug!(headers = ?table.headers, rows = table.rows.len(), "decoded source");
    Ok(table)
}

/// Shared tail of every decoder: an empty row set means there was no data.
pub(crate) fn into_table(url: &str, rows: Vec<Vec<String>>) -> Result<Table> {
    Table::from_rows(rows).ok_or_else(|| PullError::NoDataFound(url.to_string()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Serves canned payloads keyed by URL.
    #[derive(Default)]
    pub(crate) struct StaticFetcher {
        pub(crate) pages: HashMap<String, Vec<u8>>,
    }

    impl StaticFetcher {
        pub(crate) fn with(mut self, url: &str, body: &str) -> Self {
            self.pages.insert(url.to_string(), body.as_bytes().to_vec());
            self
        }
    }

    impl Fetcher for StaticFetcher {
        fn fetch(&self, url: &str) -> Result<RawDocument> {
            let bytes = self
                .pages
                .get(url)
                .cloned()
                .ok_or_else(|| PullError::SourceUnavailable {
                    url: url.to_string(),
                    reason: "404 Not Found".to_string(),
                })?;
            RawDocument::new(url, bytes)
        }
    }

    #[test]
    fn format_names_round_trip() {
        for f in [
            SourceFormat::Csv,
            SourceFormat::Pdf,
            SourceFormat::Excel,
            SourceFormat::Html,
        ] {
            assert_eq!(f.as_str().parse::<SourceFormat>().unwrap(), f);
        }
        assert_eq!("XLSX".parse::<SourceFormat>().unwrap(), SourceFormat::Excel);
        assert!(matches!(
            "sheet".parse::<SourceFormat>(),
            Err(PullError::UnsupportedFormat(name)) if name == "sheet"
        ));
    }

    #[test]
    fn load_fetches_then_decodes() -> anyhow::Result<()> {
        let fetcher = StaticFetcher::default().with("http://x/cases.csv", "County,Cases\nAlpha,3\n");
        let source = for_format(SourceFormat::Csv, &SourceOptions::default());
        let table = load(&fetcher, "http://x/cases.csv", source.as_ref())?;
        assert_eq!(table.headers, vec!["County", "Cases"]);
        assert_eq!(table.rows.len(), 1);

        let err = load(&fetcher, "http://x/missing.csv", source.as_ref()).unwrap_err();
        assert!(matches!(err, PullError::SourceUnavailable { .. }));
        Ok(())
    }

    #[test]
    fn whitespace_only_payload_has_no_rows() {
        let fetcher = StaticFetcher::default().with("http://x/blank.csv", "\n\n");
        let err = load(&fetcher, "http://x/blank.csv", &CsvSource).unwrap_err();
        assert!(matches!(err, PullError::NoDataFound(_)), "{:?}", err);
    }
}
