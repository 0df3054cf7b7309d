// src/source/pdf.rs
//! Tables embedded in PDF reports.
//!
//! Finding table boundaries inside a PDF is left to an external extractor; this
//! module only hands it the document plus a page range and stitches the tables it
//! returns into one [`Table`].

use std::{
    fmt, fs,
    path::{Path, PathBuf},
    process::Command,
    str::FromStr,
};

use glob::glob;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, instrument};

use super::{csv::parse_csv, into_table, SourceFormat, TableSource};
use crate::{
    error::{PullError, Result},
    fetch::RawDocument,
    table::Table,
};

static PAGES_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(all|\d+(-(\d+|end))?(,\d+(-(\d+|end))?)*)$").expect("page regex should compile")
});
static TABLE_FILE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"page-(\d+)-table-(\d+)").expect("table file regex should compile"));

/// Pages to extract from, e.g. `1`, `1,3-5`, `2-end` or `all`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRange(String);

impl PageRange {
    pub fn first() -> Self {
        PageRange("1".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for PageRange {
    type Err = PullError;

    fn from_str(s: &str) -> Result<Self> {
        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        if PAGES_RE.is_match(&compact) {
            Ok(PageRange(compact))
        } else {
            Err(PullError::decode("pdf", format!("invalid page range {:?}", s)))
        }
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pulls the tables out of a PDF, in page order.
pub trait TableExtractor {
    fn extract(&self, pdf: &[u8], pages: &PageRange) -> Result<Vec<Vec<Vec<String>>>>;
}

pub struct PdfSource {
    pages: PageRange,
    extractor: Box<dyn TableExtractor>,
}

impl PdfSource {
    pub fn new(pages: PageRange, extractor: Box<dyn TableExtractor>) -> Self {
        Self { pages, extractor }
    }
}

impl TableSource for PdfSource {
    fn format(&self) -> SourceFormat {
        SourceFormat::Pdf
    }

    fn decode(&self, doc: RawDocument) -> Result<Table> {
        if !doc.bytes.starts_with(b"%PDF-") {
            return Err(PullError::decode("pdf", "payload is not a PDF document"));
        }
        let tables = self.extractor.extract(&doc.bytes, &self.pages)?;
        debug!(tables = tables.len(), pages = %self.pages, "extracted pdf tables");
        into_table(&doc.url, stitch(tables))
    }
}

/// Concatenate tables; a table that starts with the first table's header
/// (a header repeated on every page) loses that row.
fn stitch(tables: Vec<Vec<Vec<String>>>) -> Vec<Vec<String>> {
    let mut tables = tables.into_iter().filter(|t| !t.is_empty());
    let mut rows = match tables.next() {
        Some(first) => first,
        None => return Vec::new(),
    };
    let header = rows[0].clone();
    for table in tables {
        let skip = usize::from(table[0] == header);
        rows.extend(table.into_iter().skip(skip));
    }
    rows
}

/// Runs an extraction CLI (camelot by default) in a scratch directory and reads
/// back the CSV files it writes.
#[derive(Debug, Clone)]
pub struct CommandExtractor {
    program: String,
    flavor: String,
}

impl CommandExtractor {
    pub fn new(program: &str, flavor: &str) -> Self {
        Self {
            program: program.to_string(),
            flavor: flavor.to_string(),
        }
    }
}

impl TableExtractor for CommandExtractor {
    #[instrument(level = "info", skip(self, pdf), fields(program = %self.program))]
    fn extract(&self, pdf: &[u8], pages: &PageRange) -> Result<Vec<Vec<Vec<String>>>> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("source.pdf");
        fs::write(&input, pdf)?;
        let output = dir.path().join("table.csv");

        let out = Command::new(&self.program)
            .arg("--pages")
            .arg(pages.as_str())
            .arg("--format")
            .arg("csv")
            .arg("--output")
            .arg(&output)
            .arg(&self.flavor)
            .arg(&input)
            .output()
            .map_err(|e| PullError::Extraction(format!("running {}: {}", self.program, e)))?;
        if !out.status.success() {
            return Err(PullError::Extraction(format!(
                "{} exited with {}: {}",
                self.program,
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }

        let files = extracted_files(dir.path())?;
        info!(files = files.len(), "extractor finished");
        files
            .iter()
            .map(|path| parse_csv(&fs::read(path)?))
            .collect()
    }
}

/// `table-page-<p>-table-<t>.csv` files (or a lone `table.csv`), ordered by page then table.
fn extracted_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = format!("{}/table*.csv", dir.display());
    let mut files: Vec<PathBuf> = glob(&pattern)
        .map_err(|e| PullError::Extraction(e.to_string()))?
        .filter_map(|entry| entry.ok())
        .collect();
    files.sort_by_key(|p| table_order(p));
    Ok(files)
}

fn table_order(path: &Path) -> (u32, u32) {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|name| TABLE_FILE_RE.captures(name))
        .map(|caps| {
            (
                caps[1].parse().unwrap_or(u32::MAX),
                caps[2].parse().unwrap_or(u32::MAX),
            )
        })
        .unwrap_or((0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::RefCell, rc::Rc};

    /// Returns canned tables and remembers the page range it was asked for.
    struct CannedExtractor {
        tables: Vec<Vec<Vec<String>>>,
        seen_pages: Rc<RefCell<Option<String>>>,
    }

    impl TableExtractor for CannedExtractor {
        fn extract(&self, _pdf: &[u8], pages: &PageRange) -> Result<Vec<Vec<Vec<String>>>> {
            *self.seen_pages.borrow_mut() = Some(pages.to_string());
            Ok(self.tables.clone())
        }
    }

    fn canned(
        pages: PageRange,
        tables: Vec<Vec<Vec<String>>>,
    ) -> (PdfSource, Rc<RefCell<Option<String>>>) {
        let seen = Rc::new(RefCell::new(None));
        let extractor = CannedExtractor {
            tables,
            seen_pages: Rc::clone(&seen),
        };
        (PdfSource::new(pages, Box::new(extractor)), seen)
    }

    fn t(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    fn pdf_doc() -> RawDocument {
        RawDocument::new("http://x/report.pdf", b"%PDF-1.7\n...".to_vec()).unwrap()
    }

    #[test]
    fn stitches_pages_and_drops_repeated_headers() -> anyhow::Result<()> {
        let (source, seen) = canned(
            "2-end".parse()?,
            vec![
                t(&[&["County", "Cases"], &["Alpha", "10"]]),
                Vec::new(),
                t(&[&["County", "Cases"], &["Beta", "5"]]),
                t(&[&["Gamma", "2"]]),
            ],
        );
        let table = source.decode(pdf_doc())?;

        assert_eq!(table.headers, vec!["County", "Cases"]);
        assert_eq!(table.rows, t(&[&["Alpha", "10"], &["Beta", "5"], &["Gamma", "2"]]));
        assert_eq!(seen.borrow().as_deref(), Some("2-end"));
        Ok(())
    }

    #[test]
    fn rejects_non_pdf_payload() {
        let (source, seen) = canned(PageRange::first(), Vec::new());
        let doc = RawDocument::new("u", b"<html>".to_vec()).unwrap();
        assert!(matches!(
            source.decode(doc),
            Err(PullError::Decode { format: "pdf", .. })
        ));
        assert!(seen.borrow().is_none());
    }

    #[test]
    fn no_tables_is_no_data() {
        let (source, _) = canned(PageRange::first(), Vec::new());
        assert!(matches!(source.decode(pdf_doc()), Err(PullError::NoDataFound(_))));
    }

    #[test]
    fn page_range_syntax() {
        for ok in ["1", "all", "1,3-5", "2-end", " 1, 4 "] {
            assert!(ok.parse::<PageRange>().is_ok(), "{}", ok);
        }
        assert_eq!("1, 4".parse::<PageRange>().unwrap().as_str(), "1,4");
        for bad in ["", "one", "1-", "-3", "1;2"] {
            assert!(bad.parse::<PageRange>().is_err(), "{}", bad);
        }
    }

    #[test]
    fn extractor_output_ordering() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        for name in [
            "table-page-10-table-1.csv",
            "table-page-2-table-2.csv",
            "table-page-2-table-1.csv",
            "notes.txt",
        ] {
            fs::write(dir.path().join(name), "a\n")?;
        }
        let names: Vec<String> = extracted_files(dir.path())?
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "table-page-2-table-1.csv",
                "table-page-2-table-2.csv",
                "table-page-10-table-1.csv"
            ]
        );
        Ok(())
    }

    #[test]
    fn missing_program_is_extraction_error() {
        let extractor = CommandExtractor::new("covidpull-no-such-extractor", "lattice");
        let err = extractor
            .extract(b"%PDF-1.4", &PageRange::first())
            .unwrap_err();
        assert!(matches!(err, PullError::Extraction(_)), "{:?}", err);
    }
}
