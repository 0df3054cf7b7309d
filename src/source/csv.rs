// src/source/csv.rs
use ::csv::ReaderBuilder;

use super::{into_table, SourceFormat, TableSource};
use crate::{
    error::{PullError, Result},
    fetch::RawDocument,
    table::Table,
};

/// Comma-delimited text.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvSource;

impl TableSource for CsvSource {
    fn format(&self) -> SourceFormat {
        SourceFormat::Csv
    }

    fn decode(&self, doc: RawDocument) -> Result<Table> {
        let rows = parse_csv(&doc.bytes)?;
        into_table(&doc.url, rows)
    }
}

/// Parse UTF-8 comma-separated bytes into rows of cells.
/// Records may differ in length; empty trailing fields are kept.
pub fn parse_csv(bytes: &[u8]) -> Result<Vec<Vec<String>>> {
    std::str::from_utf8(bytes).map_err(|e| PullError::decode("csv", e))?;

    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut rows = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        let record = result
            .map_err(|e| PullError::decode("csv", format!("record {}: {}", idx, e)))?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(body: &str) -> RawDocument {
        RawDocument::new("http://x/data.csv", body.as_bytes().to_vec()).unwrap()
    }

    #[test]
    fn keeps_trailing_empty_fields() -> anyhow::Result<()> {
        let table = CsvSource.decode(doc("Date,County,Cases,\n2021-02-01,Alpha,10,\n,,,\n"))?;
        assert_eq!(table.headers, vec!["Date", "County", "Cases", ""]);
        assert_eq!(table.rows[0], vec!["2021-02-01", "Alpha", "10", ""]);
        assert_eq!(table.rows[1], vec!["", "", "", ""]);
        Ok(())
    }

    #[test]
    fn honours_quoting_and_ragged_rows() -> anyhow::Result<()> {
        let table = CsvSource.decode(doc(
            "County,Cases\r\n\"Alpha, North\",\"1,204\"\r\nBeta\r\n",
        ))?;
        assert_eq!(table.rows[0], vec!["Alpha, North", "1,204"]);
        assert_eq!(table.rows[1], vec!["Beta"]);
        Ok(())
    }

    #[test]
    fn rejects_non_utf8() {
        let raw = RawDocument::new("u", vec![b'a', 0xff, 0xfe, b'\n']).unwrap();
        let err = CsvSource.decode(raw).unwrap_err();
        assert!(matches!(err, PullError::Decode { format: "csv", .. }), "{:?}", err);
    }
}
