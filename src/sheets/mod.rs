//! Destination spreadsheet: layout discovery and per-metric column writes.

pub mod auth;
pub mod google;

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, instrument};

use crate::{
    aggregate::{Metric, RegionRecord},
    error::{PullError, Result},
    table::clean_str,
};

pub use auth::TokenStore;
pub use google::GoogleSheets;

/// The two calls a pull makes against the destination spreadsheet.
pub trait SheetService {
    /// Rows of a rectangular A1 range; trailing empty cells may be missing.
    fn read_range(&self, spreadsheet_id: &str, range: &str) -> Result<Vec<Vec<String>>>;

    /// Overwrite `range` with `rows`.
    fn update_range(&self, spreadsheet_id: &str, range: &str, rows: Vec<Vec<String>>)
        -> Result<()>;
}

/// Where things live in the destination sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetLayout {
    pub region_column: usize,
    pub outputs: BTreeMap<Metric, usize>,
    /// Region names in sheet row order, starting at row 2. Blank cells stay as "".
    pub regions: Vec<String>,
}

impl SheetLayout {
    /// Build from the destination's values (header first). Fails before any write
    /// is attempted if the header is empty or a configured column is missing.
    pub fn from_values(
        values: &[Vec<String>],
        region_header: &str,
        outputs: &[(Metric, String)],
    ) -> Result<Self> {
        let header = match values.first() {
            Some(h) if h.iter().any(|c| !c.trim().is_empty()) => h,
            _ => return Err(PullError::SheetFormat("header row is empty".to_string())),
        };
        let find = |name: &str| {
            header
                .iter()
                .position(|cell| clean_str(cell) == clean_str(name))
        };

        let region_column = find(region_header).ok_or_else(|| {
            PullError::SheetFormat(format!("no region column {:?} in header", region_header))
        })?;

        let mut columns = BTreeMap::new();
        for (metric, name) in outputs {
            let col = find(name).ok_or_else(|| {
                PullError::SheetFormat(format!(
                    "no output column {:?} for {} in header",
                    name, metric
                ))
            })?;
            columns.insert(*metric, col);
        }

        let regions = values[1..]
            .iter()
            .map(|row| {
                row.get(region_column)
                    .map(|c| clean_str(c).to_string())
                    .unwrap_or_default()
            })
            .collect();

        Ok(Self {
            region_column,
            outputs: columns,
            regions,
        })
    }

    /// The authoritative region set.
    pub fn known_regions(&self) -> BTreeSet<String> {
        self.regions
            .iter()
            .filter(|r| !r.is_empty())
            .cloned()
            .collect()
    }

    /// One single-cell row per destination row, in sheet order.
    pub fn column_values(
        &self,
        records: &BTreeMap<String, RegionRecord>,
        metric: Metric,
    ) -> Vec<Vec<String>> {
        self.regions
            .iter()
            .map(|region| {
                let cell = if region.is_empty() {
                    String::new()
                } else {
                    records
                        .get(region)
                        .copied()
                        .unwrap_or_default()
                        .get(metric)
                        .to_string()
                };
                vec![cell]
            })
            .collect()
    }
}

/// Summary of one bulk column update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResult {
    pub metric: Metric,
    pub range: String,
    pub cells: usize,
}

/// Reads the layout of and writes columns into one spreadsheet tab.
pub struct SheetWriter<'a> {
    service: &'a dyn SheetService,
    spreadsheet_id: &'a str,
    sheet: Option<&'a str>,
}

impl<'a> SheetWriter<'a> {
    pub fn new(service: &'a dyn SheetService, spreadsheet_id: &'a str, sheet: Option<&'a str>) -> Self {
        Self {
            service,
            spreadsheet_id,
            sheet,
        }
    }

    #[instrument(level = "info", skip(self, outputs), fields(spreadsheet = self.spreadsheet_id))]
    pub fn read_layout(&self, region_header: &str, outputs: &[(Metric, String)]) -> Result<SheetLayout> {
        let range = a1_range(self.sheet, "A:ZZ");
        let values = self.service.read_range(self.spreadsheet_id, &range)?;
        debug!(header = ?values.first(), rows = values.len(), "destination values");
        let layout = SheetLayout::from_values(&values, region_header, outputs)?;
        debug!(
            region_column = layout.region_column,
            outputs = ?layout.outputs,
            regions = layout.regions.len(),
            "destination layout"
        );
        Ok(layout)
    }

    /// Write one metric's column. Does nothing for metrics the layout has no column for.
    pub fn write(
        &self,
        layout: &SheetLayout,
        records: &BTreeMap<String, RegionRecord>,
        metric: Metric,
    ) -> Result<Option<WriteResult>> {
        let column = match layout.outputs.get(&metric) {
            Some(c) => *c,
            None => return Ok(None),
        };
        if layout.regions.is_empty() {
            return Ok(None);
        }

        let rows = layout.column_values(records, metric);
        let letter = column_letter(column);
        let range = a1_range(
            self.sheet,
            &format!("{}2:{}{}", letter, letter, rows.len() + 1),
        );
        let cells = rows.len();
        self.service.update_range(self.spreadsheet_id, &range, rows)?;
        info!(%metric, %range, cells, "wrote column");

        Ok(Some(WriteResult {
            metric,
            range,
            cells,
        }))
    }
}

/// Zero-based column position → A1 letters (0 → A, 26 → AA).
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Qualify `range` with a tab name, quoting it when it isn't a bare word.
pub fn a1_range(sheet: Option<&str>, range: &str) -> String {
    match sheet {
        None => range.to_string(),
        Some(name) if name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') => {
            format!("{}!{}", name, range)
        }
        Some(name) => format!("'{}'!{}", name.replace('\'', "''"), range),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::{cell::RefCell, collections::HashMap};

    /// A spreadsheet held in memory; records every update.
    #[derive(Default)]
    pub(crate) struct MemorySheet {
        pub(crate) values: Vec<Vec<String>>,
        pub(crate) updates: RefCell<Vec<(String, Vec<Vec<String>>)>>,
        pub(crate) reads: RefCell<HashMap<String, usize>>,
    }

    impl MemorySheet {
        pub(crate) fn new(rows: &[&[&str]]) -> Self {
            Self {
                values: rows
                    .iter()
                    .map(|r| r.iter().map(|c| c.to_string()).collect())
                    .collect(),
                ..Default::default()
            }
        }
    }

    impl SheetService for MemorySheet {
        fn read_range(&self, _id: &str, range: &str) -> Result<Vec<Vec<String>>> {
            *self.reads.borrow_mut().entry(range.to_string()).or_default() += 1;
            Ok(self.values.clone())
        }

        fn update_range(&self, _id: &str, range: &str, rows: Vec<Vec<String>>) -> Result<()> {
            self.updates.borrow_mut().push((range.to_string(), rows));
            Ok(())
        }
    }

    fn outputs() -> Vec<(Metric, String)> {
        vec![
            (Metric::Cases, "Cases".to_string()),
            (Metric::Deaths, "Deaths".to_string()),
        ]
    }

    fn records() -> BTreeMap<String, RegionRecord> {
        let mut m = BTreeMap::new();
        m.insert(
            "Alpha".to_string(),
            RegionRecord {
                cases: 10,
                deaths: 1,
                ..Default::default()
            },
        );
        m.insert(
            "Beta".to_string(),
            RegionRecord {
                cases: 5,
                deaths: 0,
                ..Default::default()
            },
        );
        m
    }

    #[test]
    fn writes_follow_destination_order() -> anyhow::Result<()> {
        let sheet = MemorySheet::new(&[
            &["County", "Population", "Cases", "Deaths"],
            &["Beta", "100"],
            &["Alpha", "200"],
        ]);
        let writer = SheetWriter::new(&sheet, "sheet-id", None);
        let layout = writer.read_layout("County", &outputs())?;
        let result = writer.write(&layout, &records(), Metric::Cases)?.unwrap();

        assert_eq!(result.range, "C2:C3");
        assert_eq!(result.cells, 2);
        let updates = sheet.updates.borrow();
        assert_eq!(updates[0].1, vec![vec!["5".to_string()], vec!["10".to_string()]]);
        Ok(())
    }

    #[test]
    fn unmatched_and_blank_regions() -> anyhow::Result<()> {
        let sheet = MemorySheet::new(&[
            &["County", "Cases", "Deaths"],
            &["Alpha"],
            &[],
            &["Gamma"],
        ]);
        let writer = SheetWriter::new(&sheet, "id", Some("Daily Totals"));
        let layout = writer.read_layout("County", &outputs())?;
        assert_eq!(layout.known_regions().len(), 2);

        let result = writer.write(&layout, &records(), Metric::Deaths)?.unwrap();
        assert_eq!(result.range, "'Daily Totals'!C2:C4");
        let updates = sheet.updates.borrow();
        assert_eq!(
            updates[0].1,
            vec![vec!["1".to_string()], vec![String::new()], vec!["0".to_string()]]
        );
        assert_eq!(sheet.reads.borrow()["'Daily Totals'!A:ZZ"], 1);
        Ok(())
    }

    #[test]
    fn layout_fails_fast() {
        let cases = |values: &[&[&str]]| {
            let sheet = MemorySheet::new(values);
            let err = SheetWriter::new(&sheet, "id", None)
                .read_layout("County", &outputs())
                .unwrap_err();
            assert!(sheet.updates.borrow().is_empty());
            err
        };
        assert!(matches!(cases(&[]), PullError::SheetFormat(_)));
        assert!(matches!(cases(&[&["", " "]]), PullError::SheetFormat(_)));
        assert!(matches!(
            cases(&[&["Region", "Cases", "Deaths"]]),
            PullError::SheetFormat(msg) if msg.contains("County")
        ));
        assert!(matches!(
            cases(&[&["County", "Cases"]]),
            PullError::SheetFormat(msg) if msg.contains("Deaths")
        ));
    }

    #[test]
    fn metric_without_column_is_skipped() -> anyhow::Result<()> {
        let sheet = MemorySheet::new(&[&["County", "Cases", "Deaths"], &["Alpha"]]);
        let writer = SheetWriter::new(&sheet, "id", None);
        let layout = writer.read_layout("County", &outputs())?;
        assert!(writer.write(&layout, &records(), Metric::FirstDose)?.is_none());
        assert!(sheet.updates.borrow().is_empty());
        Ok(())
    }

    #[test]
    fn column_letters() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(51), "AZ");
        assert_eq!(column_letter(702), "AAA");
    }

    #[test]
    fn range_quoting() {
        assert_eq!(a1_range(None, "A:ZZ"), "A:ZZ");
        assert_eq!(a1_range(Some("Sheet1"), "B2:B9"), "Sheet1!B2:B9");
        assert_eq!(a1_range(Some("Bob's tab"), "A1"), "'Bob''s tab'!A1");
    }
}
