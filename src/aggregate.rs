// src/aggregate.rs
use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    fmt,
};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, instrument};

use crate::{
    error::{PullError, Result},
    table::{clean_str, ColumnIndex, Table},
};

/// One tracked quantity per region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    Cases,
    Deaths,
    Recovered,
    FirstDose,
    FullyVaccinated,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::Cases,
        Metric::Deaths,
        Metric::Recovered,
        Metric::FirstDose,
        Metric::FullyVaccinated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cases => "cases",
            Metric::Deaths => "deaths",
            Metric::Recovered => "recovered",
            Metric::FirstDose => "first dose",
            Metric::FullyVaccinated => "fully vaccinated",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegionRecord {
    pub cases: i64,
    pub deaths: i64,
    pub recovered: i64,
    pub first_dose: i64,
    pub fully_vaccinated: i64,
}

impl RegionRecord {
    pub fn get(&self, metric: Metric) -> i64 {
        match metric {
            Metric::Cases => self.cases,
            Metric::Deaths => self.deaths,
            Metric::Recovered => self.recovered,
            Metric::FirstDose => self.first_dose,
            Metric::FullyVaccinated => self.fully_vaccinated,
        }
    }

    pub fn set(&mut self, metric: Metric, value: i64) {
        match metric {
            Metric::Cases => self.cases = value,
            Metric::Deaths => self.deaths = value,
            Metric::Recovered => self.recovered = value,
            Metric::FirstDose => self.first_dose = value,
            Metric::FullyVaccinated => self.fully_vaccinated = value,
        }
    }
}

/// A metric bound to its position in a source table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricColumn {
    pub metric: Metric,
    pub name: String,
    pub position: usize,
}

/// Resolve configured `(metric, header name)` pairs against a source header.
pub fn resolve_metrics(index: &ColumnIndex, wanted: &[(Metric, String)]) -> Result<Vec<MetricColumn>> {
    wanted
        .iter()
        .map(|(metric, name)| {
            Ok(MetricColumn {
                metric: *metric,
                name: name.clone(),
                position: index.lookup(name)?,
            })
        })
        .collect()
}

/// First-row-wins aggregation.
///
/// Each row is scanned cell by cell; the first cell naming a known region picks
/// the row's region. Only the first row seen for a region is recorded. Every
/// row must reach the highest referenced column, otherwise the pass fails with
/// `RowTooShort`.
#[instrument(level = "debug", skip_all, fields(rows = table.rows.len(), regions = known_regions.len()))]
pub fn aggregate(
    table: &Table,
    metrics: &[MetricColumn],
    known_regions: &BTreeSet<String>,
) -> Result<BTreeMap<String, RegionRecord>> {
    let needed = metrics.iter().map(|m| m.position).max();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut out = BTreeMap::new();

    for (idx, row) in table.rows.iter().enumerate() {
        if let Some(needed) = needed {
            if row.len() <= needed {
                return Err(PullError::RowTooShort {
                    // 1-based, counting the header
                    row: idx + 2,
                    len: row.len(),
                    needed,
                });
            }
        }

        let region = match row
            .iter()
            .map(|cell| clean_str(cell))
            .find_map(|cell| known_regions.get(cell))
        {
            Some(region) => region,
            None => continue,
        };
        if !seen.insert(region.as_str()) {
            continue;
        }

        let mut record = RegionRecord::default();
        for m in metrics {
            let value = parse_count(&row[m.position]).ok_or_else(|| PullError::InvalidNumber {
                region: region.clone(),
                column: m.name.clone(),
                value: row[m.position].clone(),
            })?;
            record.set(m.metric, value);
        }
        debug!(region = %region, ?record, row = idx + 2, "recorded region");
        out.insert(region.clone(), record);
    }

    Ok(out)
}

/// Copy the metrics a pass carried into the running per-region totals.
/// Later passes win for the metrics they carry.
pub fn merge(
    into: &mut BTreeMap<String, RegionRecord>,
    pass: &BTreeMap<String, RegionRecord>,
    metrics: &[MetricColumn],
) {
    for (region, record) in pass {
        let target = into.entry(region.clone()).or_default();
        for m in metrics {
            target.set(m.metric, record.get(m.metric));
        }
    }
}

/// Plain digits or properly grouped thousands, optionally followed by a zero
/// fraction (`12.0`).
static COUNT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^-?(\d{1,3}(?:[,_ ]\d{3})+|\d+)(?:\.0*)?$").expect("count regex should compile")
});

/// Counts as published: `1,204`, ` 17 `, `12.0`; empty means zero.
/// Anything else, including values outside `i64`, is `None`.
pub fn parse_count(raw: &str) -> Option<i64> {
    let trimmed = clean_str(raw);
    if trimmed.is_empty() {
        return Some(0);
    }
    if !COUNT_RE.is_match(trimmed) {
        return None;
    }
    let digits: String = trimmed
        .split('.')
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| *c == '-' || c.is_ascii_digit())
        .collect();
    digits.parse::<i64>().ok()
}
