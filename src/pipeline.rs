// src/pipeline.rs
use std::collections::BTreeMap;

use tracing::{debug, info, instrument};

use crate::{
    aggregate::{aggregate, merge, resolve_metrics, Metric, MetricColumn, RegionRecord},
    error::Result,
    fetch::Fetcher,
    sheets::{SheetService, SheetWriter, WriteResult},
    source::{self, SourceFormat, SourceOptions},
    table::Table,
};

/// One source to fetch and the metrics it supplies.
#[derive(Debug, Clone)]
pub struct SourcePass {
    /// Shown in logs and column-not-found errors.
    pub name: String,
    pub url: String,
    pub format: SourceFormat,
    /// Sort rows newest-first by this column before aggregating.
    pub date_column: Option<String>,
    /// `(metric, input header name)`
    pub metrics: Vec<(Metric, String)>,
}

#[derive(Debug, Clone)]
pub struct Destination {
    pub spreadsheet_id: String,
    pub sheet: Option<String>,
    pub region_column: String,
    /// `(metric, output header name)`
    pub outputs: Vec<(Metric, String)>,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub passes: Vec<SourcePass>,
    pub destination: Destination,
    pub source_options: SourceOptions,
}

#[derive(Debug)]
pub struct RunSummary {
    pub records: BTreeMap<String, RegionRecord>,
    pub writes: Vec<WriteResult>,
}

/// A decoded source with its metric columns already resolved.
struct Prepared<'a> {
    pass: &'a SourcePass,
    table: Table,
    columns: Vec<MetricColumn>,
}

/// Fetch every source, read the destination layout, aggregate, then write one
/// column per configured metric.
#[instrument(level = "info", skip_all, fields(spreadsheet = %config.destination.spreadsheet_id))]
pub fn run(
    config: &RunConfig,
    fetcher: &dyn Fetcher,
    sheets: &dyn SheetService,
) -> Result<RunSummary> {
    // ─── 1) fetch, decode, sort, resolve columns ─────────────────────
    let mut prepared = Vec::with_capacity(config.passes.len());
    for pass in &config.passes {
        prepared.push(prepare(pass, fetcher, &config.source_options)?);
    }

    // ─── 2) destination layout (fails before any write) ──────────────
    let dest = &config.destination;
    let writer = SheetWriter::new(sheets, &dest.spreadsheet_id, dest.sheet.as_deref());
    let layout = writer.read_layout(&dest.region_column, &dest.outputs)?;
    let known = layout.known_regions();
    info!(regions = known.len(), "destination regions");

    // ─── 3) aggregate each pass, later passes win their metrics ──────
    let mut records: BTreeMap<String, RegionRecord> = known
        .iter()
        .map(|r| (r.clone(), RegionRecord::default()))
        .collect();
    for p in &prepared {
        let found = aggregate(&p.table, &p.columns, &known)?;
        info!(pass = %p.pass.name, matched = found.len(), "aggregated");
        merge(&mut records, &found, &p.columns);
    }
    debug!(?records, "aggregated records");

    // ─── 4) one bulk write per metric ────────────────────────────────
    let mut writes = Vec::new();
    for metric in Metric::ALL {
        if let Some(result) = writer.write(&layout, &records, metric)? {
            writes.push(result);
        }
    }

    info!(writes = writes.len(), "run complete");
    Ok(RunSummary { records, writes })
}

fn prepare<'a>(
    pass: &'a SourcePass,
    fetcher: &dyn Fetcher,
    options: &SourceOptions,
) -> Result<Prepared<'a>> {
    let decoder = source::for_format(pass.format, options);
    let mut table = source::load(fetcher, &pass.url, decoder.as_ref())?;
    debug!(pass = %pass.name, headers = ?table.headers, "source header");

    let index = table.column_index(&pass.name);
    if let Some(date) = &pass.date_column {
        let position = index.lookup(date)?;
        table.sort_by_date(position);
        debug!(pass = %pass.name, column = %date, position, "sorted rows by date");
    }
    let columns = resolve_metrics(&index, &pass.metrics)?;
    debug!(pass = %pass.name, ?columns, "resolved metric columns");

    Ok(Prepared {
        pass,
        table,
        columns,
    })
}
