use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use covidpull::{
    aggregate::Metric,
    fetch::HttpFetcher,
    pipeline::{self, Destination, RunConfig, SourcePass},
    sheets::{GoogleSheets, TokenStore},
    source::{PageRange, SourceFormat, SourceOptions},
};
use reqwest::blocking::Client;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

/// Pull COVID-19 case and death data and populate a Google sheet.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
#[command(group(ArgGroup::new("doses").multiple(true)))]
struct Args {
    /// Format of the data source: csv, pdf, excel or html
    mode: SourceFormat,

    /// Data source URL
    source: String,

    /// Input case column header name
    cases: String,

    /// Input death column header name
    deaths: String,

    /// Output spreadsheet id
    output: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output column header for case numbers
    #[arg(long, visible_alias = "oc", default_value = "Cases")]
    output_cases: String,

    /// Output column header for death numbers
    #[arg(long, visible_alias = "od", default_value = "Deaths")]
    output_deaths: String,

    /// Output column holding region (county) names
    #[arg(long, default_value = "County")]
    counties: String,

    /// Input date column; rows are sorted newest-first by it
    #[arg(short, long)]
    date: Option<String>,

    /// Input recovered column header name
    #[arg(long)]
    recovered: Option<String>,

    #[arg(long, default_value = "Recovered")]
    output_recovered: String,

    /// Input first-dose column header name
    #[arg(long, group = "doses")]
    first_dose: Option<String>,

    #[arg(long, default_value = "First Dose")]
    output_first_dose: String,

    /// Input fully-vaccinated column header name
    #[arg(long, group = "doses")]
    fully_vaccinated: Option<String>,

    #[arg(long, default_value = "Fully Vaccinated")]
    output_fully_vaccinated: String,

    /// Separate source URL for vaccine doses; needs --first-dose or --fully-vaccinated
    #[arg(long, requires = "doses")]
    vaccine_source: Option<String>,

    /// Format of the vaccine source
    #[arg(long, default_value = "csv")]
    vaccine_mode: SourceFormat,

    /// Date column of the vaccine source
    #[arg(long)]
    vaccine_date: Option<String>,

    /// Page range for pdf mode, e.g. 1,3-5 or all
    #[arg(long, default_value = "1")]
    pages: PageRange,

    /// Extraction flavor handed to the pdf table extractor
    #[arg(long, default_value = "lattice")]
    flavor: String,

    /// Program used to pull tables out of pdf sources
    #[arg(long, default_value = "camelot")]
    extractor: String,

    /// Which table (html) or worksheet (excel) to read
    #[arg(long, default_value_t = 0)]
    table_index: usize,

    /// Destination tab name (defaults to the first tab)
    #[arg(long)]
    sheet: Option<String>,

    /// Application credentials file
    #[arg(long, default_value = "credentials.json")]
    credentials: PathBuf,

    /// Token cache file
    #[arg(long, default_value = "token.json")]
    token: PathBuf,

    /// Use this access token instead of the token cache
    #[arg(long, env = "SHEETS_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,
}

impl Args {
    /// Dose metrics ride on the primary source unless a vaccine source is given.
    fn run_config(&self) -> RunConfig {
        let doses: Vec<(Metric, String)> = [
            (Metric::FirstDose, &self.first_dose),
            (Metric::FullyVaccinated, &self.fully_vaccinated),
        ]
        .into_iter()
        .filter_map(|(m, col)| col.clone().map(|c| (m, c)))
        .collect();

        let mut primary = vec![
            (Metric::Cases, self.cases.clone()),
            (Metric::Deaths, self.deaths.clone()),
        ];
        if let Some(col) = &self.recovered {
            primary.push((Metric::Recovered, col.clone()));
        }

        let mut passes = Vec::with_capacity(2);
        match &self.vaccine_source {
            Some(url) => {
                passes.push(SourcePass {
                    name: "source".into(),
                    url: self.source.clone(),
                    format: self.mode,
                    date_column: self.date.clone(),
                    metrics: primary,
                });
                passes.push(SourcePass {
                    name: "vaccine".into(),
                    url: url.clone(),
                    format: self.vaccine_mode,
                    date_column: self.vaccine_date.clone(),
                    metrics: doses,
                });
            }
            None => {
                primary.extend(doses);
                passes.push(SourcePass {
                    name: "source".into(),
                    url: self.source.clone(),
                    format: self.mode,
                    date_column: self.date.clone(),
                    metrics: primary,
                });
            }
        }

        let output_name = |metric: Metric| match metric {
            Metric::Cases => self.output_cases.clone(),
            Metric::Deaths => self.output_deaths.clone(),
            Metric::Recovered => self.output_recovered.clone(),
            Metric::FirstDose => self.output_first_dose.clone(),
            Metric::FullyVaccinated => self.output_fully_vaccinated.clone(),
        };
        let mut configured: Vec<Metric> = passes
            .iter()
            .flat_map(|p| p.metrics.iter().map(|(m, _)| *m))
            .collect();
        configured.sort();
        configured.dedup();

        RunConfig {
            passes,
            destination: Destination {
                spreadsheet_id: self.output.clone(),
                sheet: self.sheet.clone(),
                region_column: self.counties.clone(),
                outputs: configured.into_iter().map(|m| (m, output_name(m))).collect(),
            },
            source_options: SourceOptions {
                pages: self.pages.clone(),
                extractor: self.extractor.clone(),
                flavor: self.flavor.clone(),
                table_index: self.table_index,
            },
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // ─── 1) init logging ─────────────────────────────────────────────
    let default_filter = if args.verbose {
        "covidpull=debug"
    } else {
        "covidpull=info"
    };
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    fmt::Subscriber::builder().with_env_filter(env).init();
    let shown = Args {
        access_token: args.access_token.as_ref().map(|_| "<redacted>".to_string()),
        ..args.clone()
    };
    debug!(args = ?shown, "parsed arguments");

    // ─── 2) configure the run ────────────────────────────────────────
    let config = args.run_config();
    let client = Client::builder()
        .user_agent(concat!("covidpull/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("building HTTP client")?;

    // ─── 3) authorize against the destination ────────────────────────
    let access_token = match &args.access_token {
        Some(token) => token.clone(),
        None => TokenStore::new(&args.token, &args.credentials)
            .access_token(&client)
            .context("loading Sheets credentials")?,
    };
    let sheets = GoogleSheets::new(client.clone(), access_token)?;
    let fetcher = HttpFetcher::new(client);

    // ─── 4) pull + write ─────────────────────────────────────────────
    let summary = pipeline::run(&config, &fetcher, &sheets)
        .with_context(|| format!("updating spreadsheet {}", config.destination.spreadsheet_id))?;

    for write in &summary.writes {
        info!(metric = %write.metric, range = %write.range, cells = write.cells, "updated");
    }
    debug!(records = ?summary.records, "final aggregates");
    info!(regions = summary.records.len(), "all done");
    Ok(())
}
