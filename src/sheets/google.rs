// src/sheets/google.rs
use reqwest::blocking::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use super::SheetService;
use crate::error::{PullError, Result};

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets/";

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValueRangeUpdate<'a> {
    range: &'a str,
    major_dimension: &'static str,
    values: Vec<Vec<String>>,
}

/// Google Sheets v4 `values` endpoints over a bearer token.
pub struct GoogleSheets {
    client: Client,
    base: Url,
    access_token: String,
}

impl GoogleSheets {
    pub fn new(client: Client, access_token: String) -> Result<Self> {
        Self::with_base(client, SHEETS_API, access_token)
    }

    /// Same endpoints rooted somewhere other than the public API.
    pub fn with_base(client: Client, base: &str, access_token: String) -> Result<Self> {
        let base =
            Url::parse(base).map_err(|e| PullError::InvalidUrl(format!("{:?}: {}", base, e)))?;
        Ok(Self {
            client,
            base,
            access_token,
        })
    }

    /// `<base>/<spreadsheet_id>/values/<range>` with both segments percent-encoded.
    fn values_url(&self, spreadsheet_id: &str, range: &str) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| PullError::InvalidUrl(format!("{} cannot be a base", self.base)))?
            .pop_if_empty()
            .push(spreadsheet_id)
            .push("values")
            .push(range);
        Ok(url)
    }
}

fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    Err(PullError::SheetsApi {
        status: status.as_u16(),
        body,
    })
}

fn cell_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl SheetService for GoogleSheets {
    #[instrument(level = "debug", skip(self))]
    fn read_range(&self, spreadsheet_id: &str, range: &str) -> Result<Vec<Vec<String>>> {
        let url = self.values_url(spreadsheet_id, range)?;
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()?;
        let body: ValueRange = check(resp)?.json()?;
        debug!(rows = body.values.len(), "read range");
        Ok(body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }

    #[instrument(level = "debug", skip(self, rows), fields(rows = rows.len()))]
    fn update_range(
        &self,
        spreadsheet_id: &str,
        range: &str,
        rows: Vec<Vec<String>>,
    ) -> Result<()> {
        let mut url = self.values_url(spreadsheet_id, range)?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED");
        let body = ValueRangeUpdate {
            range,
            major_dimension: "ROWS",
            values: rows,
        };
        let resp = self
            .client
            .put(url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()?;
        check(resp)?;
        Ok(())
    }
}
