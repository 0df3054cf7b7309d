// src/fetch.rs

use reqwest::blocking::Client;
use tracing::{debug, instrument};

use crate::error::{PullError, Result};

/// Bytes fetched from a source URL, consumed once by a decoder.
#[derive(Debug)]
pub struct RawDocument {
    pub url: String,
    pub bytes: Vec<u8>,
}

impl RawDocument {
    /// Fails with `NoDataFound` on an empty payload.
    pub fn new(url: impl Into<String>, bytes: Vec<u8>) -> Result<Self> {
        let url = url.into();
        if bytes.is_empty() {
            return Err(PullError::NoDataFound(url));
        }
        Ok(Self { url, bytes })
    }
}

/// Anything that can turn a URL into a `RawDocument`.
pub trait Fetcher {
    fn fetch(&self, url: &str) -> Result<RawDocument>;
}

/// Plain blocking GET, following redirects.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl Fetcher for HttpFetcher {
    #[instrument(level = "info", skip(self))]
    fn fetch(&self, url: &str) -> Result<RawDocument> {
        let unavailable = |e: reqwest::Error| PullError::SourceUnavailable {
            url: url.to_string(),
            reason: e.to_string(),
        };
        let bytes = self
            .client
            .get(url)
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.bytes())
            .map_err(unavailable)?;
        debug!(url, size = bytes.len(), "fetched source");
        RawDocument::new(url, bytes.to_vec())
    }
}
