// src/sheets/auth.rs
//! Cached OAuth credentials for the Sheets API.
//!
//! The consent flow that first creates the token cache happens elsewhere; this
//! module only reads the cache, refreshes an expiring access token and writes the
//! refreshed token back.

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Duration, Utc};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::{PullError, Result};

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Tokens this close to expiry are refreshed up front.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Authorized-user token cache, as written by the usual Google client libraries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CachedToken {
    #[serde(alias = "access_token")]
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl CachedToken {
    /// A token without an expiry is taken at face value.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry
            .map(|exp| exp <= now + Duration::seconds(EXPIRY_MARGIN_SECS))
            .unwrap_or(false)
    }
}

/// Application credentials file; Google issues either an `installed` or a `web` block.
#[derive(Debug, Deserialize)]
struct ClientSecrets {
    installed: Option<ClientInfo>,
    web: Option<ClientInfo>,
}

#[derive(Debug, Clone, Deserialize)]
struct ClientInfo {
    client_id: String,
    client_secret: String,
    #[serde(default)]
    token_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Token cache + application credentials on disk.
#[derive(Debug, Clone)]
pub struct TokenStore {
    token_path: PathBuf,
    credentials_path: PathBuf,
}

impl TokenStore {
    pub fn new(token_path: impl Into<PathBuf>, credentials_path: impl Into<PathBuf>) -> Self {
        Self {
            token_path: token_path.into(),
            credentials_path: credentials_path.into(),
        }
    }

    pub fn load(&self) -> Result<CachedToken> {
        let text = fs::read_to_string(&self.token_path).map_err(|e| {
            PullError::Auth(format!(
                "cannot read token cache {}: {} (authorize the application first)",
                self.token_path.display(),
                e
            ))
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, token: &CachedToken) -> Result<()> {
        let json = serde_json::to_string_pretty(token)?;
        fs::write(&self.token_path, json)?;
        debug!(path = %self.token_path.display(), "saved token cache");
        Ok(())
    }

    /// A usable access token, refreshing (and re-caching) it when needed.
    #[instrument(level = "info", skip_all, fields(cache = %self.token_path.display()))]
    pub fn access_token(&self, client: &Client) -> Result<String> {
        let token = self.load()?;
        if !token.is_expired(Utc::now()) {
            return Ok(token.token);
        }

        info!(expiry = ?token.expiry, "access token expired; refreshing");
        let refreshed = self.refresh(client, token)?;
        self.save(&refreshed)?;
        Ok(refreshed.token)
    }

    fn refresh(&self, client: &Client, token: CachedToken) -> Result<CachedToken> {
        let refresh_token = token
            .refresh_token
            .clone()
            .ok_or_else(|| PullError::Auth("token expired and no refresh token cached".into()))?;
        let info = self.client_info(&token)?;
        let token_uri = info
            .token_uri
            .clone()
            .or_else(|| token.token_uri.clone())
            .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string());

        let resp = client
            .post(&token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", info.client_id.as_str()),
                ("client_secret", info.client_secret.as_str()),
            ])
            .send()
            .map_err(|e| PullError::Auth(format!("token refresh request failed: {}", e)))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(PullError::Auth(format!(
                "token refresh rejected ({}): {}",
                status, body
            )));
        }
        let fresh: RefreshResponse = resp
            .json()
            .map_err(|e| PullError::Auth(format!("bad token refresh response: {}", e)))?;

        Ok(CachedToken {
            token: fresh.access_token,
            refresh_token: fresh.refresh_token.or(Some(refresh_token)),
            token_uri: Some(token_uri),
            client_id: Some(info.client_id),
            client_secret: Some(info.client_secret),
            expiry: Some(Utc::now() + Duration::seconds(fresh.expires_in)),
            scopes: token.scopes,
        })
    }

    /// Client id/secret from the token cache, else from the credentials file.
    fn client_info(&self, token: &CachedToken) -> Result<ClientInfo> {
        if let (Some(id), Some(secret)) = (&token.client_id, &token.client_secret) {
            return Ok(ClientInfo {
                client_id: id.clone(),
                client_secret: secret.clone(),
                token_uri: token.token_uri.clone(),
            });
        }
        read_client_secrets(&self.credentials_path)
    }
}

fn read_client_secrets(path: &Path) -> Result<ClientInfo> {
    let text = fs::read_to_string(path).map_err(|e| {
        PullError::Auth(format!("cannot read credentials {}: {}", path.display(), e))
    })?;
    let secrets: ClientSecrets = serde_json::from_str(&text)?;
    secrets.installed.or(secrets.web).ok_or_else(|| {
        PullError::Auth(format!(
            "{} has neither an \"installed\" nor a \"web\" client",
            path.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    #[test]
    fn reads_authorized_user_layout() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("token.json");
        fs::write(
            &path,
            r#"{"token": "ya29.abc", "refresh_token": "1//r", "token_uri": "https://oauth2.googleapis.com/token",
                "client_id": "cid", "client_secret": "secret",
                "scopes": ["https://www.googleapis.com/auth/spreadsheets"],
                "expiry": "2021-03-01T12:00:00.123456Z"}"#,
        )?;
        let store = TokenStore::new(&path, dir.path().join("credentials.json"));
        let token = store.load()?;
        assert_eq!(token.token, "ya29.abc");
        assert_eq!(token.scopes.len(), 1);
        assert!(token.is_expired(Utc.with_ymd_and_hms(2021, 3, 1, 11, 59, 30).unwrap()));
        assert!(!token.is_expired(Utc.with_ymd_and_hms(2021, 3, 1, 11, 0, 0).unwrap()));
        Ok(())
    }

    #[test]
    fn fresh_token_needs_no_network() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = TokenStore::new(dir.path().join("token.json"), dir.path().join("c.json"));
        store.save(&CachedToken {
            token: "live".into(),
            refresh_token: None,
            token_uri: None,
            client_id: None,
            client_secret: None,
            scopes: Vec::new(),
            expiry: Some(Utc::now() + Duration::hours(1)),
        })?;
        assert_eq!(store.access_token(&Client::new())?, "live");

        // an access_token key is accepted too
        fs::write(dir.path().join("token.json"), r#"{"access_token": "plain"}"#)?;
        assert_eq!(store.access_token(&Client::new())?, "plain");
        Ok(())
    }

    #[test]
    fn missing_cache_is_auth_error() {
        let dir = tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("nope.json"), dir.path().join("c.json"));
        assert!(matches!(store.access_token(&Client::new()), Err(PullError::Auth(_))));
    }

    #[test]
    fn expired_without_refresh_token_is_auth_error() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = TokenStore::new(dir.path().join("token.json"), dir.path().join("c.json"));
        store.save(&CachedToken {
            token: "old".into(),
            refresh_token: None,
            token_uri: None,
            client_id: None,
            client_secret: None,
            scopes: Vec::new(),
            expiry: Some(Utc::now() - Duration::hours(1)),
        })?;
        let err = store.access_token(&Client::new()).unwrap_err();
        assert!(matches!(err, PullError::Auth(msg) if msg.contains("refresh token")));
        Ok(())
    }

    #[test]
    fn credentials_file_layouts() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("credentials.json");

        fs::write(
            &path,
            r#"{"installed": {"client_id": "a", "client_secret": "b", "token_uri": "https://t"}}"#,
        )?;
        let info = read_client_secrets(&path)?;
        assert_eq!(info.client_id, "a");
        assert_eq!(info.token_uri.as_deref(), Some("https://t"));

        fs::write(&path, r#"{"web": {"client_id": "w", "client_secret": "s"}}"#)?;
        assert_eq!(read_client_secrets(&path)?.client_id, "w");

        fs::write(&path, r#"{"other": {}}"#)?;
        assert!(matches!(read_client_secrets(&path), Err(PullError::Auth(_))));
        Ok(())
    }
}
