use anyhow::{Context, Result};
use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;

use crate::config::RemoteConfig;
use habitlog_core::models::{Identity, RemoteRow};
use habitlog_core::sync::RemoteStore;

/// HTTP client for a `habitlog serve` row store.
pub struct RemoteClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct UpsertBody<'a> {
    payload: &'a Value,
    updated_at: Option<&'a str>,
}

impl RemoteClient {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "habitlog-cli/{} (habit log)",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(std::time::Duration::from_secs(10))
            .connect_timeout(std::time::Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn entry_url(&self, date: &str) -> String {
        self.url(&format!("/api/entries/{date}"))
    }
}

impl RemoteStore for RemoteClient {
    async fn identity(&self) -> Result<Option<Identity>> {
        let resp = self
            .client
            .get(self.url("/api/me"))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .context("Failed to reach remote")?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            return Ok(None);
        }

        let identity = resp
            .error_for_status()
            .context("Identity lookup rejected")?
            .json()
            .await
            .context("Failed to parse identity response")?;
        Ok(Some(identity))
    }

    // The server scopes rows by the key's identity.
    async fn fetch_rows(&self, _identity: &Identity) -> Result<Vec<RemoteRow>> {
        let rows = self
            .client
            .get(self.url("/api/entries"))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .context("Failed to reach remote")?
            .error_for_status()
            .context("Row query rejected")?
            .json()
            .await
            .context("Failed to parse remote rows")?;
        Ok(rows)
    }

    async fn upsert_row(&self, _identity: &Identity, row: &RemoteRow) -> Result<()> {
        let body = UpsertBody {
            payload: &row.payload,
            updated_at: row.updated_at.as_deref(),
        };
        self.client
            .put(self.entry_url(&row.date))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("Failed to reach remote")?
            .error_for_status()
            .context("Row upsert rejected")?;
        Ok(())
    }

    async fn delete_row(&self, _identity: &Identity, date: NaiveDate) -> Result<()> {
        let resp = self
            .client
            .delete(self.entry_url(&date.format("%Y-%m-%d").to_string()))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .context("Failed to reach remote")?;

        // Already gone is fine.
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        resp.error_for_status().context("Row delete rejected")?;
        Ok(())
    }
}
