use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use tracing::debug;

use crate::models::{Entry, Identity, RemoteRow};

/// Remote row store keyed by `(principal, date)`.
///
/// The CLI implements this over HTTP; tests use an in-memory map. Calls are
/// awaited one at a time by the service.
#[allow(async_fn_in_trait)]
pub trait RemoteStore {
    /// The authenticated principal, or `None` when not signed in.
    async fn identity(&self) -> Result<Option<Identity>>;
    /// All rows of the principal ordered by date.
    async fn fetch_rows(&self, identity: &Identity) -> Result<Vec<RemoteRow>>;
    /// Idempotent insert-or-replace keyed by principal and date.
    async fn upsert_row(&self, identity: &Identity, row: &RemoteRow) -> Result<()>;
    async fn delete_row(&self, identity: &Identity, date: NaiveDate) -> Result<()>;
}

/// Build the remote shadow of an entry. A never-stamped entry is stamped with
/// `now`, and the payload and row column always carry the same instant.
pub fn entry_to_row(entry: &Entry, now: DateTime<Utc>) -> Result<RemoteRow> {
    let stamped = entry.updated_at.unwrap_or(now);
    let mut payload_entry = entry.clone();
    payload_entry.updated_at = Some(stamped);
    let payload = serde_json::to_value(&payload_entry)?;
    Ok(RemoteRow {
        date: entry.date_str(),
        payload,
        updated_at: Some(stamped.to_rfc3339_opts(SecondsFormat::Millis, true)),
    })
}

/// Identity lookup followed by the row query. `None` when not authenticated.
pub async fn pull<R: RemoteStore>(remote: &R) -> Result<Option<(Identity, Vec<RemoteRow>)>> {
    let Some(identity) = remote.identity().await.context("Identity lookup failed")? else {
        return Ok(None);
    };
    let rows = remote
        .fetch_rows(&identity)
        .await
        .context("Failed to fetch remote rows")?;
    debug!(user = %identity.id, rows = rows.len(), "pulled remote rows");
    Ok(Some((identity, rows)))
}

pub async fn push_entry<R: RemoteStore>(
    remote: &R,
    identity: &Identity,
    entry: &Entry,
    now: DateTime<Utc>,
) -> Result<()> {
    let row = entry_to_row(entry, now)?;
    remote
        .upsert_row(identity, &row)
        .await
        .with_context(|| format!("Failed to push entry {}", row.date))
}

/// Push every entry, one round trip each. Stops at the first failure.
pub async fn push_all<R: RemoteStore>(
    remote: &R,
    identity: &Identity,
    entries: &[Entry],
    now: DateTime<Utc>,
) -> Result<usize> {
    for entry in entries {
        push_entry(remote, identity, entry, now).await?;
    }
    debug!(count = entries.len(), "pushed all entries");
    Ok(entries.len())
}

pub async fn delete_remote<R: RemoteStore>(
    remote: &R,
    identity: &Identity,
    date: NaiveDate,
) -> Result<()> {
    remote
        .delete_row(identity, date)
        .await
        .with_context(|| format!("Failed to delete remote entry {date}"))
}
