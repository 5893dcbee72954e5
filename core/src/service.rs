use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{debug, warn};

use crate::db::Database;
use crate::export::{self, ImportData};
use crate::metrics;
use crate::models::{
    ChartPoint, Entry, ImportSummary, Metrics, PaceAssessment, RemoteStatus, Settings, SyncReport,
    validate_entry, validate_settings,
};
use crate::reconcile;
use crate::store;
use crate::sync::{self, RemoteStore};

/// A sync lock older than this is assumed abandoned.
const SYNC_LOCK_STALE_MINUTES: i64 = 10;

/// Owns the database handle and the in-memory log and settings.
///
/// Every change to the log is persisted before memory is updated; single
/// writes go through `commit`, imports through one transaction. Remote operations are best-effort and never roll
/// back local state.
pub struct LogService {
    db: Database,
    entries: Vec<Entry>,
    settings: Settings,
}

impl LogService {
    pub fn open(db_path: &Path, today: NaiveDate) -> Result<Self> {
        let db = Database::open(db_path)?;
        Ok(Self::load(db, today))
    }

    pub fn open_in_memory(today: NaiveDate) -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self::load(db, today))
    }

    fn load(db: Database, today: NaiveDate) -> Self {
        let entries = store::load_entries(&db);
        let settings = store::load_settings(&db, today);
        debug!(entries = entries.len(), "loaded local log");
        Self {
            db,
            entries,
            settings,
        }
    }

    // --- Reads ---

    #[must_use]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn entry(&self, date: NaiveDate) -> Option<&Entry> {
        self.entries.iter().find(|e| e.date == date)
    }

    // --- Mutations ---

    fn commit(&mut self, entries: Vec<Entry>) -> Result<()> {
        store::save_entries(&self.db, &entries)?;
        self.entries = entries;
        Ok(())
    }

    /// Validate, stamp with `now` and upsert an entry. Returns the stored entry.
    pub fn record(&mut self, mut entry: Entry, now: DateTime<Utc>) -> Result<Entry> {
        validate_entry(&entry)?;
        entry.notes = entry.notes.trim().to_string();
        entry.updated_at = Some(now);
        let log = store::upsert(self.entries.clone(), entry.clone());
        self.commit(log)?;
        Ok(entry)
    }

    /// Remove the entry for `date`. Returns whether one existed.
    pub fn remove(&mut self, date: NaiveDate) -> Result<bool> {
        if self.entry(date).is_none() {
            return Ok(false);
        }
        let log = store::delete(self.entries.clone(), date);
        self.commit(log)?;
        Ok(true)
    }

    pub fn save_settings(&mut self, settings: Settings) -> Result<()> {
        validate_settings(&settings)?;
        store::save_settings(&self.db, &settings)?;
        self.settings = settings;
        Ok(())
    }

    pub fn reset_settings(&mut self, today: NaiveDate) -> Result<()> {
        self.save_settings(Settings::defaults(today))
    }

    /// Delete every local entry and the settings, including legacy slots.
    pub fn wipe(&mut self, today: NaiveDate) -> Result<()> {
        store::wipe(&self.db)?;
        self.entries.clear();
        self.settings = Settings::defaults(today);
        Ok(())
    }

    // --- Derived views ---

    #[must_use]
    pub fn metrics(&self, today: NaiveDate) -> Metrics {
        metrics::compute_metrics(&self.entries, &self.settings, today)
    }

    #[must_use]
    pub fn assessment(&self, today: NaiveDate) -> PaceAssessment {
        metrics::assess(&self.metrics(today))
    }

    #[must_use]
    pub fn weight_series(&self) -> Vec<ChartPoint> {
        metrics::weight_series(&self.entries)
    }

    #[must_use]
    pub fn steps_series(&self) -> Vec<ChartPoint> {
        metrics::steps_series(&self.entries)
    }

    // --- Export / Import ---

    pub fn export_json(&self, now: DateTime<Utc>) -> Result<String> {
        export::export_json(&self.entries, &self.settings, now)
    }

    pub fn export_csv(&self) -> Result<String> {
        export::export_csv(&self.entries)
    }

    /// Replace the log (and settings, when present) with a backup's contents.
    /// A malformed file is an error and nothing is applied.
    pub fn import(&mut self, bytes: &[u8], today: NaiveDate) -> Result<ImportSummary> {
        let ImportData { entries, settings } = export::parse_import(bytes, today)?;
        store::save_all(&self.db, &entries, settings.as_ref())?;

        let entries_imported = entries.len();
        let settings_imported = settings.is_some();
        self.entries = entries;
        if let Some(settings) = settings {
            self.settings = settings;
        }

        Ok(ImportSummary {
            entries_imported,
            settings_imported,
        })
    }

    // --- Remote ---

    /// Best-effort upsert of one entry to the remote store.
    pub async fn push_entry<R: RemoteStore>(
        &self,
        remote: Option<&R>,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> RemoteStatus {
        let Some(remote) = remote else {
            return RemoteStatus::NotConfigured;
        };
        let Some(entry) = self.entry(date) else {
            return RemoteStatus::Failed {
                error: format!("no entry for {date}"),
            };
        };
        settle(push_one(remote, entry, now).await)
    }

    /// Best-effort delete of one date on the remote store.
    pub async fn delete_remote<R: RemoteStore>(
        &self,
        remote: Option<&R>,
        date: NaiveDate,
    ) -> RemoteStatus {
        let Some(remote) = remote else {
            return RemoteStatus::NotConfigured;
        };
        settle(delete_one(remote, date).await)
    }

    /// Full cycle: pull, merge, persist, push everything.
    ///
    /// Guarded by a lock row so only one cycle runs per data directory at a
    /// time; a concurrent attempt reports [`RemoteStatus::AlreadyRunning`].
    pub async fn sync<R: RemoteStore>(
        &mut self,
        remote: Option<&R>,
        now: DateTime<Utc>,
    ) -> RemoteStatus {
        let Some(remote) = remote else {
            return RemoteStatus::NotConfigured;
        };

        let holder = format!("{}-{}", std::process::id(), now.timestamp_micros());
        let stale = Duration::minutes(SYNC_LOCK_STALE_MINUTES);
        match self.db.try_acquire_sync_lock(&holder, now, stale) {
            Ok(true) => {}
            Ok(false) => return RemoteStatus::AlreadyRunning,
            Err(e) => return settle(Err(e)),
        }

        let status = match self.sync_cycle(remote, now).await {
            Ok(Some(report)) => RemoteStatus::Synced(report),
            Ok(None) => RemoteStatus::NotAuthenticated,
            Err(e) => settle(Err(e)),
        };

        if let Err(e) = self.db.release_sync_lock(&holder) {
            warn!(error = %e, "failed to release sync lock");
        }
        status
    }

    async fn sync_cycle<R: RemoteStore>(
        &mut self,
        remote: &R,
        now: DateTime<Utc>,
    ) -> Result<Option<SyncReport>> {
        let Some((identity, rows)) = sync::pull(remote).await? else {
            return Ok(None);
        };
        let merged = reconcile::merge(&self.entries, &rows);
        self.commit(merged)?;

        let pushed = sync::push_all(remote, &identity, &self.entries, now).await?;
        Ok(Some(SyncReport {
            pulled: rows.len(),
            merged: self.entries.len(),
            pushed,
        }))
    }
}

async fn push_one<R: RemoteStore>(
    remote: &R,
    entry: &Entry,
    now: DateTime<Utc>,
) -> Result<RemoteStatus> {
    let Some(identity) = remote.identity().await? else {
        return Ok(RemoteStatus::NotAuthenticated);
    };
    sync::push_entry(remote, &identity, entry, now).await?;
    Ok(RemoteStatus::Pushed)
}

async fn delete_one<R: RemoteStore>(remote: &R, date: NaiveDate) -> Result<RemoteStatus> {
    let Some(identity) = remote.identity().await? else {
        return Ok(RemoteStatus::NotAuthenticated);
    };
    sync::delete_remote(remote, &identity, date).await?;
    Ok(RemoteStatus::Deleted)
}

/// Collapse a remote outcome into a status, logging failures.
fn settle(result: Result<RemoteStatus>) -> RemoteStatus {
    result.unwrap_or_else(|e| {
        let error = format!("{e:#}");
        warn!(%error, "remote operation failed");
        RemoteStatus::Failed { error }
    })
}
