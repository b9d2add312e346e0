//! Deep-merge record store.
//!
//! Single source of truth for guild configuration and user records. The
//! record set lives behind one RwLock; every mutation is read-merge-write
//! under the write lock, so two events touching the same record cannot
//! interleave. Durability is delegated to a background flush worker fed
//! by a bounded channel: bursts of mutations coalesce into one pre-image
//! snapshot plus one atomic write, and the newest in-memory state always
//! wins. None of the public operations propagate I/O or parse failures;
//! they recover locally and log.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, RwLock, RwLockWriteGuard};
use tracing::{debug, error, info, warn};

use herald_common::leveling::level_from_xp;
use herald_common::merge::deep_merge;
use herald_common::schema::{user_key, EconomyConfig, GuildConfig, RecordSet, UserRecord};

use crate::backup::{BackupRotator, STAMP_FORMAT};
use crate::config::Config;

/// Reason tag for routine flush snapshots
const REASON_AUTO_SAVE: &str = "auto_save";

/// Reason tag for the diagnostic snapshot of an unparseable document
const REASON_CORRUPTED: &str = "corrupted_recovery";

/// Events emitted for the presentation layer
#[derive(Debug, Clone)]
pub enum StoreEvent {
    LevelUp {
        guild_id: u64,
        user_id: u64,
        old_level: u32,
        new_level: u32,
        total_xp: u64,
    },
}

/// The one failure `Store::open` surfaces: an unusable backing location.
/// Everything after open recovers locally instead of propagating.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("cannot prepare {path}: {source}")]
    Prepare {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone)]
struct StorePaths {
    data_file: PathBuf,
    emergency_file: PathBuf,
}

/// Handle to the shared record store. Cheap to clone; all clones share
/// the same record set, flush worker, and event channel.
#[derive(Clone)]
pub struct Store {
    inner: Arc<RwLock<RecordSet>>,
    paths: StorePaths,
    rotator: BackupRotator,
    flush_tx: mpsc::Sender<()>,
    events: broadcast::Sender<StoreEvent>,
}

impl Store {
    /// Open the store: prepare the backing directories, load (or recover)
    /// the record set, and start the flush worker. Must be called inside
    /// a Tokio runtime.
    pub fn open(config: &Config) -> Result<Self, OpenError> {
        let backup_dir = config.backup_dir();
        for dir in [&config.storage.data_dir, &backup_dir] {
            fs::create_dir_all(dir).map_err(|source| OpenError::Prepare {
                path: dir.clone(),
                source,
            })?;
        }

        let paths = StorePaths {
            data_file: config.data_file(),
            emergency_file: config.emergency_file(),
        };
        let rotator = BackupRotator::new(
            paths.data_file.clone(),
            backup_dir,
            config.storage.backup_keep,
        );

        let record_set = load_or_recover(&paths.data_file, &rotator);

        let (flush_tx, flush_rx) = mpsc::channel(config.flush.queue_depth.max(1));
        let (events, _) = broadcast::channel(64);

        let store = Self {
            inner: Arc::new(RwLock::new(record_set)),
            paths,
            rotator,
            flush_tx,
            events,
        };
        store.spawn_flush_worker(flush_rx);
        Ok(store)
    }

    fn spawn_flush_worker(&self, mut flush_rx: mpsc::Receiver<()>) {
        let store = self.clone();
        tokio::spawn(async move {
            while flush_rx.recv().await.is_some() {
                // Drain the burst; one flush covers every mark taken.
                while flush_rx.try_recv().is_ok() {}
                store.flush_once().await;
            }
        });
    }

    /// Guild configuration, materializing (and scheduling persistence of)
    /// schema defaults on first access
    pub async fn guild_config(&self, guild_id: u64) -> GuildConfig {
        let key = guild_id.to_string();
        {
            let record_set = self.inner.read().await;
            if let Some(config) = record_set.servers.get(&key) {
                return config.clone();
            }
        }

        let mut record_set = self.inner.write().await;
        let config = record_set
            .servers
            .entry(key)
            .or_insert_with(GuildConfig::default)
            .clone();
        drop(record_set);

        self.schedule_flush();
        config
    }

    /// User record keyed by (guild, user), materializing defaults on
    /// first access with the wallet seeded from the guild's configured
    /// starting balance
    pub async fn user_record(&self, guild_id: u64, user_id: u64) -> UserRecord {
        let key = user_key(guild_id, user_id);
        {
            let record_set = self.inner.read().await;
            if let Some(record) = record_set.users.get(&key) {
                return record.clone();
            }
        }

        let mut guard = self.inner.write().await;
        let record_set = &mut *guard;
        let starting_balance = record_set
            .servers
            .get(&guild_id.to_string())
            .map(|config| config.economy.starting_balance)
            .unwrap_or_else(|| EconomyConfig::default().starting_balance);
        let record = record_set
            .users
            .entry(key)
            .or_insert_with(|| UserRecord::with_starting_balance(starting_balance))
            .clone();
        drop(guard);

        self.schedule_flush();
        record
    }

    /// Deep-merge a partial update into the guild's configuration and
    /// schedule persistence. Returns the merged configuration. A patch
    /// that does not re-type against the schema is rejected and logged,
    /// leaving the record unchanged.
    pub async fn update_guild_config(&self, guild_id: u64, patch: Value) -> GuildConfig {
        let merged = {
            let mut record_set = self.inner.write().await;
            let current = record_set
                .servers
                .entry(guild_id.to_string())
                .or_insert_with(GuildConfig::default);
            match apply_patch(current, patch) {
                Ok(updated) => {
                    *current = updated.clone();
                    updated
                }
                Err(e) => {
                    warn!("rejected config patch for guild {}: {}", guild_id, e);
                    current.clone()
                }
            }
        };
        self.schedule_flush();
        merged
    }

    /// Deep-merge a partial update into a user record and schedule
    /// persistence. The level is re-derived from `total_xp` afterwards,
    /// so the progression invariant holds even for patches that touch
    /// only the XP fields.
    pub async fn update_user_record(&self, guild_id: u64, user_id: u64, patch: Value) -> UserRecord {
        let merged = {
            let mut guard = self.inner.write().await;
            let record_set = &mut *guard;
            let starting_balance = record_set
                .servers
                .get(&guild_id.to_string())
                .map(|config| config.economy.starting_balance)
                .unwrap_or_else(|| EconomyConfig::default().starting_balance);
            let current = record_set
                .users
                .entry(user_key(guild_id, user_id))
                .or_insert_with(|| UserRecord::with_starting_balance(starting_balance));
            match apply_patch(current, patch) {
                Ok(mut updated) => {
                    updated.leveling.level = level_from_xp(updated.leveling.total_xp);
                    *current = updated.clone();
                    updated
                }
                Err(e) => {
                    warn!(
                        "rejected record patch for user {} in guild {}: {}",
                        user_id, guild_id, e
                    );
                    current.clone()
                }
            }
        };
        self.schedule_flush();
        merged
    }

    /// Clone of the whole record set, for diagnostics and leaderboards
    pub async fn snapshot(&self) -> RecordSet {
        self.inner.read().await.clone()
    }

    /// Subscribe to store events (level-ups) for the presentation layer
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: StoreEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub(crate) async fn write(&self) -> RwLockWriteGuard<'_, RecordSet> {
        self.inner.write().await
    }

    /// Mark the store dirty. A full queue means a flush is already
    /// pending, which is exactly the coalescing we want.
    pub fn schedule_flush(&self) {
        let _ = self.flush_tx.try_send(());
    }

    /// Persist the current record set right now: pre-image snapshot,
    /// metadata bookkeeping, atomic write. Returns whether the primary
    /// write landed; failures fall back to the emergency dump and are
    /// never raised.
    pub async fn flush_now(&self) -> bool {
        self.flush_once().await
    }

    async fn flush_once(&self) -> bool {
        let now = Utc::now();
        let stamp = now.format(STAMP_FORMAT).to_string();
        let backed_up = self.rotator.snapshot(&stamp, REASON_AUTO_SAVE);

        let snapshot = {
            let mut guard = self.inner.write().await;
            let record_set = &mut *guard;
            record_set.metadata.last_updated = Some(now);
            record_set.metadata.total_servers = record_set.servers.len() as u64;
            record_set.metadata.total_users = record_set.users.len() as u64;
            if backed_up {
                record_set.metadata.last_backup = Some(stamp);
            }
            record_set.clone()
        };

        match write_atomic(&self.paths.data_file, &snapshot) {
            Ok(()) => {
                debug!("record set persisted to {}", self.paths.data_file.display());
                true
            }
            Err(e) => {
                error!("failed to persist record set: {:#}", e);
                emergency_dump(&self.paths.emergency_file, &snapshot);
                false
            }
        }
    }
}

/// Deep-merge a JSON patch into a typed record, re-typing the result
/// through the schema
fn apply_patch<T>(current: &T, patch: Value) -> serde_json::Result<T>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    let mut value = serde_json::to_value(current)?;
    deep_merge(&mut value, patch);
    serde_json::from_value(value)
}

fn load_or_recover(data_file: &Path, rotator: &BackupRotator) -> RecordSet {
    let raw = match fs::read_to_string(data_file) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!(
                "no record set at {}, starting from schema defaults",
                data_file.display()
            );
            return RecordSet::default();
        }
        Err(e) => {
            error!("cannot read {}: {}", data_file.display(), e);
            snapshot_corrupt(rotator);
            return RecordSet::default();
        }
    };

    match RecordSet::from_json_str(&raw) {
        Ok(record_set) => {
            info!(
                "loaded {} guilds and {} user records",
                record_set.servers.len(),
                record_set.users.len()
            );
            record_set
        }
        Err(e) => {
            error!("malformed record set, falling back to schema defaults: {}", e);
            snapshot_corrupt(rotator);
            RecordSet::default()
        }
    }
}

fn snapshot_corrupt(rotator: &BackupRotator) {
    let stamp = Utc::now().format(STAMP_FORMAT).to_string();
    if rotator.snapshot(&stamp, REASON_CORRUPTED) {
        warn!("diagnostic snapshot of the unreadable document taken");
    }
}

/// Write-to-temp-then-rename so a crash mid-write can never leave a
/// truncated primary file
fn write_atomic(data_file: &Path, record_set: &RecordSet) -> Result<()> {
    let json = serde_json::to_string_pretty(record_set).context("serializing record set")?;
    let tmp = data_file.with_extension("json.tmp");
    fs::write(&tmp, json.as_bytes()).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, data_file).with_context(|| format!("replacing {}", data_file.display()))?;
    Ok(())
}

fn emergency_dump(emergency_file: &Path, record_set: &RecordSet) {
    match serde_json::to_string(record_set) {
        Ok(json) => match fs::write(emergency_file, json) {
            Ok(()) => warn!("emergency dump written to {}", emergency_file.display()),
            Err(e) => error!(
                "emergency dump to {} failed: {}",
                emergency_file.display(),
                e
            ),
        },
        Err(e) => error!("emergency dump serialization failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_apply_patch_merges_maps_and_fills_schema() {
        let config = GuildConfig::default();
        let updated: GuildConfig = apply_patch(
            &config,
            json!({"leveling": {"xp_per_message": 25, "role_multipliers": {"7": 2.0}}}),
        )
        .unwrap();

        assert_eq!(updated.leveling.xp_per_message, 25);
        assert_eq!(updated.leveling.role_multipliers["7"], 2.0);
        // Untouched siblings survive the merge.
        assert_eq!(updated.leveling.xp_cooldown_secs, 60);
        assert_eq!(updated.economy.daily_amount, 100);
    }

    #[test]
    fn test_apply_patch_rejects_mistyped_values() {
        let config = GuildConfig::default();
        let result = apply_patch(&config, json!({"leveling": {"xp_per_message": "lots"}}));
        assert!(result.is_err());
    }
}
