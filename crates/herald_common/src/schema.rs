//! Record schema for the Herald data file.
//!
//! One document holds everything: metadata, per-guild configuration,
//! per-(guild, user) records, and global counters. Every field carries a
//! serde default so documents written by older versions gain new keys on
//! load instead of failing to parse.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::merge::deep_merge;
use crate::VERSION;

/// Module key for the leveling subsystem in [`GuildConfig::modules`].
pub const MODULE_LEVELS: &str = "levels";

/// Module key for the economy subsystem in [`GuildConfig::modules`].
pub const MODULE_ECONOMY: &str = "economy";

/// Composite key for a user record inside [`RecordSet::users`].
pub fn user_key(guild_id: u64, user_id: u64) -> String {
    format!("{}_{}", guild_id, user_id)
}

/// The full persisted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RecordSet {
    #[serde(default)]
    pub metadata: Metadata,

    /// Guild id (as a string) -> guild configuration.
    #[serde(default)]
    pub servers: HashMap<String, GuildConfig>,

    /// `"{guild_id}_{user_id}"` -> user record.
    #[serde(default)]
    pub users: HashMap<String, UserRecord>,

    #[serde(default)]
    pub statistics: Statistics,
}

impl RecordSet {
    /// Parse a document, reconciling it against the current default
    /// schema: keys the file predates are filled from defaults, keys the
    /// file carries win everywhere else.
    pub fn from_json_str(raw: &str) -> serde_json::Result<Self> {
        let loaded: serde_json::Value = serde_json::from_str(raw)?;
        let mut base = serde_json::to_value(RecordSet::default())?;
        deep_merge(&mut base, loaded);
        serde_json::from_value(base)
    }
}

/// Document bookkeeping, maintained by the store on every save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Schema version that wrote this document.
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    /// Set on every persisted save.
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,

    /// Timestamp tag of the newest backup snapshot.
    #[serde(default)]
    pub last_backup: Option<String>,

    #[serde(default)]
    pub total_servers: u64,

    #[serde(default)]
    pub total_users: u64,
}

fn default_version() -> String {
    VERSION.to_string()
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            version: default_version(),
            created_at: Utc::now(),
            last_updated: None,
            last_backup: None,
            total_servers: 0,
            total_users: 0,
        }
    }
}

/// Global counters across all guilds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Statistics {
    #[serde(default)]
    pub messages_processed: u64,

    #[serde(default)]
    pub level_ups: u64,

    #[serde(default)]
    pub economy_transactions: u64,
}

/// Per-guild configuration, materialized with defaults on first access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildConfig {
    #[serde(default = "default_prefix")]
    pub prefix: String,

    #[serde(default = "default_language")]
    pub language: String,

    /// Feature name -> enabled. Gates the engines; unknown features are
    /// treated as enabled, matching the defaults.
    #[serde(default = "default_modules")]
    pub modules: HashMap<String, bool>,

    #[serde(default)]
    pub leveling: LevelingConfig,

    #[serde(default)]
    pub economy: EconomyConfig,
}

fn default_prefix() -> String {
    "!".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_modules() -> HashMap<String, bool> {
    HashMap::from([
        (MODULE_LEVELS.to_string(), true),
        (MODULE_ECONOMY.to_string(), true),
    ])
}

impl Default for GuildConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            language: default_language(),
            modules: default_modules(),
            leveling: LevelingConfig::default(),
            economy: EconomyConfig::default(),
        }
    }
}

impl GuildConfig {
    /// Whether a feature module is enabled for this guild.
    pub fn module_enabled(&self, name: &str) -> bool {
        self.modules.get(name).copied().unwrap_or(true)
    }
}

/// Guild-level knobs for the progression engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Whether the presentation layer should announce level-ups.
    #[serde(default = "default_true")]
    pub announce_level_up: bool,

    #[serde(default = "default_xp_per_message")]
    pub xp_per_message: u64,

    /// Minimum seconds between XP grants for one user.
    #[serde(default = "default_xp_cooldown_secs")]
    pub xp_cooldown_secs: u64,

    #[serde(default = "default_multiplier")]
    pub message_multiplier: f64,

    /// Role id (as a string) -> XP multiplier.
    #[serde(default)]
    pub role_multipliers: HashMap<String, f64>,

    /// Channel id (as a string) -> XP multiplier.
    #[serde(default)]
    pub channel_multipliers: HashMap<String, f64>,
}

fn default_true() -> bool {
    true
}

fn default_xp_per_message() -> u64 {
    15
}

fn default_xp_cooldown_secs() -> u64 {
    60
}

fn default_multiplier() -> f64 {
    1.0
}

impl Default for LevelingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            announce_level_up: true,
            xp_per_message: default_xp_per_message(),
            xp_cooldown_secs: default_xp_cooldown_secs(),
            message_multiplier: default_multiplier(),
            role_multipliers: HashMap::new(),
            channel_multipliers: HashMap::new(),
        }
    }
}

/// Guild-level knobs for the reward engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_currency_name")]
    pub currency_name: String,

    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,

    #[serde(default = "default_daily_amount")]
    pub daily_amount: i64,

    #[serde(default = "default_work_amount_min")]
    pub work_amount_min: i64,

    #[serde(default = "default_work_amount_max")]
    pub work_amount_max: i64,

    /// Wallet balance a freshly materialized user record starts with.
    #[serde(default = "default_starting_balance")]
    pub starting_balance: i64,
}

fn default_currency_name() -> String {
    "coins".to_string()
}

fn default_currency_symbol() -> String {
    "\u{1fa99}".to_string()
}

fn default_daily_amount() -> i64 {
    100
}

fn default_work_amount_min() -> i64 {
    50
}

fn default_work_amount_max() -> i64 {
    150
}

fn default_starting_balance() -> i64 {
    100
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            currency_name: default_currency_name(),
            currency_symbol: default_currency_symbol(),
            daily_amount: default_daily_amount(),
            work_amount_min: default_work_amount_min(),
            work_amount_max: default_work_amount_max(),
            starting_balance: default_starting_balance(),
        }
    }
}

/// Per-(guild, user) record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct UserRecord {
    #[serde(default)]
    pub leveling: LevelingRecord,

    #[serde(default)]
    pub economy: EconomyRecord,
}

impl UserRecord {
    /// Fresh record with the wallet seeded from the guild's configured
    /// starting balance.
    pub fn with_starting_balance(starting_balance: i64) -> Self {
        Self {
            economy: EconomyRecord {
                wallet: starting_balance,
                ..EconomyRecord::default()
            },
            ..Self::default()
        }
    }
}

/// Progression state for one user in one guild.
///
/// Invariant: `level == leveling::level_from_xp(total_xp)` after every
/// mutation, and `total_xp` never decreases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelingRecord {
    #[serde(default = "default_level")]
    pub level: u32,

    #[serde(default)]
    pub xp: u64,

    #[serde(default)]
    pub total_xp: u64,

    #[serde(default)]
    pub messages: u64,

    /// When the user last earned XP.
    #[serde(default)]
    pub last_message: Option<DateTime<Utc>>,
}

fn default_level() -> u32 {
    1
}

impl Default for LevelingRecord {
    fn default() -> Self {
        Self {
            level: 1,
            xp: 0,
            total_xp: 0,
            messages: 0,
            last_message: None,
        }
    }
}

/// Economy state for one user in one guild. The wallet only changes
/// through reward-engine operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomyRecord {
    #[serde(default = "default_starting_balance")]
    pub wallet: i64,

    #[serde(default)]
    pub bank: i64,

    /// Consecutive-calendar-day daily claims.
    #[serde(default)]
    pub daily_streak: u32,

    #[serde(default)]
    pub last_daily: Option<DateTime<Utc>>,

    #[serde(default)]
    pub last_work: Option<DateTime<Utc>>,

    /// Job tag scaling the work reward; unknown tags scale by 1.0.
    #[serde(default)]
    pub job: Option<String>,
}

impl Default for EconomyRecord {
    fn default() -> Self {
        Self {
            wallet: default_starting_balance(),
            bank: 0,
            daily_streak: 0,
            last_daily: None,
            last_work: None,
            job: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_defaults() {
        let record = UserRecord::default();
        assert_eq!(record.leveling.level, 1);
        assert_eq!(record.leveling.total_xp, 0);
        assert_eq!(record.economy.wallet, 100);
        assert_eq!(record.economy.daily_streak, 0);

        let config = GuildConfig::default();
        assert_eq!(config.leveling.xp_per_message, 15);
        assert_eq!(config.leveling.xp_cooldown_secs, 60);
        assert_eq!(config.economy.daily_amount, 100);
        assert!(config.module_enabled(MODULE_LEVELS));
        assert!(config.module_enabled(MODULE_ECONOMY));
    }

    #[test]
    fn test_user_key_format() {
        assert_eq!(user_key(42, 7), "42_7");
    }

    #[test]
    fn test_round_trip() {
        let mut record_set = RecordSet::default();
        record_set
            .servers
            .insert("1".to_string(), GuildConfig::default());
        record_set
            .users
            .insert(user_key(1, 2), UserRecord::with_starting_balance(250));
        record_set.statistics.level_ups = 3;

        let json = serde_json::to_string_pretty(&record_set).unwrap();
        let reloaded = RecordSet::from_json_str(&json).unwrap();
        assert_eq!(record_set, reloaded);
    }

    #[test]
    fn test_forward_compatible_load() {
        // A document from an older version: missing metadata keys, a guild
        // with only a prefix, a user with only a wallet.
        let raw = r#"{
            "servers": {"9": {"prefix": "?"}},
            "users": {"9_1": {"economy": {"wallet": 7}}}
        }"#;
        let record_set = RecordSet::from_json_str(raw).unwrap();

        let config = &record_set.servers["9"];
        assert_eq!(config.prefix, "?");
        assert_eq!(config.leveling.xp_per_message, 15);
        assert!(config.module_enabled(MODULE_ECONOMY));

        let record = &record_set.users["9_1"];
        assert_eq!(record.economy.wallet, 7);
        assert_eq!(record.leveling.level, 1);
        assert_eq!(record_set.metadata.version, VERSION);
    }

    #[test]
    fn test_unknown_keys_are_dropped_not_fatal() {
        let raw = r#"{
            "analytics": {"daily_commands": {}},
            "servers": {"9": {"automod": {"enabled": true}}}
        }"#;
        let record_set = RecordSet::from_json_str(raw).unwrap();
        assert!(record_set.servers.contains_key("9"));
    }
}
