//! End-to-end tests against a disk-backed store in a temp directory.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use std::fs;
use std::path::Path;

use heraldd::config::Config;
use heraldd::economy::{DailyOutcome, WorkOutcome, WORK_COOLDOWN_SECS};
use heraldd::leveling::GrantOutcome;
use heraldd::store::{Store, StoreEvent};

const GUILD: u64 = 1001;
const USER: u64 = 5005;
const CHANNEL: u64 = 42;

fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.storage.data_dir = dir.to_path_buf();
    config
}

fn at(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, hour, minute, second)
        .unwrap()
}

fn day(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, day, 9, 0, 0).unwrap()
}

#[tokio::test]
async fn test_save_load_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());

    let store = Store::open(&config).unwrap();
    store
        .update_guild_config(GUILD, json!({"leveling": {"xp_per_message": 100}}))
        .await;
    store
        .update_user_record(GUILD, USER, json!({"economy": {"job": "programmer"}}))
        .await;
    assert!(store.flush_now().await);

    let before = store.snapshot().await;
    drop(store);

    let reopened = Store::open(&config).unwrap();
    let after = reopened.snapshot().await;

    assert_eq!(before.servers, after.servers);
    assert_eq!(before.users, after.users);
    assert_eq!(before.statistics, after.statistics);
    assert_eq!(
        after.servers[&GUILD.to_string()].leveling.xp_per_message,
        100
    );
    assert_eq!(
        after.users["1001_5005"].economy.job.as_deref(),
        Some("programmer")
    );
}

#[tokio::test]
async fn test_corrupt_file_recovers_with_diagnostic_backup() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    fs::write(config.data_file(), "{ not json at all").unwrap();

    let store = Store::open(&config).unwrap();

    // Fell back to schema defaults.
    let record = store.user_record(GUILD, USER).await;
    assert_eq!(record.leveling.level, 1);
    assert_eq!(record.economy.wallet, 100);

    // The corrupt bytes were preserved for inspection.
    let backups: Vec<String> = fs::read_dir(config.backup_dir())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(backups.len(), 1);
    assert!(backups[0].contains("corrupted_recovery"));
    let preserved = fs::read_to_string(config.backup_dir().join(&backups[0])).unwrap();
    assert_eq!(preserved, "{ not json at all");
}

#[tokio::test]
async fn test_missing_file_starts_from_defaults() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());

    let store = Store::open(&config).unwrap();
    let guild = store.guild_config(GUILD).await;
    assert_eq!(guild.leveling.xp_per_message, 15);
    assert_eq!(guild.economy.daily_amount, 100);

    // No diagnostic backup for a merely missing file.
    assert_eq!(fs::read_dir(config.backup_dir()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_backup_rotation_stays_bounded() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = test_config(tmp.path());
    config.storage.backup_keep = 3;

    let store = Store::open(&config).unwrap();
    for round in 0..12 {
        store
            .update_user_record(GUILD, USER, json!({"economy": {"bank": round}}))
            .await;
        assert!(store.flush_now().await);
    }

    let count = fs::read_dir(config.backup_dir()).unwrap().count();
    assert!(count <= 3, "expected at most 3 backups, found {}", count);
}

#[tokio::test]
async fn test_xp_accrual_cooldown_and_level_ups() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Store::open(&test_config(tmp.path())).unwrap();
    let mut events = store.subscribe();

    store
        .update_guild_config(GUILD, json!({"leveling": {"xp_per_message": 100}}))
        .await;

    // First message grants.
    let outcome = store
        .grant_message_xp(GUILD, USER, CHANNEL, &[], at(10, 0, 0))
        .await;
    assert_eq!(
        outcome,
        GrantOutcome::Granted {
            xp: 100,
            total_xp: 100,
            level_up: None,
        }
    );

    // Ten seconds later: inside the 60s window, complete no-op.
    let outcome = store
        .grant_message_xp(GUILD, USER, CHANNEL, &[], at(10, 0, 10))
        .await;
    assert_eq!(
        outcome,
        GrantOutcome::OnCooldown { remaining_secs: 50 }
    );
    let record = store.user_record(GUILD, USER).await;
    assert_eq!(record.leveling.total_xp, 100);
    assert_eq!(record.leveling.messages, 1);

    // Exactly at the window edge the grant fires again.
    let outcome = store
        .grant_message_xp(GUILD, USER, CHANNEL, &[], at(10, 1, 0))
        .await;
    assert!(matches!(outcome, GrantOutcome::Granted { xp: 100, .. }));

    // Keep granting a minute apart until 900 XP: level 3.
    for minute in 2..9 {
        store
            .grant_message_xp(GUILD, USER, CHANNEL, &[], at(10, minute, 0))
            .await;
    }
    let record = store.user_record(GUILD, USER).await;
    assert_eq!(record.leveling.total_xp, 900);
    assert_eq!(record.leveling.level, 3);
    assert_eq!(record.leveling.messages, 9);

    // Level-up events were emitted for 1->2 and 2->3.
    let mut level_ups = Vec::new();
    while let Ok(StoreEvent::LevelUp {
        old_level,
        new_level,
        ..
    }) = events.try_recv()
    {
        level_ups.push((old_level, new_level));
    }
    assert_eq!(level_ups, vec![(1, 2), (2, 3)]);
    assert_eq!(store.snapshot().await.statistics.level_ups, 2);
}

#[tokio::test]
async fn test_xp_multipliers_stack_and_truncate() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Store::open(&test_config(tmp.path())).unwrap();

    store
        .update_guild_config(
            GUILD,
            json!({"leveling": {
                "message_multiplier": 1.5,
                "role_multipliers": {"7": 2.0},
                "channel_multipliers": {"42": 0.5},
            }}),
        )
        .await;

    // 15 * 1.5 * 2.0 * 0.5 = 22.5, truncated to 22.
    let outcome = store
        .grant_message_xp(GUILD, USER, CHANNEL, &[7, 8], at(12, 0, 0))
        .await;
    assert!(matches!(outcome, GrantOutcome::Granted { xp: 22, .. }));
}

#[tokio::test]
async fn test_daily_claim_streak_and_same_day_repeat() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Store::open(&test_config(tmp.path())).unwrap();

    let outcome = store.claim_daily(GUILD, USER, day(1)).await;
    assert_eq!(
        outcome,
        DailyOutcome::Claimed {
            amount: 100,
            streak: 1,
            bonus: 0,
        }
    );

    // Same calendar date, later hour: rejected, nothing changes.
    let later_same_day = Utc.with_ymd_and_hms(2026, 3, 1, 23, 59, 59).unwrap();
    let outcome = store.claim_daily(GUILD, USER, later_same_day).await;
    assert_eq!(outcome, DailyOutcome::AlreadyClaimed);
    let record = store.user_record(GUILD, USER).await;
    assert_eq!(record.economy.wallet, 200);
    assert_eq!(record.economy.daily_streak, 1);

    // Next day: streak bonus kicks in.
    let outcome = store.claim_daily(GUILD, USER, day(2)).await;
    assert_eq!(
        outcome,
        DailyOutcome::Claimed {
            amount: 110,
            streak: 2,
            bonus: 10,
        }
    );
}

#[tokio::test]
async fn test_daily_streak_bonus_caps_at_100() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Store::open(&test_config(tmp.path())).unwrap();

    store
        .update_user_record(GUILD, USER, json!({"economy": {"daily_streak": 50}}))
        .await;

    let outcome = store.claim_daily(GUILD, USER, day(5)).await;
    assert_eq!(
        outcome,
        DailyOutcome::Claimed {
            amount: 200,
            streak: 51,
            bonus: 100,
        }
    );
}

#[tokio::test]
async fn test_work_cooldown_window() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Store::open(&test_config(tmp.path())).unwrap();

    let first = at(8, 0, 0);
    let outcome = store.claim_work(GUILD, USER, first).await;
    let first_amount = match outcome {
        WorkOutcome::Worked { amount, job: None } => amount,
        other => panic!("expected Worked, got {:?}", other),
    };
    assert!((50..=150).contains(&first_amount));

    // One hour later: still cooling down, wallet untouched.
    let wallet_after_first = store.user_record(GUILD, USER).await.economy.wallet;
    let outcome = store.claim_work(GUILD, USER, at(9, 0, 0)).await;
    match outcome {
        WorkOutcome::OnCooldown { remaining_secs } => {
            assert_eq!(remaining_secs, (WORK_COOLDOWN_SECS - 3600) as u64);
        }
        other => panic!("expected OnCooldown, got {:?}", other),
    }
    assert_eq!(
        store.user_record(GUILD, USER).await.economy.wallet,
        wallet_after_first
    );

    // Exactly six hours after the first claim the window has elapsed.
    let outcome = store.claim_work(GUILD, USER, at(14, 0, 0)).await;
    assert!(matches!(outcome, WorkOutcome::Worked { .. }));
}

#[tokio::test]
async fn test_work_job_multiplier_applies() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Store::open(&test_config(tmp.path())).unwrap();

    store
        .update_guild_config(
            GUILD,
            json!({"economy": {"work_amount_min": 100, "work_amount_max": 100}}),
        )
        .await;
    store
        .update_user_record(GUILD, USER, json!({"economy": {"job": "programmer"}}))
        .await;

    let outcome = store.claim_work(GUILD, USER, at(8, 0, 0)).await;
    assert_eq!(
        outcome,
        WorkOutcome::Worked {
            amount: 120,
            job: Some("programmer".to_string()),
        }
    );
}

#[tokio::test]
async fn test_disabled_modules_short_circuit() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Store::open(&test_config(tmp.path())).unwrap();

    store
        .update_guild_config(GUILD, json!({"modules": {"economy": false, "levels": false}}))
        .await;

    assert_eq!(
        store.claim_daily(GUILD, USER, day(1)).await,
        DailyOutcome::Disabled
    );
    assert_eq!(
        store.claim_work(GUILD, USER, day(1)).await,
        WorkOutcome::Disabled
    );
    assert_eq!(
        store
            .grant_message_xp(GUILD, USER, CHANNEL, &[], day(1))
            .await,
        GrantOutcome::Disabled
    );

    let snapshot = store.snapshot().await;
    // No user record was materialized by the gated-off operations.
    assert!(snapshot.users.is_empty());
    // The message itself was still counted.
    assert_eq!(snapshot.statistics.messages_processed, 1);
    // Disabling one module leaves the other map keys intact.
    let config = &snapshot.servers[&GUILD.to_string()];
    assert_eq!(config.modules.len(), 2);
}

#[tokio::test]
async fn test_write_failure_falls_back_to_emergency_dump() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    let store = Store::open(&config).unwrap();

    store.guild_config(GUILD).await;

    // Occupy the temp path with a directory so the atomic write fails.
    fs::create_dir(tmp.path().join("herald.json.tmp")).unwrap();
    assert!(!store.flush_now().await);

    let dumped = fs::read_to_string(config.emergency_file()).unwrap();
    assert!(dumped.contains(&GUILD.to_string()));
}

#[tokio::test]
async fn test_first_access_materializes_and_persists() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());

    let store = Store::open(&config).unwrap();
    let record = store.user_record(GUILD, USER).await;
    assert_eq!(record.economy.wallet, 100);
    store.flush_now().await;
    drop(store);

    let reopened = Store::open(&config).unwrap();
    let snapshot = reopened.snapshot().await;
    assert!(snapshot.users.contains_key("1001_5005"));
    assert_eq!(snapshot.metadata.total_users, 1);
}

#[tokio::test]
async fn test_starting_balance_seeds_new_wallets() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Store::open(&test_config(tmp.path())).unwrap();

    store
        .update_guild_config(GUILD, json!({"economy": {"starting_balance": 500}}))
        .await;
    let record = store.user_record(GUILD, USER).await;
    assert_eq!(record.economy.wallet, 500);
}

#[tokio::test]
async fn test_update_reads_back_immediately() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Store::open(&test_config(tmp.path())).unwrap();

    store
        .update_guild_config(GUILD, json!({"prefix": "?"}))
        .await;
    // Read-your-writes regardless of flush timing.
    assert_eq!(store.guild_config(GUILD).await.prefix, "?");
}
