//! Message-driven XP accrual.
//!
//! One grant per cooldown window per user. A message inside the window
//! leaves the record completely untouched: no XP, no message count, no
//! timestamp refresh. Outside the window, XP is the guild's base amount
//! scaled by the message, role, and channel multipliers, and the level is
//! re-derived from lifetime XP after every grant.

use chrono::{DateTime, Utc};

use herald_common::leveling::{level_from_xp, xp_for_message};
use herald_common::schema::{user_key, GuildConfig, UserRecord, MODULE_LEVELS};

use crate::store::{Store, StoreEvent};

/// Result of handing one message event to the progression engine
#[derive(Debug, Clone, PartialEq)]
pub enum GrantOutcome {
    /// XP granted; `level_up` is set when the level increased
    Granted {
        xp: u64,
        total_xp: u64,
        level_up: Option<LevelUp>,
    },
    /// Inside the per-user cooldown window; the record is untouched
    OnCooldown { remaining_secs: u64 },
    /// The guild has the levels module disabled
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelUp {
    pub old_level: u32,
    pub new_level: u32,
}

impl Store {
    /// Hand one message event to the progression engine. Always counts
    /// the message in the global statistics, even when the grant itself
    /// is gated off.
    pub async fn grant_message_xp(
        &self,
        guild_id: u64,
        user_id: u64,
        channel_id: u64,
        role_ids: &[u64],
        now: DateTime<Utc>,
    ) -> GrantOutcome {
        let mut level_up_event = None;

        let outcome = {
            let mut guard = self.write().await;
            let record_set = &mut *guard;
            record_set.statistics.messages_processed += 1;

            let config = record_set
                .servers
                .entry(guild_id.to_string())
                .or_insert_with(GuildConfig::default)
                .clone();

            if !config.module_enabled(MODULE_LEVELS) {
                GrantOutcome::Disabled
            } else {
                let record = record_set
                    .users
                    .entry(user_key(guild_id, user_id))
                    .or_insert_with(|| {
                        UserRecord::with_starting_balance(config.economy.starting_balance)
                    });

                let cooldown = config.leveling.xp_cooldown_secs as i64;
                let remaining = record
                    .leveling
                    .last_message
                    .map(|last| cooldown - (now - last).num_seconds())
                    .filter(|remaining| *remaining > 0);

                if let Some(remaining) = remaining {
                    GrantOutcome::OnCooldown {
                        remaining_secs: remaining as u64,
                    }
                } else {
                    let role_multipliers: Vec<f64> = role_ids
                        .iter()
                        .map(|id| {
                            config
                                .leveling
                                .role_multipliers
                                .get(&id.to_string())
                                .copied()
                                .unwrap_or(1.0)
                        })
                        .collect();
                    let channel_multiplier = config
                        .leveling
                        .channel_multipliers
                        .get(&channel_id.to_string())
                        .copied()
                        .unwrap_or(1.0);

                    let earned = xp_for_message(
                        config.leveling.xp_per_message,
                        config.leveling.message_multiplier,
                        &role_multipliers,
                        channel_multiplier,
                    );

                    record.leveling.xp += earned;
                    record.leveling.total_xp += earned;
                    record.leveling.messages += 1;
                    record.leveling.last_message = Some(now);

                    let old_level = record.leveling.level;
                    let new_level = level_from_xp(record.leveling.total_xp);
                    record.leveling.level = new_level;
                    let total_xp = record.leveling.total_xp;

                    let mut level_up = None;
                    if new_level > old_level {
                        record_set.statistics.level_ups += 1;
                        level_up = Some(LevelUp {
                            old_level,
                            new_level,
                        });
                        level_up_event = Some(StoreEvent::LevelUp {
                            guild_id,
                            user_id,
                            old_level,
                            new_level,
                            total_xp,
                        });
                    }

                    GrantOutcome::Granted {
                        xp: earned,
                        total_xp,
                        level_up,
                    }
                }
            }
        };

        if let Some(event) = level_up_event {
            self.emit(event);
        }
        self.schedule_flush();
        outcome
    }
}
