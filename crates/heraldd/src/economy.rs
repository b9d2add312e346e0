//! Cooldown-gated rewards.
//!
//! Two independent tracks per user: a daily reward gated by calendar-date
//! equality (UTC) with a capped streak bonus, and a work reward gated by
//! a fixed rolling window with an optional job multiplier. Gate hits are
//! explicit outcomes, not errors, and mutate nothing.

use chrono::{DateTime, Utc};
use rand::Rng;

use herald_common::schema::{user_key, GuildConfig, UserRecord, MODULE_ECONOMY};

use crate::store::Store;

/// Rolling cooldown between work claims (6 hours)
pub const WORK_COOLDOWN_SECS: i64 = 21_600;

/// Cap on the daily streak bonus
const MAX_STREAK_BONUS: i64 = 100;

/// Result of a daily claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DailyOutcome {
    Claimed { amount: i64, streak: u32, bonus: i64 },
    /// Already claimed on this calendar date; nothing changed
    AlreadyClaimed,
    /// The guild has the economy module disabled
    Disabled,
}

/// Result of a work claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkOutcome {
    Worked { amount: i64, job: Option<String> },
    /// Still inside the rolling window; nothing changed
    OnCooldown { remaining_secs: u64 },
    /// The guild has the economy module disabled
    Disabled,
}

/// Earnings multiplier for a job tag; unknown tags earn the base rate
pub fn job_multiplier(job: &str) -> f64 {
    match job {
        "programmer" => 1.2,
        "moderator" => 1.15,
        "designer" => 1.1,
        _ => 1.0,
    }
}

impl Store {
    /// Claim the calendar-gated daily reward
    pub async fn claim_daily(&self, guild_id: u64, user_id: u64, now: DateTime<Utc>) -> DailyOutcome {
        let outcome = {
            let mut guard = self.write().await;
            let record_set = &mut *guard;

            let config = record_set
                .servers
                .entry(guild_id.to_string())
                .or_insert_with(GuildConfig::default)
                .clone();

            if !config.module_enabled(MODULE_ECONOMY) {
                DailyOutcome::Disabled
            } else {
                let record = record_set
                    .users
                    .entry(user_key(guild_id, user_id))
                    .or_insert_with(|| {
                        UserRecord::with_starting_balance(config.economy.starting_balance)
                    });

                let claimed_today = record
                    .economy
                    .last_daily
                    .is_some_and(|last| last.date_naive() == now.date_naive());

                if claimed_today {
                    DailyOutcome::AlreadyClaimed
                } else {
                    let bonus = (record.economy.daily_streak as i64 * 10).min(MAX_STREAK_BONUS);
                    let amount = config.economy.daily_amount + bonus;

                    record.economy.wallet += amount;
                    record.economy.daily_streak += 1;
                    record.economy.last_daily = Some(now);
                    record_set.statistics.economy_transactions += 1;

                    DailyOutcome::Claimed {
                        amount,
                        streak: record.economy.daily_streak,
                        bonus,
                    }
                }
            }
        };

        self.schedule_flush();
        outcome
    }

    /// Claim the work reward if the rolling window has elapsed
    pub async fn claim_work(&self, guild_id: u64, user_id: u64, now: DateTime<Utc>) -> WorkOutcome {
        let outcome = {
            let mut guard = self.write().await;
            let record_set = &mut *guard;

            let config = record_set
                .servers
                .entry(guild_id.to_string())
                .or_insert_with(GuildConfig::default)
                .clone();

            if !config.module_enabled(MODULE_ECONOMY) {
                WorkOutcome::Disabled
            } else {
                let record = record_set
                    .users
                    .entry(user_key(guild_id, user_id))
                    .or_insert_with(|| {
                        UserRecord::with_starting_balance(config.economy.starting_balance)
                    });

                let remaining = record
                    .economy
                    .last_work
                    .map(|last| WORK_COOLDOWN_SECS - (now - last).num_seconds())
                    .filter(|remaining| *remaining > 0);

                if let Some(remaining) = remaining {
                    WorkOutcome::OnCooldown {
                        remaining_secs: remaining as u64,
                    }
                } else {
                    // A config patch can invert the range; normalize it
                    // rather than panic inside a store operation.
                    let min = config.economy.work_amount_min;
                    let max = config.economy.work_amount_max;
                    let (low, high) = if min <= max { (min, max) } else { (max, min) };

                    let rolled = rand::thread_rng().gen_range(low..=high);
                    let amount = match record.economy.job.as_deref() {
                        Some(job) => (rolled as f64 * job_multiplier(job)) as i64,
                        None => rolled,
                    };

                    record.economy.wallet += amount;
                    record.economy.last_work = Some(now);
                    record_set.statistics.economy_transactions += 1;

                    WorkOutcome::Worked {
                        amount,
                        job: record.economy.job.clone(),
                    }
                }
            }
        };

        self.schedule_flush();
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_multipliers() {
        assert_eq!(job_multiplier("programmer"), 1.2);
        assert_eq!(job_multiplier("moderator"), 1.15);
        assert_eq!(job_multiplier("designer"), 1.1);
        assert_eq!(job_multiplier("astronaut"), 1.0);
    }
}
