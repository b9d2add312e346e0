//! Pure progression math. No I/O, no clock.

/// Level reached at a given lifetime XP total: `max(1, floor(sqrt(total_xp / 100)))`.
pub fn level_from_xp(total_xp: u64) -> u32 {
    let level = (total_xp as f64 / 100.0).sqrt().floor() as u32;
    level.max(1)
}

/// Lifetime XP needed to reach a level: `100 * level^2`.
pub fn xp_required_for_level(level: u32) -> u64 {
    100 * (level as u64).pow(2)
}

/// XP granted for one message: base times the product of the guild
/// message multiplier, every role multiplier the user holds, and the
/// channel multiplier, truncated to an integer.
pub fn xp_for_message(
    base: u64,
    message_multiplier: f64,
    role_multipliers: &[f64],
    channel_multiplier: f64,
) -> u64 {
    let mut multiplier = message_multiplier;
    for role_multiplier in role_multipliers {
        multiplier *= role_multiplier;
    }
    multiplier *= channel_multiplier;
    (base as f64 * multiplier) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_from_xp_curve() {
        assert_eq!(level_from_xp(0), 1);
        assert_eq!(level_from_xp(100), 1);
        assert_eq!(level_from_xp(399), 1);
        assert_eq!(level_from_xp(400), 2);
        assert_eq!(level_from_xp(900), 3);
        assert_eq!(level_from_xp(10_000), 10);
    }

    #[test]
    fn test_level_from_xp_monotonic() {
        let mut previous = 0;
        for total_xp in (0..50_000).step_by(37) {
            let level = level_from_xp(total_xp);
            assert!(level >= previous, "level dropped at {} xp", total_xp);
            previous = level;
        }
    }

    #[test]
    fn test_xp_required_inverts_level() {
        for level in 1..200 {
            assert_eq!(xp_required_for_level(level), 100 * (level as u64).pow(2));
            assert!(level_from_xp(xp_required_for_level(level)) >= level);
        }
    }

    #[test]
    fn test_xp_for_message_truncates() {
        assert_eq!(xp_for_message(15, 1.0, &[], 1.0), 15);
        assert_eq!(xp_for_message(15, 1.5, &[], 1.0), 22);
        assert_eq!(xp_for_message(15, 1.0, &[2.0, 0.5], 1.0), 15);
        assert_eq!(xp_for_message(15, 1.0, &[1.2], 2.0), 36);
        assert_eq!(xp_for_message(10, 0.0, &[], 1.0), 0);
    }
}
