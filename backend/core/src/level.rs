//! Level curve shared by ranking display and role thresholds.
//!
//! The curve is the inverse of `xp_required(level) = 60 * level * (level - 1)`,
//! so levels get progressively more expensive: level 2 at 120 XP, level 3 at
//! 360 XP, level 4 at 720 XP.

/// Level for a lifetime XP total. Floors at 1.
pub fn level_from_xp(lifetime_xp: i64) -> u32 {
    if lifetime_xp <= 0 {
        return 1;
    }
    let threshold = lifetime_xp as f64 / 60.0;
    let level = ((1.0 + (1.0 + 4.0 * threshold).sqrt()) / 2.0).floor() as u32;
    level.max(1)
}

/// Minimum lifetime XP required to hold `level`.
pub fn xp_required(level: u32) -> i64 {
    if level <= 1 {
        return 0;
    }
    let level = i64::from(level);
    60 * level * (level - 1)
}

/// Level, current/next level floors, and progress toward the next level
/// clamped to `[0, 1]`.
pub fn level_progress(lifetime_xp: i64) -> (u32, i64, i64, f64) {
    let level = level_from_xp(lifetime_xp);
    let curr = xp_required(level);
    let next = xp_required(level + 1);
    let progress = if next <= curr {
        0.0
    } else {
        ((lifetime_xp - curr) as f64 / (next - curr) as f64).clamp(0.0, 1.0)
    };
    (level, curr, next, progress)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_floors_at_one() {
        assert_eq!(level_from_xp(0), 1);
        assert_eq!(level_from_xp(-5), 1);
        assert_eq!(level_from_xp(1), 1);
    }

    #[test]
    fn level_boundaries_match_inverse() {
        assert_eq!(xp_required(1), 0);
        assert_eq!(xp_required(2), 120);
        assert_eq!(xp_required(3), 360);

        assert_eq!(level_from_xp(119), 1);
        assert_eq!(level_from_xp(120), 2);
        assert_eq!(level_from_xp(359), 2);
        assert_eq!(level_from_xp(360), 3);
    }

    #[test]
    fn level_is_bracketed_by_inverse() {
        for xp in [0, 1, 59, 60, 119, 120, 121, 359, 360, 719, 720, 10_000, 1_000_000] {
            let level = level_from_xp(xp);
            assert!(xp_required(level) <= xp, "xp={xp} level={level}");
            assert!(xp < xp_required(level + 1), "xp={xp} level={level}");
        }
    }

    #[test]
    fn progress_is_clamped() {
        let (level, curr, next, progress) = level_progress(0);
        assert_eq!(level, 1);
        assert_eq!(curr, 0);
        assert_eq!(next, 120);
        assert!(progress.abs() < f64::EPSILON);

        let (_, _, _, progress) = level_progress(60);
        assert!((progress - 0.5).abs() < 1e-9);

        let (level, _, _, progress) = level_progress(120);
        assert_eq!(level, 2);
        assert!(progress.abs() < f64::EPSILON);
    }
}
