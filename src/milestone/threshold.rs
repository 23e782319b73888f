//! Pure threshold-crossing evaluation.

use crate::milestone::types::{LevelStatus, MilestoneLevel};

/// Return the levels newly crossed by moving an aggregate from `previous`
/// to `new`: every level with `previous < threshold <= new`, in ascending
/// threshold order regardless of configuration order.
///
/// The strict lower bound is the core correctness rule: a level crosses at
/// most once per upward movement, and an update large enough to skip several
/// levels reports all of them in one call.
pub fn crossed_levels<'a>(
    levels: &'a [MilestoneLevel],
    previous: u64,
    new: u64,
) -> Vec<&'a MilestoneLevel> {
    let mut crossed: Vec<&MilestoneLevel> = levels
        .iter()
        .filter(|l| previous < l.threshold && l.threshold <= new)
        .collect();
    crossed.sort_by_key(|l| l.threshold);
    crossed
}

/// Derive the status of one level from the current aggregate and claim flag.
pub fn level_status(level: &MilestoneLevel, aggregate: u64, claimed: bool) -> LevelStatus {
    if claimed {
        LevelStatus::Claimed
    } else if aggregate >= level.threshold {
        LevelStatus::Reached
    } else {
        LevelStatus::NotReached
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(ordinal: u32, threshold: u64) -> MilestoneLevel {
        MilestoneLevel {
            level: ordinal,
            threshold,
            display: None,
            on_cross: None,
            on_claim: None,
        }
    }

    #[test]
    fn one_update_reports_every_skipped_level() {
        let levels = vec![level(1, 10), level(2, 20), level(3, 30)];
        let crossed = crossed_levels(&levels, 0, 35);
        let ordinals: Vec<u32> = crossed.iter().map(|l| l.level).collect();
        assert_eq!(ordinals, vec![1, 2, 3]);
    }

    #[test]
    fn crossing_is_strict_and_never_repeats() {
        let levels = vec![level(1, 10)];
        assert_eq!(crossed_levels(&levels, 0, 10).len(), 1);
        // Already at or past the threshold: no re-crossing.
        assert!(crossed_levels(&levels, 10, 15).is_empty());
        assert!(crossed_levels(&levels, 12, 12).is_empty());
        // Below the threshold on both sides: nothing.
        assert!(crossed_levels(&levels, 3, 9).is_empty());
    }

    #[test]
    fn unsorted_configuration_order_still_reports_ascending() {
        let levels = vec![level(3, 300), level(1, 100), level(2, 200)];
        let crossed = crossed_levels(&levels, 50, 250);
        let thresholds: Vec<u64> = crossed.iter().map(|l| l.threshold).collect();
        assert_eq!(thresholds, vec![100, 200]);
    }

    #[test]
    fn downward_movement_crosses_nothing() {
        let levels = vec![level(1, 10), level(2, 20)];
        assert!(crossed_levels(&levels, 25, 5).is_empty());
    }

    #[test]
    fn status_is_derived_from_aggregate_and_claim() {
        let l = level(1, 100);
        assert_eq!(level_status(&l, 99, false), LevelStatus::NotReached);
        assert_eq!(level_status(&l, 100, false), LevelStatus::Reached);
        assert_eq!(level_status(&l, 100, true), LevelStatus::Claimed);
    }
}
