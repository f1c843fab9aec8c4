//! Streak calculation over completion and rest-day history.
//!
//! A run is a maximal sequence of consecutive days where every day is either
//! a completion or a rest day. Completions count one each; rest days count
//! only when they sit between two completions of the same run, so a rest day
//! bridges a gap but never extends a streak at either end.

use std::collections::BTreeSet;

use crate::calendar::{DayKey, days_between};

/// Upper bound on the backward walk for the current streak.
pub const MAX_LOOKBACK_DAYS: u32 = 365;

/// Consecutive qualifying days ending today.
///
/// `today` is a grace day: when it is neither completed nor a rest day it
/// adds nothing but does not break the run that ended yesterday.
pub fn compute_current_streak(
    completions: &BTreeSet<DayKey>,
    rest_days: &BTreeSet<DayKey>,
    today: DayKey,
) -> u32 {
    let mut streak = 0u32;
    let mut bridged = 0u32; // rest days since the last counted completion
    let mut day = today;

    for offset in 0..MAX_LOOKBACK_DAYS {
        if completions.contains(&day) {
            if streak > 0 {
                streak += bridged;
            }
            bridged = 0;
            streak += 1;
        } else if rest_days.contains(&day) {
            bridged += 1;
        } else if offset > 0 {
            break;
        }
        day = day.pred();
    }

    streak
}

/// Longest streak anywhere in the history.
pub fn compute_best_streak(completions: &BTreeSet<DayKey>, rest_days: &BTreeSet<DayKey>) -> u32 {
    let timeline: BTreeSet<DayKey> = completions.union(rest_days).copied().collect();

    let mut best = 0u32;
    let mut run = 0u32;
    let mut bridged = 0u32;
    let mut prev: Option<DayKey> = None;

    for day in timeline {
        if prev.is_some_and(|p| days_between(p, day) != 1) {
            run = 0;
            bridged = 0;
        }

        if completions.contains(&day) {
            if run > 0 {
                run += bridged;
            }
            bridged = 0;
            run += 1;
            best = best.max(run);
        } else {
            bridged += 1;
        }
        prev = Some(day);
    }

    best
}
