use std::collections::BTreeSet;

use crate::calendar::DayKey;
use crate::models::{Habit, HabitStats, HabitView};
use crate::streak::{compute_best_streak, compute_current_streak};
use crate::xp::{compute_experience, compute_level};

/// Rebuild a habit's view from its full history.
///
/// Rest days only bridge streaks while the habit allows them; they are still
/// reported in the view either way.
pub fn build_habit_view(
    habit: Habit,
    completions: BTreeSet<DayKey>,
    rest_days: BTreeSet<DayKey>,
    today: DayKey,
) -> HabitView {
    let stats = compute_stats(&habit, &completions, &rest_days, today);
    HabitView {
        habit,
        stats,
        completions,
        rest_days,
    }
}

/// View with no history, used when a habit's history could not be read.
pub fn empty_habit_view(habit: Habit) -> HabitView {
    HabitView {
        habit,
        stats: HabitStats {
            level: compute_level(0),
            ..HabitStats::default()
        },
        completions: BTreeSet::new(),
        rest_days: BTreeSet::new(),
    }
}

fn compute_stats(
    habit: &Habit,
    completions: &BTreeSet<DayKey>,
    rest_days: &BTreeSet<DayKey>,
    today: DayKey,
) -> HabitStats {
    let no_rest = BTreeSet::new();
    let eligible_rest = if habit.allows_rest_days() {
        rest_days
    } else {
        &no_rest
    };

    let current_streak = compute_current_streak(completions, eligible_rest, today);
    let best_streak = compute_best_streak(completions, eligible_rest);
    let total_completions = completions.len() as u32;
    let experience = compute_experience(total_completions, current_streak);

    HabitStats {
        current_streak,
        best_streak,
        total_completions,
        experience,
        level: compute_level(experience),
        is_completed_today: completions.contains(&today),
        has_rest_day_today: rest_days.contains(&today),
    }
}
