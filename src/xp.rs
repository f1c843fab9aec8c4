const XP_PER_COMPLETION: u32 = 10;
const XP_PER_LEVEL: u32 = 100;

// cumulative streak bonuses as (minimum streak, bonus); the first tier only
// starts past three days so a fresh three-day run is still plain base
const STREAK_BONUSES: [(u32, u32); 4] = [(4, 15), (7, 35), (14, 50), (30, 100)];
const LONG_STREAK_BLOCK_BONUS: u32 = 25;

// single completion reward, awarded once the streak reaches each threshold
const GAIN_BASE: u32 = 10;
const GAIN_BONUSES: [(u32, u32); 3] = [(7, 5), (14, 10), (30, 20)];
const GAIN_BLOCK_BONUS: u32 = 5;

const LONG_STREAK_START: u32 = 30;
const BLOCK_DAYS: u32 = 7;

fn full_blocks_beyond_long_streak(streak: u32) -> u32 {
    streak.saturating_sub(LONG_STREAK_START) / BLOCK_DAYS
}

/// Total experience of a habit; drives its level.
pub fn compute_experience(total_completions: u32, current_streak: u32) -> u32 {
    let base = total_completions * XP_PER_COMPLETION;
    let bonus: u32 = STREAK_BONUSES
        .iter()
        .filter(|(min_streak, _)| current_streak >= *min_streak)
        .map(|(_, bonus)| bonus)
        .sum();
    let blocks = full_blocks_beyond_long_streak(current_streak) * LONG_STREAK_BLOCK_BONUS;
    base + bonus + blocks
}

/// Reward shown at the moment of a completion. Separate scale from
/// [`compute_experience`].
pub fn compute_experience_gained(streak_after_completion: u32) -> u32 {
    let bonus: u32 = GAIN_BONUSES
        .iter()
        .filter(|(threshold, _)| streak_after_completion >= *threshold)
        .map(|(_, bonus)| bonus)
        .sum();
    let blocks = full_blocks_beyond_long_streak(streak_after_completion) * GAIN_BLOCK_BONUS;
    GAIN_BASE + bonus + blocks
}

pub fn compute_level(experience: u32) -> u32 {
    (experience / XP_PER_LEVEL) + 1
}

/// Experience at which `level` ends.
pub fn experience_for_next_level(level: u32) -> u32 {
    level * XP_PER_LEVEL
}

/// 0.0..1.0 progress within current level
pub fn level_progress(experience: u32) -> f32 {
    let xp_in_level = experience % XP_PER_LEVEL;
    xp_in_level as f32 / XP_PER_LEVEL as f32
}
