use rand::Rng;
use rand::seq::SliceRandom;

/// Which pool of templates a completion message is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTier {
    NewRecord,
    Milestone(u32),
    Starting,
    Building,
    OnFire,
}

pub const MILESTONES: [u32; 6] = [1, 3, 7, 14, 30, 100];

impl MessageTier {
    /// New records win over milestones, milestones over bands.
    pub fn classify(current_streak: u32, is_new_record: bool) -> Self {
        if is_new_record {
            MessageTier::NewRecord
        } else if MILESTONES.contains(&current_streak) {
            MessageTier::Milestone(current_streak)
        } else if current_streak <= 5 {
            MessageTier::Starting
        } else if current_streak <= 15 {
            MessageTier::Building
        } else {
            MessageTier::OnFire
        }
    }

    pub fn templates(&self) -> &'static [&'static str] {
        match self {
            MessageTier::NewRecord => &[
                "🏆 New record! {streak} days of {habit}, your best ever!",
                "🚀 You just beat your best: {streak} days of {habit}!",
                "👑 {streak} days! {habit} has never gone this well.",
            ],
            MessageTier::Milestone(1) => &[
                "🌱 Day one of {habit}. Every streak starts here!",
                "✨ First step done: {habit} is on the board.",
            ],
            MessageTier::Milestone(3) => &[
                "🔥 Three days of {habit} in a row. It's becoming a habit!",
                "💪 3-day streak on {habit}. Keep it rolling!",
            ],
            MessageTier::Milestone(7) => &[
                "🎉 One full week of {habit}!",
                "📅 7 days straight of {habit}. That's a real streak!",
            ],
            MessageTier::Milestone(14) => &[
                "⚡ Two weeks of {habit}. Unstoppable!",
                "🌟 14 days of {habit} without a miss!",
            ],
            MessageTier::Milestone(30) => &[
                "🏅 A whole month of {habit}. Incredible!",
                "🗓️ 30 days of {habit}. This is who you are now.",
            ],
            MessageTier::Milestone(100) => &[
                "💯 100 days of {habit}. Legendary!",
                "🏛️ Triple digits! {streak} days of {habit}.",
            ],
            MessageTier::Milestone(_) | MessageTier::Starting => &[
                "👍 {habit} done. {streak} days and counting!",
                "✅ Nice! {habit} streak is at {streak}.",
                "🙌 Another day of {habit} in the books.",
            ],
            MessageTier::Building => &[
                "🔥 {streak} days of {habit}. You're building momentum!",
                "💪 {habit} streak: {streak}. Keep going!",
                "📈 {streak} days strong on {habit}.",
            ],
            MessageTier::OnFire => &[
                "🚀 {streak} days of {habit}. You're on fire!",
                "⭐ {habit} for {streak} days. Nothing can stop you!",
                "🦾 {streak}-day {habit} streak. Pure discipline.",
            ],
        }
    }
}

const REST_DAY_TEMPLATES: &[&str] = &[
    "😌 Rest day logged for {habit}. Your streak is safe.",
    "🛌 Taking a break from {habit} today. Recharge!",
    "🌙 {habit} is resting today. See you tomorrow!",
];

const NEW_DAY_TEMPLATES: &[&str] = &[
    "🌅 A new day has started. Time to keep your streaks alive!",
    "☀️ Good morning! Fresh day, fresh chances.",
    "📆 New day, new check-ins. You've got this!",
];

fn render(template: &str, habit_name: &str, streak: u32) -> String {
    template
        .replace("{habit}", habit_name)
        .replace("{streak}", &streak.to_string())
}

fn pick<'a, R: Rng + ?Sized>(templates: &[&'a str], rng: &mut R) -> &'a str {
    templates.choose(rng).copied().unwrap_or_default()
}

/// Completion message for the tier `(current_streak, is_new_record)` falls in.
pub fn select_message<R: Rng + ?Sized>(
    habit_name: &str,
    current_streak: u32,
    is_new_record: bool,
    rng: &mut R,
) -> String {
    let tier = MessageTier::classify(current_streak, is_new_record);
    render(pick(tier.templates(), rng), habit_name, current_streak)
}

pub fn rest_day_message<R: Rng + ?Sized>(habit_name: &str, rng: &mut R) -> String {
    render(pick(REST_DAY_TEMPLATES, rng), habit_name, 0)
}

pub fn new_day_message<R: Rng + ?Sized>(rng: &mut R) -> String {
    pick(NEW_DAY_TEMPLATES, rng).to_string()
}
