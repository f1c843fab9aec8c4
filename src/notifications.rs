use std::collections::HashMap;
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::models::{HabitId, HabitView};
use crate::observer::EngineObserver;

const APP_NAME: &str = "Habit Streaks";

/// Observer that turns engine messages into desktop notifications.
#[derive(Debug, Default)]
pub struct DesktopNotifier {
    levels: Mutex<HashMap<HabitId, u32>>,
}

impl DesktopNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the highest level seen; true when a habit passes it.
    fn record_level(&self, habit_id: HabitId, level: u32) -> bool {
        let mut levels = self.levels.lock().unwrap_or_else(|e| e.into_inner());
        match levels.get(&habit_id).copied() {
            Some(highest) if level <= highest => false,
            previous => {
                levels.insert(habit_id, level);
                previous.is_some()
            }
        }
    }
}

fn show(title: &str, body: &str, timeout_ms: i32) {
    if let Err(e) = notify_rust::Notification::new()
        .summary(title)
        .body(body)
        .appname(APP_NAME)
        .timeout(timeout_ms)
        .show()
    {
        warn!(error = %e, "failed to send notification");
    }
}

impl EngineObserver for DesktopNotifier {
    fn on_stats_updated(&self, habit_id: HabitId, view: &HabitView) {
        debug!(
            habit_id,
            streak = view.stats.current_streak,
            level = view.stats.level,
            "stats updated"
        );
        if self.record_level(habit_id, view.stats.level) {
            show(
                &format!("🎉 Level Up! Level {}", view.stats.level),
                &format!("{} reached level {}!", view.habit.name, view.stats.level),
                8000,
            );
        }
    }

    fn on_message(&self, text: &str) {
        show("🦀 Habit Streaks", text, 5000);
    }

    fn on_celebration(&self, habit_id: HabitId, experience_gained: u32, is_new_record: bool) {
        debug!(habit_id, experience_gained, is_new_record, "celebration");
        if is_new_record {
            show("🏆 New Record!", &format!("+{} XP!", experience_gained), 5000);
        }
    }
}
