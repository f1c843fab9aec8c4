use tokio::sync::mpsc;

use crate::models::{HabitId, HabitView};

/// Hooks the presentation layer subscribes to. The engine renders nothing
/// itself.
pub trait EngineObserver: Send + Sync {
    fn on_stats_updated(&self, habit_id: HabitId, view: &HabitView);

    fn on_message(&self, text: &str);

    /// Celebratory side effect after a completion (confetti, sound, ...).
    fn on_celebration(&self, _habit_id: HabitId, _experience_gained: u32, _is_new_record: bool) {}
}

/// Drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl EngineObserver for NullObserver {
    fn on_stats_updated(&self, _habit_id: HabitId, _view: &HabitView) {}

    fn on_message(&self, _text: &str) {}
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    StatsUpdated {
        habit_id: HabitId,
        view: Box<HabitView>,
    },
    Message(String),
    Celebration {
        habit_id: HabitId,
        experience_gained: u32,
        is_new_record: bool,
    },
}

/// Forwards every hook into a channel so a UI loop can be driven by it.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: EngineEvent) {
        // receiver gone means nobody is listening anymore
        let _ = self.tx.send(event);
    }
}

impl EngineObserver for ChannelObserver {
    fn on_stats_updated(&self, habit_id: HabitId, view: &HabitView) {
        self.send(EngineEvent::StatsUpdated {
            habit_id,
            view: Box::new(view.clone()),
        });
    }

    fn on_message(&self, text: &str) {
        self.send(EngineEvent::Message(text.to_string()));
    }

    fn on_celebration(&self, habit_id: HabitId, experience_gained: u32, is_new_record: bool) {
        self.send(EngineEvent::Celebration {
            habit_id,
            experience_gained,
            is_new_record,
        });
    }
}
