//! Habit streak engine: streaks with rest days, experience and levels, and
//! daily rollover, on top of a pluggable habit store.

pub mod calendar;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod messages;
pub mod models;
pub mod notifications;
pub mod observer;
pub mod rollover;
pub mod store;
pub mod streak;
pub mod view;
pub mod xp;

pub use calendar::{Clock, DayKey, ManualClock, SystemClock};
pub use engine::{CompletionOutcome, HabitEngine, RestDayOutcome, RolloverOutcome};
pub use error::{EngineError, RestDayRejection, StoreError};
pub use models::{Habit, HabitId, HabitStats, HabitView, NewHabit, RestDayPolicy};
pub use store::{HabitStore, InsertOutcome};
