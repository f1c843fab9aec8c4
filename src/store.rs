//! Storage seam between the engine and whatever backend persists habits.
//!
//! Reads always return full, unfiltered history; writes report a uniqueness
//! conflict as [`InsertOutcome::AlreadyExists`] rather than as an error.

use async_trait::async_trait;

use crate::calendar::DayKey;
use crate::error::StoreError;
use crate::models::{CompletionEvent, Habit, HabitId, NewHabit, RestDayEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

#[async_trait]
pub trait HabitStore: Send + Sync {
    async fn fetch_habit(&self, habit_id: HabitId) -> Result<Habit, StoreError>;

    async fn fetch_active_habits(&self, user_id: &str) -> Result<Vec<Habit>, StoreError>;

    async fn create_habit(&self, user_id: &str, habit: &NewHabit) -> Result<Habit, StoreError>;

    /// Persist name, description and rest-day policy.
    async fn update_habit(&self, habit: &Habit) -> Result<(), StoreError>;

    /// Soft delete. History stays.
    async fn deactivate_habit(&self, habit_id: HabitId) -> Result<(), StoreError>;

    async fn fetch_completions(
        &self,
        habit_id: HabitId,
        user_id: &str,
    ) -> Result<Vec<CompletionEvent>, StoreError>;

    async fn fetch_rest_days(
        &self,
        habit_id: HabitId,
        user_id: &str,
    ) -> Result<Vec<RestDayEvent>, StoreError>;

    async fn insert_completion(
        &self,
        habit_id: HabitId,
        user_id: &str,
        day: DayKey,
        note: Option<&str>,
    ) -> Result<InsertOutcome, StoreError>;

    async fn insert_rest_day(
        &self,
        habit_id: HabitId,
        user_id: &str,
        day: DayKey,
        reason: Option<&str>,
    ) -> Result<InsertOutcome, StoreError>;
}
