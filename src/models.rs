use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::DayKey;
use crate::error::ValidationError;

pub type HabitId = i64;
pub type UserId = String;

pub const MAX_REST_DAYS_PER_WEEK: u8 = 6;

/// Whether a habit may skip days without breaking its streak.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "per_week", rename_all = "snake_case")]
pub enum RestDayPolicy {
    #[default]
    Disallowed,
    PerWeek(u8),
}

impl RestDayPolicy {
    pub fn per_week(days: u8) -> Result<Self, ValidationError> {
        if (1..=MAX_REST_DAYS_PER_WEEK).contains(&days) {
            Ok(RestDayPolicy::PerWeek(days))
        } else {
            Err(ValidationError::RestDaysOutOfRange(days))
        }
    }

    /// Build from the flat `(allow, per_week)` pair storage keeps.
    pub fn from_parts(allow: bool, per_week: u8) -> Result<Self, ValidationError> {
        if allow {
            Self::per_week(per_week)
        } else {
            Ok(RestDayPolicy::Disallowed)
        }
    }

    pub fn allows_rest_days(&self) -> bool {
        matches!(self, RestDayPolicy::PerWeek(_))
    }

    /// 0 when disabled.
    pub fn days_per_week(&self) -> u8 {
        match self {
            RestDayPolicy::Disallowed => 0,
            RestDayPolicy::PerWeek(n) => *n,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Habit {
    pub id: HabitId,
    pub user_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub rest_policy: RestDayPolicy,
    pub is_active: bool,
    pub group_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Habit {
    pub fn allows_rest_days(&self) -> bool {
        self.rest_policy.allows_rest_days()
    }
}

/// Fields for a habit that does not exist yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewHabit {
    pub name: String,
    pub description: Option<String>,
    pub rest_policy: RestDayPolicy,
}

impl NewHabit {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            rest_policy: RestDayPolicy::Disallowed,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_rest_policy(mut self, policy: RestDayPolicy) -> Self {
        self.rest_policy = policy;
        self
    }

    /// Trims the name and rejects empty ones or an out-of-range rest policy.
    pub fn validated(mut self) -> Result<Self, ValidationError> {
        self.name = validate_name(&self.name)?;
        self.description = normalize_description(self.description);
        validate_policy(self.rest_policy)?;
        Ok(self)
    }
}

/// Partial edit of a habit; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HabitUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub rest_policy: Option<RestDayPolicy>,
}

impl HabitUpdate {
    pub fn apply(&self, habit: &mut Habit) -> Result<(), ValidationError> {
        if let Some(name) = &self.name {
            habit.name = validate_name(name)?;
        }
        if let Some(description) = &self.description {
            habit.description = normalize_description(description.clone());
        }
        if let Some(policy) = self.rest_policy {
            habit.rest_policy = validate_policy(policy)?;
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<String, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    Ok(name.to_string())
}

fn validate_policy(policy: RestDayPolicy) -> Result<RestDayPolicy, ValidationError> {
    match policy {
        RestDayPolicy::PerWeek(n) => RestDayPolicy::per_week(n),
        RestDayPolicy::Disallowed => Ok(policy),
    }
}

fn normalize_description(description: Option<String>) -> Option<String> {
    description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub habit_id: HabitId,
    pub user_id: UserId,
    pub completed_date: DayKey,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestDayEvent {
    pub habit_id: HabitId,
    pub user_id: UserId,
    pub rest_date: DayKey,
    pub reason: Option<String>,
}

/// Derived per-habit numbers. Never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitStats {
    pub current_streak: u32,
    pub best_streak: u32,
    pub total_completions: u32,
    pub experience: u32,
    pub level: u32,
    pub is_completed_today: bool,
    pub has_rest_day_today: bool,
}

/// What the presentation layer gets for one habit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HabitView {
    pub habit: Habit,
    pub stats: HabitStats,
    pub completions: BTreeSet<DayKey>,
    pub rest_days: BTreeSet<DayKey>,
}
