use thiserror::Error;

use crate::models::HabitId;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("habit {0} not found")]
    HabitNotFound(HabitId),

    /// Transport-level failure of a remote backend.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("habit name must not be empty")]
    EmptyName,

    #[error("rest days per week must be between 1 and 6, got {0}")]
    RestDaysOutOfRange(u8),
}

/// Why a rest day was refused before anything was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RestDayRejection {
    #[error("rest days are not allowed for this habit")]
    NotAllowed,

    #[error("habit is already completed today")]
    AlreadyCompleted,

    #[error("weekly rest day limit of {limit} reached")]
    WeeklyLimitReached { limit: u8 },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("habit {0} is not loaded")]
    UnknownHabit(HabitId),

    #[error("habit {0} is inactive")]
    Inactive(HabitId),

    #[error("habit {0} already has a rest day today")]
    RestDayTaken(HabitId),

    #[error("rest day rejected: {0}")]
    RestDay(#[from] RestDayRejection),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
