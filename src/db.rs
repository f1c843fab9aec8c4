use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, warn};

use crate::calendar::DayKey;
use crate::error::StoreError;
use crate::models::{CompletionEvent, Habit, HabitId, NewHabit, RestDayEvent, RestDayPolicy};
use crate::store::{HabitStore, InsertOutcome};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS habits (
        id INTEGER PRIMARY KEY,
        user_id TEXT NOT NULL,
        name TEXT NOT NULL,
        description TEXT,
        allow_rest_days BOOLEAN NOT NULL DEFAULT 0,
        rest_days_per_week INTEGER NOT NULL DEFAULT 0,
        is_active BOOLEAN NOT NULL DEFAULT 1,
        group_id TEXT,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS habit_completions (
        id INTEGER PRIMARY KEY,
        habit_id INTEGER NOT NULL REFERENCES habits(id),
        user_id TEXT NOT NULL,
        completed_date TEXT NOT NULL,
        note TEXT,
        UNIQUE (habit_id, user_id, completed_date)
    );

    CREATE TABLE IF NOT EXISTS habit_rest_days (
        id INTEGER PRIMARY KEY,
        habit_id INTEGER NOT NULL REFERENCES habits(id),
        user_id TEXT NOT NULL,
        rest_date TEXT NOT NULL,
        reason TEXT,
        UNIQUE (habit_id, user_id, rest_date)
    );
";

const HABIT_COLUMNS: &str = "id, user_id, name, description, allow_rest_days, rest_days_per_week, is_active, group_id, created_at";

/// default db file path
pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("habit-streaks")
        .join("habits.db")
}

/// SQLite-backed [`HabitStore`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// open db + init tables
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).ok();
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // a panic mid-statement leaves sqlite itself consistent
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn habit_from_row(row: &Row<'_>) -> rusqlite::Result<Habit> {
    let id: HabitId = row.get(0)?;
    let allow: bool = row.get(4)?;
    let per_week: i64 = row.get(5)?;
    let rest_policy = u8::try_from(per_week)
        .ok()
        .and_then(|n| RestDayPolicy::from_parts(allow, n).ok())
        .unwrap_or_else(|| {
            warn!(habit_id = id, allow, per_week, "invalid stored rest day policy, disabling rest days");
            RestDayPolicy::Disallowed
        });

    let created_raw: String = row.get(8)?;
    let created_at = DateTime::parse_from_rfc3339(&created_raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            warn!(habit_id = id, created_at = %created_raw, "unparseable habit timestamp");
            DateTime::<Utc>::default()
        });

    Ok(Habit {
        id,
        user_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        rest_policy,
        is_active: row.get(6)?,
        group_id: row.get(7)?,
        created_at,
    })
}

/// Day column read as text; rows that don't parse are dropped by the caller.
fn parse_day(habit_id: HabitId, raw: &str) -> Option<DayKey> {
    match raw.parse() {
        Ok(day) => Some(day),
        Err(e) => {
            warn!(habit_id, day = raw, error = %e, "skipping record with malformed date");
            None
        }
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn insert_outcome(result: rusqlite::Result<usize>) -> Result<InsertOutcome, StoreError> {
    match result {
        Ok(_) => Ok(InsertOutcome::Inserted),
        Err(e) if is_unique_violation(&e) => Ok(InsertOutcome::AlreadyExists),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl HabitStore for SqliteStore {
    async fn fetch_habit(&self, habit_id: HabitId) -> Result<Habit, StoreError> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {HABIT_COLUMNS} FROM habits WHERE id = ?1"),
            params![habit_id],
            habit_from_row,
        )
        .optional()?
        .ok_or(StoreError::HabitNotFound(habit_id))
    }

    async fn fetch_active_habits(&self, user_id: &str) -> Result<Vec<Habit>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {HABIT_COLUMNS} FROM habits WHERE user_id = ?1 AND is_active = 1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![user_id], habit_from_row)?;

        let mut habits = Vec::new();
        for row in rows {
            habits.push(row?);
        }
        Ok(habits)
    }

    async fn create_habit(&self, user_id: &str, habit: &NewHabit) -> Result<Habit, StoreError> {
        let created_at = Utc::now();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO habits (user_id, name, description, allow_rest_days, rest_days_per_week, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
            params![
                user_id,
                habit.name,
                habit.description,
                habit.rest_policy.allows_rest_days(),
                habit.rest_policy.days_per_week(),
                created_at.to_rfc3339(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!(habit_id = id, name = %habit.name, "created habit");

        Ok(Habit {
            id,
            user_id: user_id.to_string(),
            name: habit.name.clone(),
            description: habit.description.clone(),
            rest_policy: habit.rest_policy,
            is_active: true,
            group_id: None,
            created_at,
        })
    }

    async fn update_habit(&self, habit: &Habit) -> Result<(), StoreError> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE habits SET name = ?1, description = ?2, allow_rest_days = ?3, rest_days_per_week = ?4 WHERE id = ?5",
            params![
                habit.name,
                habit.description,
                habit.rest_policy.allows_rest_days(),
                habit.rest_policy.days_per_week(),
                habit.id,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::HabitNotFound(habit.id));
        }
        Ok(())
    }

    async fn deactivate_habit(&self, habit_id: HabitId) -> Result<(), StoreError> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE habits SET is_active = 0 WHERE id = ?1",
            params![habit_id],
        )?;
        if changed == 0 {
            return Err(StoreError::HabitNotFound(habit_id));
        }
        Ok(())
    }

    async fn fetch_completions(
        &self,
        habit_id: HabitId,
        user_id: &str,
    ) -> Result<Vec<CompletionEvent>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT completed_date, note FROM habit_completions
             WHERE habit_id = ?1 AND user_id = ?2
             ORDER BY completed_date",
        )?;
        let rows = stmt.query_map(params![habit_id, user_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (raw_day, note) = row?;
            if let Some(completed_date) = parse_day(habit_id, &raw_day) {
                events.push(CompletionEvent {
                    habit_id,
                    user_id: user_id.to_string(),
                    completed_date,
                    note,
                });
            }
        }
        Ok(events)
    }

    async fn fetch_rest_days(
        &self,
        habit_id: HabitId,
        user_id: &str,
    ) -> Result<Vec<RestDayEvent>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT rest_date, reason FROM habit_rest_days
             WHERE habit_id = ?1 AND user_id = ?2
             ORDER BY rest_date",
        )?;
        let rows = stmt.query_map(params![habit_id, user_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (raw_day, reason) = row?;
            if let Some(rest_date) = parse_day(habit_id, &raw_day) {
                events.push(RestDayEvent {
                    habit_id,
                    user_id: user_id.to_string(),
                    rest_date,
                    reason,
                });
            }
        }
        Ok(events)
    }

    async fn insert_completion(
        &self,
        habit_id: HabitId,
        user_id: &str,
        day: DayKey,
        note: Option<&str>,
    ) -> Result<InsertOutcome, StoreError> {
        let conn = self.conn();
        insert_outcome(conn.execute(
            "INSERT INTO habit_completions (habit_id, user_id, completed_date, note) VALUES (?1, ?2, ?3, ?4)",
            params![habit_id, user_id, day.to_string(), note],
        ))
    }

    async fn insert_rest_day(
        &self,
        habit_id: HabitId,
        user_id: &str,
        day: DayKey,
        reason: Option<&str>,
    ) -> Result<InsertOutcome, StoreError> {
        let conn = self.conn();
        insert_outcome(conn.execute(
            "INSERT INTO habit_rest_days (habit_id, user_id, rest_date, reason) VALUES (?1, ?2, ?3, ?4)",
            params![habit_id, user_id, day.to_string(), reason],
        ))
    }
}
