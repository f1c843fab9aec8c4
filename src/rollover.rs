use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

use crate::calendar::DayKey;
use crate::engine::{HabitEngine, RolloverOutcome};

pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// cursor state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Stable(DayKey),
    RollingOver { from: DayKey, to: DayKey },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayChange {
    pub from: DayKey,
    pub to: DayKey,
}

/// The day the engine believes is today, pure state machine
#[derive(Debug, Clone)]
pub struct DayCursor {
    state: CursorState,
}

impl DayCursor {
    pub fn new(today: DayKey) -> Self {
        Self {
            state: CursorState::Stable(today),
        }
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Day to compute against. Already the new day while rolling over.
    pub fn current_day(&self) -> DayKey {
        match self.state {
            CursorState::Stable(day) => day,
            CursorState::RollingOver { to, .. } => to,
        }
    }

    /// Compare against the wall-clock day; enters `RollingOver` when they
    /// differ, in either direction.
    pub fn observe(&mut self, today: DayKey) -> Option<DayChange> {
        let current = self.current_day();
        if current == today && !self.is_rolling_over() {
            return None;
        }
        let from = match self.state {
            CursorState::Stable(day) => day,
            CursorState::RollingOver { from, .. } => from,
        };
        self.state = CursorState::RollingOver { from, to: today };
        Some(DayChange { from, to: today })
    }

    /// back to stable on the new day
    pub fn finish(&mut self) {
        if let CursorState::RollingOver { to, .. } = self.state {
            self.state = CursorState::Stable(to);
        }
    }

    pub fn is_rolling_over(&self) -> bool {
        matches!(self.state, CursorState::RollingOver { .. })
    }
}

/// App lifecycle signals that should trigger an immediate day check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Foreground,
}

/// Owns the periodic check task. Dropping it stops the task.
pub struct RolloverHandle {
    cancel: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl RolloverHandle {
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    /// Cancel and wait for the task to finish its current check.
    pub async fn shutdown(mut self) {
        self.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for RolloverHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Check for a new day every `every` and on each lifecycle event.
///
/// The first check runs immediately.
pub fn spawn_rollover_loop(
    engine: Arc<Mutex<HabitEngine>>,
    every: Duration,
    mut lifecycle: mpsc::Receiver<LifecycleEvent>,
) -> RolloverHandle {
    let (cancel_tx, mut cancel_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut lifecycle_open = true;

        loop {
            tokio::select! {
                biased;

                _ = cancel_rx.changed() => break,
                _ = ticker.tick() => run_check(&engine, "timer").await,
                event = lifecycle.recv(), if lifecycle_open => match event {
                    Some(LifecycleEvent::Foreground) => run_check(&engine, "foreground").await,
                    None => lifecycle_open = false,
                },
            }
        }
        debug!("rollover loop stopped");
    });

    RolloverHandle {
        cancel: cancel_tx,
        task: Some(task),
    }
}

async fn run_check(engine: &Mutex<HabitEngine>, trigger: &'static str) {
    let mut engine = engine.lock().await;
    match engine.check_rollover().await {
        RolloverOutcome::Unchanged => debug!(trigger, "day unchanged"),
        RolloverOutcome::Advanced { to, .. } => debug!(trigger, day = %to, "rollover handled"),
    }
}
