//! Cron schedules for periodic tasks.
//!
//! A schedule names the months, days, weekdays, hours and minutes a task
//! fires on. Launching is tick-driven: a tick that lands on a scheduled
//! minute starts the task unless its slot is still running, in which case
//! the tick is dropped.

use chrono::{Datelike, Duration, NaiveDateTime, Timelike};

/// One task's cron field sets. Empty fields never fire.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    /// Months 1–12.
    pub months: Vec<u32>,
    /// Days of month 1–31.
    pub days: Vec<u32>,
    /// Weekdays 0–6, Monday first.
    pub weekdays: Vec<u32>,
    /// Hours 0–23.
    pub hours: Vec<u32>,
    /// Minutes 0–59.
    pub minutes: Vec<u32>,
}

impl Default for CronSchedule {
    /// Every minute.
    fn default() -> Self {
        Self {
            months: (1..=12).collect(),
            days: (1..=31).collect(),
            weekdays: (0..7).collect(),
            hours: (0..24).collect(),
            minutes: (0..60).collect(),
        }
    }
}

impl CronSchedule {
    fn matches(&self, at: NaiveDateTime) -> bool {
        self.months.contains(&at.month())
            && self.days.contains(&at.day())
            && self.weekdays.contains(&at.weekday().num_days_from_monday())
            && self.hours.contains(&at.hour())
            && self.minutes.contains(&at.minute())
    }

    /// Whether a tick at `at` should launch. Only whole minutes fire.
    pub fn launch_at(&self, at: NaiveDateTime) -> bool {
        at.second() == 0 && self.matches(at)
    }

    /// The next scheduled time strictly after `after`, within one year.
    pub fn next_plan_at(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
        let mut at = after
            .with_second(0)?
            .checked_add_signed(Duration::minutes(1))?;
        // Minute stepping is plenty fast for a one-year horizon.
        for _ in 0..(366 * 24 * 60) {
            if self.matches(at) {
                return Some(at);
            }
            at = at.checked_add_signed(Duration::minutes(1))?;
        }
        None
    }
}

/// Observable task states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Running,
    Done,
}

/// One task slot with the busy-discard launch policy.
#[derive(Debug)]
pub struct CronSlot {
    state: TaskState,
}

impl CronSlot {
    /// A fresh idle slot.
    pub fn new() -> Self {
        Self {
            state: TaskState::Idle,
        }
    }

    /// Current state.
    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Try to launch: a running slot drops the tick.
    pub fn try_launch(&mut self) -> bool {
        if self.state == TaskState::Running {
            return false;
        }
        self.state = TaskState::Running;
        true
    }

    /// Mark the running work finished.
    pub fn finish(&mut self) {
        self.state = TaskState::Done;
    }
}

impl Default for CronSlot {
    fn default() -> Self {
        Self::new()
    }
}
