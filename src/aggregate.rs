//! Per-habit day status and weekly roll-ups.
//!
//! Weekly vectors report raw completion row counts per day; duplicate
//! same-day rows are not collapsed. The day status treats one or more rows
//! as done.

use chrono::NaiveDate;
use serde::Serialize;

use crate::calendar;
use crate::db::{Habit, HabitStore, MAX_HABITS};
use crate::error::Result;

/// Status of one card on the habit grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HabitStatus {
    NotDone,
    Done,
    /// Empty slot below the habit ceiling.
    Placeholder,
}

impl HabitStatus {
    pub fn label(&self) -> &'static str {
        match self {
            HabitStatus::NotDone => "Not Done",
            HabitStatus::Done => "Done",
            HabitStatus::Placeholder => "No Habit",
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, HabitStatus::Done)
    }
}

/// One slot of the home-screen grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardSlot {
    pub habit: Option<Habit>,
    pub status: HabitStatus,
}

/// Completion counts for one Monday..Sunday week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WeeklyVector {
    pub monday: NaiveDate,
    pub counts: [u32; 7],
}

impl WeeklyVector {
    pub fn total(&self) -> u32 {
        self.counts.iter().sum()
    }

    pub fn summary(&self) -> WeeklySummary {
        WeeklySummary::from_vector(&self.counts)
    }
}

/// Statistics shown on the habit detail view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklySummary {
    pub total: u32,
    pub daily_average: f64,
    /// Name of the first day with the highest count; `None` for an empty week.
    pub best_day: Option<&'static str>,
}

impl WeeklySummary {
    pub fn from_vector(counts: &[u32; 7]) -> Self {
        let total: u32 = counts.iter().sum();
        let best_day = counts
            .iter()
            .copied()
            .enumerate()
            .filter(|&(_, c)| c > 0)
            .fold(None, |best: Option<(usize, u32)>, (i, c)| match best {
                Some((_, b)) if b >= c => best,
                _ => Some((i, c)),
            })
            .and_then(|(i, _)| calendar::weekday_name(i));

        Self {
            total,
            daily_average: f64::from(total) / 7.0,
            best_day,
        }
    }
}

/// Read-side queries over the habit store.
pub struct Aggregator<'a> {
    store: &'a HabitStore,
}

impl<'a> Aggregator<'a> {
    pub fn new(store: &'a HabitStore) -> Self {
        Self { store }
    }

    /// Done iff at least one completion exists for `habit` dated today.
    pub fn status_today(&self, habit: &Habit) -> Result<HabitStatus> {
        self.status_on(habit, calendar::today())
    }

    pub fn status_on(&self, habit: &Habit, date: NaiveDate) -> Result<HabitStatus> {
        if self.store.has_completion_on(habit.id, date)? {
            Ok(HabitStatus::Done)
        } else {
            Ok(HabitStatus::NotDone)
        }
    }

    /// Completion counts for the current week, Monday first.
    pub fn weekly_vector(&self, habit_id: i64) -> Result<WeeklyVector> {
        self.weekly_vector_for(habit_id, calendar::today())
    }

    /// Completion counts for the week containing `date`, Monday first.
    pub fn weekly_vector_for(&self, habit_id: i64, date: NaiveDate) -> Result<WeeklyVector> {
        let days = calendar::week_days(date);
        let (monday, sunday) = (days[0], days[6]);

        let mut counts = [0u32; 7];
        for (day, count) in self.store.completion_counts_between(habit_id, monday, sunday)? {
            if let Some(slot) = days.iter().position(|d| *d == day) {
                counts[slot] = count;
            }
        }

        Ok(WeeklyVector { monday, counts })
    }

    /// Every stored habit with today's status, padded with placeholders up to
    /// the habit ceiling.
    pub fn dashboard(&self) -> Result<Vec<DashboardSlot>> {
        self.dashboard_on(calendar::today())
    }

    pub fn dashboard_on(&self, date: NaiveDate) -> Result<Vec<DashboardSlot>> {
        let mut slots = Vec::with_capacity(MAX_HABITS);
        for habit in self.store.list_habits()? {
            let status = self.status_on(&habit, date)?;
            slots.push(DashboardSlot {
                habit: Some(habit),
                status,
            });
        }
        while slots.len() < MAX_HABITS {
            slots.push(DashboardSlot {
                habit: None,
                status: HabitStatus::Placeholder,
            });
        }
        Ok(slots)
    }

    /// Manually flip today's status. Returns the new status.
    pub fn toggle_today(&self, habit: &Habit) -> Result<HabitStatus> {
        self.toggle_on(habit, calendar::today())
    }

    pub fn toggle_on(&self, habit: &Habit, date: NaiveDate) -> Result<HabitStatus> {
        match self.status_on(habit, date)? {
            HabitStatus::Done => {
                self.store.clear_completion(habit.id, date)?;
                Ok(HabitStatus::NotDone)
            }
            _ => {
                self.store.record_completion(habit.id, date, None, None)?;
                Ok(HabitStatus::Done)
            }
        }
    }
}
