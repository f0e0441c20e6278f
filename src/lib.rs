//! Photo-verified habit tracking.
//!
//! Habits and their completions live in a SQLite-backed [`HabitStore`]. The
//! [`Aggregator`] derives today's status and Monday-first weekly counts from
//! it, and the [`CaptureWorkflow`] records a completion once the
//! [`VerificationGateway`] accepts a photo as proof.

pub mod aggregate;
pub mod calendar;
pub mod capture;
pub mod config;
pub mod credentials;
pub mod db;
pub mod error;
pub mod llm;
pub mod logging;

#[cfg(test)]
pub(crate) mod test_support;

pub use aggregate::{Aggregator, DashboardSlot, HabitStatus, WeeklySummary, WeeklyVector};
pub use capture::{Camera, CaptureState, CaptureWorkflow, ExistingPhoto};
pub use config::Config;
pub use db::{Completion, Frequency, Habit, HabitStore, NewHabit, MAX_HABITS};
pub use error::{Error, ErrorKind, Result};
pub use llm::{VerificationGateway, Verdict};
