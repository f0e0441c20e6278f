//! Types for habits and their completions.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// How often a habit is meant to be performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "daily" => Some(Frequency::Daily),
            "weekly" => Some(Frequency::Weekly),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Frequency::Daily => "Once a day",
            Frequency::Weekly => "Once a week",
        }
    }
}

/// A stored habit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Habit {
    pub id: i64,
    pub name: String,
    pub icon: String,
    pub color: String,
    pub frequency: Frequency,
    /// What a photo must show to prove completion.
    pub scan_method: String,
}

/// Fields for a habit that has not been stored yet.
#[derive(Debug, Clone)]
pub struct NewHabit {
    pub name: String,
    pub icon: String,
    pub color: String,
    pub frequency: Frequency,
    pub scan_method: String,
}

impl NewHabit {
    pub fn new(name: impl Into<String>, frequency: Frequency) -> Self {
        Self {
            name: name.into(),
            icon: "checkmark-circle-outline".to_string(),
            color: "#314146".to_string(),
            frequency,
            scan_method: String::new(),
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn with_scan_method(mut self, scan_method: impl Into<String>) -> Self {
        self.scan_method = scan_method.into();
        self
    }
}

/// A completion record. Several may exist for the same habit and day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub id: i64,
    pub habit_id: i64,
    pub date: NaiveDate,
    pub image_uri: Option<String>,
    /// Judge confidence percentage, when the completion came from a verification.
    pub confidence: Option<u8>,
}
