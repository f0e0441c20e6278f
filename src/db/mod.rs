mod schema;
pub mod habits;

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::error::{Error, Result};

pub use habits::{Completion, Frequency, Habit, NewHabit};
pub use schema::{MIGRATIONS, SCHEMA};

/// Maximum number of habits that may exist at once.
pub const MAX_HABITS: usize = 6;

/// Sole owner of the `habits` and `completions` tables.
///
/// The connection sits behind a mutex so the store can be shared between
/// tasks; concurrent writes serialize on it.
pub struct HabitStore {
    conn: Mutex<Connection>,
}

impl HabitStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::StoreUnavailable(rusqlite::Error::InvalidPath(
                        format!("{}: {}", parent.display(), e).into(),
                    ))
                })?;
            }
        }
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "Opened habit store");
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Create tables if needed and apply migrations. Safe to call repeatedly.
    pub fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        for migration in MIGRATIONS {
            let _ = conn.execute(migration, []);
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::poisoned())
    }

    // ========================================================================
    // Habit operations
    // ========================================================================

    /// Insert a habit, enforcing the [`MAX_HABITS`] ceiling in the same
    /// transaction as the insert.
    pub fn create_habit(&self, habit: &NewHabit) -> Result<i64> {
        let name = habit.name.trim();
        if name.is_empty() {
            return Err(Error::InvalidHabit("name must not be empty".to_string()));
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let count: i64 = tx.query_row("SELECT COUNT(*) FROM habits", [], |row| row.get(0))?;
        if count as usize >= MAX_HABITS {
            return Err(Error::CapacityExceeded { limit: MAX_HABITS });
        }

        tx.execute(
            r#"
            INSERT INTO habits (name, color, icon, freq, scan_method)
            VALUES (?, ?, ?, ?, ?)
            "#,
            params![
                name,
                habit.color,
                habit.icon,
                habit.frequency.as_str(),
                habit.scan_method
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        info!(habit_id = id, name, "Created habit");
        Ok(id)
    }

    /// All habits in insertion order.
    pub fn list_habits(&self) -> Result<Vec<Habit>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, icon, color, freq, scan_method FROM habits ORDER BY id ASC",
        )?;
        let habits = stmt
            .query_map([], habit_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(habits)
    }

    pub fn get_habit(&self, habit_id: i64) -> Result<Option<Habit>> {
        let conn = self.lock()?;
        let habit = conn
            .query_row(
                "SELECT id, name, icon, color, freq, scan_method FROM habits WHERE id = ?",
                [habit_id],
                habit_from_row,
            )
            .optional()?;
        Ok(habit)
    }

    pub fn habit_count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM habits", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Delete a habit and all of its completions as one transaction.
    pub fn delete_habit(&self, habit_id: i64) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let removed_completions =
            tx.execute("DELETE FROM completions WHERE habit_id = ?", [habit_id])?;
        let removed = tx.execute("DELETE FROM habits WHERE id = ?", [habit_id])?;
        if removed == 0 {
            // Dropping the transaction rolls back.
            return Err(Error::NotFound { habit_id });
        }
        tx.commit()?;

        info!(habit_id, removed_completions, "Deleted habit");
        Ok(())
    }

    // ========================================================================
    // Completion operations
    // ========================================================================

    /// Insert a completion row. Same-day duplicates are allowed.
    pub fn record_completion(
        &self,
        habit_id: i64,
        date: NaiveDate,
        image_uri: Option<&str>,
        confidence: Option<u8>,
    ) -> Result<i64> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM habits WHERE id = ?)",
            [habit_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(Error::NotFound { habit_id });
        }

        tx.execute(
            "INSERT INTO completions (habit_id, date_iso, image_uri, conf) VALUES (?, ?, ?, ?)",
            params![habit_id, date, image_uri, confidence],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        debug!(habit_id, completion_id = id, %date, "Recorded completion");
        Ok(id)
    }

    /// Remove every completion of `habit_id` dated `date`. Returns the number removed.
    pub fn clear_completion(&self, habit_id: i64, date: NaiveDate) -> Result<usize> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM completions WHERE habit_id = ? AND date_iso = ?",
            params![habit_id, date],
        )?;
        debug!(habit_id, %date, removed, "Cleared completions");
        Ok(removed)
    }

    pub fn completions_for(&self, habit_id: i64) -> Result<Vec<Completion>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, habit_id, date_iso, image_uri, conf
            FROM completions
            WHERE habit_id = ?
            ORDER BY date_iso ASC, id ASC
            "#,
        )?;
        let completions = stmt
            .query_map([habit_id], completion_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(completions)
    }

    /// Completions of `habit_id` dated within `from..=to`.
    pub fn completions_between(
        &self,
        habit_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Completion>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, habit_id, date_iso, image_uri, conf
            FROM completions
            WHERE habit_id = ? AND date_iso BETWEEN ? AND ?
            ORDER BY date_iso ASC, id ASC
            "#,
        )?;
        let completions = stmt
            .query_map(params![habit_id, from, to], completion_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(completions)
    }

    /// Number of completion rows per date for `habit_id` within `from..=to`.
    /// Dates without completions are absent.
    pub fn completion_counts_between(
        &self,
        habit_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<(NaiveDate, u32)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT date_iso, COUNT(*)
            FROM completions
            WHERE habit_id = ? AND date_iso BETWEEN ? AND ?
            GROUP BY date_iso
            ORDER BY date_iso ASC
            "#,
        )?;
        let counts = stmt
            .query_map(params![habit_id, from, to], |row| {
                Ok((row.get::<_, NaiveDate>(0)?, row.get::<_, u32>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(counts)
    }

    pub fn has_completion_on(&self, habit_id: i64, date: NaiveDate) -> Result<bool> {
        let conn = self.lock()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM completions WHERE habit_id = ? AND date_iso = ?)",
            params![habit_id, date],
            |row| row.get(0),
        )?;
        Ok(exists)
    }
}

fn habit_from_row(row: &Row<'_>) -> rusqlite::Result<Habit> {
    let freq: String = row.get(4)?;
    let frequency = Frequency::from_str(&freq).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown habit frequency '{}'", freq).into(),
        )
    })?;
    Ok(Habit {
        id: row.get(0)?,
        name: row.get(1)?,
        icon: row.get(2)?,
        color: row.get(3)?,
        frequency,
        scan_method: row.get(5)?,
    })
}

fn completion_from_row(row: &Row<'_>) -> rusqlite::Result<Completion> {
    let conf: Option<i64> = row.get(4)?;
    Ok(Completion {
        id: row.get(0)?,
        habit_id: row.get(1)?,
        date: row.get(2)?,
        image_uri: row.get(3)?,
        confidence: conf.map(|c| c.clamp(0, 100) as u8),
    })
}
