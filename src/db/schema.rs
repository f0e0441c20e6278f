pub const SCHEMA: &str = r#"
-- Habits: user-defined recurring activities (at most 6 rows)
CREATE TABLE IF NOT EXISTS habits (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    color TEXT NOT NULL,
    icon TEXT NOT NULL,
    freq TEXT NOT NULL,          -- 'daily' or 'weekly'
    scan_method TEXT NOT NULL DEFAULT ''
);

-- Completions: one row per verified (or manually marked) completion
CREATE TABLE IF NOT EXISTS completions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    habit_id INTEGER NOT NULL,
    date_iso TEXT NOT NULL,      -- civil date, YYYY-MM-DD
    image_uri TEXT,
    conf INTEGER,                -- judge confidence, 0-100
    FOREIGN KEY (habit_id) REFERENCES habits(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_completions_habit_date ON completions(habit_id, date_iso);
"#;

/// Migrations for databases created before `scan_method` existed.
/// Errors are ignored since the column may already be present.
pub const MIGRATIONS: &[&str] = &[
    "ALTER TABLE habits ADD COLUMN scan_method TEXT NOT NULL DEFAULT ''",
];
