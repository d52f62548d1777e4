use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, params};

use crate::models::{
    ChatUser, DATE_FORMAT, DailyTotal, Gender, LedgerEntry, NewLedgerEntry, NewProfile,
    PersonalCacheEntry, Profile, TIMESTAMP_FORMAT,
};

pub struct Database {
    conn: Connection,
}

/// Result of a quota-gated ledger insert.
#[derive(Debug, Clone)]
pub struct GuardedInsert {
    /// Entries the user already had in the window before this insert.
    pub count_before: i64,
    /// `None` when the limit was reached and nothing was written.
    pub entry: Option<LedgerEntry>,
}

fn format_ts(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn day_start(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

fn parse_ts_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_date_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        // Cascading user deletion depends on this; it is per-connection in SQLite.
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    external_id INTEGER NOT NULL UNIQUE,
                    username TEXT,
                    first_name TEXT,
                    last_name TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS user_profiles (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    gender TEXT NOT NULL CHECK (gender IN ('male', 'female', 'other')),
                    age INTEGER NOT NULL,
                    height_cm INTEGER NOT NULL,
                    weight_kg REAL NOT NULL,
                    recorded_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS calories (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    input TEXT NOT NULL,
                    calories INTEGER,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS user_calorie_cache (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    input TEXT NOT NULL,
                    normalized_input TEXT NOT NULL,
                    calories INTEGER NOT NULL,
                    UNIQUE (user_id, normalized_input)
                );

                CREATE TABLE IF NOT EXISTS calorie_cache (
                    input TEXT PRIMARY KEY,
                    calories INTEGER NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_calories_user_created ON calories(user_id, created_at);
                CREATE INDEX IF NOT EXISTS idx_user_profiles_user ON user_profiles(user_id, recorded_at);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    // Expects columns: 0: id, 1: user_id, 2: input, 3: calories, 4: created_at
    fn ledger_entry_from_row(row: &rusqlite::Row) -> rusqlite::Result<LedgerEntry> {
        Ok(LedgerEntry {
            id: row.get(0)?,
            user_id: row.get(1)?,
            input: row.get(2)?,
            calories: row.get(3)?,
            created_at: parse_ts_column(row, 4)?,
        })
    }

    fn profile_from_row(row: &rusqlite::Row) -> rusqlite::Result<Profile> {
        let gender: String = row.get(2)?;
        let gender = gender.parse::<Gender>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into())
        })?;
        Ok(Profile {
            id: row.get(0)?,
            user_id: row.get(1)?,
            gender,
            age: row.get(3)?,
            height_cm: row.get(4)?,
            weight_kg: row.get(5)?,
            recorded_at: row.get(6)?,
        })
    }

    fn personal_cache_from_row(row: &rusqlite::Row) -> rusqlite::Result<PersonalCacheEntry> {
        Ok(PersonalCacheEntry {
            id: row.get(0)?,
            user_id: row.get(1)?,
            input: row.get(2)?,
            calories: row.get(3)?,
        })
    }

    // --- Users ---

    /// Get-or-create in one statement, so concurrent first contact from the
    /// same external identity cannot produce two rows.
    pub fn upsert_user(&self, user: &ChatUser) -> Result<i64> {
        let now = format_ts(Local::now().naive_local());
        let id = self.conn.query_row(
            "INSERT INTO users (external_id, username, first_name, last_name, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(external_id) DO UPDATE SET
                username = excluded.username,
                first_name = excluded.first_name,
                last_name = excluded.last_name
             RETURNING id",
            params![
                user.external_id,
                user.username,
                user.first_name,
                user.last_name,
                now,
            ],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn find_user(&self, external_id: i64) -> Result<Option<i64>> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM users WHERE external_id = ?1",
                params![external_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Removes the user and, through cascades, every profile, cache entry and
    /// ledger row they own.
    pub fn delete_user_by_external_id(&self, external_id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM users WHERE external_id = ?1",
            params![external_id],
        )?;
        Ok(rows > 0)
    }

    // --- Profiles ---

    pub fn insert_profile(
        &self,
        user_id: i64,
        profile: &NewProfile,
        recorded_at: NaiveDateTime,
    ) -> Result<Profile> {
        self.conn.execute(
            "INSERT INTO user_profiles (user_id, gender, age, height_cm, weight_kg, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user_id,
                profile.gender.as_str(),
                profile.age,
                profile.height_cm,
                profile.weight_kg,
                format_ts(recorded_at),
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.conn
            .query_row(
                "SELECT id, user_id, gender, age, height_cm, weight_kg, recorded_at
                 FROM user_profiles WHERE id = ?1",
                params![id],
                Self::profile_from_row,
            )
            .context("Profile not found after insert")
    }

    pub fn get_current_profile(&self, user_id: i64) -> Result<Option<Profile>> {
        let profile = self
            .conn
            .query_row(
                "SELECT id, user_id, gender, age, height_cm, weight_kg, recorded_at
                 FROM user_profiles
                 WHERE user_id = ?1
                 ORDER BY recorded_at DESC, id DESC
                 LIMIT 1",
                params![user_id],
                Self::profile_from_row,
            )
            .optional()?;
        Ok(profile)
    }

    // --- Personal cache ---

    /// Returns `None` when the user already has an entry for this description.
    pub fn insert_personal_cache(
        &self,
        user_id: i64,
        input: &str,
        normalized: &str,
        calories: i64,
    ) -> Result<Option<PersonalCacheEntry>> {
        let rows = self.conn.execute(
            "INSERT INTO user_calorie_cache (user_id, input, normalized_input, calories)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, normalized_input) DO NOTHING",
            params![user_id, input, normalized, calories],
        )?;
        if rows == 0 {
            return Ok(None);
        }
        let id = self.conn.last_insert_rowid();
        self.get_personal_cache_entry(user_id, id)
    }

    pub fn get_personal_calories(&self, user_id: i64, normalized: &str) -> Result<Option<i64>> {
        let calories = self
            .conn
            .query_row(
                "SELECT calories FROM user_calorie_cache
                 WHERE user_id = ?1 AND normalized_input = ?2",
                params![user_id, normalized],
                |row| row.get(0),
            )
            .optional()?;
        Ok(calories)
    }

    pub fn get_personal_cache_entry(
        &self,
        user_id: i64,
        id: i64,
    ) -> Result<Option<PersonalCacheEntry>> {
        let entry = self
            .conn
            .query_row(
                "SELECT id, user_id, input, calories FROM user_calorie_cache
                 WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
                Self::personal_cache_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    pub fn list_personal_cache(&self, user_id: i64) -> Result<Vec<PersonalCacheEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, input, calories FROM user_calorie_cache
             WHERE user_id = ?1
             ORDER BY normalized_input, id",
        )?;
        let entries = stmt
            .query_map(params![user_id], Self::personal_cache_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Scoped to the owner: another user's id deletes nothing.
    pub fn delete_personal_cache_entry(&self, user_id: i64, id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM user_calorie_cache WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        Ok(rows > 0)
    }

    // --- Shared cache ---

    pub fn get_shared_calories(&self, normalized: &str) -> Result<Option<i64>> {
        let calories = self
            .conn
            .query_row(
                "SELECT calories FROM calorie_cache WHERE input = ?1",
                params![normalized],
                |row| row.get(0),
            )
            .optional()?;
        Ok(calories)
    }

    /// Last write wins.
    pub fn upsert_shared_calories(&self, normalized: &str, calories: i64) -> Result<()> {
        let now = format_ts(Local::now().naive_local());
        self.conn.execute(
            "INSERT INTO calorie_cache (input, calories, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(input) DO UPDATE SET
                calories = excluded.calories,
                updated_at = excluded.updated_at",
            params![normalized, calories, now],
        )?;
        Ok(())
    }

    // --- Ledger ---

    pub fn count_entries_since(&self, user_id: i64, since: NaiveDateTime) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM calories WHERE user_id = ?1 AND created_at >= ?2",
            params![user_id, format_ts(since)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Count and insert as one unit: the insert is conditional on the count
    /// still being under `limit`, inside a single transaction.
    pub fn insert_entry_within_limit(
        &self,
        entry: &NewLedgerEntry,
        since: NaiveDateTime,
        limit: i64,
    ) -> Result<GuardedInsert> {
        let since = format_ts(since);
        let tx = self.conn.unchecked_transaction()?;

        let count_before: i64 = tx.query_row(
            "SELECT COUNT(*) FROM calories WHERE user_id = ?1 AND created_at >= ?2",
            params![entry.user_id, since],
            |row| row.get(0),
        )?;
        if count_before >= limit {
            return Ok(GuardedInsert {
                count_before,
                entry: None,
            });
        }

        let rows = tx.execute(
            "INSERT INTO calories (user_id, input, calories, created_at)
             SELECT ?1, ?2, ?3, ?4
             WHERE (SELECT COUNT(*) FROM calories WHERE user_id = ?1 AND created_at >= ?5) < ?6",
            params![
                entry.user_id,
                entry.input,
                entry.calories,
                format_ts(entry.created_at),
                since,
                limit,
            ],
        )?;
        if rows == 0 {
            return Ok(GuardedInsert {
                count_before,
                entry: None,
            });
        }
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(GuardedInsert {
            count_before,
            entry: Some(self.get_entry(id)?),
        })
    }

    pub fn get_entry(&self, id: i64) -> Result<LedgerEntry> {
        self.conn
            .query_row(
                "SELECT id, user_id, input, calories, created_at FROM calories WHERE id = ?1",
                params![id],
                Self::ledger_entry_from_row,
            )
            .context("Ledger entry not found")
    }

    /// Selects and deletes the most recent entry in one statement.
    pub fn delete_last_entry(&self, user_id: i64) -> Result<Option<LedgerEntry>> {
        let mut stmt = self.conn.prepare(
            "DELETE FROM calories
             WHERE id = (
                 SELECT id FROM calories
                 WHERE user_id = ?1
                 ORDER BY created_at DESC, id DESC
                 LIMIT 1
             )
             RETURNING id, user_id, input, calories, created_at",
        )?;
        let mut rows = stmt.query(params![user_id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::ledger_entry_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    /// Entries in `[from, to)`, oldest first.
    pub fn get_entries_between(
        &self,
        user_id: i64,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<LedgerEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, input, calories, created_at
             FROM calories
             WHERE user_id = ?1 AND created_at >= ?2 AND created_at < ?3
             ORDER BY created_at, id",
        )?;
        let entries = stmt
            .query_map(
                params![user_id, format_ts(from), format_ts(to)],
                Self::ledger_entry_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn get_entries_for_date(&self, user_id: i64, date: NaiveDate) -> Result<Vec<LedgerEntry>> {
        let from = day_start(date);
        let to = from + chrono::Duration::days(1);
        self.get_entries_between(user_id, from, to)
    }

    /// Calendar days that have at least one entry, most recent first.
    pub fn get_distinct_entry_dates(&self, user_id: i64, limit: i64) -> Result<Vec<NaiveDate>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT substr(created_at, 1, 10) AS day
             FROM calories
             WHERE user_id = ?1
             ORDER BY day DESC
             LIMIT ?2",
        )?;
        let dates = stmt
            .query_map(params![user_id, limit], |row| parse_date_column(row, 0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(dates)
    }

    /// Per-day sums from `since` onwards, oldest first. Uncosted entries count
    /// as zero. Days without entries are omitted.
    pub fn get_daily_totals(&self, user_id: i64, since: NaiveDate) -> Result<Vec<DailyTotal>> {
        let mut stmt = self.conn.prepare(
            "SELECT substr(created_at, 1, 10) AS day, COALESCE(SUM(calories), 0), COUNT(*)
             FROM calories
             WHERE user_id = ?1 AND created_at >= ?2
             GROUP BY day
             ORDER BY day",
        )?;
        let totals = stmt
            .query_map(params![user_id, format_ts(day_start(since))], |row| {
                Ok(DailyTotal {
                    date: parse_date_column(row, 0)?,
                    calories: row.get(1)?,
                    entries: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(totals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(date: &str, time: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(&format!("{date} {time}"), TIMESTAMP_FORMAT).unwrap()
    }

    fn new_entry(user_id: i64, input: &str, calories: Option<i64>, ts: NaiveDateTime) -> NewLedgerEntry {
        NewLedgerEntry {
            user_id,
            input: input.to_string(),
            calories,
            created_at: ts,
        }
    }

    fn setup() -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        let user_id = db.upsert_user(&ChatUser::new(1001)).unwrap();
        (db, user_id)
    }

    #[test]
    fn test_upsert_user_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let mut user = ChatUser::new(42);
        let first = db.upsert_user(&user).unwrap();
        user.username = Some("eater".to_string());
        let second = db.upsert_user(&user).unwrap();
        assert_eq!(first, second);
        assert_eq!(db.find_user(42).unwrap(), Some(first));
        assert_eq!(db.find_user(43).unwrap(), None);
    }

    #[test]
    fn test_current_profile_is_most_recent() {
        let (db, user_id) = setup();
        assert!(db.get_current_profile(user_id).unwrap().is_none());

        let old = NewProfile {
            gender: Gender::Male,
            age: 30,
            height_cm: 180,
            weight_kg: 90.0,
        };
        let new = NewProfile {
            weight_kg: 80.0,
            ..old.clone()
        };
        db.insert_profile(user_id, &old, at("2026-01-01", "10:00:00"))
            .unwrap();
        db.insert_profile(user_id, &new, at("2026-02-01", "10:00:00"))
            .unwrap();

        let current = db.get_current_profile(user_id).unwrap().unwrap();
        assert!((current.weight_kg - 80.0).abs() < f64::EPSILON);
        assert_eq!(current.gender, Gender::Male);
    }

    #[test]
    fn test_personal_cache_rejects_duplicates_case_insensitively() {
        let (db, user_id) = setup();
        let first = db
            .insert_personal_cache(user_id, "Greek Salad", "greek salad", 320)
            .unwrap();
        assert!(first.is_some());
        let dup = db
            .insert_personal_cache(user_id, "GREEK salad", "greek salad", 999)
            .unwrap();
        assert!(dup.is_none());
        assert_eq!(
            db.get_personal_calories(user_id, "greek salad").unwrap(),
            Some(320)
        );
    }

    #[test]
    fn test_personal_cache_is_scoped_to_owner() {
        let (db, owner) = setup();
        let other = db.upsert_user(&ChatUser::new(2002)).unwrap();
        let entry = db
            .insert_personal_cache(owner, "Canteen lunch", "canteen lunch", 650)
            .unwrap()
            .unwrap();

        assert_eq!(db.get_personal_calories(other, "canteen lunch").unwrap(), None);
        assert!(db.get_personal_cache_entry(other, entry.id).unwrap().is_none());
        assert!(!db.delete_personal_cache_entry(other, entry.id).unwrap());
        assert!(db.delete_personal_cache_entry(owner, entry.id).unwrap());
        assert!(db.list_personal_cache(owner).unwrap().is_empty());
    }

    #[test]
    fn test_list_personal_cache_sorted() {
        let (db, user_id) = setup();
        db.insert_personal_cache(user_id, "Porridge", "porridge", 250)
            .unwrap();
        db.insert_personal_cache(user_id, "apple pie", "apple pie", 400)
            .unwrap();
        let names: Vec<String> = db
            .list_personal_cache(user_id)
            .unwrap()
            .into_iter()
            .map(|e| e.input)
            .collect();
        assert_eq!(names, vec!["apple pie", "Porridge"]);
    }

    #[test]
    fn test_shared_cache_last_write_wins() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.get_shared_calories("apple").unwrap(), None);
        db.upsert_shared_calories("apple", 95).unwrap();
        db.upsert_shared_calories("apple", 80).unwrap();
        assert_eq!(db.get_shared_calories("apple").unwrap(), Some(80));
    }

    #[test]
    fn test_insert_within_limit_counts_only_window() {
        let (db, user_id) = setup();
        let since = at("2026-10-16", "00:00:00");
        db.insert_entry_within_limit(
            &new_entry(user_id, "yesterday", Some(100), at("2026-10-15", "23:59:59")),
            at("2026-10-15", "00:00:00"),
            40,
        )
        .unwrap();

        let result = db
            .insert_entry_within_limit(
                &new_entry(user_id, "apple", Some(95), at("2026-10-16", "08:00:00")),
                since,
                40,
            )
            .unwrap();
        assert_eq!(result.count_before, 0);
        let entry = result.entry.unwrap();
        assert_eq!(entry.input, "apple");
        assert_eq!(entry.calories, Some(95));
        assert_eq!(db.count_entries_since(user_id, since).unwrap(), 1);
    }

    #[test]
    fn test_insert_within_limit_denies_at_limit() {
        let (db, user_id) = setup();
        let since = at("2026-10-16", "00:00:00");
        for i in 0..3 {
            let r = db
                .insert_entry_within_limit(
                    &new_entry(user_id, &format!("item {i}"), None, at("2026-10-16", "09:00:00")),
                    since,
                    3,
                )
                .unwrap();
            assert!(r.entry.is_some());
        }
        let denied = db
            .insert_entry_within_limit(
                &new_entry(user_id, "one too many", Some(1), at("2026-10-16", "10:00:00")),
                since,
                3,
            )
            .unwrap();
        assert_eq!(denied.count_before, 3);
        assert!(denied.entry.is_none());
        assert_eq!(db.count_entries_since(user_id, since).unwrap(), 3);
    }

    #[test]
    fn test_delete_last_entry() {
        let (db, user_id) = setup();
        assert!(db.delete_last_entry(user_id).unwrap().is_none());

        let since = at("2026-10-16", "00:00:00");
        for (input, time) in [("first", "08:00:00"), ("second", "12:00:00")] {
            db.insert_entry_within_limit(
                &new_entry(user_id, input, Some(10), at("2026-10-16", time)),
                since,
                40,
            )
            .unwrap();
        }

        let deleted = db.delete_last_entry(user_id).unwrap().unwrap();
        assert_eq!(deleted.input, "second");
        let deleted = db.delete_last_entry(user_id).unwrap().unwrap();
        assert_eq!(deleted.input, "first");
        assert!(db.delete_last_entry(user_id).unwrap().is_none());
    }

    #[test]
    fn test_entries_for_date_half_open_range() {
        let (db, user_id) = setup();
        let window = at("2026-10-01", "00:00:00");
        for (input, ts) in [
            ("late dinner", at("2026-10-15", "23:30:00")),
            ("breakfast", at("2026-10-16", "00:00:00")),
            ("uncosted", at("2026-10-16", "13:00:00")),
            ("next day", at("2026-10-17", "00:00:00")),
        ] {
            db.insert_entry_within_limit(&new_entry(user_id, input, None, ts), window, 40)
                .unwrap();
        }
        let date = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        let entries = db.get_entries_for_date(user_id, date).unwrap();
        let inputs: Vec<&str> = entries.iter().map(|e| e.input.as_str()).collect();
        assert_eq!(inputs, vec!["breakfast", "uncosted"]);
        assert!(entries[1].calories.is_none());
    }

    #[test]
    fn test_distinct_dates_and_daily_totals() {
        let (db, user_id) = setup();
        let window = at("2026-10-01", "00:00:00");
        for (cal, ts) in [
            (Some(100), at("2026-10-14", "08:00:00")),
            (Some(200), at("2026-10-16", "08:00:00")),
            (None, at("2026-10-16", "09:00:00")),
            (Some(50), at("2026-10-16", "10:00:00")),
        ] {
            db.insert_entry_within_limit(&new_entry(user_id, "x", cal, ts), window, 40)
                .unwrap();
        }

        let dates = db.get_distinct_entry_dates(user_id, 16).unwrap();
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2026, 10, 16).unwrap(),
                NaiveDate::from_ymd_opt(2026, 10, 14).unwrap(),
            ]
        );

        let totals = db
            .get_daily_totals(user_id, NaiveDate::from_ymd_opt(2026, 10, 15).unwrap())
            .unwrap();
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].calories, 250);
        assert_eq!(totals[0].entries, 3);
    }

    #[test]
    fn test_delete_user_cascades() {
        let (db, user_id) = setup();
        db.insert_profile(
            user_id,
            &NewProfile {
                gender: Gender::Female,
                age: 28,
                height_cm: 170,
                weight_kg: 60.0,
            },
            at("2026-10-01", "10:00:00"),
        )
        .unwrap();
        db.insert_personal_cache(user_id, "tea", "tea", 5).unwrap();
        db.insert_entry_within_limit(
            &new_entry(user_id, "tea", Some(5), at("2026-10-16", "08:00:00")),
            at("2026-10-16", "00:00:00"),
            40,
        )
        .unwrap();

        assert!(db.delete_user_by_external_id(1001).unwrap());
        assert!(!db.delete_user_by_external_id(1001).unwrap());

        let orphans: i64 = db
            .conn
            .query_row(
                "SELECT (SELECT COUNT(*) FROM calories)
                      + (SELECT COUNT(*) FROM user_profiles)
                      + (SELECT COUNT(*) FROM user_calorie_cache)",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[test]
    fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calofit.db");
        {
            let db = Database::open(&path).unwrap();
            db.upsert_shared_calories("banana", 105).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.get_shared_calories("banana").unwrap(), Some(105));
    }
}
