use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tracing::{debug, warn};

use crate::chat::Keyboard;
use crate::db::Database;
use crate::estimation::extract_calories;
use crate::models::{
    ChatUser, DailyTotal, LedgerEntry, NewLedgerEntry, NewProfile, PersonalCacheEntry, Profile,
    is_numeric_input, normalize_input, parse_calories,
};
use crate::picker::{DatePicker, PickerStep, SessionStore, WINDOW_MAX, candidate_window};
use crate::quota::{DAILY_ENTRY_LIMIT, QuotaStatus};
use crate::report::{DayReport, Report, ReportOutcome};

/// External calorie estimation, e.g. a hosted language model.
///
/// Called synchronously: the caller runs service methods off the async
/// executor. Implementations return the raw answer text; the pipeline extracts
/// the number itself.
pub trait CalorieEstimator: Send + Sync {
    fn estimate(&self, food: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalorieSource {
    Direct,
    PersonalCache,
    SharedCache,
    Estimated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Resolved { calories: i64, source: CalorieSource },
    /// Nothing could cost this input; the entry is stored with NULL calories.
    Unresolved,
}

impl Resolution {
    #[must_use]
    pub const fn calories(self) -> Option<i64> {
        match self {
            Self::Resolved { calories, .. } => Some(calories),
            Self::Unresolved => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum LogOutcome {
    Logged {
        entry: LedgerEntry,
        resolution: Resolution,
        quota: QuotaStatus,
    },
    QuotaExceeded,
    /// Input was not accepted; the message says why.
    Rejected(String),
}

#[derive(Debug, Clone)]
pub enum CacheAddOutcome {
    Added(PersonalCacheEntry),
    Duplicate,
}

#[derive(Debug, Clone)]
pub enum ToggleOutcome {
    Updated(Keyboard),
    Finished(ReportOutcome),
    NotInWindow,
    /// No live picker for this user (never started, cancelled or timed out).
    Expired,
}

#[derive(Debug, Clone)]
pub enum FinalizeOutcome {
    Finished(ReportOutcome),
    NothingSelected,
    Expired,
}

pub const DEFAULT_PICKER_TTL: Duration = Duration::from_secs(15 * 60);

fn day_start(now: NaiveDateTime) -> NaiveDateTime {
    now.date().and_time(NaiveTime::MIN)
}

pub struct CalorieService {
    db: Mutex<Database>,
    pickers: Mutex<SessionStore<DatePicker>>,
}

impl CalorieService {
    pub fn new(db_path: &Path, picker_ttl: Duration) -> Result<Self> {
        let db = Database::open(db_path)?;
        Ok(Self::with_database(db, picker_ttl))
    }

    pub fn new_in_memory(picker_ttl: Duration) -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self::with_database(db, picker_ttl))
    }

    fn with_database(db: Database, picker_ttl: Duration) -> Self {
        Self {
            db: Mutex::new(db),
            pickers: Mutex::new(SessionStore::new(picker_ttl)),
        }
    }

    fn db(&self) -> MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pickers(&self) -> MutexGuard<'_, SessionStore<DatePicker>> {
        self.pickers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // --- Users ---

    pub fn register_user(&self, user: &ChatUser) -> Result<i64> {
        self.db().upsert_user(user)
    }

    pub fn find_user(&self, external_id: i64) -> Result<Option<i64>> {
        self.db().find_user(external_id)
    }

    // --- Resolution pipeline ---

    /// Numeric input, then the user's own cache, then the shared cache, then
    /// the estimator. A successful estimate is written to the shared cache.
    ///
    /// Estimator failures and answers without a number become
    /// [`Resolution::Unresolved`]; only store failures are returned as errors.
    pub fn resolve(
        &self,
        user_id: i64,
        raw: &str,
        estimator: &dyn CalorieEstimator,
    ) -> Result<Resolution> {
        if is_numeric_input(raw) {
            return Ok(parse_calories(raw).map_or(Resolution::Unresolved, |calories| {
                Resolution::Resolved {
                    calories,
                    source: CalorieSource::Direct,
                }
            }));
        }

        let normalized = normalize_input(raw);
        {
            let db = self.db();
            if let Some(calories) = db.get_personal_calories(user_id, &normalized)? {
                return Ok(Resolution::Resolved {
                    calories,
                    source: CalorieSource::PersonalCache,
                });
            }
            if let Some(calories) = db.get_shared_calories(&normalized)? {
                return Ok(Resolution::Resolved {
                    calories,
                    source: CalorieSource::SharedCache,
                });
            }
        }

        // The store lock is not held across the network call.
        let answer = match estimator.estimate(raw.trim()) {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Calorie estimation failed for {normalized:?}: {e:#}");
                return Ok(Resolution::Unresolved);
            }
        };

        let Some(calories) = extract_calories(&answer) else {
            warn!("No number in estimation answer for {normalized:?}: {answer:?}");
            return Ok(Resolution::Unresolved);
        };
        self.db().upsert_shared_calories(&normalized, calories)?;
        debug!("Cached estimate {normalized:?} = {calories}");
        Ok(Resolution::Resolved {
            calories,
            source: CalorieSource::Estimated,
        })
    }

    /// Resolves and records one food report, gated by the daily quota.
    ///
    /// The quota is checked before resolution so a user at the limit never
    /// triggers an estimation call; the insert itself re-checks atomically.
    pub fn log_food(
        &self,
        user: &ChatUser,
        text: &str,
        now: NaiveDateTime,
        estimator: &dyn CalorieEstimator,
    ) -> Result<LogOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(LogOutcome::Rejected(
                "Send a food description or a calorie number.".to_string(),
            ));
        }
        if is_numeric_input(text) {
            if let Err(e) = parse_calories(text) {
                return Ok(LogOutcome::Rejected(e.to_string()));
            }
        }

        let since = day_start(now);
        let user_id = {
            let db = self.db();
            let user_id = db.upsert_user(user)?;
            if QuotaStatus::for_count(db.count_entries_since(user_id, since)?).is_denied() {
                return Ok(LogOutcome::QuotaExceeded);
            }
            user_id
        };

        let resolution = self.resolve(user_id, text, estimator)?;
        let new_entry = NewLedgerEntry {
            user_id,
            input: text.to_string(),
            calories: resolution.calories(),
            created_at: now,
        };
        self.record(&new_entry, since, resolution)
    }

    /// Logs a personal cache entry as eaten now.
    pub fn log_from_personal_cache(
        &self,
        user: &ChatUser,
        cache_id: i64,
        now: NaiveDateTime,
    ) -> Result<LogOutcome> {
        let (user_id, cached) = {
            let db = self.db();
            let user_id = db.upsert_user(user)?;
            (user_id, db.get_personal_cache_entry(user_id, cache_id)?)
        };
        let Some(cached) = cached else {
            return Ok(LogOutcome::Rejected(
                "That saved dish no longer exists.".to_string(),
            ));
        };

        let new_entry = NewLedgerEntry {
            user_id,
            input: cached.input,
            calories: Some(cached.calories),
            created_at: now,
        };
        let resolution = Resolution::Resolved {
            calories: cached.calories,
            source: CalorieSource::PersonalCache,
        };
        self.record(&new_entry, day_start(now), resolution)
    }

    fn record(
        &self,
        new_entry: &NewLedgerEntry,
        since: NaiveDateTime,
        resolution: Resolution,
    ) -> Result<LogOutcome> {
        let guarded = self
            .db()
            .insert_entry_within_limit(new_entry, since, DAILY_ENTRY_LIMIT)?;
        Ok(match guarded.entry {
            Some(entry) => LogOutcome::Logged {
                entry,
                resolution,
                quota: QuotaStatus::for_count(guarded.count_before),
            },
            None => LogOutcome::QuotaExceeded,
        })
    }

    // --- Ledger mutations ---

    /// Removes and returns the user's most recent entry; `None` when there is
    /// nothing to delete.
    pub fn delete_last(&self, external_id: i64) -> Result<Option<LedgerEntry>> {
        let db = self.db();
        match db.find_user(external_id)? {
            Some(user_id) => db.delete_last_entry(user_id),
            None => Ok(None),
        }
    }

    /// Deletes the user and everything they own. `false` when already gone.
    pub fn delete_all(&self, external_id: i64) -> Result<bool> {
        self.pickers().remove(external_id);
        self.db().delete_user_by_external_id(external_id)
    }

    // --- Personal cache ---

    pub fn add_personal_cache(
        &self,
        user: &ChatUser,
        input: &str,
        calories: i64,
    ) -> Result<CacheAddOutcome> {
        let input = input.trim();
        let db = self.db();
        let user_id = db.upsert_user(user)?;
        Ok(
            match db.insert_personal_cache(user_id, input, &normalize_input(input), calories)? {
                Some(entry) => CacheAddOutcome::Added(entry),
                None => CacheAddOutcome::Duplicate,
            },
        )
    }

    pub fn personal_cache_exists(&self, user: &ChatUser, input: &str) -> Result<bool> {
        let db = self.db();
        let user_id = db.upsert_user(user)?;
        Ok(db
            .get_personal_calories(user_id, &normalize_input(input))?
            .is_some())
    }

    pub fn list_personal_cache(&self, user: &ChatUser) -> Result<Vec<PersonalCacheEntry>> {
        let db = self.db();
        let user_id = db.upsert_user(user)?;
        db.list_personal_cache(user_id)
    }

    pub fn delete_personal_cache(&self, user: &ChatUser, cache_id: i64) -> Result<bool> {
        let db = self.db();
        let user_id = db.upsert_user(user)?;
        db.delete_personal_cache_entry(user_id, cache_id)
    }

    // --- Profiles ---

    pub fn save_profile(
        &self,
        user: &ChatUser,
        profile: &NewProfile,
        now: NaiveDateTime,
    ) -> Result<Profile> {
        let db = self.db();
        let user_id = db.upsert_user(user)?;
        db.insert_profile(user_id, profile, now)
    }

    pub fn current_profile(&self, user_id: i64) -> Result<Option<Profile>> {
        self.db().get_current_profile(user_id)
    }

    // --- Reports ---

    /// Opens a date picker for the user, replacing any previous one, and
    /// returns its keyboard.
    #[allow(clippy::cast_possible_wrap)]
    pub fn start_report(&self, user: &ChatUser, today: NaiveDate, at: Instant) -> Result<Keyboard> {
        let history = {
            let db = self.db();
            let user_id = db.upsert_user(user)?;
            db.get_distinct_entry_dates(user_id, WINDOW_MAX as i64)?
        };
        let picker = DatePicker::new(candidate_window(&history, today));
        let keyboard = picker.keyboard();

        let mut pickers = self.pickers();
        let swept = pickers.sweep(at);
        if swept > 0 {
            debug!("Evicted {swept} idle report sessions");
        }
        pickers.insert(user.external_id, picker, at);
        Ok(keyboard)
    }

    pub fn toggle_report_date(
        &self,
        user: &ChatUser,
        date: NaiveDate,
        at: Instant,
    ) -> Result<ToggleOutcome> {
        let dates = {
            let mut pickers = self.pickers();
            let Some(picker) = pickers.get_mut(user.external_id, at) else {
                return Ok(ToggleOutcome::Expired);
            };
            match picker.toggle(date) {
                PickerStep::Updated => return Ok(ToggleOutcome::Updated(picker.keyboard())),
                PickerStep::NotInWindow => return Ok(ToggleOutcome::NotInWindow),
                PickerStep::Finalized(dates) => {
                    pickers.remove(user.external_id);
                    dates
                }
            }
        };
        Ok(ToggleOutcome::Finished(self.assemble_report(user, &dates)?))
    }

    pub fn finalize_report(&self, user: &ChatUser, at: Instant) -> Result<FinalizeOutcome> {
        let dates = {
            let mut pickers = self.pickers();
            let Some(picker) = pickers.get_mut(user.external_id, at) else {
                return Ok(FinalizeOutcome::Expired);
            };
            let Some(dates) = picker.finalize() else {
                return Ok(FinalizeOutcome::NothingSelected);
            };
            pickers.remove(user.external_id);
            dates
        };
        Ok(FinalizeOutcome::Finished(self.assemble_report(user, &dates)?))
    }

    /// `true` when a picker was open.
    pub fn cancel_report(&self, external_id: i64) -> bool {
        self.pickers().remove(external_id).is_some()
    }

    /// Per-day ledger rows for `dates` (ascending) plus the user's baseline.
    pub fn assemble_report(&self, user: &ChatUser, dates: &[NaiveDate]) -> Result<ReportOutcome> {
        let db = self.db();
        let user_id = db.upsert_user(user)?;
        let Some(profile) = db.get_current_profile(user_id)? else {
            return Ok(ReportOutcome::ProfileMissing);
        };

        let mut dates = dates.to_vec();
        dates.sort_unstable();
        dates.dedup();
        let days = dates
            .into_iter()
            .map(|date| {
                Ok(DayReport {
                    date,
                    entries: db.get_entries_for_date(user_id, date)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ReportOutcome::Ready(Report {
            days,
            baseline_kcal: profile.baseline_kcal(),
        }))
    }

    pub fn daily_totals(&self, user_id: i64, since: NaiveDate) -> Result<Vec<DailyTotal>> {
        self.db().get_daily_totals(user_id, since)
    }
}
