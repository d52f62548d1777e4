use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use chrono::NaiveDate;

use crate::chat::{Button, CallbackAction, Keyboard};

/// Dates offered are a multiple of this, also the row width of the keyboard.
pub const WINDOW_STEP: usize = 4;
pub const WINDOW_MAX: usize = 16;
/// Reaching this many selected dates finalizes the picker immediately.
pub const AUTO_FINALIZE_AT: usize = 4;

pub const SHOW_REPORT_LABEL: &str = "📥 Show report";
pub const CANCEL_LABEL: &str = "❌ Cancel";

/// Candidate dates for a report, most recent first.
///
/// Starts from the user's distinct ledger dates (`history` is most recent
/// first), seeds `today` when there is no history, then pads with the days
/// before the oldest candidate until the length is a multiple of
/// [`WINDOW_STEP`]. Never longer than [`WINDOW_MAX`].
#[must_use]
pub fn candidate_window(history: &[NaiveDate], today: NaiveDate) -> Vec<NaiveDate> {
    let mut dates: Vec<NaiveDate> = Vec::with_capacity(WINDOW_MAX);
    for date in history {
        if dates.len() == WINDOW_MAX {
            break;
        }
        if !dates.contains(date) {
            dates.push(*date);
        }
    }
    dates.sort_unstable_by(|a, b| b.cmp(a));
    if dates.is_empty() {
        dates.push(today);
    }

    let mut cursor = dates.last().copied().unwrap_or(today);
    while dates.len() % WINDOW_STEP != 0 {
        match cursor.pred_opt() {
            Some(prev) => {
                dates.push(prev);
                cursor = prev;
            }
            None => break,
        }
    }
    dates
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickerStep {
    /// Selection changed; re-render the keyboard.
    Updated,
    /// Selection reached [`AUTO_FINALIZE_AT`]; dates ascending.
    Finalized(Vec<NaiveDate>),
    /// The date is not one of the offered candidates.
    NotInWindow,
}

#[derive(Debug, Clone)]
pub struct DatePicker {
    candidates: Vec<NaiveDate>,
    selected: BTreeSet<NaiveDate>,
}

impl DatePicker {
    #[must_use]
    pub fn new(candidates: Vec<NaiveDate>) -> Self {
        Self {
            candidates,
            selected: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn selected(&self) -> &BTreeSet<NaiveDate> {
        &self.selected
    }

    pub fn toggle(&mut self, date: NaiveDate) -> PickerStep {
        if !self.candidates.contains(&date) {
            return PickerStep::NotInWindow;
        }
        if !self.selected.remove(&date) {
            self.selected.insert(date);
        }
        if self.selected.len() == AUTO_FINALIZE_AT {
            PickerStep::Finalized(self.selected.iter().copied().collect())
        } else {
            PickerStep::Updated
        }
    }

    /// Selected dates ascending, or `None` while nothing is selected.
    #[must_use]
    pub fn finalize(&self) -> Option<Vec<NaiveDate>> {
        if self.selected.is_empty() {
            None
        } else {
            Some(self.selected.iter().copied().collect())
        }
    }

    #[must_use]
    pub fn keyboard(&self) -> Keyboard {
        let mut rows: Vec<Vec<Button>> = self
            .candidates
            .chunks(WINDOW_STEP)
            .map(|chunk| {
                chunk
                    .iter()
                    .map(|date| {
                        let mark = if self.selected.contains(date) { "✅ " } else { "" };
                        Button::new(
                            format!("{mark}{}", date.format("%d.%m")),
                            &CallbackAction::PickDate(*date),
                        )
                    })
                    .collect()
            })
            .collect();
        rows.push(vec![
            Button::new(SHOW_REPORT_LABEL, &CallbackAction::ShowReport),
            Button::new(CANCEL_LABEL, &CallbackAction::CancelReport),
        ]);
        Keyboard::Inline(rows)
    }
}

/// Per-user in-memory sessions that expire after a period of inactivity.
pub struct SessionStore<T> {
    sessions: HashMap<i64, (T, Instant)>,
    ttl: Duration,
}

impl<T> SessionStore<T> {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            ttl,
        }
    }

    /// Replaces any existing session for `key`.
    pub fn insert(&mut self, key: i64, value: T, now: Instant) {
        self.sessions.insert(key, (value, now));
    }

    /// Live session for `key`, refreshing its activity time. An expired
    /// session is dropped and reported as absent.
    pub fn get_mut(&mut self, key: i64, now: Instant) -> Option<&mut T> {
        let expired = match self.sessions.get(&key) {
            Some((_, touched)) => now.saturating_duration_since(*touched) >= self.ttl,
            None => return None,
        };
        if expired {
            self.sessions.remove(&key);
            return None;
        }
        let (value, touched) = self.sessions.get_mut(&key)?;
        *touched = now;
        Some(value)
    }

    pub fn remove(&mut self, key: i64) -> Option<T> {
        self.sessions.remove(&key).map(|(value, _)| value)
    }

    /// Drops every expired session and returns how many were removed.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.sessions.len();
        let ttl = self.ttl;
        self.sessions
            .retain(|_, (_, touched)| now.saturating_duration_since(*touched) < ttl);
        before - self.sessions.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
