use anyhow::Result;
use chrono::NaiveDateTime;

use calofit_core::chat::{Button, CallbackAction, Keyboard, Reply};
use calofit_core::models::{ChatUser, PersonalCacheEntry, parse_calories};
use calofit_core::service::{CacheAddOutcome, CalorieService};

use super::ledger::outcome_replies;
use super::{BACK_LABEL, back_keyboard};

/// Longer button labels are cut with an ellipsis.
const LABEL_LIMIT: usize = 64;

const EMPTY_TEXT: &str = "ℹ️ You have no saved dishes yet. Add one with /add_cache.";
const DUPLICATE_TEXT: &str = "⚠️ A dish with this name already exists.";
const LOG_LIST_TEXT: &str = "📋 Pick a saved dish to log it:";
const EDIT_LIST_TEXT: &str = "✏️ Press a dish to delete it:";

/// `/add_cache`: a dish name, then its calories.
#[derive(Debug, Default)]
pub(super) struct AddCache {
    name: Option<String>,
}

pub(super) enum Step {
    Continue(Reply),
    Done(Reply),
}

impl Step {
    pub(super) fn keeps_dialog(&self) -> bool {
        matches!(self, Self::Continue(_))
    }

    pub(super) fn into_reply(self) -> Reply {
        match self {
            Self::Continue(reply) | Self::Done(reply) => reply,
        }
    }
}

fn done(text: &str) -> Step {
    Step::Done(Reply::text(text).with_keyboard(Keyboard::Remove))
}

impl AddCache {
    pub(super) fn new() -> Self {
        Self::default()
    }

    pub(super) fn prompt() -> Reply {
        Reply::text("✏️ Enter the dish name:").with_keyboard(back_keyboard())
    }

    pub(super) fn answer(
        &mut self,
        service: &CalorieService,
        user: &ChatUser,
        text: &str,
    ) -> Result<Step> {
        let text = text.trim();
        let Some(name) = self.name.take() else {
            if text == BACK_LABEL {
                return Ok(done("🚫 Cancelled."));
            }
            if text.is_empty() {
                return Ok(Step::Continue(Self::prompt()));
            }
            if service.personal_cache_exists(user, text)? {
                return Ok(done(DUPLICATE_TEXT));
            }
            self.name = Some(text.to_string());
            return Ok(Step::Continue(
                Reply::text("🔥 Now the calories per serving:").with_keyboard(back_keyboard()),
            ));
        };

        if text == BACK_LABEL {
            return Ok(Step::Continue(Self::prompt()));
        }
        let calories = match parse_calories(text) {
            Ok(calories) => calories,
            Err(e) => {
                self.name = Some(name);
                return Ok(Step::Continue(
                    Reply::text(format!("⚠️ {e}")).with_keyboard(back_keyboard()),
                ));
            }
        };
        Ok(match service.add_personal_cache(user, &name, calories)? {
            CacheAddOutcome::Added(entry) => done(&format!(
                "✅ Saved: {} | 🔥 {} kcal",
                entry.input, entry.calories
            )),
            CacheAddOutcome::Duplicate => done(DUPLICATE_TEXT),
        })
    }
}

fn label(prefix: &str, entry: &PersonalCacheEntry) -> String {
    let label = format!("{prefix}{} ({} kcal)", entry.input, entry.calories);
    if label.chars().count() <= LABEL_LIMIT {
        return label;
    }
    let mut short: String = label.chars().take(LABEL_LIMIT - 1).collect();
    short.push('…');
    short
}

fn list_keyboard(
    entries: &[PersonalCacheEntry],
    prefix: &str,
    action: fn(i64) -> CallbackAction,
) -> Keyboard {
    let mut rows: Vec<Vec<Button>> = entries
        .iter()
        .map(|entry| vec![Button::new(label(prefix, entry), &action(entry.id))])
        .collect();
    rows.push(vec![Button::new(BACK_LABEL, &CallbackAction::CloseCacheList)]);
    Keyboard::Inline(rows)
}

/// `/from_cache`
pub(super) fn log_list(service: &CalorieService, user: &ChatUser) -> Result<Vec<Reply>> {
    let entries = service.list_personal_cache(user)?;
    if entries.is_empty() {
        return Ok(vec![Reply::text(EMPTY_TEXT)]);
    }
    Ok(vec![Reply::text(LOG_LIST_TEXT).with_keyboard(list_keyboard(
        &entries,
        "",
        CallbackAction::LogCached,
    ))])
}

/// `/edit_cache`
pub(super) fn edit_list(service: &CalorieService, user: &ChatUser) -> Result<Vec<Reply>> {
    let entries = service.list_personal_cache(user)?;
    if entries.is_empty() {
        return Ok(vec![Reply::text(EMPTY_TEXT)]);
    }
    Ok(vec![Reply::text(EDIT_LIST_TEXT).with_keyboard(list_keyboard(
        &entries,
        "❌ ",
        CallbackAction::DeleteCached,
    ))])
}

pub(super) fn log_cached(
    service: &CalorieService,
    user: &ChatUser,
    cache_id: i64,
    now: NaiveDateTime,
) -> Result<Vec<Reply>> {
    Ok(outcome_replies(
        &service.log_from_personal_cache(user, cache_id, now)?,
    ))
}

/// Deletes one entry and redraws the list in place.
pub(super) fn delete_cached(
    service: &CalorieService,
    user: &ChatUser,
    cache_id: i64,
) -> Result<Vec<Reply>> {
    let deleted = service.delete_personal_cache(user, cache_id)?;
    let toast = Reply::toast(if deleted {
        "🗑 Deleted."
    } else {
        "Already deleted."
    });

    let entries = service.list_personal_cache(user)?;
    let list = if entries.is_empty() {
        Reply::text(EMPTY_TEXT).edit()
    } else {
        Reply::text(EDIT_LIST_TEXT)
            .with_keyboard(list_keyboard(&entries, "❌ ", CallbackAction::DeleteCached))
            .edit()
    };
    Ok(vec![toast, list])
}

pub(super) fn closed() -> Reply {
    Reply::text("⬅️ Closed.").edit()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(input: &str) -> PersonalCacheEntry {
        PersonalCacheEntry {
            id: 7,
            user_id: 1,
            input: input.to_string(),
            calories: 250,
        }
    }

    #[test]
    fn test_label_truncates_long_names() {
        assert_eq!(label("", &entry("soup")), "soup (250 kcal)");
        let long = label("❌ ", &entry(&"x".repeat(100)));
        assert_eq!(long.chars().count(), LABEL_LIMIT);
        assert!(long.starts_with("❌ xxx"));
        assert!(long.ends_with('…'));
    }

    #[test]
    fn test_list_keyboard_ends_with_back() {
        let Keyboard::Inline(rows) =
            list_keyboard(&[entry("soup")], "", CallbackAction::LogCached)
        else {
            panic!("expected inline keyboard");
        };
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0].data, "cache_log:7");
        assert_eq!(rows[1][0].data, "cache:back");
    }

    #[test]
    fn test_back_on_calories_returns_to_name() {
        let service = CalorieService::new_in_memory(std::time::Duration::from_secs(60)).unwrap();
        let user = ChatUser::new(1);
        let mut dialog = AddCache::new();
        assert!(dialog.answer(&service, &user, "soup").unwrap().keeps_dialog());
        let step = dialog.answer(&service, &user, BACK_LABEL).unwrap();
        assert!(step.keeps_dialog());
        assert_eq!(step.into_reply().text, AddCache::prompt().text);
        dialog.answer(&service, &user, "borscht").unwrap();
        let step = dialog.answer(&service, &user, "0").unwrap();
        assert!(!step.keeps_dialog());
        assert_eq!(step.into_reply().text, "✅ Saved: borscht | 🔥 0 kcal");
    }
}
