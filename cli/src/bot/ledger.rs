use anyhow::Result;
use chrono::NaiveDateTime;

use calofit_core::chat::{Button, CallbackAction, Keyboard, Reply};
use calofit_core::models::ChatUser;
use calofit_core::quota::QUOTA_EXCEEDED_TEXT;
use calofit_core::report::format_calories;
use calofit_core::service::{
    CalorieEstimator, CalorieService, CalorieSource, LogOutcome, Resolution,
};

pub(super) fn log_food(
    service: &CalorieService,
    user: &ChatUser,
    text: &str,
    now: NaiveDateTime,
    estimator: &dyn CalorieEstimator,
) -> Result<Vec<Reply>> {
    Ok(outcome_replies(&service.log_food(user, text, now, estimator)?))
}

/// Confirmation for a log attempt, followed by the quota warning if any.
pub(super) fn outcome_replies(outcome: &LogOutcome) -> Vec<Reply> {
    match outcome {
        LogOutcome::Logged {
            entry,
            resolution,
            quota,
        } => {
            let text = match resolution {
                Resolution::Resolved {
                    calories,
                    source: CalorieSource::Direct,
                } => format!("✅ Logged: 🔥 {calories} kcal"),
                Resolution::Resolved { calories, source } => {
                    let note = match source {
                        CalorieSource::PersonalCache => " (saved dish)",
                        _ => " (estimated)",
                    };
                    format!("✅ Logged: {} | 🔥 {calories} kcal{note}", entry.input)
                }
                Resolution::Unresolved => format!(
                    "✅ Logged: {}\n❓ Couldn't estimate the calories; reports will show ?.",
                    entry.input
                ),
            };
            let mut replies = vec![Reply::text(text)];
            if let Some(warning) = quota.warning_text() {
                replies.push(Reply::text(warning));
            }
            replies
        }
        LogOutcome::QuotaExceeded => vec![Reply::text(QUOTA_EXCEEDED_TEXT)],
        LogOutcome::Rejected(reason) => vec![Reply::text(format!("⚠️ {reason}"))],
    }
}

pub(super) fn delete_last(service: &CalorieService, user: &ChatUser) -> Result<Vec<Reply>> {
    let text = match service.delete_last(user.external_id)? {
        Some(entry) => format!(
            "🗑 Deleted: {} | {} | 🔥 {} kcal",
            entry.created_at.format("%d.%m %H:%M"),
            entry.input,
            format_calories(entry.calories)
        ),
        None => "ℹ️ Nothing to delete.".to_string(),
    };
    Ok(vec![Reply::text(text)])
}

pub(super) fn confirm_delete_all() -> Reply {
    Reply::text(
        "⚠️ This permanently deletes your profile, saved dishes and all entries. Are you sure?",
    )
    .with_keyboard(Keyboard::Inline(vec![vec![
        Button::new("✅ Yes, delete", &CallbackAction::ConfirmDeleteAll),
        Button::new("❌ No", &CallbackAction::CancelDeleteAll),
    ]]))
}

pub(super) fn delete_all(service: &CalorieService, user: &ChatUser) -> Result<Vec<Reply>> {
    let text = if service.delete_all(user.external_id)? {
        "🗑 All your data has been deleted. Send /start to begin again."
    } else {
        "ℹ️ There was nothing to delete."
    };
    Ok(vec![Reply::text(text).edit()])
}

pub(super) fn delete_all_cancelled() -> Reply {
    Reply::text("👌 Deletion cancelled, your data is kept.").edit()
}
