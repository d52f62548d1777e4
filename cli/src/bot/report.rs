use std::time::Instant;

use anyhow::Result;
use chrono::{NaiveDate, TimeDelta};

use calofit_core::chat::Reply;
use calofit_core::models::ChatUser;
use calofit_core::report::{PROFILE_MISSING_TEXT, ReportOutcome, render_chart, render_report};
use calofit_core::service::{CalorieService, FinalizeOutcome, ToggleOutcome};

/// Days covered by `/graph`, today included.
pub(super) const CHART_DAYS: i64 = 14;

const PICK_PROMPT: &str = "📆 Pick up to 4 dates, then press \"Show report\":";
const EXPIRED_TEXT: &str = "⌛ This date picker has expired. Send /report to start again.";

pub(super) fn start(
    service: &CalorieService,
    user: &ChatUser,
    today: NaiveDate,
    at: Instant,
) -> Result<Vec<Reply>> {
    let keyboard = service.start_report(user, today, at)?;
    Ok(vec![Reply::text(PICK_PROMPT).with_keyboard(keyboard)])
}

pub(super) fn toggle(
    service: &CalorieService,
    user: &ChatUser,
    date: NaiveDate,
    at: Instant,
) -> Result<Vec<Reply>> {
    Ok(match service.toggle_report_date(user, date, at)? {
        ToggleOutcome::Updated(keyboard) => {
            vec![Reply::text(PICK_PROMPT).with_keyboard(keyboard).edit()]
        }
        ToggleOutcome::Finished(outcome) => finished(&outcome),
        ToggleOutcome::NotInWindow => vec![Reply::toast("That date is not on the list.")],
        ToggleOutcome::Expired => vec![Reply::text(EXPIRED_TEXT).edit()],
    })
}

pub(super) fn finalize(service: &CalorieService, user: &ChatUser, at: Instant) -> Result<Vec<Reply>> {
    Ok(match service.finalize_report(user, at)? {
        FinalizeOutcome::Finished(outcome) => finished(&outcome),
        FinalizeOutcome::NothingSelected => vec![Reply::toast("Select at least one date.")],
        FinalizeOutcome::Expired => vec![Reply::text(EXPIRED_TEXT).edit()],
    })
}

pub(super) fn cancel(service: &CalorieService, user: &ChatUser) -> Vec<Reply> {
    service.cancel_report(user.external_id);
    vec![Reply::text("🚫 Report cancelled.").edit()]
}

/// The picker message is replaced by a caption; the report follows as a new
/// message so it can be split if long.
fn finished(outcome: &ReportOutcome) -> Vec<Reply> {
    match outcome {
        ReportOutcome::Ready(report) => vec![
            Reply::text(format!("📊 Report for {} day(s):", report.days.len())).edit(),
            Reply::html(render_report(report)),
        ],
        ReportOutcome::ProfileMissing => vec![Reply::text(PROFILE_MISSING_TEXT).edit()],
    }
}

/// `/graph`
pub(super) fn graph(service: &CalorieService, user: &ChatUser, today: NaiveDate) -> Result<Vec<Reply>> {
    let user_id = service.register_user(user)?;
    let from = today - TimeDelta::days(CHART_DAYS - 1);
    let totals = service.daily_totals(user_id, from)?;
    if totals.is_empty() {
        return Ok(vec![Reply::text(format!(
            "📉 No entries in the last {CHART_DAYS} days yet."
        ))]);
    }
    let baseline = service
        .current_profile(user_id)?
        .map(|profile| profile.baseline_kcal());
    Ok(vec![Reply::html(render_chart(&totals, from, today, baseline))])
}
