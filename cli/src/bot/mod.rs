//! Conversation handlers: turn inbound chat events into replies.
//!
//! Handlers are synchronous; the store and the estimator block. Callers run
//! [`Bot::handle`] on a blocking thread, one event per user at a time.

mod cache;
mod ledger;
mod onboarding;
mod report;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::NaiveDateTime;
use tracing::{debug, error};

use calofit_core::chat::{CallbackAction, Inbound, Keyboard, Reply};
use calofit_core::models::ChatUser;
use calofit_core::picker::SessionStore;
use calofit_core::service::{CalorieEstimator, CalorieService};

use cache::AddCache;
use onboarding::{Answer, Onboarding};

pub const TECHNICAL_ERROR_TEXT: &str = "🔧 Technical error, please try again later.";

const BACK_LABEL: &str = "⬅️ Back";

const HELP_TEXT: &str = "<b>Just send me what you ate</b>, e.g. <i>2 boiled eggs</i>, \
or a number of calories, e.g. <i>250</i>.\n\n\
/start - fill in your profile (gender, age, height, weight)\n\
/report - entries and totals for chosen days\n\
/graph - calories over the last two weeks\n\
/del - delete the last entry\n\
/del_all - delete all your data\n\
/add_cache - save a dish with its calories\n\
/from_cache - log a saved dish\n\
/edit_cache - remove saved dishes\n\
/cancel - stop the current dialog";

const UNKNOWN_COMMAND_TEXT: &str = "Unknown command. See /help.";

const STALE_BUTTON_TEXT: &str = "This button is no longer active.";

const EXPIRED_DIALOG_TEXT: &str = "⌛ This dialog has expired. Send the command again.";

fn back_keyboard() -> Keyboard {
    Keyboard::Reply(vec![vec![BACK_LABEL.to_string()]])
}

/// Multi-message exchanges that capture the user's next text messages.
enum Dialog {
    Onboarding(Onboarding),
    AddCache(AddCache),
}

/// `"/report@calofit_bot extra"` → `"report"`.
fn parse_command(text: &str) -> Option<String> {
    let word = text.trim_start().strip_prefix('/')?.split_whitespace().next()?;
    let name = word.split('@').next().unwrap_or(word);
    Some(name.to_lowercase())
}

pub struct Bot {
    service: CalorieService,
    estimator: Arc<dyn CalorieEstimator>,
    dialogs: Mutex<SessionStore<Dialog>>,
}

impl Bot {
    pub fn new(
        service: CalorieService,
        estimator: Arc<dyn CalorieEstimator>,
        dialog_ttl: Duration,
    ) -> Self {
        Self {
            service,
            estimator,
            dialogs: Mutex::new(SessionStore::new(dialog_ttl)),
        }
    }

    /// Replies for one inbound event. Failures are logged and answered with a
    /// generic message; they never reach the caller.
    pub fn handle(&self, inbound: &Inbound, now: NaiveDateTime, at: Instant) -> Vec<Reply> {
        match self.route(inbound, now, at) {
            Ok(replies) => replies,
            Err(e) => {
                error!(
                    "Failed to handle update from {}: {e:#}",
                    inbound.user().external_id
                );
                vec![Reply::text(TECHNICAL_ERROR_TEXT)]
            }
        }
    }

    fn route(&self, inbound: &Inbound, now: NaiveDateTime, at: Instant) -> Result<Vec<Reply>> {
        match inbound {
            Inbound::Text { user, text } => match parse_command(text) {
                Some(command) => {
                    debug!("Command /{command} from {}", user.external_id);
                    self.command(user, &command, now, at)
                }
                None => self.text(user, text, now, at),
            },
            Inbound::Callback { user, data } => match CallbackAction::parse(data) {
                Some(action) => self.callback(user, action, now, at),
                None => Ok(vec![Reply::toast(STALE_BUTTON_TEXT)]),
            },
        }
    }

    fn dialogs(&self) -> MutexGuard<'_, SessionStore<Dialog>> {
        self.dialogs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Removes and returns the user's live dialog, dropping an expired one.
    fn take_dialog(&self, external_id: i64, at: Instant) -> Option<Dialog> {
        let mut dialogs = self.dialogs();
        dialogs.get_mut(external_id, at)?;
        dialogs.remove(external_id)
    }

    fn keep_dialog(&self, external_id: i64, dialog: Dialog, at: Instant) {
        let mut dialogs = self.dialogs();
        dialogs.sweep(at);
        dialogs.insert(external_id, dialog, at);
    }

    /// Every command ends whatever dialog was open.
    fn command(
        &self,
        user: &ChatUser,
        command: &str,
        now: NaiveDateTime,
        at: Instant,
    ) -> Result<Vec<Reply>> {
        let previous = self.take_dialog(user.external_id, at);
        match command {
            "start" => {
                self.service.register_user(user)?;
                let dialog = Dialog::Onboarding(Onboarding::new());
                self.keep_dialog(user.external_id, dialog, at);
                Ok(vec![Onboarding::greeting(user.first_name.as_deref())])
            }
            "help" => Ok(vec![Reply::html(HELP_TEXT)]),
            "cancel" => {
                let had_report = self.service.cancel_report(user.external_id);
                let text = if previous.is_some() || had_report {
                    "🚫 Cancelled."
                } else {
                    "Nothing to cancel."
                };
                Ok(vec![Reply::text(text).with_keyboard(Keyboard::Remove)])
            }
            "report" => report::start(&self.service, user, now.date(), at),
            "graph" => report::graph(&self.service, user, now.date()),
            "del" => ledger::delete_last(&self.service, user),
            "del_all" => Ok(vec![ledger::confirm_delete_all()]),
            "add_cache" => {
                self.keep_dialog(user.external_id, Dialog::AddCache(AddCache::new()), at);
                Ok(vec![AddCache::prompt()])
            }
            "from_cache" => cache::log_list(&self.service, user),
            "edit_cache" => cache::edit_list(&self.service, user),
            _ => Ok(vec![Reply::text(UNKNOWN_COMMAND_TEXT)]),
        }
    }

    fn text(
        &self,
        user: &ChatUser,
        text: &str,
        now: NaiveDateTime,
        at: Instant,
    ) -> Result<Vec<Reply>> {
        match self.take_dialog(user.external_id, at) {
            Some(Dialog::Onboarding(mut dialog)) => match dialog.answer(text) {
                Answer::Ask(reply) => {
                    self.keep_dialog(user.external_id, Dialog::Onboarding(dialog), at);
                    Ok(vec![reply])
                }
                Answer::Cancelled(reply) => Ok(vec![reply]),
                Answer::Complete(profile) => {
                    let saved = self.service.save_profile(user, &profile, now)?;
                    Ok(vec![
                        Reply::text(format!(
                            "✅ Profile saved. Your daily norm is about {:.0} kcal.\n\
                             Now just send me what you eat.",
                            saved.baseline_kcal()
                        ))
                        .with_keyboard(Keyboard::Remove),
                    ])
                }
            },
            Some(Dialog::AddCache(mut dialog)) => {
                let step = dialog.answer(&self.service, user, text)?;
                if step.keeps_dialog() {
                    self.keep_dialog(user.external_id, Dialog::AddCache(dialog), at);
                }
                Ok(vec![step.into_reply()])
            }
            // A keyboard left over from a dialog that timed out.
            None if onboarding::is_button_label(text) => {
                Ok(vec![Reply::text(EXPIRED_DIALOG_TEXT).with_keyboard(Keyboard::Remove)])
            }
            None => ledger::log_food(&self.service, user, text, now, self.estimator.as_ref()),
        }
    }

    fn callback(
        &self,
        user: &ChatUser,
        action: CallbackAction,
        now: NaiveDateTime,
        at: Instant,
    ) -> Result<Vec<Reply>> {
        match action {
            CallbackAction::PickDate(date) => report::toggle(&self.service, user, date, at),
            CallbackAction::ShowReport => report::finalize(&self.service, user, at),
            CallbackAction::CancelReport => Ok(report::cancel(&self.service, user)),
            CallbackAction::ConfirmDeleteAll => {
                self.dialogs().remove(user.external_id);
                ledger::delete_all(&self.service, user)
            }
            CallbackAction::CancelDeleteAll => Ok(vec![ledger::delete_all_cancelled()]),
            CallbackAction::LogCached(id) => cache::log_cached(&self.service, user, id, now),
            CallbackAction::DeleteCached(id) => cache::delete_cached(&self.service, user, id),
            CallbackAction::CloseCacheList => Ok(vec![cache::closed()]),
        }
    }
}
