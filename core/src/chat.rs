//! Transport-neutral conversation types: what arrives from a chat platform and
//! what the handlers send back.

use chrono::NaiveDate;

use crate::models::{ChatUser, DATE_FORMAT};

#[derive(Debug, Clone)]
pub enum Inbound {
    Text { user: ChatUser, text: String },
    Callback { user: ChatUser, data: String },
}

impl Inbound {
    #[must_use]
    pub fn user(&self) -> &ChatUser {
        match self {
            Self::Text { user, .. } | Self::Callback { user, .. } => user,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub data: String,
}

impl Button {
    pub fn new(label: impl Into<String>, action: &CallbackAction) -> Self {
        Self {
            label: label.into(),
            data: action.encode(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keyboard {
    /// Buttons attached to the message; presses arrive as callbacks.
    Inline(Vec<Vec<Button>>),
    /// Suggested answers shown in place of the text keyboard.
    Reply(Vec<Vec<String>>),
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// A new message in the chat.
    Send,
    /// Replace the message whose button was pressed.
    Edit,
    /// Short popup acknowledging a button press.
    Toast,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub keyboard: Option<Keyboard>,
    pub html: bool,
    pub delivery: Delivery,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
            html: false,
            delivery: Delivery::Send,
        }
    }

    pub fn html(text: impl Into<String>) -> Self {
        Self {
            html: true,
            ..Self::text(text)
        }
    }

    pub fn toast(text: impl Into<String>) -> Self {
        Self {
            delivery: Delivery::Toast,
            ..Self::text(text)
        }
    }

    #[must_use]
    pub fn edit(mut self) -> Self {
        self.delivery = Delivery::Edit;
        self
    }

    #[must_use]
    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}

/// Button payloads. Encoded forms stay well under the 64-byte callback limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    PickDate(NaiveDate),
    ShowReport,
    CancelReport,
    ConfirmDeleteAll,
    CancelDeleteAll,
    LogCached(i64),
    DeleteCached(i64),
    CloseCacheList,
}

impl CallbackAction {
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::PickDate(date) => format!("pick:{}", date.format(DATE_FORMAT)),
            Self::ShowReport => "pick:show".to_string(),
            Self::CancelReport => "pick:cancel".to_string(),
            Self::ConfirmDeleteAll => "del_all:yes".to_string(),
            Self::CancelDeleteAll => "del_all:no".to_string(),
            Self::LogCached(id) => format!("cache_log:{id}"),
            Self::DeleteCached(id) => format!("cache_del:{id}"),
            Self::CloseCacheList => "cache:back".to_string(),
        }
    }

    #[must_use]
    pub fn parse(data: &str) -> Option<Self> {
        let (kind, arg) = data.split_once(':')?;
        match (kind, arg) {
            ("pick", "show") => Some(Self::ShowReport),
            ("pick", "cancel") => Some(Self::CancelReport),
            ("pick", date) => NaiveDate::parse_from_str(date, DATE_FORMAT)
                .ok()
                .map(Self::PickDate),
            ("del_all", "yes") => Some(Self::ConfirmDeleteAll),
            ("del_all", "no") => Some(Self::CancelDeleteAll),
            ("cache_log", id) => id.parse().ok().map(Self::LogCached),
            ("cache_del", id) => id.parse().ok().map(Self::DeleteCached),
            ("cache", "back") => Some(Self::CloseCacheList),
            _ => None,
        }
    }
}
