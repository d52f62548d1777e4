use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use calofit_core::chat::{Delivery, Inbound, Keyboard, Reply};
use calofit_core::models::ChatUser;

/// Maximum message length accepted by the Bot API, in UTF-16 code units.
pub const MESSAGE_LIMIT: usize = 4096;

// --- Incoming ---

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub message: Option<Message>,
    pub data: Option<String>,
}

impl From<&User> for ChatUser {
    fn from(user: &User) -> Self {
        Self {
            external_id: user.id,
            username: user.username.clone(),
            first_name: Some(user.first_name.clone()),
            last_name: user.last_name.clone(),
        }
    }
}

/// Where replies to an update go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub chat_id: i64,
    /// Message carrying the pressed button, for edits.
    pub message_id: Option<i64>,
    pub callback_id: Option<String>,
}

impl Update {
    /// The user-facing event in this update, if it is one the bot handles.
    #[must_use]
    pub fn into_inbound(self) -> Option<(Inbound, Origin)> {
        if let Some(query) = self.callback_query {
            if query.from.is_bot {
                return None;
            }
            let chat_id = query
                .message
                .as_ref()
                .map_or(query.from.id, |m| m.chat.id);
            let origin = Origin {
                chat_id,
                message_id: query.message.as_ref().map(|m| m.message_id),
                callback_id: Some(query.id),
            };
            let inbound = Inbound::Callback {
                user: ChatUser::from(&query.from),
                data: query.data.unwrap_or_default(),
            };
            return Some((inbound, origin));
        }

        let message = self.message?;
        let from = message.from.as_ref().filter(|u| !u.is_bot)?;
        let text = message.text.clone()?;
        let origin = Origin {
            chat_id: message.chat.id,
            message_id: None,
            callback_id: None,
        };
        Some((
            Inbound::Text {
                user: ChatUser::from(from),
                text,
            },
            origin,
        ))
    }
}

// --- Outgoing ---

#[derive(Debug, Serialize)]
struct InlineButton {
    text: String,
    callback_data: String,
}

#[derive(Debug, Serialize)]
struct KeyboardButton {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ReplyMarkup {
    Inline {
        inline_keyboard: Vec<Vec<InlineButton>>,
    },
    Keyboard {
        keyboard: Vec<Vec<KeyboardButton>>,
        resize_keyboard: bool,
    },
    Remove {
        remove_keyboard: bool,
    },
}

impl From<&Keyboard> for ReplyMarkup {
    fn from(keyboard: &Keyboard) -> Self {
        match keyboard {
            Keyboard::Inline(rows) => Self::Inline {
                inline_keyboard: rows
                    .iter()
                    .map(|row| {
                        row.iter()
                            .map(|b| InlineButton {
                                text: b.label.clone(),
                                callback_data: b.data.clone(),
                            })
                            .collect()
                    })
                    .collect(),
            },
            Keyboard::Reply(rows) => Self::Keyboard {
                keyboard: rows
                    .iter()
                    .map(|row| {
                        row.iter()
                            .map(|label| KeyboardButton {
                                text: label.clone(),
                            })
                            .collect()
                    })
                    .collect(),
                resize_keyboard: true,
            },
            Keyboard::Remove => Self::Remove {
                remove_keyboard: true,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<ReplyMarkup>,
}

#[derive(Debug, Serialize)]
struct EditMessageText<'a> {
    chat_id: i64,
    message_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<ReplyMarkup>,
}

#[derive(Debug, Serialize)]
struct AnswerCallbackQuery<'a> {
    callback_query_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct GetUpdates {
    offset: i64,
    timeout: u64,
    allowed_updates: [&'static str; 2],
}

#[derive(Debug, Serialize)]
struct SetWebhook<'a> {
    url: &'a str,
    secret_token: &'a str,
    allowed_updates: [&'static str; 2],
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

const ALLOWED_UPDATES: [&str; 2] = ["message", "callback_query"];

fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Splits text into chunks of at most `limit` UTF-16 units, breaking on line
/// boundaries where possible.
#[must_use]
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    if utf16_len(text) <= limit {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split('\n') {
        let line_len = utf16_len(line);
        let sep = usize::from(!current.is_empty());
        if current_len + sep + line_len <= limit {
            if sep == 1 {
                current.push('\n');
            }
            current.push_str(line);
            current_len += sep + line_len;
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len <= limit {
            current.push_str(line);
            current_len = line_len;
            continue;
        }

        // A single line over the limit is cut by characters.
        for c in line.chars() {
            let c_len = c.len_utf16();
            if current_len + c_len > limit {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            current.push(c);
            current_len += c_len;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

pub struct TelegramClient {
    client: reqwest::Client,
    base_url: String,
}

impl TelegramClient {
    pub fn new(api_url: &str, token: &str, poll_timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("calofit/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(poll_timeout_secs + 15))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: format!("{api_url}/bot{token}"),
        })
    }

    async fn call<P: Serialize, R: DeserializeOwned>(&self, method: &str, payload: &P) -> Result<R> {
        let resp = self
            .client
            .post(format!("{}/{method}", self.base_url))
            .json(payload)
            .send()
            .await
            .with_context(|| format!("Failed to reach Telegram ({method})"))?;

        let data: ApiResponse<R> = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse Telegram {method} response"))?;

        if !data.ok {
            bail!(
                "Telegram {method} failed: {}",
                data.description.unwrap_or_else(|| "unknown error".to_string())
            );
        }
        data.result
            .with_context(|| format!("Telegram {method} returned no result"))
    }

    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        self.call(
            "getUpdates",
            &GetUpdates {
                offset,
                timeout: timeout_secs,
                allowed_updates: ALLOWED_UPDATES,
            },
        )
        .await
    }

    pub async fn set_webhook(&self, url: &str, secret: &str) -> Result<()> {
        let _: bool = self
            .call(
                "setWebhook",
                &SetWebhook {
                    url,
                    secret_token: secret,
                    allowed_updates: ALLOWED_UPDATES,
                },
            )
            .await?;
        Ok(())
    }

    pub async fn delete_webhook(&self) -> Result<()> {
        let _: bool = self
            .call("deleteWebhook", &serde_json::json!({}))
            .await?;
        Ok(())
    }

    pub async fn send_message(&self, chat_id: i64, reply: &Reply) -> Result<()> {
        let chunks = split_message(&reply.text, MESSAGE_LIMIT);
        let last = chunks.len().saturating_sub(1);
        for (i, chunk) in chunks.iter().enumerate() {
            let _: serde_json::Value = self
                .call(
                    "sendMessage",
                    &SendMessage {
                        chat_id,
                        text: chunk,
                        parse_mode: reply.html.then_some("HTML"),
                        reply_markup: if i == last {
                            reply.keyboard.as_ref().map(ReplyMarkup::from)
                        } else {
                            None
                        },
                    },
                )
                .await?;
        }
        Ok(())
    }

    pub async fn edit_message(&self, chat_id: i64, message_id: i64, reply: &Reply) -> Result<()> {
        let _: serde_json::Value = self
            .call(
                "editMessageText",
                &EditMessageText {
                    chat_id,
                    message_id,
                    text: &reply.text,
                    parse_mode: reply.html.then_some("HTML"),
                    reply_markup: reply.keyboard.as_ref().map(ReplyMarkup::from),
                },
            )
            .await?;
        Ok(())
    }

    pub async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        let _: bool = self
            .call(
                "answerCallbackQuery",
                &AnswerCallbackQuery {
                    callback_query_id: callback_id,
                    text,
                },
            )
            .await?;
        Ok(())
    }

    /// Sends handler replies for one update. Button presses are always
    /// acknowledged, with the first toast if there is one.
    pub async fn deliver(&self, origin: &Origin, replies: &[Reply]) -> Result<()> {
        let mut acknowledged = false;
        for reply in replies {
            match reply.delivery {
                Delivery::Toast => {
                    if let Some(id) = origin.callback_id.as_deref().filter(|_| !acknowledged) {
                        self.answer_callback(id, Some(&reply.text)).await?;
                        acknowledged = true;
                    } else if origin.callback_id.is_none() {
                        self.send_message(origin.chat_id, reply).await?;
                    }
                }
                Delivery::Edit => match origin.message_id {
                    Some(message_id) if can_edit(reply) => {
                        self.edit_message(origin.chat_id, message_id, reply).await?;
                    }
                    _ => self.send_message(origin.chat_id, reply).await?,
                },
                Delivery::Send => self.send_message(origin.chat_id, reply).await?,
            }
        }
        if let Some(id) = origin.callback_id.as_deref().filter(|_| !acknowledged) {
            self.answer_callback(id, None).await?;
        }
        debug!("Delivered {} replies to chat {}", replies.len(), origin.chat_id);
        Ok(())
    }
}

/// Edited messages accept only inline keyboards and must fit in one message.
fn can_edit(reply: &Reply) -> bool {
    matches!(reply.keyboard, None | Some(Keyboard::Inline(_)))
        && utf16_len(&reply.text) <= MESSAGE_LIMIT
}

#[cfg(test)]
mod tests {
    use super::*;
    use calofit_core::chat::{Button, CallbackAction};

    #[test]
    fn test_text_update_to_inbound() {
        let raw = r#"{
            "update_id": 10,
            "message": {
                "message_id": 5,
                "from": {"id": 42, "is_bot": false, "first_name": "Ann", "username": "ann"},
                "chat": {"id": 42, "type": "private"},
                "date": 1760600000,
                "text": "apple"
            }
        }"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        let (inbound, origin) = update.into_inbound().unwrap();
        let Inbound::Text { user, text } = inbound else {
            panic!("expected text");
        };
        assert_eq!(user.external_id, 42);
        assert_eq!(user.username.as_deref(), Some("ann"));
        assert_eq!(text, "apple");
        assert_eq!(origin.chat_id, 42);
        assert!(origin.callback_id.is_none());
    }

    #[test]
    fn test_callback_update_to_inbound() {
        let raw = r#"{
            "update_id": 11,
            "callback_query": {
                "id": "cb1",
                "from": {"id": 42, "is_bot": false, "first_name": "Ann"},
                "message": {"message_id": 7, "chat": {"id": 42}, "text": "pick dates"},
                "data": "pick:show"
            }
        }"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        let (inbound, origin) = update.into_inbound().unwrap();
        assert!(matches!(inbound, Inbound::Callback { ref data, .. } if data == "pick:show"));
        assert_eq!(origin.message_id, Some(7));
        assert_eq!(origin.callback_id.as_deref(), Some("cb1"));
    }

    #[test]
    fn test_non_text_and_bot_updates_are_skipped() {
        let sticker = r#"{"update_id": 1, "message": {"message_id": 1,
            "from": {"id": 1, "first_name": "A"}, "chat": {"id": 1}}}"#;
        let bot = r#"{"update_id": 2, "message": {"message_id": 1,
            "from": {"id": 2, "is_bot": true, "first_name": "B"}, "chat": {"id": 2}, "text": "hi"}}"#;
        for raw in [sticker, bot] {
            let update: Update = serde_json::from_str(raw).unwrap();
            assert!(update.into_inbound().is_none());
        }
    }

    #[test]
    fn test_reply_markup_serialization() {
        let inline = Keyboard::Inline(vec![vec![Button::new(
            "Show",
            &CallbackAction::ShowReport,
        )]]);
        let json = serde_json::to_value(ReplyMarkup::from(&inline)).unwrap();
        assert_eq!(json["inline_keyboard"][0][0]["callback_data"], "pick:show");

        let reply = Keyboard::Reply(vec![vec!["Male".to_string()]]);
        let json = serde_json::to_value(ReplyMarkup::from(&reply)).unwrap();
        assert_eq!(json["keyboard"][0][0]["text"], "Male");
        assert_eq!(json["resize_keyboard"], true);

        let json = serde_json::to_value(ReplyMarkup::from(&Keyboard::Remove)).unwrap();
        assert_eq!(json["remove_keyboard"], true);
    }

    #[test]
    fn test_split_short_message_untouched() {
        assert_eq!(split_message("hello\nworld", 100), vec!["hello\nworld"]);
    }

    #[test]
    fn test_split_on_line_boundaries() {
        let text = "aaaa\nbbbb\ncccc";
        assert_eq!(split_message(text, 9), vec!["aaaa\nbbbb", "cccc"]);
    }

    #[test]
    fn test_split_long_line_by_chars() {
        let chunks = split_message("abcdefghij", 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_split_counts_utf16_units() {
        // Each emoji is two UTF-16 units.
        let chunks = split_message("🔥🔥🔥", 4);
        assert_eq!(chunks, vec!["🔥🔥", "🔥"]);
    }

    #[test]
    fn test_split_report_sized_text() {
        let line = "⏰ 12:00 | 🍽 something tasty | 🔥 250 kcal";
        let text = vec![line; 300].join("\n");
        let chunks = split_message(&text, MESSAGE_LIMIT);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| utf16_len(c) <= MESSAGE_LIMIT));
        assert_eq!(chunks.join("\n"), text);
    }

    #[test]
    fn test_can_edit() {
        assert!(can_edit(&Reply::text("ok").edit()));
        assert!(!can_edit(
            &Reply::text("ok").with_keyboard(Keyboard::Remove).edit()
        ));
    }
}
