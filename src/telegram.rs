use std::time::Duration;

use reqwest::{header::CONTENT_TYPE, Client};
use serde::{de::DeserializeOwned, de::IgnoredAny, Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::time;
use tracing::{debug, warn};

use crate::{
    config::TelegramConfig,
    error::{self, Error},
    linker::{Keyboard, ShownMessage, Transport},
    sources::{MediaKind, Post, PostKind},
    text::Escaped,
};

const PARSE_MODE: &str = "Markdown";

pub struct TelegramClient {
    client: Client,
    /// `{api_url}/bot{token}`
    endpoint: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Scheme(#[from] serde_json::Error),
    #[error("API returned error {error_code}: {description}")]
    Server { error_code: u32, description: String },
    #[error("ratelimited for {} seconds", .timeout.as_secs())]
    RateLimited { timeout: Duration },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TelegramResponse<T> {
    Ok {
        result: T,
    },
    Err {
        error_code: u32,
        description: String,
        #[serde(default)]
        parameters: Option<TelegramRateLimitError>,
    },
}
#[derive(Deserialize)]
struct TelegramRateLimitError {
    retry_after: u64,
}

#[derive(Deserialize, Debug)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Deserialize, Debug)]
pub struct Chat {
    pub id: i64,
}

#[derive(Deserialize, Debug)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub entities: Vec<MessageEntity>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub caption_entities: Vec<MessageEntity>,
    #[serde(default)]
    photo: Option<IgnoredAny>,
    #[serde(default)]
    video: Option<IgnoredAny>,
    #[serde(default)]
    document: Option<IgnoredAny>,
    #[serde(default)]
    animation: Option<IgnoredAny>,
}

/// Formatting of a span of text. Offsets are in UTF-16 code units.
#[derive(Deserialize, Debug, Clone)]
pub struct MessageEntity {
    #[serde(rename = "type")]
    pub kind: String,
    pub offset: usize,
    pub length: usize,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct CallbackQuery {
    pub id: String,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Deserialize)]
#[non_exhaustive]
struct TelegramMessage {
    message_id: i64,
}

/// What a keyboard button asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Delete,
    Edit,
    More,
}

#[derive(Serialize)]
struct InlineKeyboardButton {
    text: &'static str,
    callback_data: &'static str,
}

#[derive(Serialize)]
struct InlineKeyboardMarkup {
    inline_keyboard: [Vec<InlineKeyboardButton>; 1],
}

#[derive(Serialize)]
struct TelegramMedia<'a> {
    r#type: &'static str,
    media: &'a str,
    caption: String,
    parse_mode: &'static str,
}

impl Action {
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "delete" => Some(Self::Delete),
            "edit" => Some(Self::Edit),
            "more" => Some(Self::More),
            _ => None,
        }
    }

    fn data(self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Edit => "edit",
            Self::More => "more",
        }
    }
}

fn button(text: &'static str, action: Action) -> InlineKeyboardButton {
    InlineKeyboardButton {
        text,
        callback_data: action.data(),
    }
}

fn markup(keyboard: Keyboard) -> InlineKeyboardMarkup {
    let row = match keyboard {
        Keyboard::Edit => vec![
            button("✕", Action::Delete),
            button("↻", Action::Edit),
            button("＋", Action::More),
        ],
        Keyboard::EditFailed => vec![
            button("✕", Action::Delete),
            button("Retry↻", Action::Edit),
            button("＋", Action::More),
        ],
        Keyboard::NoEdit => vec![button("✕", Action::Delete), button("＋", Action::More)],
        Keyboard::Delete => vec![button("✕", Action::Delete)],
    };
    InlineKeyboardMarkup {
        inline_keyboard: [row],
    }
}

/// Send method, the field carrying the url, and the `InputMedia` type.
fn media_method(kind: MediaKind) -> Option<(&'static str, &'static str, &'static str)> {
    match kind {
        MediaKind::Photo => Some(("sendPhoto", "photo", "photo")),
        MediaKind::Video => Some(("sendVideo", "video", "video")),
        MediaKind::Animation => Some(("sendDocument", "document", "document")),
        MediaKind::ExternalVideo => None,
    }
}

/// Attachment of `post`, unless it is sent as plain text.
fn attachment(post: &Post) -> Option<(&str, MediaKind)> {
    post.media
        .as_ref()
        .filter(|m| m.kind() != MediaKind::ExternalVideo)
        .map(|m| (m.url(), m.kind()))
}

/// Rebuilds the markdown a message was sent with from its entities.
pub fn render_markdown(text: &str, entities: &[MessageEntity]) -> String {
    let units: Vec<u16> = text.encode_utf16().collect();
    let slice = |from: usize, to: usize| {
        let to = to.min(units.len());
        String::from_utf16_lossy(&units[from.min(to)..to])
    };

    let mut entities: Vec<&MessageEntity> = entities.iter().collect();
    entities.sort_by_key(|e| e.offset);

    let mut out = String::new();
    let mut pos = 0;
    for entity in entities {
        // nested entities are not used by the bot
        if entity.offset < pos {
            continue;
        }
        let end = entity.offset + entity.length;
        out.push_str(&Escaped(&slice(pos, entity.offset)).to_string());
        let inner = slice(entity.offset, end);
        let rendered = match (entity.kind.as_str(), &entity.url) {
            ("bold", _) => format!("*{}*", Escaped(&inner)),
            ("italic", _) => format!("_{}_", Escaped(&inner)),
            ("text_link", Some(url)) => format!("[{inner}]({url})"),
            _ => Escaped(&inner).to_string(),
        };
        out.push_str(&rendered);
        pos = end;
    }
    out.push_str(&Escaped(&slice(pos, units.len())).to_string());
    out
}

impl Message {
    pub fn has_media(&self) -> bool {
        self.photo.is_some()
            || self.video.is_some()
            || self.document.is_some()
            || self.animation.is_some()
    }

    /// Markdown of the text or, for media messages, of the caption.
    pub fn markdown(&self) -> String {
        match &self.text {
            Some(text) => render_markdown(text, &self.entities),
            None => render_markdown(
                self.caption.as_deref().unwrap_or_default(),
                &self.caption_entities,
            ),
        }
    }

    pub fn shown(&self) -> ShownMessage {
        ShownMessage {
            chat_id: self.chat.id,
            message_id: self.message_id,
            text: self.markdown(),
            has_media: self.has_media(),
        }
    }
}

impl TelegramClient {
    pub fn new(client: Client, token: &str, config: &TelegramConfig) -> Self {
        Self {
            client,
            endpoint: format!("{}/bot{token}", config.api_url.trim_end_matches('/')),
        }
    }

    /// Calls `method`, waiting out one rate limit.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: &Value,
    ) -> Result<T, TelegramError> {
        let res = self.call_once(method, payload).await;

        if let Err(TelegramError::RateLimited { timeout }) = res {
            warn!("{method} ratelimited, retrying in {}s", timeout.as_secs());
            time::sleep(timeout).await;
            self.call_once(method, payload).await
        } else {
            res
        }
    }

    async fn call_once<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: &Value,
    ) -> Result<T, TelegramError> {
        debug!("Calling {method}");
        let res = self
            .client
            .post(format!("{}/{method}", self.endpoint))
            .header(CONTENT_TYPE, "application/json")
            .body(serde_json::to_string(payload)?)
            .send()
            .await?
            .text()
            .await?;

        let res: TelegramResponse<T> = serde_json::from_str(&res)?;

        match res {
            TelegramResponse::Ok { result } => Ok(result),

            TelegramResponse::Err {
                error_code: 429,
                parameters: Some(TelegramRateLimitError { retry_after }),
                ..
            } => Err(TelegramError::RateLimited {
                timeout: Duration::from_secs(retry_after),
            }),

            TelegramResponse::Err {
                error_code,
                description,
                ..
            } => Err(TelegramError::Server {
                error_code,
                description,
            }),
        }
    }

    /// Sends `post` with the primitive matching its kind. Returns the message id.
    pub async fn send_post(
        &self,
        chat_id: i64,
        post: &Post,
        keyboard: Keyboard,
    ) -> Result<i64, TelegramError> {
        let caption = post.message();
        let attachment = attachment(post).and_then(|(url, kind)| Some((url, media_method(kind)?)));
        let (method, payload) = match attachment {
            Some((url, (method, field, _))) => {
                let mut payload = json!({
                    "chat_id": chat_id,
                    "caption": caption,
                    "parse_mode": PARSE_MODE,
                    "reply_markup": markup(keyboard),
                });
                payload[field] = json!(url);
                (method, payload)
            }
            None => (
                "sendMessage",
                json!({
                    "chat_id": chat_id,
                    "text": caption,
                    "parse_mode": PARSE_MODE,
                    "disable_web_page_preview": post.kind() != PostKind::ExternalVideo,
                    "reply_markup": markup(keyboard),
                }),
            ),
        };

        let TelegramMessage { message_id } = self.call(method, &payload).await?;
        Ok(message_id)
    }

    pub async fn edit_post(
        &self,
        message: &ShownMessage,
        post: &Post,
    ) -> Result<(), TelegramError> {
        let caption = post.message();
        let attachment = attachment(post).and_then(|(url, kind)| Some((url, media_method(kind)?)));
        let (method, payload) = match attachment {
            Some((url, (_, _, media_type))) => (
                "editMessageMedia",
                json!({
                    "chat_id": message.chat_id,
                    "message_id": message.message_id,
                    "media": TelegramMedia {
                        r#type: media_type,
                        media: url,
                        caption,
                        parse_mode: PARSE_MODE,
                    },
                    "reply_markup": markup(Keyboard::Edit),
                }),
            ),
            None => (
                "editMessageText",
                json!({
                    "chat_id": message.chat_id,
                    "message_id": message.message_id,
                    "text": caption,
                    "parse_mode": PARSE_MODE,
                    "disable_web_page_preview": post.kind() != PostKind::ExternalVideo,
                    "reply_markup": markup(Keyboard::Edit),
                }),
            ),
        };

        self.call::<IgnoredAny>(method, &payload).await?;
        Ok(())
    }

    pub async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<i64, TelegramError> {
        let mut payload = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": PARSE_MODE,
        });
        if let Some(keyboard) = keyboard {
            payload["reply_markup"] = json!(markup(keyboard));
        }

        let TelegramMessage { message_id } = self.call("sendMessage", &payload).await?;
        Ok(message_id)
    }

    pub async fn set_keyboard(
        &self,
        chat_id: i64,
        message_id: i64,
        keyboard: Keyboard,
    ) -> Result<(), TelegramError> {
        let payload = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "reply_markup": markup(keyboard),
        });
        self.call::<IgnoredAny>("editMessageReplyMarkup", &payload).await?;
        Ok(())
    }

    pub async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), TelegramError> {
        let payload = json!({ "chat_id": chat_id, "message_id": message_id });
        self.call::<bool>("deleteMessage", &payload).await?;
        Ok(())
    }

    pub async fn answer_callback_query(&self, id: &str) -> Result<(), TelegramError> {
        self.call::<bool>("answerCallbackQuery", &json!({ "callback_query_id": id }))
            .await?;
        Ok(())
    }

    /// Long polls for updates after `offset`.
    pub async fn get_updates(
        &self,
        offset: i64,
        timeout: u64,
    ) -> Result<Vec<Update>, TelegramError> {
        let payload = json!({
            "offset": offset,
            "timeout": timeout,
            "allowed_updates": ["message", "callback_query"],
        });
        self.call("getUpdates", &payload).await
    }
}

impl Transport for TelegramClient {
    async fn send_post(&self, chat_id: i64, post: &Post, keyboard: Keyboard) -> error::Result<()> {
        TelegramClient::send_post(self, chat_id, post, keyboard)
            .await
            .map_err(|e| Error::PostSend {
                permalink: post.permalink.clone(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn edit_post(&self, message: &ShownMessage, post: &Post) -> error::Result<()> {
        TelegramClient::edit_post(self, message, post)
            .await
            .map_err(|e| Error::PostSend {
                permalink: post.permalink.clone(),
                reason: e.to_string(),
            })
    }

    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> error::Result<()> {
        TelegramClient::send_text(self, chat_id, text, keyboard).await?;
        Ok(())
    }

    async fn set_keyboard(&self, message: &ShownMessage, keyboard: Keyboard) -> error::Result<()> {
        Ok(TelegramClient::set_keyboard(self, message.chat_id, message.message_id, keyboard).await?)
    }
}
