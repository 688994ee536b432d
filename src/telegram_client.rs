use std::time::Duration;

use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use url::Url;

use crate::domain::{ActionLink, MessageBlock, RecipientId};
use crate::registry_client::with_trailing_slash;

/// Minimal Telegram Bot API client: the two calls a broadcast needs.
#[derive(Clone)]
pub struct TelegramClient {
    http_client: Client,
    base_url: Url,
    bot_token: SecretString,
}

/// Identifies a sent message so it can be edited later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHandle(i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParseMode {
    Markdown,
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("The recipient blocked the bot: {description}")]
    Blocked { description: String },
    #[error("The chat could not be found: {description}")]
    ChatNotFound { description: String },
    #[error("Telegram rejected the request: {description}")]
    BadRequest { description: String },
    #[error("Telegram answered {status}: {description}")]
    Api {
        status: StatusCode,
        description: String,
    },
    #[error("Failed to reach Telegram.")]
    Transport(#[source] reqwest::Error),
    #[error("Telegram sent a reply that could not be understood.")]
    UnexpectedReply(#[source] serde_json::Error),
}

impl SendError {
    fn classify(status: StatusCode, description: String) -> Self {
        match status {
            StatusCode::FORBIDDEN => SendError::Blocked { description },
            StatusCode::BAD_REQUEST if description.to_lowercase().contains("chat not found") => {
                SendError::ChatNotFound { description }
            }
            StatusCode::BAD_REQUEST => SendError::BadRequest { description },
            status => SendError::Api {
                status,
                description,
            },
        }
    }
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: RecipientId,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<ParseMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboardMarkup<'a>>,
}

#[derive(Serialize)]
struct EditMessageTextRequest<'a> {
    chat_id: RecipientId,
    message_id: i64,
    text: &'a str,
}

#[derive(Serialize)]
struct InlineKeyboardMarkup<'a> {
    inline_keyboard: Vec<Vec<InlineKeyboardButton<'a>>>,
}

#[derive(Serialize)]
struct InlineKeyboardButton<'a> {
    text: &'a str,
    url: &'a str,
}

impl<'a> From<&'a ActionLink> for InlineKeyboardMarkup<'a> {
    fn from(link: &'a ActionLink) -> Self {
        Self {
            inline_keyboard: vec![vec![InlineKeyboardButton {
                text: &link.label,
                url: link.url.as_str(),
            }]],
        }
    }
}

#[derive(serde::Deserialize)]
struct ApiReply<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(serde::Deserialize)]
struct SentMessage {
    message_id: i64,
}

impl TelegramClient {
    pub fn new(
        base_url: Url,
        bot_token: SecretString,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http_client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            http_client,
            base_url: with_trailing_slash(base_url),
            bot_token,
        })
    }

    /// Sends a composed block: Markdown text plus an optional link button.
    pub async fn send_block(
        &self,
        recipient: RecipientId,
        block: &MessageBlock,
    ) -> Result<MessageHandle, SendError> {
        self.send_message(
            recipient,
            block.text(),
            Some(ParseMode::Markdown),
            block.action_link(),
        )
        .await
    }

    pub async fn send_text(
        &self,
        recipient: RecipientId,
        text: &str,
    ) -> Result<MessageHandle, SendError> {
        self.send_message(recipient, text, None, None).await
    }

    #[tracing::instrument(name = "Sending a Telegram message", skip(self, text, action_link))]
    pub async fn send_message(
        &self,
        recipient: RecipientId,
        text: &str,
        parse_mode: Option<ParseMode>,
        action_link: Option<&ActionLink>,
    ) -> Result<MessageHandle, SendError> {
        let body = SendMessageRequest {
            chat_id: recipient,
            text,
            parse_mode,
            reply_markup: action_link.map(InlineKeyboardMarkup::from),
        };

        let sent: SentMessage = self.call("sendMessage", &body).await?;
        Ok(MessageHandle(sent.message_id))
    }

    #[tracing::instrument(name = "Editing a Telegram message", skip(self, text))]
    pub async fn edit_message_text(
        &self,
        recipient: RecipientId,
        handle: MessageHandle,
        text: &str,
    ) -> Result<(), SendError> {
        let body = EditMessageTextRequest {
            chat_id: recipient,
            message_id: handle.0,
            text,
        };

        // The result is either the edited message or `true`.
        let _: serde_json::Value = self.call("editMessageText", &body).await?;
        Ok(())
    }

    async fn call<B, T>(&self, api_method: &str, body: &B) -> Result<T, SendError>
    where
        B: Serialize,
        T: serde::de::DeserializeOwned,
    {
        // Bot tokens contain a colon, the leading `./` stops it reading as a scheme.
        let url = self
            .base_url
            .join(&format!(
                "./bot{}/{}",
                self.bot_token.expose_secret(),
                api_method
            ))
            .map_err(|e| SendError::BadRequest {
                description: format!("Invalid bot API url: {e}"),
            })?;

        // The token is part of the url, keep it out of error messages.
        let response = self
            .http_client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| SendError::Transport(e.without_url()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SendError::Transport(e.without_url()))?;

        let reply: ApiReply<T> = match serde_json::from_str(&text) {
            Ok(reply) => reply,
            Err(_) if !status.is_success() => return Err(SendError::classify(status, text)),
            Err(e) => return Err(SendError::UnexpectedReply(e)),
        };

        match reply {
            ApiReply {
                ok: true,
                result: Some(result),
                ..
            } if status.is_success() => Ok(result),
            ApiReply { description, .. } => {
                let status = if status.is_success() {
                    StatusCode::BAD_GATEWAY
                } else {
                    status
                };
                Err(SendError::classify(
                    status,
                    description.unwrap_or_else(|| "no description".to_owned()),
                ))
            }
        }
    }
}
