//! The real [`Transport`] over the Telegram Bot API.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{
    ChatId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, InputMedia, InputMediaPhoto,
    MessageId, ParseMode,
};
use teloxide::{ApiError, RequestError};

use crate::delivery::{Keyboard, Transport, TransportError};

/// Telegram transport wrapping a `teloxide::Bot`.
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    /// Wrap a configured bot.
    #[must_use]
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn markup(buttons: &Keyboard) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = buttons
        .iter()
        .map(|row| {
            row.iter()
                .map(|(label, data)| InlineKeyboardButton::callback(label.clone(), data.clone()))
                .collect()
        })
        .collect();
    InlineKeyboardMarkup::new(rows)
}

fn map_err(e: RequestError) -> TransportError {
    match e {
        RequestError::RetryAfter(seconds) => TransportError::RetryAfter(seconds.duration()),
        RequestError::Api(api) => match api {
            ApiError::BotBlocked
            | ApiError::ChatNotFound
            | ApiError::UserDeactivated
            | ApiError::CantInitiateConversation => TransportError::ChatClosed,
            ApiError::MessageNotModified => TransportError::NotModified,
            ApiError::MessageToEditNotFound => TransportError::MessageNotFound,
            other => TransportError::Api(other.to_string()),
        },
        RequestError::Network(e) => TransportError::Network(e.to_string()),
        RequestError::Io(e) => TransportError::Network(e.to_string()),
        other => TransportError::Api(other.to_string()),
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        buttons: Option<&Keyboard>,
    ) -> Result<(), TransportError> {
        let mut request = self
            .bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html);
        if let Some(buttons) = buttons {
            request = request.reply_markup(markup(buttons));
        }
        request.await.map(|_| ()).map_err(map_err)
    }

    async fn send_media_group(
        &self,
        chat_id: i64,
        photos: &[String],
        caption: &str,
    ) -> Result<(), TransportError> {
        let mut media = Vec::with_capacity(photos.len());
        for (i, photo) in photos.iter().enumerate() {
            let Ok(parsed) = url::Url::parse(photo) else {
                tracing::warn!(photo, "skipping unparseable photo url");
                continue;
            };
            let mut item = InputMediaPhoto::new(InputFile::url(parsed));
            if i == 0 {
                item = item.caption(caption).parse_mode(ParseMode::Html);
            }
            media.push(InputMedia::Photo(item));
        }
        if media.is_empty() {
            return Err(TransportError::Api("no sendable photos".to_string()));
        }
        self.bot
            .send_media_group(ChatId(chat_id), media)
            .await
            .map(|_| ())
            .map_err(map_err)
    }

    async fn edit_text(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
        buttons: Option<&Keyboard>,
    ) -> Result<(), TransportError> {
        let mut request = self
            .bot
            .edit_message_text(ChatId(chat_id), MessageId(message_id), text)
            .parse_mode(ParseMode::Html);
        if let Some(buttons) = buttons {
            request = request.reply_markup(markup(buttons));
        }
        request.await.map(|_| ()).map_err(map_err)
    }
}
