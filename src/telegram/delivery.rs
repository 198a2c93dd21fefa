// Delivery over the Telegram Bot API

use std::path::Path;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, InputFile, MessageId};
use teloxide::RequestError;
use tokio::sync::Mutex;
use tracing::debug;

use crate::delivery::{BestEffort, Delivery, DeliveryError, MenuOption, Mood};
use crate::downloader::MediaKind;

const WELCOME_STICKER: &str =
    "CAACAgIAAxkBAAEMD-ZmYgV_t5s_2b7x2gwh20wpc-J2AAICAA_d22A-g_NqgABu_AN4NAQ";
const NOT_FOUND_STICKER: &str =
    "CAACAgIAAxkBAAEMD-pmYgWb5gABiR3NB3Uf56n25Zl2qWwAAg4AA_d22A-AAAF0h2aJfrs0BA";
const ERROR_STICKER: &str =
    "CAACAgIAAxkBAAEMD-5mYgWvJgABHn5aTzRzFzTqo_mP5fMAAg8AA_d22A-g_NqgABu_AN4NAQ";

/// Replies into one chat, tracking a single editable status message
pub struct TelegramDelivery {
    bot: Bot,
    chat_id: ChatId,
    status: Mutex<Option<MessageId>>,
}

impl TelegramDelivery {
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        Self::with_status(bot, chat_id, None)
    }

    /// Reuse an existing message (e.g. the pressed menu) as status line
    pub fn with_status(bot: Bot, chat_id: ChatId, status: Option<MessageId>) -> Self {
        Self {
            bot,
            chat_id,
            status: Mutex::new(status),
        }
    }
}

fn classify_error(e: RequestError) -> DeliveryError {
    match e {
        RequestError::Api(api) => DeliveryError::Rejected(api.to_string()),
        other => DeliveryError::Transport(other.to_string()),
    }
}

fn keyboard(options: &[MenuOption]) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(options.iter().map(|option| {
        vec![InlineKeyboardButton::callback(
            option.label.clone(),
            option.data.clone(),
        )]
    }))
}

#[async_trait]
impl Delivery for TelegramDelivery {
    async fn status(&self, text: &str) -> BestEffort {
        let mut status = self.status.lock().await;
        match *status {
            Some(message_id) => BestEffort::from_result(
                self.bot
                    .edit_message_text(self.chat_id, message_id, text)
                    .await,
                "edit status",
            ),
            None => match self.bot.send_message(self.chat_id, text).await {
                Ok(message) => {
                    *status = Some(message.id);
                    BestEffort::Done
                }
                Err(e) => BestEffort::from_result(Err::<(), _>(e), "send status"),
            },
        }
    }

    async fn clear_status(&self) -> BestEffort {
        match self.status.lock().await.take() {
            Some(message_id) => BestEffort::from_result(
                self.bot.delete_message(self.chat_id, message_id).await,
                "delete status",
            ),
            None => BestEffort::Skipped,
        }
    }

    async fn notify(&self, text: &str) -> Result<(), DeliveryError> {
        self.bot
            .send_message(self.chat_id, text)
            .await
            .map(|_| ())
            .map_err(classify_error)
    }

    async fn send_media(
        &self,
        path: &Path,
        kind: MediaKind,
        title: &str,
    ) -> Result<(), DeliveryError> {
        let file = InputFile::file(path.to_path_buf());
        debug!(chat = %self.chat_id, file = %path.display(), ?kind, "uploading");
        let sent = match kind {
            MediaKind::Audio => {
                self.bot
                    .send_audio(self.chat_id, file)
                    .title(title.to_string())
                    .await
            }
            MediaKind::Video => {
                self.bot
                    .send_video(self.chat_id, file)
                    .caption(title.to_string())
                    .await
            }
        };
        sent.map(|_| ()).map_err(classify_error)
    }

    async fn present_options(
        &self,
        prompt: &str,
        options: &[MenuOption],
    ) -> Result<(), DeliveryError> {
        self.bot
            .send_message(self.chat_id, prompt)
            .reply_markup(keyboard(options))
            .await
            .map(|_| ())
            .map_err(classify_error)
    }

    async fn sticker(&self, mood: Mood) -> BestEffort {
        let id = match mood {
            Mood::Welcome => WELCOME_STICKER,
            Mood::NotFound => NOT_FOUND_STICKER,
            Mood::Error => ERROR_STICKER,
        };
        BestEffort::from_result(
            self.bot
                .send_sticker(self.chat_id, InputFile::file_id(id.to_string()))
                .await,
            "sticker",
        )
    }
}
