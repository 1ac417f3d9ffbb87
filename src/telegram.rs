//! Outbound Telegram surface.
//!
//! `Messaging` is the seam the rest of the crate talks through; tests swap in
//! recording implementations. `TelegramGateway` is the production impl over a
//! teloxide [`Bot`].

use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{
    ChatId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, MessageId, ParseMode,
};

/// One inline-keyboard callback button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub callback_data: String,
}

impl Button {
    pub fn new(label: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            callback_data: callback_data.into(),
        }
    }
}

/// File metadata resolved from the bot API before a download.
#[derive(Debug, Clone)]
pub struct RemoteFile {
    pub path: String,
    pub unique_id: String,
    pub size: u32,
}

/// Where an outbound photo comes from: a Telegram-side file id or an
/// external URL (e.g. the CMS asset CDN).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoRef {
    FileId(String),
    Url(String),
}

#[async_trait]
pub trait Messaging: Send + Sync {
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<MessageId>;

    async fn send_text_with_buttons(
        &self,
        chat: ChatId,
        text: &str,
        buttons: Vec<Vec<Button>>,
    ) -> Result<MessageId>;

    /// Send a photo with an HTML caption and optional buttons.
    async fn send_photo(
        &self,
        chat: ChatId,
        photo: PhotoRef,
        caption: &str,
        buttons: Vec<Vec<Button>>,
    ) -> Result<MessageId>;

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<()>;

    async fn delete_message(&self, chat: ChatId, message_id: MessageId) -> Result<()>;

    /// Remove the inline keyboard from a message, leaving its content.
    async fn clear_buttons(&self, chat: ChatId, message_id: MessageId) -> Result<()>;

    async fn file_info(&self, file_id: &str) -> Result<RemoteFile>;

    async fn download_to(&self, remote_path: &str, dest: &Path) -> Result<()>;
}

/// Production gateway over the Telegram bot API.
#[derive(Clone)]
pub struct TelegramGateway {
    bot: Bot,
}

impl TelegramGateway {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

impl fmt::Debug for TelegramGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramGateway").finish_non_exhaustive()
    }
}

fn markup(buttons: Vec<Vec<Button>>) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(buttons.into_iter().map(|row| {
        row.into_iter()
            .map(|b| InlineKeyboardButton::callback(b.label, b.callback_data))
            .collect::<Vec<_>>()
    }))
}

#[async_trait]
impl Messaging for TelegramGateway {
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<MessageId> {
        let msg = self
            .bot
            .send_message(chat, text)
            .parse_mode(ParseMode::Html)
            .await?;
        Ok(msg.id)
    }

    async fn send_text_with_buttons(
        &self,
        chat: ChatId,
        text: &str,
        buttons: Vec<Vec<Button>>,
    ) -> Result<MessageId> {
        let msg = self
            .bot
            .send_message(chat, text)
            .parse_mode(ParseMode::Html)
            .reply_markup(markup(buttons))
            .await?;
        Ok(msg.id)
    }

    async fn send_photo(
        &self,
        chat: ChatId,
        photo: PhotoRef,
        caption: &str,
        buttons: Vec<Vec<Button>>,
    ) -> Result<MessageId> {
        let input = match photo {
            PhotoRef::FileId(id) => InputFile::file_id(id),
            PhotoRef::Url(url) => InputFile::url(reqwest::Url::parse(&url)?),
        };
        let mut req = self
            .bot
            .send_photo(chat, input)
            .caption(caption)
            .parse_mode(ParseMode::Html);
        if !buttons.is_empty() {
            req = req.reply_markup(markup(buttons));
        }
        let msg = req.await?;
        Ok(msg.id)
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        let mut req = self.bot.answer_callback_query(callback_id);
        if let Some(text) = text {
            req = req.text(text);
        }
        req.await?;
        Ok(())
    }

    async fn delete_message(&self, chat: ChatId, message_id: MessageId) -> Result<()> {
        self.bot.delete_message(chat, message_id).await?;
        Ok(())
    }

    async fn clear_buttons(&self, chat: ChatId, message_id: MessageId) -> Result<()> {
        self.bot
            .edit_message_reply_markup(chat, message_id)
            .reply_markup(InlineKeyboardMarkup::new(
                Vec::<Vec<InlineKeyboardButton>>::new(),
            ))
            .await?;
        Ok(())
    }

    async fn file_info(&self, file_id: &str) -> Result<RemoteFile> {
        let file = self.bot.get_file(file_id).await?;
        Ok(RemoteFile {
            path: file.path,
            unique_id: file.meta.unique_id,
            size: file.meta.size,
        })
    }

    async fn download_to(&self, remote_path: &str, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        let mut dst = tokio::fs::File::create(dest).await?;
        self.bot.download_file(remote_path, &mut dst).await?;
        Ok(())
    }
}
