use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, ParseMode};
use thiserror::Error;
use tokio::time::{self, Instant};

use crate::handlers::utils::split_message;

/// Telegram rejects messages above 4096 characters; leave room for escapes.
const MAX_MESSAGE_CHARS: usize = 4000;

pub const TYPING_INTERVAL: Duration = Duration::from_millis(4500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Plain,
    /// Text is already escaped for MarkdownV2.
    MarkdownV2,
}

#[derive(Debug, Error)]
pub enum PresenterError {
    #[error("Telegram request failed: {0}")]
    Telegram(#[from] teloxide::RequestError),
}

/// Outbound side of a conversation.
#[async_trait]
pub trait Presenter: Send + Sync {
    async fn reply(&self, text: &str, format: Format) -> Result<(), PresenterError>;
    async fn send_typing(&self) -> Result<(), PresenterError>;
}

pub struct TelegramChat {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramChat {
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        Self { bot, chat_id }
    }
}

#[async_trait]
impl Presenter for TelegramChat {
    async fn reply(&self, text: &str, format: Format) -> Result<(), PresenterError> {
        for chunk in split_message(text, MAX_MESSAGE_CHARS) {
            let request = self.bot.send_message(self.chat_id, chunk);
            match format {
                Format::Plain => request.await?,
                Format::MarkdownV2 => request.parse_mode(ParseMode::MarkdownV2).await?,
            };
        }
        Ok(())
    }

    async fn send_typing(&self) -> Result<(), PresenterError> {
        self.bot
            .send_chat_action(self.chat_id, ChatAction::Typing)
            .await?;
        Ok(())
    }
}

/// Drives `fut` to completion while re-sending the typing action every
/// [`TYPING_INTERVAL`], starting immediately.
///
/// The signal lives inside this future, so it stops on every exit path:
/// completion, or the caller dropping the whole handler.
pub async fn with_typing<F: Future>(presenter: &dyn Presenter, fut: F) -> F::Output {
    signal_typing(presenter).await;

    let mut ticker = time::interval_at(Instant::now() + TYPING_INTERVAL, TYPING_INTERVAL);
    tokio::pin!(fut);

    loop {
        tokio::select! {
            output = &mut fut => return output,
            _ = ticker.tick() => signal_typing(presenter).await,
        }
    }
}

async fn signal_typing(presenter: &dyn Presenter) {
    if let Err(e) = presenter.send_typing().await {
        log::warn!("Failed to send typing indicator: {}", e);
    }
}
