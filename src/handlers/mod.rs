pub mod commands;
pub mod contract;
pub mod messages;
pub mod presenter;
pub mod utils;

pub use commands::command_handler;
pub use messages::message_handler;

use std::error::Error;

use teloxide::types::Message;
use tokio::time;

use crate::api::types::{ApiResponse, SessionCreated};
use crate::bot_state::BotState;
use crate::handlers::presenter::{Format, Presenter, PresenterError};

pub type HandlerResult = Result<(), Box<dyn Error + Send + Sync>>;

/// Sessions are keyed by the sender; channel posts fall back to the chat.
pub fn user_id_of(msg: &Message) -> String {
    msg.from
        .as_ref()
        .map(|user| user.id.to_string())
        .unwrap_or_else(|| msg.chat.id.to_string())
}

/// Backend session id of a create-session answer, or the error to show.
pub fn created_session_id(response: ApiResponse<SessionCreated>) -> Result<String, String> {
    let created = response.into_result()?;
    created
        .session_id()
        .map(str::to_string)
        .ok_or_else(|| "No session id returned by the server".to_string())
}

/// Last line of defence: log the fault and tell the user something went wrong.
pub async fn report_failure(presenter: &dyn Presenter, user_id: &str, error: &PresenterError) {
    log::error!("Handler failed for user {}: {}", user_id, error);

    if let Err(e) = presenter
        .reply(
            "❌ Something went wrong while processing your request. Please try again later.",
            Format::Plain,
        )
        .await
    {
        log::error!("Failed to report error to user {}: {}", user_id, e);
    }
}

pub async fn cleanup_cache_task(state: BotState) {
    let mut interval = time::interval(time::Duration::from_secs(600));

    loop {
        interval.tick().await;
        state.cleanup_cache().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{created, created_nested};

    #[test]
    fn created_session_id_follows_precedence() {
        assert_eq!(created_session_id(created("top")), Ok("top".to_string()));
        assert_eq!(
            created_session_id(created_nested("inner")),
            Ok("inner".to_string())
        );
        assert_eq!(
            created_session_id(ApiResponse::ok(SessionCreated::default())),
            Err("No session id returned by the server".to_string())
        );
        assert_eq!(
            created_session_id(ApiResponse::failure("", Some(500))),
            Err("Unknown error".to_string())
        );
    }
}
