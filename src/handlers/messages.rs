use chrono::Utc;
use teloxide::prelude::*;

use crate::api::{ApiClient, Backend};
use crate::bot_state::BotState;
use crate::handlers::contract::{handle_chain_id, handle_contract_address};
use crate::handlers::presenter::{with_typing, Format, Presenter, PresenterError, TelegramChat};
use crate::handlers::{created_session_id, report_failure, user_id_of, HandlerResult};
use crate::models::PendingInput;

pub async fn message_handler(
    bot: Bot,
    msg: Message,
    state: BotState,
    api: ApiClient,
) -> HandlerResult {
    // Stickers, photos and the like are not part of the conversation.
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let chat = TelegramChat::new(bot, msg.chat.id);
    let user_id = user_id_of(&msg);

    respond(&state, &api, &chat, &user_id, text).await;
    Ok(())
}

/// Routes the text and turns any fault into a generic reply.
pub async fn respond(
    state: &BotState,
    backend: &dyn Backend,
    presenter: &dyn Presenter,
    user_id: &str,
    text: &str,
) {
    if let Err(e) = route_text(state, backend, presenter, user_id, text).await {
        report_failure(presenter, user_id, &e).await;
    }
}

/// Sends free text to whichever flow the session is waiting on.
pub async fn route_text(
    state: &BotState,
    backend: &dyn Backend,
    presenter: &dyn Presenter,
    user_id: &str,
    text: &str,
) -> Result<(), PresenterError> {
    let pending = state.snapshot(user_id).await.pending;

    match pending {
        PendingInput::ContractAddress => {
            handle_contract_address(state, presenter, user_id, text).await
        }
        PendingInput::ChainId => handle_chain_id(state, backend, presenter, user_id, text).await,
        PendingInput::None => handle_chat(state, backend, presenter, user_id, text).await,
    }
}

pub async fn handle_chat(
    state: &BotState,
    backend: &dyn Backend,
    presenter: &dyn Presenter,
    user_id: &str,
    text: &str,
) -> Result<(), PresenterError> {
    let processing = match state.begin_chat(user_id, Utc::now()).await {
        Ok(guard) => guard,
        Err(rejection) => {
            log::warn!("Message from user {} rejected: {:?}", user_id, rejection);
            return presenter.reply(rejection.message(), Format::Plain).await;
        }
    };

    let session = state.snapshot(user_id).await;
    let mut session_id = session.session_id.clone();

    if session_id.is_empty() {
        match created_session_id(backend.create_session(user_id).await) {
            Ok(id) => {
                state.update(user_id, |s| s.adopt_session_id(Some(&id))).await;
                log::info!("Backend session {} opened for user {}", id, user_id);
                session_id = id;
            }
            Err(error) => {
                drop(processing);
                log::warn!("Session creation failed for user {}: {}", user_id, error);
                return presenter
                    .reply(
                        &format!(
                            "❌ Failed to create a new session. Please try /start again.\nError: {}",
                            error
                        ),
                        Format::Plain,
                    )
                    .await;
            }
        }
    }

    let context = session.analysis_context();
    let response = with_typing(
        presenter,
        backend.send_message(user_id, &session_id, text, context.as_ref()),
    )
    .await;
    drop(processing);

    match response.into_result() {
        Ok(reply) => {
            state
                .update(user_id, |s| s.adopt_session_id(reply.session_id()))
                .await;
            presenter
                .reply(reply.text().unwrap_or("No response from the bot."), Format::Plain)
                .await
        }
        Err(error) => {
            log::warn!("Chat call failed for user {}: {}", user_id, error);
            presenter
                .reply(
                    &format!("❌ Failed to get a response.\nError: {}", error),
                    Format::Plain,
                )
                .await
        }
    }
}
