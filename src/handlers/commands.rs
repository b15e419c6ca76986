use teloxide::prelude::*;

use crate::api::{ApiClient, Backend};
use crate::bot_state::BotState;
use crate::handlers::presenter::{with_typing, Format, Presenter, PresenterError, TelegramChat};
use crate::handlers::utils::HELP_TEXT;
use crate::handlers::{created_session_id, report_failure, user_id_of, HandlerResult};
use crate::models::ChatRejection;
use crate::Command;

const WELCOME_TEXT: &str = "👋 *Welcome\\!*\n\n\
    I'm your assistant for blockchain contract exploration\\. \
    Your session has been initialized successfully\\.\n\n";

pub async fn command_handler(
    bot: Bot,
    msg: Message,
    cmd: Command,
    state: BotState,
    api: ApiClient,
) -> HandlerResult {
    let chat = TelegramChat::new(bot, msg.chat.id);
    let user_id = user_id_of(&msg);

    run_command(cmd, &state, &api, &chat, &user_id).await;
    Ok(())
}

/// Runs one command and turns any fault into a generic reply.
pub async fn run_command(
    cmd: Command,
    state: &BotState,
    backend: &dyn Backend,
    presenter: &dyn Presenter,
    user_id: &str,
) {
    let result = match cmd {
        Command::Start => handle_start(state, backend, presenter, user_id).await,
        Command::Help => handle_help(presenter).await,
        Command::Contract => handle_contract(state, presenter, user_id).await,
    };

    if let Err(e) = result {
        report_failure(presenter, user_id, &e).await;
    }
}

/// Resets the user's session unconditionally, then opens a backend session.
pub async fn handle_start(
    state: &BotState,
    backend: &dyn Backend,
    presenter: &dyn Presenter,
    user_id: &str,
) -> Result<(), PresenterError> {
    state.update(user_id, |s| s.reset_for_start()).await;
    log::info!("Starting session for user {}", user_id);

    let response = with_typing(presenter, backend.create_session(user_id)).await;

    match created_session_id(response) {
        Ok(session_id) => {
            state
                .update(user_id, |s| s.adopt_session_id(Some(&session_id)))
                .await;
            log::info!("Backend session {} opened for user {}", session_id, user_id);

            presenter
                .reply(&format!("{}{}", WELCOME_TEXT, HELP_TEXT), Format::MarkdownV2)
                .await
        }
        Err(error) => {
            log::warn!("Session creation failed for user {}: {}", user_id, error);
            presenter
                .reply(
                    &format!(
                        "Failed to initialize your session. Please try again later.\nError: {}",
                        error
                    ),
                    Format::Plain,
                )
                .await
        }
    }
}

pub async fn handle_help(presenter: &dyn Presenter) -> Result<(), PresenterError> {
    presenter.reply(HELP_TEXT, Format::MarkdownV2).await
}

/// Starts the two-step contract/chain collection.
pub async fn handle_contract(
    state: &BotState,
    presenter: &dyn Presenter,
    user_id: &str,
) -> Result<(), PresenterError> {
    let authenticated = state
        .update(user_id, |s| {
            if s.is_authenticated {
                s.begin_contract_flow();
            }
            s.is_authenticated
        })
        .await;

    if !authenticated {
        return presenter
            .reply(ChatRejection::NotAuthenticated.message(), Format::Plain)
            .await;
    }

    presenter
        .reply(
            "Please enter the contract address you want to explore (starting with 0x):",
            Format::Plain,
        )
        .await
}
