use std::sync::Arc;

use teloxide::{prelude::*, utils::command::BotCommands};

mod api;
mod bot_state;
mod config;
mod database;
mod handlers;
mod models;
#[cfg(test)]
mod test_support;

use crate::api::ApiClient;
use crate::bot_state::BotState;
use crate::config::BotConfig;
use crate::handlers::{command_handler, message_handler};

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "start or reset the bot")]
    Start,
    #[command(description = "show this help message")]
    Help,
    #[command(description = "set contract context for chain analysis")]
    Contract,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();
    env_logger::init();
    log::info!("Starting contract chat bot...");

    let config = match BotConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };

    let db = match database::connect(&config.database_url).await {
        Ok(db) => db,
        Err(e) => {
            log::error!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };
    db.init().await?;
    log::info!("✅ Database initialized");

    let state = BotState::new(Arc::new(db));
    let api = ApiClient::new(&config)?;

    let state_clone = state.clone();
    tokio::spawn(async move {
        handlers::cleanup_cache_task(state_clone).await;
    });

    let bot = Bot::new(&config.telegram_token);

    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        log::warn!("Failed to register bot commands: {}", e);
    }

    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint(command_handler),
        )
        .branch(Update::filter_message().endpoint(message_handler));

    log::info!("🚀 Starting dispatcher...");

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state, api])
        .enable_ctrlc_handler()
        .build();

    let shutdown = dispatcher.shutdown_token();
    tokio::spawn(async move {
        terminate_signal().await;
        log::info!("Received SIGTERM - shutting down");
        match shutdown.shutdown() {
            Ok(done) => done.await,
            Err(e) => log::warn!("Dispatcher was not running: {}", e),
        }
    });

    dispatcher.dispatch().await;
    log::info!("Dispatcher stopped");

    Ok(())
}

/// Resolves on SIGTERM; Ctrl-C is handled by the dispatcher itself.
#[cfg(unix)]
async fn terminate_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            log::warn!("Failed to install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate_signal() {
    std::future::pending::<()>().await;
}
