use crate::api::Backend;
use crate::bot_state::BotState;
use crate::handlers::presenter::{with_typing, Format, Presenter, PresenterError};
use crate::handlers::utils::{escape_markdown_v2, is_valid_contract_address, parse_chain_id};
use crate::models::PendingInput;

/// Invalid input leaves the session waiting, so the user simply retries.
pub async fn handle_contract_address(
    state: &BotState,
    presenter: &dyn Presenter,
    user_id: &str,
    address: &str,
) -> Result<(), PresenterError> {
    if !is_valid_contract_address(address) {
        log::warn!("Invalid contract address from user {}: {:?}", user_id, address);
        return presenter
            .reply(
                "❌ Invalid Ethereum address format.\n\
                Address should start with \"0x\" followed by 40 hex characters.\n\
                Please try again:",
                Format::Plain,
            )
            .await;
    }

    let accepted = state
        .update(user_id, |s| {
            let waiting = s.waiting_for_contract_address();
            if waiting {
                s.set_contract_address(address);
            }
            waiting
        })
        .await;

    if !accepted {
        log::warn!("Contract address from user {} arrived after the flow ended", user_id);
        return presenter
            .reply(
                "No contract address was requested. Use /contract to start again.",
                Format::Plain,
            )
            .await;
    }

    presenter
        .reply(
            "✅ Contract address set.\n\n\
            Please enter the chain ID (e.g., 1 for Ethereum Mainnet, 137 for Polygon):",
            Format::Plain,
        )
        .await
}

pub async fn handle_chain_id(
    state: &BotState,
    backend: &dyn Backend,
    presenter: &dyn Presenter,
    user_id: &str,
    text: &str,
) -> Result<(), PresenterError> {
    let Some(chain_id) = parse_chain_id(text) else {
        log::warn!("Invalid chain id from user {}: {:?}", user_id, text);
        return presenter
            .reply("❌ Invalid chain ID. Please enter a positive number:", Format::Plain)
            .await;
    };

    let prepared = state
        .update(user_id, |s| {
            if !s.waiting_for_chain_id() {
                return None;
            }
            if s.contract_address.is_empty() {
                s.pending = PendingInput::None;
                return None;
            }
            s.set_chain_id(chain_id);
            Some((s.session_id.clone(), s.analysis_context()?))
        })
        .await;

    let Some((session_id, context)) = prepared else {
        return presenter
            .reply(
                "No contract address is set. Use /contract to start again.",
                Format::Plain,
            )
            .await;
    };

    log::info!(
        "Contract context set for user {}: {} on chain {}",
        user_id,
        context.contract_address,
        context.chain_id
    );

    presenter
        .reply(
            &format!(
                "✅ Chain ID set to {}.\n\n\
                Now analyzing contract {} on chain {}...\n\
                This may take a moment.",
                context.chain_id, context.contract_address, context.chain_id
            ),
            Format::Plain,
        )
        .await?;

    let response = with_typing(
        presenter,
        backend.get_contract_details(user_id, &session_id, &context),
    )
    .await;

    match response.into_result() {
        Ok(details) => {
            state
                .update(user_id, |s| s.adopt_session_id(details.session_id()))
                .await;

            let summary = details.text().unwrap_or("Contract details retrieved.");
            presenter
                .reply(&escape_markdown_v2(summary), Format::MarkdownV2)
                .await
        }
        Err(error) => {
            log::warn!("Contract lookup failed for user {}: {}", user_id, error);
            presenter
                .reply(
                    &format!("❌ Failed to fetch contract details.\nError: {}", error),
                    Format::Plain,
                )
                .await
        }
    }
}
