pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::api::types::{
    ApiResponse, BotReply, ChatRequest, ContractRequest, CreateSessionRequest, ErrorBody,
    SessionCreated,
};
use crate::config::BotConfig;
use crate::models::AnalysisContext;

const RETRIES: u32 = 1;
const SECRET_HEADER: &str = "x-secret-key";

/// The three operations the conversation flows need from the remote service.
///
/// Failures come back as `success: false` values, never as errors.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn create_session(&self, user_id: &str) -> ApiResponse<SessionCreated>;

    async fn send_message(
        &self,
        user_id: &str,
        session_id: &str,
        text: &str,
        context: Option<&AnalysisContext>,
    ) -> ApiResponse<BotReply>;

    async fn get_contract_details(
        &self,
        user_id: &str,
        session_id: &str,
        context: &AnalysisContext,
    ) -> ApiResponse<BotReply>;
}

#[derive(Clone)]
pub struct ApiClient {
    client: ClientWithMiddleware,
    base_url: String,
    secret_key: String,
}

impl ApiClient {
    pub fn new(config: &BotConfig) -> Result<Self, reqwest::Error> {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(RETRIES);

        let inner = Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()?;

        let client = ClientBuilder::new(inner)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            secret_key: config.api_secret_key.clone(),
        })
    }

    async fn post<B, T>(&self, endpoint: &str, body: &B) -> ApiResponse<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let payload = match serde_json::to_vec(body) {
            Ok(payload) => payload,
            Err(e) => return ApiResponse::failure(e.to_string(), None),
        };

        let response = match self
            .client
            .post(format!("{}{}", self.base_url, endpoint))
            .header("Accept", "application/json")
            .header("Content-Type", "application/json")
            .header(SECRET_HEADER, &self.secret_key)
            .body(payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                log::error!("API error ({}): {}", endpoint, e);
                return ApiResponse::failure(e.to_string(), None);
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                log::error!("API error ({}): failed to read body: {}", endpoint, e);
                return ApiResponse::failure(e.to_string(), Some(status.as_u16()));
            }
        };

        let result = decode_response(status, &text);
        if !result.success {
            log::error!(
                "API error ({}): status {} - {}",
                endpoint,
                status,
                result.error.as_deref().unwrap_or("no error message")
            );
        }
        result
    }
}

/// Maps a raw HTTP answer onto the envelope.
fn decode_response<T: DeserializeOwned>(status: StatusCode, text: &str) -> ApiResponse<T> {
    if status.is_success() {
        return serde_json::from_str::<ApiResponse<T>>(text).unwrap_or_else(|e| {
            ApiResponse::failure(
                format!("Invalid response from server: {}", e),
                Some(status.as_u16()),
            )
        });
    }

    let error = serde_json::from_str::<ErrorBody>(text)
        .ok()
        .and_then(|body| body.error)
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| format!("Request failed with status code {}", status.as_u16()));

    ApiResponse::failure(error, Some(status.as_u16()))
}

#[async_trait]
impl Backend for ApiClient {
    async fn create_session(&self, user_id: &str) -> ApiResponse<SessionCreated> {
        let request = CreateSessionRequest {
            user_id,
            title: format!("Telegram Bot Session {}", Utc::now().format("%Y-%m-%d %H:%M:%S UTC")),
        };
        self.post("/conversations", &request).await
    }

    async fn send_message(
        &self,
        user_id: &str,
        session_id: &str,
        text: &str,
        context: Option<&AnalysisContext>,
    ) -> ApiResponse<BotReply> {
        let request = ChatRequest {
            user_id,
            session_id,
            user_message: text,
            chain_id: context.map(|c| c.chain_id.as_str()),
            contract_address: context.map(|c| c.contract_address.as_str()),
        };
        self.post("/chat", &request).await
    }

    async fn get_contract_details(
        &self,
        user_id: &str,
        session_id: &str,
        context: &AnalysisContext,
    ) -> ApiResponse<BotReply> {
        let request = ContractRequest {
            user_id,
            session_id,
            contract_address: &context.contract_address,
            chain_id: &context.chain_id,
        };
        self.post("/contract", &request).await
    }
}
