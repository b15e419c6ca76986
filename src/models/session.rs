use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Minimum spacing between two accepted chat messages of one user.
pub const RATE_LIMIT_WINDOW_MS: i64 = 1000;

/// Which free-text input the router expects next.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingInput {
    #[default]
    None,
    ContractAddress,
    ChainId,
}

/// Chain id and contract address attached to chat calls once the contract flow completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisContext {
    pub chain_id: String,
    pub contract_address: String,
}

/// Per-user conversational state, keyed by the Telegram user id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Session {
    pub user_id: String,
    pub session_id: String,
    pub chain_id: String,
    pub contract_address: String,
    pub pending: PendingInput,
    pub is_authenticated: bool,
    pub last_message_time: Option<DateTime<Utc>>,
    // Runtime-only: a crash must never leave a user locked out.
    #[serde(skip)]
    pub is_processing_message: bool,
}

/// Why a chat message was refused before reaching the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRejection {
    NotAuthenticated,
    RateLimited,
    StillProcessing,
}

impl ChatRejection {
    pub fn message(self) -> &'static str {
        match self {
            ChatRejection::NotAuthenticated => "Please start the bot with /start command first.",
            ChatRejection::RateLimited => "⏳ Please wait a moment before sending another message.",
            ChatRejection::StillProcessing => {
                "⏳ I'm still working on your previous message. Please wait for the reply."
            }
        }
    }
}

impl Session {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    pub fn waiting_for_contract_address(&self) -> bool {
        self.pending == PendingInput::ContractAddress
    }

    pub fn waiting_for_chain_id(&self) -> bool {
        self.pending == PendingInput::ChainId
    }

    /// `/start`: everything back to defaults except identity, and authenticated.
    ///
    /// The processing flag survives so an in-flight chat call still owns it.
    pub fn reset_for_start(&mut self) {
        *self = Self {
            user_id: std::mem::take(&mut self.user_id),
            is_authenticated: true,
            last_message_time: self.last_message_time,
            is_processing_message: self.is_processing_message,
            ..Self::default()
        };
    }

    pub fn begin_contract_flow(&mut self) {
        self.pending = PendingInput::ContractAddress;
    }

    pub fn set_contract_address(&mut self, address: &str) {
        self.contract_address = address.to_string();
        self.pending = PendingInput::ChainId;
    }

    pub fn set_chain_id(&mut self, chain_id: u64) {
        self.chain_id = chain_id.to_string();
        self.pending = PendingInput::None;
    }

    /// Both halves must be set, otherwise no context is attached.
    pub fn analysis_context(&self) -> Option<AnalysisContext> {
        if self.chain_id.is_empty() || self.contract_address.is_empty() {
            return None;
        }
        Some(AnalysisContext {
            chain_id: self.chain_id.clone(),
            contract_address: self.contract_address.clone(),
        })
    }

    /// Adopts a backend-issued session id; absent or empty ids are ignored.
    pub fn adopt_session_id(&mut self, session_id: Option<&str>) {
        if let Some(id) = session_id.filter(|id| !id.is_empty()) {
            if id != self.session_id {
                log::debug!("Session id for user {} changed to {}", self.user_id, id);
                self.session_id = id.to_string();
            }
        }
    }

    /// Check-and-set admission for a chat message.
    ///
    /// A rate-limited message leaves the session untouched. A message refused
    /// because another one is in flight still counts against the rate limit.
    pub fn admit_chat(&mut self, now: DateTime<Utc>) -> Result<(), ChatRejection> {
        if !self.is_authenticated {
            return Err(ChatRejection::NotAuthenticated);
        }

        if let Some(last) = self.last_message_time {
            if now.signed_duration_since(last) < Duration::milliseconds(RATE_LIMIT_WINDOW_MS) {
                return Err(ChatRejection::RateLimited);
            }
        }
        self.last_message_time = Some(now);

        if self.is_processing_message {
            return Err(ChatRejection::StillProcessing);
        }
        self.is_processing_message = true;

        Ok(())
    }
}
