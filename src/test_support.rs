//! Mock collaborators for handler tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::api::types::{ApiResponse, BotReply, ChatEntry, Conversation, SessionCreated};
use crate::api::Backend;
use crate::bot_state::{BotState, BotStateError, SessionRepository};
use crate::handlers::presenter::{Format, Presenter, PresenterError};
use crate::models::{AnalysisContext, Session};

#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    CreateSession {
        user_id: String,
    },
    SendMessage {
        user_id: String,
        session_id: String,
        text: String,
        context: Option<AnalysisContext>,
    },
    ContractDetails {
        user_id: String,
        session_id: String,
        context: AnalysisContext,
    },
}

/// Backend returning queued responses and recording every call.
#[derive(Default)]
pub struct MockBackend {
    sessions: Mutex<VecDeque<ApiResponse<SessionCreated>>>,
    replies: Mutex<VecDeque<ApiResponse<BotReply>>>,
    calls: Mutex<Vec<BackendCall>>,
    delay: Option<Duration>,
}

impl MockBackend {
    /// Chat and contract calls take `delay` to answer.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn queue_session(&self, response: ApiResponse<SessionCreated>) {
        self.sessions.lock().unwrap().push_back(response);
    }

    pub fn queue_reply(&self, response: ApiResponse<BotReply>) {
        self.replies.lock().unwrap().push_back(response);
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    async fn next_reply(&self) -> ApiResponse<BotReply> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ApiResponse::failure("No mock reply queued", None))
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn create_session(&self, user_id: &str) -> ApiResponse<SessionCreated> {
        self.calls.lock().unwrap().push(BackendCall::CreateSession {
            user_id: user_id.to_string(),
        });
        self.sessions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ApiResponse::failure("No mock session queued", None))
    }

    async fn send_message(
        &self,
        user_id: &str,
        session_id: &str,
        text: &str,
        context: Option<&AnalysisContext>,
    ) -> ApiResponse<BotReply> {
        self.calls.lock().unwrap().push(BackendCall::SendMessage {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            text: text.to_string(),
            context: context.cloned(),
        });
        self.next_reply().await
    }

    async fn get_contract_details(
        &self,
        user_id: &str,
        session_id: &str,
        context: &AnalysisContext,
    ) -> ApiResponse<BotReply> {
        self.calls.lock().unwrap().push(BackendCall::ContractDetails {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            context: context.clone(),
        });
        self.next_reply().await
    }
}

/// Presenter capturing replies instead of talking to Telegram.
#[derive(Default)]
pub struct RecordingPresenter {
    replies: Mutex<Vec<(String, Format)>>,
    typing: AtomicUsize,
    failures: AtomicUsize,
}

impl RecordingPresenter {
    /// The next `count` replies fail as if Telegram refused them.
    pub fn failing(count: usize) -> Self {
        Self {
            failures: AtomicUsize::new(count),
            ..Self::default()
        }
    }

    pub fn replies(&self) -> Vec<(String, Format)> {
        self.replies.lock().unwrap().clone()
    }

    pub fn last_reply(&self) -> String {
        self.replies
            .lock()
            .unwrap()
            .last()
            .map(|(text, _)| text.clone())
            .unwrap_or_default()
    }

    pub fn typing_count(&self) -> usize {
        self.typing.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Presenter for RecordingPresenter {
    async fn reply(&self, text: &str, format: Format) -> Result<(), PresenterError> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(teloxide::RequestError::Api(teloxide::ApiError::BotBlocked).into());
        }
        self.replies.lock().unwrap().push((text.to_string(), format));
        Ok(())
    }

    async fn send_typing(&self) -> Result<(), PresenterError> {
        self.typing.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryRepository {
    sessions: Mutex<HashMap<String, Session>>,
    saves: AtomicUsize,
}

impl MemoryRepository {
    pub fn insert(&self, session: Session) {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.user_id.clone(), session);
    }

    pub fn get(&self, user_id: &str) -> Option<Session> {
        self.sessions.lock().unwrap().get(user_id).cloned()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionRepository for MemoryRepository {
    async fn load(&self, user_id: &str) -> Result<Option<Session>, BotStateError> {
        Ok(self.get(user_id))
    }

    async fn save(&self, session: &Session) -> Result<(), BotStateError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        // Round-trip through JSON like the database does.
        let stored: Session = serde_json::from_value(serde_json::to_value(session)?)?;
        self.insert(stored);
        Ok(())
    }
}

pub fn memory_state() -> BotState {
    BotState::new(Arc::new(MemoryRepository::default()))
}

pub fn created(session_id: &str) -> ApiResponse<SessionCreated> {
    ApiResponse::ok(SessionCreated {
        session_id: Some(session_id.to_string()),
        conversation: None,
    })
}

pub fn created_nested(session_id: &str) -> ApiResponse<SessionCreated> {
    ApiResponse::ok(SessionCreated {
        session_id: None,
        conversation: Some(Conversation {
            session_id: Some(session_id.to_string()),
        }),
    })
}

pub fn reply(session_id: Option<&str>, text: &str) -> ApiResponse<BotReply> {
    ApiResponse::ok(BotReply {
        session_id: session_id.map(str::to_string),
        bot_message: Some(ChatEntry {
            bot_message: Some(text.to_string()),
        }),
    })
}
