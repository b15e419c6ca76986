use serde::{Deserialize, Serialize};

/// Uniform result envelope of every backend operation.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub status_code: Option<u16>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            status_code: None,
        }
    }

    pub fn failure(error: impl Into<String>, status_code: Option<u16>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            status_code,
        }
    }

    /// Success only when the backend says so and actually returned data.
    pub fn into_result(self) -> Result<T, String> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            _ => Err(self
                .error
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| "Unknown error".to_string())),
        }
    }
}

/// Error body returned with non-2xx statuses.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ErrorBody {
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest<'a> {
    pub user_id: &'a str,
    pub title: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest<'a> {
    pub user_id: &'a str,
    pub session_id: &'a str,
    pub user_message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<&'a str>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractRequest<'a> {
    pub user_id: &'a str,
    pub session_id: &'a str,
    pub contract_address: &'a str,
    pub chain_id: &'a str,
}

/// Conversation record echoed by session creation; only its id is read.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub session_id: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreated {
    pub session_id: Option<String>,
    pub conversation: Option<Conversation>,
}

impl SessionCreated {
    /// The top-level id wins; the conversation's own id is the fallback.
    pub fn session_id(&self) -> Option<&str> {
        non_empty(self.session_id.as_deref()).or_else(|| {
            self.conversation
                .as_ref()
                .and_then(|c| non_empty(c.session_id.as_deref()))
        })
    }
}

/// Stored bot side of an exchange.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatEntry {
    pub bot_message: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BotReply {
    pub session_id: Option<String>,
    pub bot_message: Option<ChatEntry>,
}

impl BotReply {
    pub fn session_id(&self) -> Option<&str> {
        non_empty(self.session_id.as_deref())
    }

    pub fn text(&self) -> Option<&str> {
        self.bot_message
            .as_ref()
            .and_then(|m| non_empty(m.bot_message.as_deref()))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
