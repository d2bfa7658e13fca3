//! Client for the agent backend: utterance dispatch, tool calls and
//! conversation history.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{AgentError, error_detail};
use crate::http::{HttpClient, Response, bearer_json};
use crate::models::Message;
use crate::session::SessionProvider;

#[derive(Debug, Serialize)]
struct DispatchRequest<'a> {
    utterance: &'a str,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DispatchReply {
    pub message: String,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
}

#[derive(Debug, Serialize)]
struct ToolRequest<'a> {
    name: &'a str,
    arguments: &'a Value,
}

#[derive(Debug, Deserialize)]
struct ToolReply {
    #[serde(default)]
    result: Value,
}

/// One stored turn: the user's utterance and the agent's answer.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub utterance: Option<String>,
    #[serde(default)]
    pub agent_response: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

pub struct AgentClient {
    http: Arc<dyn HttpClient>,
    base_url: String,
    session: Arc<dyn SessionProvider>,
}

impl AgentClient {
    pub fn new(
        http: Arc<dyn HttpClient>,
        base_url: impl Into<String>,
        session: Arc<dyn SessionProvider>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/agent/{path}", self.base_url)
    }

    // No session means no request at all.
    fn token(&self) -> Result<String, AgentError> {
        self.session
            .current()
            .map(|s| s.access_token)
            .ok_or(AgentError::Unauthenticated)
    }

    fn check_status(response: Response) -> Result<Response, AgentError> {
        match response.status {
            401 => Err(AgentError::Unauthenticated),
            _ if response.is_success() => Ok(response),
            status => Err(AgentError::Server {
                status,
                message: error_detail(&response.body),
            }),
        }
    }

    /// POST /api/agent/dispatch
    pub async fn dispatch(&self, utterance: &str) -> Result<DispatchReply, AgentError> {
        let token = self.token()?;
        let body = serde_json::to_string(&DispatchRequest { utterance })
            .map_err(|e| AgentError::Decode(e.to_string()))?;

        debug!(chars = utterance.len(), "dispatching utterance");
        let response = self
            .http
            .post(&self.url("dispatch"), &body, &bearer_json(&token))
            .await?;
        let response = Self::check_status(response)?;

        response
            .json::<DispatchReply>()
            .map_err(|e| AgentError::Decode(e.to_string()))
    }

    /// POST /api/agent/tool
    pub async fn call_tool(&self, name: &str, arguments: &Value) -> Result<Value, AgentError> {
        let token = self.token()?;
        let body = serde_json::to_string(&ToolRequest { name, arguments })
            .map_err(|e| AgentError::Decode(e.to_string()))?;

        let response = self
            .http
            .post(&self.url("tool"), &body, &bearer_json(&token))
            .await?;
        let response = Self::check_status(response)?;

        // Tools answer with free-form text; an unreadable body is still a success.
        Ok(response
            .json::<ToolReply>()
            .map(|r| r.result)
            .unwrap_or(Value::Null))
    }

    /// GET /api/agent/history, returned in chronological order.
    pub async fn history(&self) -> Result<Vec<Message>, AgentError> {
        let token = self.token()?;
        let response = self
            .http
            .get(&self.url("history"), &bearer_json(&token))
            .await?;
        let response = Self::check_status(response)?;

        let value: Value = response
            .json()
            .map_err(|e| AgentError::Decode(e.to_string()))?;
        let Value::Array(rows) = value else {
            warn!("history endpoint returned a non-array body");
            return Ok(Vec::new());
        };
        let entries: Vec<HistoryEntry> = rows
            .into_iter()
            .filter_map(|row| serde_json::from_value(row).ok())
            .collect();
        Ok(messages_from_history(entries, Utc::now()))
    }
}

/// Rows arrive newest first, one row per turn. Rebuild the conversation
/// oldest first, user turn before assistant turn.
pub fn messages_from_history(entries: Vec<HistoryEntry>, fallback: DateTime<Utc>) -> Vec<Message> {
    let mut messages = Vec::with_capacity(entries.len() * 2);
    for entry in entries.into_iter().rev() {
        let at = entry.timestamp.or(entry.created_at).unwrap_or(fallback);
        if let Some(text) = entry.utterance.filter(|t| !t.is_empty()) {
            messages.push(Message::user(text, at));
        }
        if let Some(text) = entry.agent_response.filter(|t| !t.is_empty()) {
            messages.push(Message::assistant(text, at));
        }
    }
    messages
}
