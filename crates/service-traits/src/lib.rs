//! Collaborator interfaces consumed by bot handlers.
//!
//! Each trait has a `Noop` implementation so a bot can be wired and run
//! before the real backends are available.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    serde_json::Value,
    teloxide::types::{ChatId, MessageId},
    tracing::{debug, warn},
    uuid::Uuid,
};

/// Error type returned by collaborator methods.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{message}")]
    Message { message: String },
    #[error("{0}")]
    Serde(#[from] serde_json::Error),
    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ServiceError {
    #[must_use]
    pub fn message(message: impl std::fmt::Display) -> Self {
        Self::Message {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

impl From<String> for ServiceError {
    fn from(value: String) -> Self {
        Self::message(value)
    }
}

impl From<&str> for ServiceError {
    fn from(value: &str) -> Self {
        Self::message(value)
    }
}

pub type ServiceResult<T = ()> = Result<T, ServiceError>;

// ── Chat client ─────────────────────────────────────────────────────────────

/// How the platform should interpret outbound text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkupMode {
    #[default]
    Plain,
    Html,
    MarkdownV2,
}

/// An inline keyboard button that reports `callback_data` when pressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyboardButton {
    pub text: String,
    pub callback_data: String,
}

impl KeyboardButton {
    #[must_use]
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: callback_data.into(),
        }
    }
}

/// A message to deliver to one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub recipient: ChatId,
    pub text: String,
    pub markup: MarkupMode,
    pub reply_to: Option<MessageId>,
    /// Rows of inline buttons; empty for none.
    pub keyboard: Vec<Vec<KeyboardButton>>,
}

impl OutboundMessage {
    #[must_use]
    pub fn text(recipient: ChatId, text: impl Into<String>) -> Self {
        Self {
            recipient,
            text: text.into(),
            markup: MarkupMode::Plain,
            reply_to: None,
            keyboard: Vec::new(),
        }
    }

    #[must_use]
    pub fn html(recipient: ChatId, text: impl Into<String>) -> Self {
        Self {
            markup: MarkupMode::Html,
            ..Self::text(recipient, text)
        }
    }

    #[must_use]
    pub fn reply_to(mut self, message_id: MessageId) -> Self {
        self.reply_to = Some(message_id);
        self
    }

    #[must_use]
    pub fn keyboard_row(mut self, row: Vec<KeyboardButton>) -> Self {
        self.keyboard.push(row);
        self
    }
}

/// Replacement content for an already delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditMessage {
    pub recipient: ChatId,
    pub message_id: MessageId,
    pub text: String,
    pub markup: MarkupMode,
    pub keyboard: Vec<Vec<KeyboardButton>>,
}

/// Identity of a message the platform accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentMessage {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotCommand {
    pub command: String,
    pub description: String,
}

impl BotCommand {
    #[must_use]
    pub fn new(command: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            description: description.into(),
        }
    }
}

/// Outbound chat operations available to business handlers.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn send(&self, message: OutboundMessage) -> ServiceResult<SentMessage>;
    async fn edit(&self, edit: EditMessage) -> ServiceResult<SentMessage>;
    async fn set_commands(&self, commands: Vec<BotCommand>) -> ServiceResult;
}

pub struct NoopChatClient;

#[async_trait]
impl ChatClient for NoopChatClient {
    async fn send(&self, message: OutboundMessage) -> ServiceResult<SentMessage> {
        warn!(chat_id = message.recipient.0, "chat client not configured, dropping message");
        Err("chat client not configured".into())
    }

    async fn edit(&self, edit: EditMessage) -> ServiceResult<SentMessage> {
        warn!(chat_id = edit.recipient.0, "chat client not configured, dropping edit");
        Err("chat client not configured".into())
    }

    async fn set_commands(&self, _commands: Vec<BotCommand>) -> ServiceResult {
        Ok(())
    }
}

// ── Durable workflows ───────────────────────────────────────────────────────

/// Request to start a workflow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStart {
    pub workflow_id: String,
    pub workflow_type: String,
    pub task_queue: String,
    #[serde(default)]
    pub input: Value,
}

/// A started workflow execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub workflow_id: String,
    pub run_id: String,
}

/// Commands this bot issues to a durable-execution engine. Durability,
/// retries and recovery are the engine's responsibility.
#[async_trait]
pub trait WorkflowClient: Send + Sync {
    async fn start(&self, request: WorkflowStart) -> ServiceResult<WorkflowRun>;

    async fn signal(&self, run: &WorkflowRun, signal: &str, payload: Value) -> ServiceResult;

    /// Complete an activity that is waiting on an external event, identified
    /// by the opaque task token the engine handed out.
    async fn complete_activity(&self, task_token: &[u8], result: Value) -> ServiceResult;
}

pub struct NoopWorkflowClient;

#[async_trait]
impl WorkflowClient for NoopWorkflowClient {
    async fn start(&self, _request: WorkflowStart) -> ServiceResult<WorkflowRun> {
        Err("workflow engine not configured".into())
    }

    async fn signal(&self, _run: &WorkflowRun, _signal: &str, _payload: Value) -> ServiceResult {
        Err("workflow engine not configured".into())
    }

    async fn complete_activity(&self, _task_token: &[u8], _result: Value) -> ServiceResult {
        Err("workflow engine not configured".into())
    }
}

// ── Activity tokens ─────────────────────────────────────────────────────────

/// Parks activity task tokens behind short ids that fit in callback data.
pub trait ActivityTokenStore: Send + Sync {
    fn store(&self, token: Vec<u8>) -> Uuid;

    /// Remove and return the token; `None` if unknown or already taken.
    fn pop(&self, id: &Uuid) -> Option<Vec<u8>>;
}

#[derive(Default)]
pub struct InMemoryActivityTokenStore {
    tokens: Mutex<HashMap<Uuid, Vec<u8>>>,
}

impl InMemoryActivityTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn shared() -> Arc<dyn ActivityTokenStore> {
        Arc::new(Self::new())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ActivityTokenStore for InMemoryActivityTokenStore {
    fn store(&self, token: Vec<u8>) -> Uuid {
        let id = Uuid::new_v4();
        self.tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, token);
        debug!(%id, "stored activity token");
        id
    }

    fn pop(&self, id: &Uuid) -> Option<Vec<u8>> {
        self.tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
    }
}
