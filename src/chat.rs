// Conversation state for the web UI chat.
//
// Each caller's history lives in a `Conversation`, keyed by session id in a
// `SessionStore`. Handlers lock the store only long enough to mutate or
// snapshot a conversation; the lock is never held across upstream I/O.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One entry of a conversation, serialized exactly as the upstream API expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Ordered message history whose first entry is always the system prompt.
#[derive(Debug, Clone)]
pub struct Conversation {
    system_prompt: String,
    messages: Vec<Message>,
    max_history: Option<usize>,
}

impl Conversation {
    /// A bound of 0 is raised to 1 so the newest message always survives.
    pub fn new(system_prompt: impl Into<String>, max_history: Option<usize>) -> Self {
        let system_prompt = system_prompt.into();
        Self {
            messages: vec![Message::system(system_prompt.clone())],
            system_prompt,
            max_history: max_history.map(|n| n.max(1)),
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.evict();
    }

    /// Back to the single system message.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.messages.push(Message::system(self.system_prompt.clone()));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    // Drops the oldest non-system messages past the cap. Index 0 is the system prompt.
    fn evict(&mut self) {
        let Some(max) = self.max_history else {
            return;
        };
        let excess = (self.messages.len() - 1).saturating_sub(max);
        if excess > 0 {
            self.messages.drain(1..=excess);
            debug!(dropped = excess, "Evicted old messages from conversation");
        }
    }
}

/// All live conversations, shared between handlers.
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<Mutex<HashMap<String, Conversation>>>,
    system_prompt: String,
    max_history: Option<usize>,
}

impl SessionStore {
    pub fn new(system_prompt: impl Into<String>, max_history: Option<usize>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            system_prompt: system_prompt.into(),
            max_history,
        }
    }

    /// Append the user's message and return the history to send upstream.
    pub async fn begin_turn(&self, session_id: &str, user_message: &str) -> Vec<Message> {
        let mut sessions = self.inner.lock().await;
        let conversation = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Conversation::new(self.system_prompt.clone(), self.max_history));
        conversation.push(Message::user(user_message));
        conversation.messages().to_vec()
    }

    /// Store the assembled reply. Blank replies are not stored.
    pub async fn finish_turn(&self, session_id: &str, reply: String) -> bool {
        if reply.trim().is_empty() {
            return false;
        }
        let mut sessions = self.inner.lock().await;
        let conversation = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Conversation::new(self.system_prompt.clone(), self.max_history));
        conversation.push(Message::assistant(reply));
        true
    }

    pub async fn clear(&self, session_id: &str) {
        let mut sessions = self.inner.lock().await;
        match sessions.get_mut(session_id) {
            Some(conversation) => conversation.reset(),
            None => {
                sessions.insert(
                    session_id.to_string(),
                    Conversation::new(self.system_prompt.clone(), self.max_history),
                );
            }
        }
    }

    /// Copy of a session's history; a fresh conversation if the session is unknown.
    pub async fn history(&self, session_id: &str) -> Vec<Message> {
        let sessions = self.inner.lock().await;
        match sessions.get(session_id) {
            Some(conversation) => conversation.messages().to_vec(),
            None => vec![Message::system(self.system_prompt.clone())],
        }
    }
}
