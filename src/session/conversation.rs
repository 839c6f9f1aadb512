//! Conversation and conversation store.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::message::Message;
use crate::pipeline::TurnOutput;
use crate::providers::ModelFamily;
use crate::tidy::{filter_for, tidy_history};

/// A single conversation.
///
/// Cloning is cheap; clones share the same message list.
#[derive(Debug)]
pub struct Conversation {
    inner: Arc<ConversationInner>,
}

#[derive(Debug)]
struct ConversationInner {
    id: String,
    messages: RwLock<Vec<Message>>,
    created_at: DateTime<Utc>,
    last_activity: RwLock<DateTime<Utc>>,
}

/// Serializable snapshot of a [`Conversation`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub id: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Serialize for Conversation {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_state().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Conversation {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        ConversationState::deserialize(deserializer).map(Conversation::from_state)
    }
}

impl Clone for Conversation {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Conversation {
    fn new(id: String) -> Self {
        let now = Utc::now();
        Self {
            inner: Arc::new(ConversationInner {
                id,
                messages: RwLock::new(Vec::new()),
                created_at: now,
                last_activity: RwLock::new(now),
            }),
        }
    }

    #[must_use]
    pub fn to_state(&self) -> ConversationState {
        ConversationState {
            id: self.inner.id.clone(),
            messages: self.messages(),
            created_at: self.inner.created_at,
            last_activity: self.last_activity(),
        }
    }

    #[must_use]
    pub fn from_state(state: ConversationState) -> Self {
        Self {
            inner: Arc::new(ConversationInner {
                id: state.id,
                messages: RwLock::new(state.messages),
                created_at: state.created_at,
                last_activity: RwLock::new(state.last_activity),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    #[must_use]
    pub fn last_activity(&self) -> DateTime<Utc> {
        *self
            .inner
            .last_activity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a plain user turn.
    pub fn add_user_message(&self, text: impl Into<String>) -> Message {
        let message = Message::user(text);
        self.add_message(message.clone());
        message
    }

    /// Append an assistant turn produced by the pipeline.
    ///
    /// The stored message carries the turn's display text and native content.
    pub fn add_assistant_turn(&self, family: ModelFamily, turn: &TurnOutput) -> Message {
        let content = turn.full_content.clone();
        if content.family() != family {
            tracing::warn!(
                conversation_id = %self.inner.id,
                family = %family,
                content_family = %content.family(),
                "Assistant turn content belongs to another family"
            );
        }
        let mut message = Message::assistant(content);
        message.model_family = Some(family);
        if let Some(error) = &turn.error {
            tracing::debug!(
                conversation_id = %self.inner.id,
                reason = %error.message,
                "Storing partial assistant turn"
            );
        }
        self.add_message(message.clone());
        message
    }

    /// Append any message, such as a tool-result turn.
    pub fn add_message(&self, message: Message) {
        self.inner
            .messages
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
        self.touch();
    }

    /// A snapshot of all messages, oldest first.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.inner
            .messages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn message_count(&self) -> usize {
        self.inner
            .messages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Tidy the history around `checkpoint_id` and store the result.
    ///
    /// Returns the number of messages dropped.
    pub fn tidy(
        &self,
        checkpoint_id: Option<&str>,
        removed_tool_names: &HashSet<String>,
        family: ModelFamily,
    ) -> usize {
        let mut guard = self
            .inner
            .messages
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let tidied = tidy_history(
            &guard,
            checkpoint_id,
            removed_tool_names,
            family,
            filter_for(family),
        );
        let dropped = guard.len().saturating_sub(tidied.len());
        *guard = tidied;
        drop(guard);
        self.touch();

        tracing::info!(
            conversation_id = %self.inner.id,
            family = %family,
            dropped,
            "Conversation tidied"
        );
        dropped
    }

    fn touch(&self) {
        *self
            .inner
            .last_activity
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Utc::now();
    }
}

/// Thread-safe store of conversations.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    inner: Arc<ConversationStoreInner>,
}

#[derive(Debug)]
struct ConversationStoreInner {
    conversations: RwLock<HashMap<String, Conversation>>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ConversationStoreInner {
                conversations: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Create a conversation with a fresh UUID.
    #[must_use]
    pub fn create(&self) -> Conversation {
        self.create_with_id(Uuid::new_v4().to_string())
    }

    /// Create a conversation with a specific id, replacing any existing one.
    #[must_use]
    pub fn create_with_id(&self, id: impl Into<String>) -> Conversation {
        let id = id.into();
        let conversation = Conversation::new(id.clone());
        self.inner
            .conversations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, conversation.clone());
        conversation
    }

    /// Restore a previously serialized conversation.
    pub fn insert(&self, conversation: Conversation) {
        self.inner
            .conversations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(conversation.id().to_string(), conversation);
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Conversation> {
        self.inner
            .conversations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Get a conversation, creating it if absent.
    #[must_use]
    pub fn get_or_create(&self, id: &str) -> Conversation {
        let mut guard = self
            .inner
            .conversations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        guard
            .entry(id.to_string())
            .or_insert_with(|| Conversation::new(id.to_string()))
            .clone()
    }

    pub fn delete(&self, id: &str) -> Option<Conversation> {
        self.inner
            .conversations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    /// Conversation ids, most recently active first.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        let guard = self
            .inner
            .conversations
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<_> = guard
            .values()
            .map(|c| (c.last_activity(), c.id().to_string()))
            .collect();
        entries.sort_by(|a, b| b.cmp(a));
        entries.into_iter().map(|(_, id)| id).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .conversations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
