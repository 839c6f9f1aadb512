//! Conversation storage.
//!
//! In-memory store that owns persisted messages. Assistant turns are appended
//! straight from [`crate::pipeline::TurnOutput`], and history tidying replaces
//! the stored list with the filtered copy.
//!
//! # Architecture
//!
//! - [`Conversation`]: a single conversation's messages
//! - [`ConversationStore`]: thread-safe store of all conversations
//!
//! # Example
//!
//! ```rust
//! use unistream::session::ConversationStore;
//!
//! let store = ConversationStore::new();
//! let conversation = store.create();
//! conversation.add_user_message("Hello!");
//!
//! let messages = conversation.messages();
//! assert_eq!(messages.len(), 1);
//! ```

mod conversation;

pub use conversation::{Conversation, ConversationState, ConversationStore};
