//! Ordered conversation history with change notification.
//!
//! The store is append-only apart from two whole-sequence transitions:
//! `reset` (back to the seed greeting) and `clear` (empty). Every mutation is
//! published on a `watch` channel so subscribers re-render without polling.

use std::sync::Arc;

use tokio::sync::watch;

use crate::message::{to_backend_history, HistoryEntry, Message};

/// The transcript as published to subscribers.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Arc<Vec<Message>>,
    /// Whether `messages[0]` is the seed greeting.
    seeded: bool,
}

impl Conversation {
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// History sent with the next query. The seed greeting is a synthetic
    /// bootstrap line and is never fed back to the backend.
    pub fn history_for_backend(&self) -> Vec<HistoryEntry> {
        let start = usize::from(self.seeded && !self.messages.is_empty());
        to_backend_history(&self.messages[start..])
    }
}

pub struct ConversationStore {
    greeting: String,
    tx: watch::Sender<Conversation>,
}

impl ConversationStore {
    /// New store holding only the seed greeting.
    pub fn new(greeting: impl Into<String>) -> Self {
        let greeting = greeting.into();
        let (tx, _rx) = watch::channel(Self::seeded(&greeting));
        Self { greeting, tx }
    }

    fn seeded(greeting: &str) -> Conversation {
        Conversation {
            messages: Arc::new(vec![Message::assistant(greeting)]),
            seeded: true,
        }
    }

    pub fn append(&self, message: Message) {
        self.tx.send_modify(|conversation| {
            Arc::make_mut(&mut conversation.messages).push(message);
        });
    }

    /// Read-only view of the current transcript.
    pub fn snapshot(&self) -> Conversation {
        self.tx.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.borrow().is_empty()
    }

    pub fn history_for_backend(&self) -> Vec<HistoryEntry> {
        self.tx.borrow().history_for_backend()
    }

    /// Drop everything and reseed the greeting.
    pub fn reset(&self) {
        let seeded = Self::seeded(&self.greeting);
        self.tx.send_replace(seeded);
    }

    /// Drop everything, leaving an empty transcript.
    pub fn clear(&self) {
        self.tx.send_replace(Conversation::default());
    }

    pub fn subscribe(&self) -> watch::Receiver<Conversation> {
        self.tx.subscribe()
    }
}
