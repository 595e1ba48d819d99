//! UI-agnostic session state
//!
//! Holds the conversation store plus the `loading`/`pending_input` pair.
//! Front-ends read snapshots and subscribe for changes; they never own any of
//! this state themselves.

use tokio::sync::watch;

use crate::store::{Conversation, ConversationStore};

/// Whether a query is outstanding. At most one may be in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flight {
    #[default]
    Idle,
    Awaiting,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Status {
    pub flight: Flight,
    pub pending_input: String,
}

/// Everything a front-end needs to draw one frame.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub conversation: Conversation,
    pub loading: bool,
    pub pending_input: String,
}

impl SessionSnapshot {
    /// Suggestions show only on a fresh (or cleared) conversation while idle.
    pub fn suggestions_visible(&self) -> bool {
        self.conversation.len() <= 1 && !self.loading
    }
}

pub struct SessionState {
    store: ConversationStore,
    status: watch::Sender<Status>,
}

impl SessionState {
    pub fn new(greeting: impl Into<String>) -> Self {
        let (status, _rx) = watch::channel(Status::default());
        Self {
            store: ConversationStore::new(greeting),
            status,
        }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn is_loading(&self) -> bool {
        self.status.borrow().flight == Flight::Awaiting
    }

    /// Move Idle -> Awaiting. Returns `None` if a query is already in flight.
    ///
    /// The returned guard moves back to Idle when dropped, so every exit
    /// path of the caller releases the flight.
    pub fn begin_flight(&self) -> Option<FlightGuard<'_>> {
        let started = self.status.send_if_modified(|status| {
            if status.flight == Flight::Idle {
                status.flight = Flight::Awaiting;
                true
            } else {
                false
            }
        });
        started.then_some(FlightGuard {
            status: &self.status,
        })
    }

    pub fn set_pending_input(&self, text: &str) {
        self.status.send_if_modified(|status| {
            if status.pending_input == text {
                false
            } else {
                status.pending_input = text.to_string();
                true
            }
        });
    }

    pub fn clear_pending_input(&self) {
        self.set_pending_input("");
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let status = self.status.borrow().clone();
        SessionSnapshot {
            conversation: self.store.snapshot(),
            loading: status.flight == Flight::Awaiting,
            pending_input: status.pending_input,
        }
    }

    pub fn subscribe(&self) -> SessionWatcher {
        SessionWatcher {
            conversation: self.store.subscribe(),
            status: self.status.subscribe(),
        }
    }
}

/// Holds the session in [`Flight::Awaiting`] for as long as it lives.
#[must_use = "dropping the guard ends the flight immediately"]
pub struct FlightGuard<'a> {
    status: &'a watch::Sender<Status>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.status.send_modify(|status| status.flight = Flight::Idle);
    }
}

/// Push notification for any change to the transcript or status.
pub struct SessionWatcher {
    conversation: watch::Receiver<Conversation>,
    status: watch::Receiver<Status>,
}

impl SessionWatcher {
    /// Wait for the next change. Returns `false` once the session is gone.
    pub async fn changed(&mut self) -> bool {
        tokio::select! {
            res = self.conversation.changed() => {
                self.conversation.borrow_and_update();
                res.is_ok()
            }
            res = self.status.changed() => {
                self.status.borrow_and_update();
                res.is_ok()
            }
        }
    }
}
