//! The surface a front-end drives: submit, reset, clear, suggestions and
//! shortcut chords, plus snapshots and change subscription.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::backend::HttpBackend;
use crate::classifier::ReplyClassifier;
use crate::config::Config;
use crate::dispatcher::{Dispatcher, Submission};
use crate::download::{export_table, DownloadDir};
use crate::error::DownloadError;
use crate::message::Payload;
use crate::state::{SessionSnapshot, SessionState, SessionWatcher};

/// A key plus modifiers, independent of any terminal or GUI toolkit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chord {
    pub key: char,
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
}

impl Chord {
    pub const fn ctrl(key: char) -> Self {
        Self {
            key,
            ctrl: true,
            alt: false,
            shift: false,
        }
    }

    fn matches(&self, other: &Chord) -> bool {
        self.key.eq_ignore_ascii_case(&other.key)
            && self.ctrl == other.ctrl
            && self.alt == other.alt
            && self.shift == other.shift
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortcutAction {
    ResetSession,
    ClearSession,
}

pub const SHORTCUTS: &[(Chord, ShortcutAction)] = &[
    (Chord::ctrl('r'), ShortcutAction::ResetSession),
    (Chord::ctrl('l'), ShortcutAction::ClearSession),
];

pub fn shortcut_for(chord: &Chord) -> Option<ShortcutAction> {
    SHORTCUTS
        .iter()
        .find(|(bound, _)| bound.matches(chord))
        .map(|(_, action)| *action)
}

struct Inner {
    state: SessionState,
    dispatcher: Dispatcher,
    suggestions: Vec<String>,
}

/// Cheap to clone; clones share one conversation.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    pub fn new(greeting: impl Into<String>, suggestions: Vec<String>, dispatcher: Dispatcher) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: SessionState::new(greeting),
                dispatcher,
                suggestions,
            }),
        }
    }

    /// Wire up the HTTP backend and download directory from `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let backend = HttpBackend::new(&config.backend_url(), config.request_timeout())?;
        let sink = DownloadDir::new(config.download_dir());
        let dispatcher = Dispatcher::new(Arc::new(backend), Arc::new(sink), ReplyClassifier::new()?);
        Ok(Self::new(config.greeting(), config.suggestions(), dispatcher))
    }

    pub async fn submit_query(&self, text: &str) -> Submission {
        self.inner
            .dispatcher
            .submit_query(&self.inner.state, text)
            .await
    }

    pub fn reset_session(&self) {
        info!("resetting session");
        self.inner.state.store().reset();
        self.inner.state.clear_pending_input();
    }

    pub fn clear_session(&self) {
        info!("clearing session");
        self.inner.state.store().clear();
        self.inner.state.clear_pending_input();
    }

    pub fn set_pending_input(&self, text: &str) {
        self.inner.state.set_pending_input(text);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.state.snapshot()
    }

    pub fn subscribe(&self) -> SessionWatcher {
        self.inner.state.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state.is_loading()
    }

    pub fn suggestions(&self) -> &[String] {
        &self.inner.suggestions
    }

    pub fn suggestions_visible(&self) -> bool {
        self.snapshot().suggestions_visible()
    }

    /// Submit the suggestion at `index` exactly as if it had been typed.
    pub async fn select_suggestion(&self, index: usize) -> Option<Submission> {
        let text = self.inner.suggestions.get(index)?.clone();
        Some(self.submit_query(&text).await)
    }

    /// Run the action bound to `chord`. Returns `true` when the chord was
    /// consumed and the caller must not handle it further.
    pub fn handle_chord(&self, chord: Chord) -> bool {
        match shortcut_for(&chord) {
            Some(ShortcutAction::ResetSession) => {
                self.reset_session();
                true
            }
            Some(ShortcutAction::ClearSession) => {
                self.clear_session();
                true
            }
            None => false,
        }
    }

    /// Save the most recent table in the transcript as CSV.
    ///
    /// Returns `None` when there is no table to export.
    pub async fn export_latest_table(&self) -> Option<Result<PathBuf, DownloadError>> {
        let conversation = self.inner.state.store().snapshot();
        let (index, table) = conversation
            .messages()
            .iter()
            .enumerate()
            .rev()
            .find_map(|(i, msg)| match &msg.payload {
                Payload::Table(table) => Some((i, table.clone())),
                _ => None,
            })?;
        Some(export_table(self.inner.dispatcher.sink(), &table, index).await)
    }
}
