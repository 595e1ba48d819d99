use std::path::PathBuf;

use ratatui::layout::Rect;
use ratatui::widgets::ListState;
use tally_core::{Config, Session, SessionSnapshot};
use tokio::sync::mpsc::UnboundedSender;

use crate::tui::AppEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    Transcript,
    Suggestions,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub focus: FocusPane,

    // Conversation (owned by the session, mirrored here for drawing)
    pub session: Session,
    pub snapshot: SessionSnapshot,
    pub backend_url: String,

    // Input state
    pub input_cursor: usize, // cursor position in pending input, in chars

    // Transcript state
    pub chat_scroll: u16,
    pub chat_height: u16, // Inner height of transcript, for scroll calculations
    pub follow_tail: bool, // keep the newest message in view

    // Suggestions
    pub suggestion_state: ListState,

    // Status bar message (export results and the like)
    pub status: Option<String>,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Panel areas for mouse hit-testing (updated during render)
    pub chat_area: Option<Rect>,
    pub suggestions_area: Option<Rect>,

    // Lets background tasks report back to the event loop
    pub events: UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(session: Session, config: &Config, events: UnboundedSender<AppEvent>) -> Self {
        let snapshot = session.snapshot();

        let mut suggestion_state = ListState::default();
        if !session.suggestions().is_empty() {
            suggestion_state.select(Some(0));
        }

        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            focus: FocusPane::Transcript,

            session,
            snapshot,
            backend_url: config.backend_url(),

            input_cursor: 0,

            chat_scroll: 0,
            chat_height: 0,
            follow_tail: true,

            suggestion_state,

            status: None,

            animation_frame: 0,

            chat_area: None,
            suggestions_area: None,

            events,
        }
    }

    /// Pull a fresh snapshot after the session reported a change.
    pub fn refresh(&mut self) {
        let previous_len = self.snapshot.conversation.len();
        self.snapshot = self.session.snapshot();

        if self.snapshot.conversation.len() != previous_len || self.snapshot.loading {
            self.follow_tail = true;
        }

        let input_len = self.snapshot.pending_input.chars().count();
        self.input_cursor = self.input_cursor.min(input_len);

        if !self.snapshot.suggestions_visible() && self.focus == FocusPane::Suggestions {
            self.focus = FocusPane::Transcript;
        }
    }

    pub fn pending_input(&self) -> &str {
        &self.snapshot.pending_input
    }

    /// Replace the draft and mirror it locally so the next keystroke sees it.
    pub fn set_input(&mut self, text: String, cursor: usize) {
        self.session.set_pending_input(&text);
        self.snapshot.pending_input = text;
        self.input_cursor = cursor;
    }

    /// Submit the current draft on a background task.
    pub fn submit_input(&mut self) {
        let text = self.snapshot.pending_input.clone();
        if text.trim().is_empty() || self.snapshot.loading {
            return;
        }
        self.input_cursor = 0;
        self.input_mode = InputMode::Normal;
        self.follow_tail = true;

        let session = self.session.clone();
        tokio::spawn(async move {
            session.submit_query(&text).await;
        });
    }

    pub fn select_suggestion(&mut self) {
        let Some(index) = self.suggestion_state.selected() else {
            return;
        };
        self.focus = FocusPane::Transcript;
        self.follow_tail = true;

        let session = self.session.clone();
        tokio::spawn(async move {
            session.select_suggestion(index).await;
        });
    }

    pub fn export_latest_table(&mut self) {
        let session = self.session.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = match session.export_latest_table().await {
                None => Err("No table to export yet".to_string()),
                Some(Ok(path)) => Ok(path),
                Some(Err(err)) => Err(err.to_string()),
            };
            let _ = events.send(AppEvent::Exported(result));
        });
    }

    pub fn report_export(&mut self, result: Result<PathBuf, String>) {
        self.status = Some(match result {
            Ok(path) => format!("Table saved to {}", path.display()),
            Err(err) => err,
        });
    }

    pub fn suggestions_visible(&self) -> bool {
        self.snapshot.suggestions_visible() && !self.session.suggestions().is_empty()
    }

    pub fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            FocusPane::Transcript if self.suggestions_visible() => FocusPane::Suggestions,
            _ => FocusPane::Transcript,
        };
    }

    pub fn suggestion_nav_down(&mut self) {
        let len = self.session.suggestions().len();
        if len > 0 {
            let i = self.suggestion_state.selected().map_or(0, |i| (i + 1).min(len - 1));
            self.suggestion_state.select(Some(i));
        }
    }

    pub fn suggestion_nav_up(&mut self) {
        if let Some(i) = self.suggestion_state.selected() {
            self.suggestion_state.select(Some(i.saturating_sub(1)));
        }
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.follow_tail = false;
        self.chat_scroll = self.chat_scroll.saturating_add(lines);
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.follow_tail = false;
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    pub fn scroll_to_top(&mut self) {
        self.follow_tail = false;
        self.chat_scroll = 0;
    }

    pub fn scroll_to_bottom(&mut self) {
        self.follow_tail = true;
    }

    pub fn half_page(&self) -> u16 {
        (self.chat_height / 2).max(1)
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.snapshot.loading {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }
}
