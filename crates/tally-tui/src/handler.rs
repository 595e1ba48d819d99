use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use tally_core::Chord;

use crate::app::{App, FocusPane, InputMode};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for safe string slicing
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Modified character keys become chords for the session's shortcut table.
fn chord_from_key(key: &KeyEvent) -> Option<Chord> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let alt = key.modifiers.contains(KeyModifiers::ALT);
    match key.code {
        KeyCode::Char(c) if ctrl || alt => Some(Chord {
            key: c,
            ctrl,
            alt,
            shift: key.modifiers.contains(KeyModifiers::SHIFT),
        }),
        _ => None,
    }
}

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => {
            app.tick_animation();
        }
        AppEvent::SessionChanged => {
            app.refresh();
        }
        AppEvent::Exported(result) => {
            app.report_export(result);
        }
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    // Bound chords are consumed before the focused widget sees them
    if let Some(chord) = chord_from_key(&key) {
        if app.session.handle_chord(chord) {
            app.status = None;
            app.input_cursor = 0;
            app.refresh();
            return;
        }
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    if app.focus == FocusPane::Suggestions {
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => {
                app.suggestion_nav_down();
                return;
            }
            KeyCode::Char('k') | KeyCode::Up => {
                app.suggestion_nav_up();
                return;
            }
            KeyCode::Enter => {
                app.select_suggestion();
                return;
            }
            _ => {}
        }
    }

    match key.code {
        KeyCode::Char('q') => {
            app.should_quit = true;
        }
        KeyCode::Char('i') | KeyCode::Enter => {
            if !app.snapshot.loading {
                app.input_mode = InputMode::Editing;
                app.input_cursor = app.pending_input().chars().count();
            }
        }
        KeyCode::Tab => {
            app.toggle_focus();
        }
        KeyCode::Char('e') => {
            app.export_latest_table();
        }
        KeyCode::Char('j') | KeyCode::Down => {
            app.scroll_down(1);
        }
        KeyCode::Char('k') | KeyCode::Up => {
            app.scroll_up(1);
        }
        KeyCode::PageDown => {
            let page = app.half_page();
            app.scroll_down(page);
        }
        KeyCode::PageUp => {
            let page = app.half_page();
            app.scroll_up(page);
        }
        KeyCode::Char('g') | KeyCode::Home => {
            app.scroll_to_top();
        }
        KeyCode::Char('G') | KeyCode::End => {
            app.scroll_to_bottom();
        }
        KeyCode::Esc => {
            app.status = None;
        }
        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    if key.code == KeyCode::Esc {
        app.input_mode = InputMode::Normal;
        return;
    }

    // Input is disabled while a query is in flight
    if app.snapshot.loading {
        return;
    }

    let input = app.pending_input().to_string();
    let cursor = app.input_cursor;
    let char_count = input.chars().count();

    match key.code {
        KeyCode::Enter => {
            app.submit_input();
        }
        KeyCode::Backspace => {
            if cursor > 0 {
                let mut text = input;
                text.remove(char_to_byte_index(&text, cursor - 1));
                app.set_input(text, cursor - 1);
            }
        }
        KeyCode::Delete => {
            if cursor < char_count {
                let mut text = input;
                text.remove(char_to_byte_index(&text, cursor));
                app.set_input(text, cursor);
            }
        }
        KeyCode::Left => {
            app.input_cursor = cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            app.input_cursor = (cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.input_cursor = 0;
        }
        KeyCode::End => {
            app.input_cursor = char_count;
        }
        // Unbound Ctrl/Alt chords are not text
        KeyCode::Char(c) if !key.modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) => {
            let mut text = input;
            text.insert(char_to_byte_index(&text, cursor), c);
            app.set_input(text, cursor + 1);
        }
        _ => {}
    }
}

fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let x = mouse.column;
    let y = mouse.row;

    let in_chat = app.chat_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);
    let suggestions = app.suggestions_area.filter(|r| point_in_rect(x, y, *r));

    match mouse.kind {
        MouseEventKind::ScrollDown => {
            if suggestions.is_some() {
                app.suggestion_nav_down();
            } else if in_chat {
                app.scroll_down(3);
            }
        }
        MouseEventKind::ScrollUp => {
            if suggestions.is_some() {
                app.suggestion_nav_up();
            } else if in_chat {
                app.scroll_up(3);
            }
        }
        MouseEventKind::Down(MouseButton::Left) => {
            // Rows inside the bordered list map onto suggestion indices
            if let Some(area) = suggestions {
                if y > area.y && y + 1 < area.y + area.height {
                    let index = (y - area.y - 1) as usize + app.suggestion_state.offset();
                    if index < app.session.suggestions().len() {
                        app.suggestion_state.select(Some(index));
                        app.select_suggestion();
                    }
                }
            }
        }
        _ => {}
    }
}
