use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::path::PathBuf;

use crate::app::{App, InputMode, Screen};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string edits.
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Resize => {}
        AppEvent::Tick => app.tick_animation(),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Works in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    app.status = None;

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    // Screen switching mirrors the tab bar: one key per screen.
    match key.code {
        KeyCode::Char('q') => {
            app.should_quit = true;
            return;
        }
        KeyCode::Char('1') => {
            app.screen = Screen::Chat;
            return;
        }
        KeyCode::Char('2') => {
            app.screen = Screen::Organizations;
            return;
        }
        KeyCode::Char('3') => {
            app.screen = Screen::Documents;
            return;
        }
        KeyCode::Tab => {
            app.screen = match app.screen {
                Screen::Chat => Screen::Organizations,
                Screen::Organizations => Screen::Documents,
                Screen::Documents => Screen::Chat,
            };
            return;
        }
        _ => {}
    }

    match app.screen {
        Screen::Chat => handle_chat_normal(app, key),
        Screen::Organizations => handle_organizations_normal(app, key),
        Screen::Documents => handle_documents_normal(app, key),
    }
}

fn handle_chat_normal(app: &mut App, key: KeyEvent) {
    if app.show_chat_picker {
        match key.code {
            KeyCode::Esc | KeyCode::Char('m') => app.show_chat_picker = false,
            KeyCode::Char('j') | KeyCode::Down => app.chat_nav_down(),
            KeyCode::Char('k') | KeyCode::Up => app.chat_nav_up(),
            KeyCode::Enter => {
                if let Some(chat) = app.selected_chat().cloned() {
                    app.select_chat(chat);
                }
            }
            KeyCode::Char('n') => {
                if let Some(org) = app.organization.as_ref() {
                    app.create_chat(org.id);
                }
            }
            _ => {}
        }
        return;
    }

    match key.code {
        KeyCode::Char('i') => {
            if app.chat.is_some() {
                app.input_mode = InputMode::Editing;
            }
        }
        KeyCode::Char('m') => {
            if let Some(org) = app.organization.as_ref() {
                // Refresh the list on open, like the picker in the chat header.
                app.fetch_chats(org.id, false);
                app.show_chat_picker = true;
            }
        }
        KeyCode::Char('n') => {
            if let Some(org) = app.organization.as_ref() {
                app.create_chat(org.id);
            }
        }
        KeyCode::Char('r') => {
            if let Some(chat) = app.chat.as_ref() {
                app.fetch_messages(chat.id);
            }
        }
        KeyCode::Char('j') | KeyCode::Down => app.scroll_chat_down(),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_chat_up(),
        _ => {}
    }
}

fn handle_organizations_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.organization_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.organization_nav_up(),
        KeyCode::Enter => {
            if let Some(org) = app.selected_organization().cloned() {
                app.select_organization(org);
            }
        }
        KeyCode::Char('i') => app.input_mode = InputMode::Editing,
        KeyCode::Char('r') => app.fetch_organizations(),
        _ => {}
    }
}

fn handle_documents_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.document_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.document_nav_up(),
        KeyCode::Char('r') => {
            if let Some(org) = app.organization.as_ref() {
                app.fetch_documents(org.id);
            }
        }
        KeyCode::Char('u') => {
            if app.organization.is_some() {
                app.show_upload_input = true;
                app.input_mode = InputMode::Editing;
            }
        }
        KeyCode::Char('d') => {
            if let (Some(org), Some(doc)) = (app.organization.as_ref(), app.selected_document()) {
                let (org_id, doc_id) = (org.id, doc.id);
                app.delete_document(org_id, doc_id);
            }
        }
        KeyCode::Char('s') => {
            if let Some(doc) = app.selected_document() {
                let (id, name) = (doc.id, doc.name.clone());
                app.download_document(id, name);
            }
        }
        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
            app.show_upload_input = false;
        }
        KeyCode::Enter => submit_input(app),
        _ => {
            let (input, cursor) = editing_target(app);
            edit_input(input, cursor, key.code);
        }
    }
}

fn submit_input(app: &mut App) {
    match app.screen {
        Screen::Chat => app.submit_message(),
        Screen::Organizations => {
            let name = app.org_name_input.trim().to_string();
            if !name.is_empty() {
                app.create_organization(name);
                app.input_mode = InputMode::Normal;
            }
        }
        Screen::Documents => {
            let path = app.upload_path_input.trim().to_string();
            if !path.is_empty() {
                if let Some(org) = app.organization.as_ref() {
                    let org_id = org.id;
                    app.upload_document(org_id, PathBuf::from(path));
                }
                app.upload_path_input.clear();
                app.upload_cursor = 0;
                app.show_upload_input = false;
                app.input_mode = InputMode::Normal;
            }
        }
    }
}

fn editing_target(app: &mut App) -> (&mut String, &mut usize) {
    match app.screen {
        Screen::Chat => (&mut app.message_input, &mut app.message_cursor),
        Screen::Organizations => (&mut app.org_name_input, &mut app.org_name_cursor),
        Screen::Documents => (&mut app.upload_path_input, &mut app.upload_cursor),
    }
}

fn edit_input(input: &mut String, cursor: &mut usize, code: KeyCode) {
    match code {
        KeyCode::Char(c) => {
            let idx = char_to_byte_index(input, *cursor);
            input.insert(idx, c);
            *cursor += 1;
        }
        KeyCode::Backspace => {
            if *cursor > 0 {
                *cursor -= 1;
                let idx = char_to_byte_index(input, *cursor);
                input.remove(idx);
            }
        }
        KeyCode::Left => *cursor = cursor.saturating_sub(1),
        KeyCode::Right => *cursor = (*cursor + 1).min(input.chars().count()),
        KeyCode::Home => *cursor = 0,
        KeyCode::End => *cursor = input.chars().count(),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_input_handles_multibyte_characters() {
        let mut input = "дом".to_string();
        let mut cursor = 3;

        edit_input(&mut input, &mut cursor, KeyCode::Backspace);
        assert_eq!(input, "до");

        edit_input(&mut input, &mut cursor, KeyCode::Char('!'));
        assert_eq!(input, "до!");
        assert_eq!(cursor, 3);
    }

    #[test]
    fn test_cursor_stays_within_bounds() {
        let mut input = "ab".to_string();
        let mut cursor = 2;

        edit_input(&mut input, &mut cursor, KeyCode::Right);
        assert_eq!(cursor, 2);

        edit_input(&mut input, &mut cursor, KeyCode::Home);
        assert_eq!(cursor, 0);

        edit_input(&mut input, &mut cursor, KeyCode::Backspace);
        assert_eq!(input, "ab");
    }
}
